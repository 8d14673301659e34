use chrono::NaiveDate;
use serde::Serialize;

use crate::workflows::applications::IntegrityViolation;
use crate::workflows::catalog::{Stage, StatusId};

#[derive(Debug, Clone, Serialize)]
pub struct FlowNodeView {
    pub status_id: StatusId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    pub throughput: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlowEdgeView {
    pub from: StatusId,
    pub to: StatusId,
    pub weight: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlowGraphView {
    pub nodes: Vec<FlowNodeView>,
    pub edges: Vec<FlowEdgeView>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<IntegrityViolation>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityDayView {
    pub date: NaiveDate,
    pub count: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityView {
    pub days: Vec<ActivityDayView>,
    pub total: u32,
    pub recent_count: u32,
    pub recent_window_days: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<IntegrityViolation>,
}
