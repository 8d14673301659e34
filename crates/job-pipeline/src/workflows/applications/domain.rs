use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::workflows::catalog::{Stage, StatusCatalog, StatusId};

/// Identifier allocated by the storage collaborator for each tracked application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationId(pub u64);

impl std::fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque, already-verified identity of the person tracking the application.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub String);

impl OwnerId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Foreign reference to company reference data. Never validated here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompanyId(pub u32);

/// Input for [`PipelineService::create_application`](super::PipelineService::create_application).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewApplication {
    pub owner: OwnerId,
    pub company_id: CompanyId,
    pub title: String,
    pub location: String,
    pub applied_date: DateTime<Utc>,
    pub initial_status_id: StatusId,
}

/// One tracked application with its cached pointer to the current status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub id: ApplicationId,
    pub owner: OwnerId,
    pub company_id: CompanyId,
    pub title: String,
    pub location: String,
    pub applied_date: DateTime<Utc>,
    pub current_status_id: StatusId,
    /// Timestamp of the newest history entry; doubles as the optimistic write token.
    pub last_record_timestamp: DateTime<Utc>,
}

impl ApplicationRecord {
    pub fn is_owned_by(&self, owner: &OwnerId) -> bool {
        &self.owner == owner
    }
}

/// Append-only transition event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub application_id: ApplicationId,
    pub timestamp: DateTime<Utc>,
    pub status_id: StatusId,
}

/// An application together with its history in non-decreasing timestamp order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationHistory {
    pub record: ApplicationRecord,
    pub entries: Vec<StatusHistoryEntry>,
}

impl ApplicationHistory {
    pub fn id(&self) -> ApplicationId {
        self.record.id
    }

    pub fn first(&self) -> Option<&StatusHistoryEntry> {
        self.entries.first()
    }

    /// Entry with the greatest timestamp; the last appended one wins ties.
    pub fn latest(&self) -> Option<&StatusHistoryEntry> {
        self.entries.iter().max_by_key(|entry| entry.timestamp)
    }

    pub fn status_sequence(&self) -> impl Iterator<Item = StatusId> + '_ {
        self.entries.iter().map(|entry| entry.status_id)
    }

    /// First violated invariant, if any: a history must exist, belong to this
    /// record, be time ordered, and agree with the cached current status.
    pub fn integrity_violation(&self) -> Option<IntegrityViolation> {
        let application_id = self.record.id;
        let latest = match self.latest() {
            Some(latest) => latest,
            None => return Some(IntegrityViolation::MissingHistory { application_id }),
        };

        if let Some(stray) = self
            .entries
            .iter()
            .find(|entry| entry.application_id != application_id)
        {
            return Some(IntegrityViolation::OrphanHistory {
                application_id: stray.application_id,
            });
        }

        let ordered = self
            .entries
            .windows(2)
            .all(|pair| pair[0].timestamp <= pair[1].timestamp);
        if !ordered {
            return Some(IntegrityViolation::UnorderedHistory { application_id });
        }

        if latest.status_id != self.record.current_status_id
            || latest.timestamp != self.record.last_record_timestamp
        {
            return Some(IntegrityViolation::StaleCurrentStatus {
                application_id,
                cached: self.record.current_status_id,
                latest: latest.status_id,
            });
        }

        None
    }

    pub fn is_completed(&self, catalog: &StatusCatalog) -> bool {
        catalog
            .status_by_id(self.record.current_status_id)
            .map(|status| status.is_terminal())
            .unwrap_or(false)
    }

    pub fn view(&self, catalog: &StatusCatalog) -> ApplicationView {
        let current = catalog.status_by_id(self.record.current_status_id).ok();
        ApplicationView {
            id: self.record.id,
            company_id: self.record.company_id,
            title: self.record.title.clone(),
            location: self.record.location.clone(),
            applied_date: self.record.applied_date,
            current_status_id: self.record.current_status_id,
            current_status_name: current.map(|status| status.name.clone()),
            current_stage: current.map(|status| status.stage),
            last_record_timestamp: self.record.last_record_timestamp,
            history: self
                .entries
                .iter()
                .map(|entry| HistoryEntryView {
                    timestamp: entry.timestamp,
                    status_id: entry.status_id,
                })
                .collect(),
        }
    }
}

/// Broken record/history relationships found on the read side.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegrityViolation {
    #[error("application {application_id} has no status history")]
    MissingHistory { application_id: ApplicationId },
    #[error("history entry references missing application {application_id}")]
    OrphanHistory { application_id: ApplicationId },
    #[error("history of application {application_id} is not in timestamp order")]
    UnorderedHistory { application_id: ApplicationId },
    #[error(
        "application {application_id} caches status {cached} but its latest entry is {latest}"
    )]
    StaleCurrentStatus {
        application_id: ApplicationId,
        cached: StatusId,
        latest: StatusId,
    },
}

/// Owner-facing projection returned by the HTTP layer.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationView {
    pub id: ApplicationId,
    pub company_id: CompanyId,
    pub title: String,
    pub location: String,
    pub applied_date: DateTime<Utc>,
    pub current_status_id: StatusId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_status_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_stage: Option<Stage>,
    pub last_record_timestamp: DateTime<Utc>,
    pub history: Vec<HistoryEntryView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntryView {
    pub timestamp: DateTime<Utc>,
    pub status_id: StatusId,
}
