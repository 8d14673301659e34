use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::domain::{ApplicationId, CompanyId, NewApplication, OwnerId};
use super::repository::ApplicationRepository;
use super::service::{Clock, ListFilter, PipelineError, PipelineService};
use crate::workflows::catalog::StatusId;

/// Header carrying the verified owner identity, set by the authenticating proxy.
pub const OWNER_HEADER: &str = "x-owner-email";

#[derive(Debug, Deserialize)]
pub struct CreateApplicationRequest {
    pub company_id: CompanyId,
    pub title: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub applied_date: Option<DateTime<Utc>>,
    pub status_id: StatusId,
}

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub status_id: StatusId,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub hide_completed: bool,
}

/// Router builder exposing the pipeline and its analytics over HTTP.
pub fn pipeline_router<R, C>(service: Arc<PipelineService<R, C>>) -> Router
where
    R: ApplicationRepository + 'static,
    C: Clock + 'static,
{
    Router::new()
        .route("/api/v1/statuses", get(statuses_handler::<R, C>))
        .route(
            "/api/v1/applications",
            get(list_handler::<R, C>).post(create_handler::<R, C>),
        )
        .route(
            "/api/v1/applications/:application_id",
            get(get_handler::<R, C>)
                .patch(transition_handler::<R, C>)
                .delete(delete_handler::<R, C>),
        )
        .route("/api/v1/analytics/flow", get(flow_handler::<R, C>))
        .route("/api/v1/analytics/activity", get(activity_handler::<R, C>))
        .with_state(service)
}

pub(crate) async fn statuses_handler<R, C>(
    State(service): State<Arc<PipelineService<R, C>>>,
) -> Response
where
    R: ApplicationRepository + 'static,
    C: Clock + 'static,
{
    let groups = service.catalog().grouped_view();
    (StatusCode::OK, Json(groups)).into_response()
}

pub(crate) async fn list_handler<R, C>(
    State(service): State<Arc<PipelineService<R, C>>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Response
where
    R: ApplicationRepository + 'static,
    C: Clock + 'static,
{
    let owner = match owner_from_headers(&headers) {
        Ok(owner) => owner,
        Err(response) => return response,
    };

    let filter = ListFilter {
        hide_completed: query.hide_completed,
    };
    match service.list(&owner, filter) {
        Ok(histories) => {
            let views: Vec<_> = histories
                .iter()
                .map(|history| history.view(service.catalog()))
                .collect();
            (StatusCode::OK, Json(views)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn create_handler<R, C>(
    State(service): State<Arc<PipelineService<R, C>>>,
    headers: HeaderMap,
    Json(request): Json<CreateApplicationRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
    C: Clock + 'static,
{
    let owner = match owner_from_headers(&headers) {
        Ok(owner) => owner,
        Err(response) => return response,
    };

    let application = NewApplication {
        owner: owner.clone(),
        company_id: request.company_id,
        title: request.title,
        location: request.location,
        applied_date: request.applied_date.unwrap_or_else(|| service.now()),
        initial_status_id: request.status_id,
    };

    let created = service
        .create_application(application)
        .and_then(|record| service.get(record.id, &owner));
    match created {
        Ok(history) => {
            (StatusCode::CREATED, Json(history.view(service.catalog()))).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn get_handler<R, C>(
    State(service): State<Arc<PipelineService<R, C>>>,
    headers: HeaderMap,
    Path(application_id): Path<u64>,
) -> Response
where
    R: ApplicationRepository + 'static,
    C: Clock + 'static,
{
    let owner = match owner_from_headers(&headers) {
        Ok(owner) => owner,
        Err(response) => return response,
    };

    match service.get(ApplicationId(application_id), &owner) {
        Ok(history) => (StatusCode::OK, Json(history.view(service.catalog()))).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn transition_handler<R, C>(
    State(service): State<Arc<PipelineService<R, C>>>,
    headers: HeaderMap,
    Path(application_id): Path<u64>,
    Json(request): Json<TransitionRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
    C: Clock + 'static,
{
    let owner = match owner_from_headers(&headers) {
        Ok(owner) => owner,
        Err(response) => return response,
    };
    let id = ApplicationId(application_id);

    // Lock waits are bounded but still blocking; keep them off the async workers.
    let worker = Arc::clone(&service);
    let result = tokio::task::spawn_blocking(move || {
        let timestamp = request.timestamp.unwrap_or_else(|| worker.now());
        worker
            .transition_at(id, &owner, request.status_id, timestamp)
            .and_then(|_| worker.get(id, &owner))
    })
    .await;

    match result {
        Ok(Ok(history)) => (StatusCode::OK, Json(history.view(service.catalog()))).into_response(),
        Ok(Err(err)) => error_response(err),
        Err(join_error) => join_failure(join_error),
    }
}

pub(crate) async fn delete_handler<R, C>(
    State(service): State<Arc<PipelineService<R, C>>>,
    headers: HeaderMap,
    Path(application_id): Path<u64>,
) -> Response
where
    R: ApplicationRepository + 'static,
    C: Clock + 'static,
{
    let owner = match owner_from_headers(&headers) {
        Ok(owner) => owner,
        Err(response) => return response,
    };
    let id = ApplicationId(application_id);

    let worker = Arc::clone(&service);
    let result =
        tokio::task::spawn_blocking(move || worker.delete_application(id, &owner)).await;

    match result {
        Ok(Ok(())) => StatusCode::NO_CONTENT.into_response(),
        Ok(Err(err)) => error_response(err),
        Err(join_error) => join_failure(join_error),
    }
}

pub(crate) async fn flow_handler<R, C>(
    State(service): State<Arc<PipelineService<R, C>>>,
    headers: HeaderMap,
) -> Response
where
    R: ApplicationRepository + 'static,
    C: Clock + 'static,
{
    let owner = match owner_from_headers(&headers) {
        Ok(owner) => owner,
        Err(response) => return response,
    };

    match service.flow_graph(&owner) {
        Ok(graph) => (StatusCode::OK, Json(graph.view(service.catalog()))).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn activity_handler<R, C>(
    State(service): State<Arc<PipelineService<R, C>>>,
    headers: HeaderMap,
) -> Response
where
    R: ApplicationRepository + 'static,
    C: Clock + 'static,
{
    let owner = match owner_from_headers(&headers) {
        Ok(owner) => owner,
        Err(response) => return response,
    };

    match service.activity(&owner) {
        Ok(calendar) => {
            let view = calendar.view(service.now(), service.config().recent_window_days);
            (StatusCode::OK, Json(view)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) fn owner_from_headers(headers: &HeaderMap) -> Result<OwnerId, Response> {
    headers
        .get(OWNER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(OwnerId::new)
        .ok_or_else(|| {
            let payload = json!({ "error": "missing owner identity" });
            (StatusCode::UNAUTHORIZED, Json(payload)).into_response()
        })
}

fn error_response(err: PipelineError) -> Response {
    let status = err.status_code();
    if status.is_server_error() {
        error!(error = %err, "pipeline request failed");
    }
    let payload = json!({ "error": err.to_string() });
    (status, Json(payload)).into_response()
}

fn join_failure(err: tokio::task::JoinError) -> Response {
    error!(error = %err, "pipeline worker task failed");
    let payload = json!({ "error": "internal error" });
    (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
}
