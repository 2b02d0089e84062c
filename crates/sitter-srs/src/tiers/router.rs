use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::domain::{OrgId, WorkerId};
use super::scheduler::{
    fan_out_daily_snapshots, fan_out_weekly_evaluations, EnqueueOutcome, SchedulerHandle, SrsJob,
};
use super::service::{TierService, TierServiceError, HISTORY_DEFAULT_LIMIT};
use super::store::{AuditSink, EventReader, SnapshotStore, StoreError};

/// Shared state behind the tier endpoints: the engine plus the job queue.
pub struct TierApi<E, S, A> {
    pub service: Arc<TierService<E, S, A>>,
    pub scheduler: SchedulerHandle,
}

/// Router builder exposing HTTP endpoints for tier reads and job submission.
pub fn tier_router<E, S, A>(api: Arc<TierApi<E, S, A>>) -> Router
where
    E: EventReader + 'static,
    S: SnapshotStore + 'static,
    A: AuditSink + 'static,
{
    Router::new()
        .route(
            "/api/v1/orgs/:org_id/sitters/:sitter_id/tier",
            get(tier_details_handler::<E, S, A>),
        )
        .route(
            "/api/v1/orgs/:org_id/sitters/:sitter_id/tier/history",
            get(tier_history_handler::<E, S, A>),
        )
        .route(
            "/api/v1/orgs/:org_id/sitters/:sitter_id/score",
            get(score_preview_handler::<E, S, A>),
        )
        .route(
            "/api/v1/orgs/:org_id/jobs/daily-snapshot",
            post(daily_snapshot_job_handler::<E, S, A>),
        )
        .route(
            "/api/v1/orgs/:org_id/jobs/weekly-evaluation",
            post(weekly_evaluation_job_handler::<E, S, A>),
        )
        .with_state(api)
}

#[derive(Debug, Deserialize)]
pub(crate) struct HistoryParams {
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PreviewParams {
    as_of: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JobRequest {
    #[serde(default)]
    as_of: Option<NaiveDate>,
    #[serde(default)]
    sitter_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct JobAccepted {
    job: &'static str,
    as_of: NaiveDate,
    accepted: usize,
    duplicates: usize,
}

pub(crate) async fn tier_details_handler<E, S, A>(
    State(api): State<Arc<TierApi<E, S, A>>>,
    Path((org_id, sitter_id)): Path<(String, String)>,
) -> Response
where
    E: EventReader + 'static,
    S: SnapshotStore + 'static,
    A: AuditSink + 'static,
{
    let org = OrgId(org_id);
    let sitter = WorkerId(sitter_id);
    match api.service.tier_details(&org, &sitter) {
        Ok(details) => (StatusCode::OK, axum::Json(details)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn tier_history_handler<E, S, A>(
    State(api): State<Arc<TierApi<E, S, A>>>,
    Path((org_id, sitter_id)): Path<(String, String)>,
    Query(params): Query<HistoryParams>,
) -> Response
where
    E: EventReader + 'static,
    S: SnapshotStore + 'static,
    A: AuditSink + 'static,
{
    let org = OrgId(org_id);
    let sitter = WorkerId(sitter_id);
    let limit = params.limit.unwrap_or(HISTORY_DEFAULT_LIMIT);
    match api.service.tier_history(&org, &sitter, limit) {
        Ok(snapshots) => (StatusCode::OK, axum::Json(snapshots)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn score_preview_handler<E, S, A>(
    State(api): State<Arc<TierApi<E, S, A>>>,
    Path((org_id, sitter_id)): Path<(String, String)>,
    Query(params): Query<PreviewParams>,
) -> Response
where
    E: EventReader + 'static,
    S: SnapshotStore + 'static,
    A: AuditSink + 'static,
{
    let org = OrgId(org_id);
    let sitter = WorkerId(sitter_id);
    let as_of = params.as_of.unwrap_or_else(|| Utc::now().date_naive());
    match api.service.score_preview(&org, &sitter, as_of) {
        Ok(result) => (StatusCode::OK, axum::Json(result)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn daily_snapshot_job_handler<E, S, A>(
    State(api): State<Arc<TierApi<E, S, A>>>,
    Path(org_id): Path<String>,
    axum::Json(request): axum::Json<JobRequest>,
) -> Response
where
    E: EventReader + 'static,
    S: SnapshotStore + 'static,
    A: AuditSink + 'static,
{
    let org = OrgId(org_id);
    let as_of = request.as_of.unwrap_or_else(|| Utc::now().date_naive());

    if let Some(sitter_id) = request.sitter_id {
        let job = SrsJob::daily_snapshot(org, WorkerId(sitter_id), as_of);
        return enqueue_response("daily-snapshot", as_of, api.scheduler.enqueue(job).await);
    }

    match fan_out_daily_snapshots(&api.scheduler, &api.service, &org, as_of).await {
        Ok(summary) => (
            StatusCode::ACCEPTED,
            axum::Json(JobAccepted {
                job: "daily-snapshot",
                as_of,
                accepted: summary.accepted,
                duplicates: summary.duplicates,
            }),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn weekly_evaluation_job_handler<E, S, A>(
    State(api): State<Arc<TierApi<E, S, A>>>,
    Path(org_id): Path<String>,
    axum::Json(request): axum::Json<JobRequest>,
) -> Response
where
    E: EventReader + 'static,
    S: SnapshotStore + 'static,
    A: AuditSink + 'static,
{
    let org = OrgId(org_id);
    let as_of = request.as_of.unwrap_or_else(|| Utc::now().date_naive());

    if let Some(sitter_id) = request.sitter_id {
        let job = SrsJob::weekly_evaluation(org, WorkerId(sitter_id), as_of);
        return enqueue_response("weekly-evaluation", as_of, api.scheduler.enqueue(job).await);
    }

    match fan_out_weekly_evaluations(&api.scheduler, &api.service, &org, as_of).await {
        Ok(summary) => (
            StatusCode::ACCEPTED,
            axum::Json(JobAccepted {
                job: "weekly-evaluation",
                as_of,
                accepted: summary.accepted,
                duplicates: summary.duplicates,
            }),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

fn enqueue_response(job: &'static str, as_of: NaiveDate, outcome: EnqueueOutcome) -> Response {
    match outcome {
        EnqueueOutcome::Accepted => (
            StatusCode::ACCEPTED,
            axum::Json(JobAccepted {
                job,
                as_of,
                accepted: 1,
                duplicates: 0,
            }),
        )
            .into_response(),
        EnqueueOutcome::Duplicate => (
            StatusCode::ACCEPTED,
            axum::Json(JobAccepted {
                job,
                as_of,
                accepted: 0,
                duplicates: 1,
            }),
        )
            .into_response(),
        EnqueueOutcome::Closed => {
            let payload = json!({
                "error": "scheduler is shut down",
            });
            (StatusCode::SERVICE_UNAVAILABLE, axum::Json(payload)).into_response()
        }
    }
}

fn error_response(err: TierServiceError) -> Response {
    match err {
        TierServiceError::Store(StoreError::NotFound) => {
            let payload = json!({
                "error": "sitter has no tier record",
            });
            (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
        }
        TierServiceError::Store(StoreError::Conflict) => {
            let payload = json!({
                "error": "snapshot already recorded for this date",
            });
            (StatusCode::CONFLICT, axum::Json(payload)).into_response()
        }
        other => {
            let payload = json!({
                "error": other.to_string(),
            });
            (StatusCode::BAD_GATEWAY, axum::Json(payload)).into_response()
        }
    }
}
