use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::Duration;
use serde_json::json;
use tower::ServiceExt;

use super::common::*;
use crate::tiers::domain::{Tier, WorkerId};
use crate::tiers::router::{tier_router, TierApi};
use crate::tiers::scheduler::{SchedulerHandle, SrsScheduler};
use crate::tiers::store::{AuditKind, SnapshotStore};

fn router_for(h: &Harness) -> (Router, SchedulerHandle) {
    let scheduler = SrsScheduler::start(h.service.clone(), test_scheduler_config());
    let api = Arc::new(TierApi {
        service: h.service.clone(),
        scheduler: scheduler.clone(),
    });
    (tier_router(api), scheduler)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

fn post_json(uri: &str, payload: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .expect("request")
}

#[tokio::test]
async fn tier_endpoint_reports_current_standing() {
    let h = harness();
    h.snapshots
        .put_tier_state(tier_state(Tier::Trusted, at(2026, 3, 1, 0, 0)))
        .expect("state stored");
    h.snapshots
        .insert_snapshot(snapshot_on(date(2026, 3, 2), 82.0))
        .expect("insert");
    h.snapshots
        .put_compensation(compensation(13.00, date(2026, 6, 1)))
        .expect("compensation stored");
    let (router, scheduler) = router_for(&h);

    let response = router
        .oneshot(get("/api/v1/orgs/org-1/sitters/sitter-9/tier"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["tier"], "trusted");
    assert_eq!(body["tier_label"], "trusted");
    assert_eq!(body["score"], 82.0);
    assert_eq!(body["perks"]["holiday_rate_multiplier"], 1.5);
    assert_eq!(body["next_tier"]["tier"], "preferred");
    assert_eq!(body["next_tier"]["min_score"], 90.0);
    assert_eq!(body["compensation"]["base_pay"], 13.0);

    scheduler.shutdown().await;
}

#[tokio::test]
async fn unknown_sitters_get_a_not_found_payload() {
    let h = harness();
    let (router, scheduler) = router_for(&h);

    let response = router
        .oneshot(get("/api/v1/orgs/org-1/sitters/sitter-404/tier"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = read_json_body(response).await;
    assert_eq!(body["error"], "sitter has no tier record");

    scheduler.shutdown().await;
}

#[tokio::test]
async fn history_honors_the_limit_parameter() {
    let h = harness();
    for i in 0..5i64 {
        h.snapshots
            .insert_snapshot(snapshot_on(date(2026, 1, 1) + Duration::days(i), 80.0))
            .expect("insert");
    }
    let (router, scheduler) = router_for(&h);

    let response = router
        .oneshot(get(
            "/api/v1/orgs/org-1/sitters/sitter-9/tier/history?limit=2",
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    let rows = body.as_array().expect("array body");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["as_of_date"], "2026-01-05");
    assert_eq!(rows[1]["as_of_date"], "2026-01-04");

    scheduler.shutdown().await;
}

#[tokio::test]
async fn score_preview_reads_without_writing() {
    let h = harness();
    seed_good_month(&h, &org(), &sitter(), day_start(date(2026, 3, 2)));
    let (router, scheduler) = router_for(&h);

    let response = router
        .oneshot(get(
            "/api/v1/orgs/org-1/sitters/sitter-9/score?as_of=2026-03-02",
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["score"], 90.0);

    assert!(h
        .snapshots
        .latest_snapshot(&org(), &sitter())
        .expect("store readable")
        .is_none());
    scheduler.shutdown().await;
}

#[tokio::test]
async fn single_sitter_jobs_are_accepted_then_deduplicated() {
    let h = harness();
    let (router, scheduler) = router_for(&h);
    let payload = json!({ "as_of": "2026-03-02", "sitter_id": "sitter-9" });

    let response = router
        .clone()
        .oneshot(post_json(
            "/api/v1/orgs/org-1/jobs/daily-snapshot",
            payload.clone(),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = read_json_body(response).await;
    assert_eq!(body["job"], "daily-snapshot");
    assert_eq!(body["as_of"], "2026-03-02");
    assert_eq!(body["accepted"], 1);
    assert_eq!(body["duplicates"], 0);

    let response = router
        .oneshot(post_json("/api/v1/orgs/org-1/jobs/daily-snapshot", payload))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = read_json_body(response).await;
    assert_eq!(body["accepted"], 0);
    assert_eq!(body["duplicates"], 1);

    scheduler.shutdown().await;
    assert!(h
        .snapshots
        .snapshot(&org(), &sitter(), date(2026, 3, 2))
        .expect("store readable")
        .is_some());
}

#[tokio::test]
async fn snapshot_jobs_fan_out_across_the_org() {
    let h = harness();
    h.events
        .register_worker(&org(), &WorkerId("sitter-a".to_string()));
    h.events
        .register_worker(&org(), &WorkerId("sitter-b".to_string()));
    let (router, scheduler) = router_for(&h);

    let response = router
        .oneshot(post_json(
            "/api/v1/orgs/org-1/jobs/daily-snapshot",
            json!({ "as_of": "2026-03-02" }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = read_json_body(response).await;
    assert_eq!(body["accepted"], 2);
    assert_eq!(body["duplicates"], 0);

    scheduler.shutdown().await;
    assert_eq!(h.audit.of_kind(AuditKind::SnapshotCreated).len(), 2);
}

#[tokio::test]
async fn evaluation_jobs_fan_out_to_recently_snapshotted_sitters() {
    let h = harness();
    h.snapshots
        .insert_snapshot(snapshot_on(date(2026, 3, 1), 85.0))
        .expect("insert");
    let (router, scheduler) = router_for(&h);

    let response = router
        .oneshot(post_json(
            "/api/v1/orgs/org-1/jobs/weekly-evaluation",
            json!({ "as_of": "2026-03-02" }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = read_json_body(response).await;
    assert_eq!(body["job"], "weekly-evaluation");
    assert_eq!(body["accepted"], 1);

    scheduler.shutdown().await;
}

#[tokio::test]
async fn malformed_query_dates_are_rejected() {
    let h = harness();
    let (router, scheduler) = router_for(&h);

    let response = router
        .oneshot(get(
            "/api/v1/orgs/org-1/sitters/sitter-9/score?as_of=not-a-date",
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    scheduler.shutdown().await;
}

#[tokio::test]
async fn malformed_body_dates_are_rejected() {
    let h = harness();
    let (router, scheduler) = router_for(&h);

    let response = router
        .oneshot(post_json(
            "/api/v1/orgs/org-1/jobs/daily-snapshot",
            json!({ "as_of": "03/02/2026" }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    scheduler.shutdown().await;
}

#[tokio::test]
async fn job_submission_after_shutdown_is_unavailable() {
    let h = harness();
    let (router, scheduler) = router_for(&h);
    scheduler.shutdown().await;

    let response = router
        .oneshot(post_json(
            "/api/v1/orgs/org-1/jobs/daily-snapshot",
            json!({ "as_of": "2026-03-02", "sitter_id": "sitter-9" }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = read_json_body(response).await;
    assert_eq!(body["error"], "scheduler is shut down");
}
