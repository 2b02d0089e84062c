use std::sync::Arc;

use chrono::Duration;

use super::common::*;
use crate::tiers::domain::WorkerId;
use crate::tiers::memory::{InMemoryAuditSink, InMemoryEventStore, InMemorySnapshotStore};
use crate::tiers::scheduler::{
    fan_out_daily_snapshots, fan_out_weekly_evaluations, EnqueueOutcome, SrsJob, SrsScheduler,
};
use crate::tiers::service::TierService;
use crate::tiers::store::{AuditKind, SnapshotStore};

#[test]
fn job_keys_identify_kind_sitter_and_date() {
    let daily = SrsJob::daily_snapshot(org(), sitter(), date(2026, 3, 2));
    assert_eq!(daily.key(), "srs-snapshot-org-1-sitter-9-2026-03-02");

    let weekly = SrsJob::weekly_evaluation(org(), sitter(), date(2026, 3, 2));
    assert_eq!(weekly.key(), "srs-eval-org-1-sitter-9-2026-03-02");
    assert_ne!(daily.key(), weekly.key());
}

#[tokio::test]
async fn a_repeated_key_is_dropped_as_a_duplicate() {
    let h = harness();
    let scheduler = SrsScheduler::start(h.service.clone(), test_scheduler_config());

    let job = SrsJob::daily_snapshot(org(), sitter(), date(2026, 3, 2));
    assert_eq!(scheduler.enqueue(job.clone()).await, EnqueueOutcome::Accepted);
    assert_eq!(scheduler.enqueue(job).await, EnqueueOutcome::Duplicate);

    scheduler.shutdown().await;
    assert_eq!(h.audit.of_kind(AuditKind::SnapshotCreated).len(), 1);
}

#[tokio::test]
async fn shutdown_drains_everything_already_queued() {
    let h = harness();
    let scheduler = SrsScheduler::start(h.service.clone(), test_scheduler_config());

    for i in 0..5i64 {
        let day = date(2026, 3, 2) + Duration::days(i);
        let outcome = scheduler
            .enqueue(SrsJob::daily_snapshot(org(), sitter(), day))
            .await;
        assert_eq!(outcome, EnqueueOutcome::Accepted);
    }
    scheduler.shutdown().await;

    assert_eq!(h.audit.of_kind(AuditKind::SnapshotCreated).len(), 5);
    for i in 0..5i64 {
        let day = date(2026, 3, 2) + Duration::days(i);
        let snapshot = h
            .snapshots
            .snapshot(&org(), &sitter(), day)
            .expect("store readable")
            .expect("snapshot drained");
        assert_eq!(snapshot.score, 38.0);
    }
}

#[tokio::test]
async fn transient_failures_retry_until_the_store_recovers() {
    let events = Arc::new(InMemoryEventStore::default());
    let snapshots = Arc::new(FlakySnapshotStore::failing(2));
    let audit = Arc::new(InMemoryAuditSink::default());
    let service = Arc::new(TierService::new(events, snapshots.clone(), audit.clone()));
    let scheduler = SrsScheduler::start(service, test_scheduler_config());

    let outcome = scheduler
        .enqueue(SrsJob::daily_snapshot(org(), sitter(), date(2026, 3, 2)))
        .await;
    assert_eq!(outcome, EnqueueOutcome::Accepted);
    scheduler.shutdown().await;

    assert!(snapshots
        .latest_snapshot(&org(), &sitter())
        .expect("store readable")
        .is_some());
    assert!(audit.of_kind(AuditKind::JobFailed).is_empty());
    assert_eq!(audit.of_kind(AuditKind::SnapshotCreated).len(), 1);
}

#[tokio::test]
async fn exhausted_retries_leave_an_audit_trace() {
    let events = Arc::new(DownEventStore);
    let snapshots = Arc::new(InMemorySnapshotStore::default());
    let audit = Arc::new(InMemoryAuditSink::default());
    let service = Arc::new(TierService::new(events, snapshots.clone(), audit.clone()));
    let scheduler = SrsScheduler::start(service, test_scheduler_config());

    let outcome = scheduler
        .enqueue(SrsJob::daily_snapshot(org(), sitter(), date(2026, 3, 2)))
        .await;
    assert_eq!(outcome, EnqueueOutcome::Accepted);
    scheduler.shutdown().await;

    let failures = audit.of_kind(AuditKind::JobFailed);
    assert_eq!(failures.len(), 1);
    let reason = failures[0].reason.as_deref().expect("failure reason");
    assert!(reason.contains("srs-snapshot-org-1-sitter-9-2026-03-02"));
    assert!(snapshots
        .latest_snapshot(&org(), &sitter())
        .expect("store readable")
        .is_none());
}

#[tokio::test]
async fn daily_fan_out_queues_each_registered_sitter_once() {
    let h = harness();
    for name in ["sitter-a", "sitter-b", "sitter-c"] {
        h.events.register_worker(&org(), &WorkerId(name.to_string()));
    }
    let scheduler = SrsScheduler::start(h.service.clone(), test_scheduler_config());

    let first = fan_out_daily_snapshots(&scheduler, h.service.as_ref(), &org(), date(2026, 3, 2))
        .await
        .expect("fan-out runs");
    assert_eq!(first.accepted, 3);
    assert_eq!(first.duplicates, 0);

    let second = fan_out_daily_snapshots(&scheduler, h.service.as_ref(), &org(), date(2026, 3, 2))
        .await
        .expect("fan-out reruns");
    assert_eq!(second.accepted, 0);
    assert_eq!(second.duplicates, 3);

    scheduler.shutdown().await;
    assert_eq!(h.audit.of_kind(AuditKind::SnapshotCreated).len(), 3);
}

#[tokio::test]
async fn weekly_fan_out_covers_only_recently_snapshotted_sitters() {
    let h = harness();
    let mut snapshot = snapshot_on(date(2026, 3, 1), 80.0);
    snapshot.worker_id = WorkerId("sitter-a".to_string());
    h.snapshots.insert_snapshot(snapshot).expect("insert");
    let mut snapshot = snapshot_on(date(2026, 2, 10), 80.0);
    snapshot.worker_id = WorkerId("sitter-b".to_string());
    h.snapshots.insert_snapshot(snapshot).expect("insert");
    let scheduler = SrsScheduler::start(h.service.clone(), test_scheduler_config());

    let summary =
        fan_out_weekly_evaluations(&scheduler, h.service.as_ref(), &org(), date(2026, 3, 2))
            .await
            .expect("fan-out runs");
    assert_eq!(summary.accepted, 1);
    assert_eq!(summary.duplicates, 0);

    scheduler.shutdown().await;
}

#[tokio::test]
async fn enqueue_after_shutdown_is_rejected() {
    let h = harness();
    let scheduler = SrsScheduler::start(h.service.clone(), test_scheduler_config());
    scheduler.shutdown().await;

    let outcome = scheduler
        .enqueue(SrsJob::daily_snapshot(org(), sitter(), date(2026, 3, 2)))
        .await;
    assert_eq!(outcome, EnqueueOutcome::Closed);
}
