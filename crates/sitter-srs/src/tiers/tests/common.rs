use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde_json::Value;

use crate::config::SchedulerConfig;
use crate::tiers::domain::{
    BookingId, CompensationRecord, OrgId, ScoreBreakdown, Tier, TierSnapshot, WorkerId,
    WorkerTierState,
};
use crate::tiers::events::{
    EventWindow, OfferEvent, ResponseLink, ServiceEvent, ServiceLevel, VisitEvent, VisitStatus,
    WindowBounds,
};
use crate::tiers::memory::{InMemoryAuditSink, InMemoryEventStore, InMemorySnapshotStore};
use crate::tiers::service::TierService;
use crate::tiers::store::{
    EvaluationUpdate, EventReader, SnapshotStore, StoreError,
};

pub(super) fn org() -> OrgId {
    OrgId("org-1".to_string())
}

pub(super) fn sitter() -> WorkerId {
    WorkerId("sitter-9".to_string())
}

pub(super) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

pub(super) fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0)
        .single()
        .expect("valid instant")
}

pub(super) fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Empty 30-day window ending at `end`.
pub(super) fn window_ending(end: DateTime<Utc>) -> EventWindow {
    EventWindow {
        org_id: org(),
        worker_id: sitter(),
        bounds: WindowBounds::trailing_days(end, 30),
        response_links: Vec::new(),
        offers: Vec::new(),
        visits: Vec::new(),
        time_off: Vec::new(),
        service_events: Vec::new(),
    }
}

pub(super) fn response_link(
    requires_response_at: DateTime<Utc>,
    latency_minutes: i64,
) -> ResponseLink {
    ResponseLink {
        requires_response_at,
        responded_at: requires_response_at + Duration::minutes(latency_minutes),
        within_assignment_window: true,
        excluded: false,
    }
}

pub(super) fn accepted_offer(offered_at: DateTime<Utc>, booking: &str) -> OfferEvent {
    OfferEvent {
        offered_at,
        accepted_at: Some(offered_at + Duration::minutes(10)),
        declined_at: None,
        booking_id: Some(BookingId(booking.to_string())),
        excluded: false,
    }
}

pub(super) fn declined_offer(offered_at: DateTime<Utc>) -> OfferEvent {
    OfferEvent {
        offered_at,
        accepted_at: None,
        declined_at: Some(offered_at + Duration::minutes(10)),
        booking_id: None,
        excluded: false,
    }
}

pub(super) fn completed_visit(
    scheduled_start: DateTime<Utc>,
    booking: &str,
    late_minutes: u32,
) -> VisitEvent {
    VisitEvent {
        booking_id: BookingId(booking.to_string()),
        scheduled_start,
        status: VisitStatus::Completed,
        late_minutes,
        checklist_missed_count: 0,
        media_missing_count: 0,
        complaint_verified: false,
        safety_flag: false,
        excluded: false,
    }
}

pub(super) fn missed_visit(scheduled_start: DateTime<Utc>, booking: &str) -> VisitEvent {
    VisitEvent {
        booking_id: BookingId(booking.to_string()),
        scheduled_start,
        status: VisitStatus::Missed,
        late_minutes: 0,
        checklist_missed_count: 0,
        media_missing_count: 0,
        complaint_verified: false,
        safety_flag: false,
        excluded: false,
    }
}

pub(super) fn service_event(level: ServiceLevel, effective_from: DateTime<Utc>) -> ServiceEvent {
    ServiceEvent {
        level,
        effective_from,
        effective_to: None,
    }
}

/// Snapshot row with the given score and neutral everything else. Tier
/// fields follow the score.
pub(super) fn snapshot_on(as_of_date: NaiveDate, score: f64) -> TierSnapshot {
    TierSnapshot {
        org_id: org(),
        worker_id: sitter(),
        as_of_date,
        score,
        breakdown: ScoreBreakdown::default(),
        samples: Default::default(),
        tier: Tier::from_score(score),
        tier_recommendation: Tier::from_score(score),
        provisional: false,
        visits_30d: 20,
        offers_30d: 10,
        rolling_26w: None,
        at_risk: false,
        at_risk_reason: None,
        last_promotion_at: None,
        last_demotion_at: None,
    }
}

pub(super) fn tier_state(tier: Tier, updated_at: DateTime<Utc>) -> WorkerTierState {
    WorkerTierState {
        org_id: org(),
        worker_id: sitter(),
        tier,
        last_promotion_at: None,
        last_demotion_at: None,
        updated_at,
    }
}

pub(super) fn compensation(base_pay: f64, next_review_date: NaiveDate) -> CompensationRecord {
    CompensationRecord {
        org_id: org(),
        worker_id: sitter(),
        base_pay,
        last_raise_at: None,
        last_raise_amount: None,
        next_review_date,
    }
}

pub(super) struct Harness {
    pub(super) events: Arc<InMemoryEventStore>,
    pub(super) snapshots: Arc<InMemorySnapshotStore>,
    pub(super) audit: Arc<InMemoryAuditSink>,
    pub(super) service:
        Arc<TierService<InMemoryEventStore, InMemorySnapshotStore, InMemoryAuditSink>>,
}

pub(super) fn harness() -> Harness {
    let events = Arc::new(InMemoryEventStore::default());
    let snapshots = Arc::new(InMemorySnapshotStore::default());
    let audit = Arc::new(InMemoryAuditSink::default());
    let service = Arc::new(TierService::new(
        events.clone(),
        snapshots.clone(),
        audit.clone(),
    ));
    Harness {
        events,
        snapshots,
        audit,
        service,
    }
}

/// Fills the trailing month before `end` with activity that scores exactly
/// 90.0 for a foundation sitter: fast replies, a perfect acceptance and
/// completion record, sixteen on-time visits, and a clean conduct sheet.
pub(super) fn seed_good_month(
    harness: &Harness,
    org: &OrgId,
    worker: &WorkerId,
    end: DateTime<Utc>,
) {
    for i in 0..10i64 {
        let day = end - Duration::days(i + 1);
        harness
            .events
            .push_response_link(org, worker, response_link(day, 3));
        harness
            .events
            .push_offer(org, worker, accepted_offer(day, &format!("bk-{i}")));
    }
    for i in 0..16i64 {
        let day = end - Duration::days(i + 1);
        harness
            .events
            .push_visit(org, worker, completed_visit(day, &format!("bk-{i}"), 0));
    }
}

pub(super) fn test_scheduler_config() -> SchedulerConfig {
    SchedulerConfig {
        concurrency: 2,
        retry_attempts: 3,
        retry_base_delay_ms: 1,
    }
}

/// Snapshot store that fails the first `failures` inserts with a transient
/// error, then behaves normally.
pub(super) struct FlakySnapshotStore {
    inner: InMemorySnapshotStore,
    failures: Mutex<u32>,
}

impl FlakySnapshotStore {
    pub(super) fn failing(failures: u32) -> Self {
        Self {
            inner: InMemorySnapshotStore::default(),
            failures: Mutex::new(failures),
        }
    }
}

impl SnapshotStore for FlakySnapshotStore {
    fn insert_snapshot(&self, snapshot: TierSnapshot) -> Result<TierSnapshot, StoreError> {
        let mut failures = self.failures.lock().expect("failure counter mutex poisoned");
        if *failures > 0 {
            *failures -= 1;
            return Err(StoreError::Unavailable("snapshot store offline".to_string()));
        }
        drop(failures);
        self.inner.insert_snapshot(snapshot)
    }

    fn snapshot(
        &self,
        org: &OrgId,
        worker: &WorkerId,
        as_of_date: NaiveDate,
    ) -> Result<Option<TierSnapshot>, StoreError> {
        self.inner.snapshot(org, worker, as_of_date)
    }

    fn latest_snapshot(
        &self,
        org: &OrgId,
        worker: &WorkerId,
    ) -> Result<Option<TierSnapshot>, StoreError> {
        self.inner.latest_snapshot(org, worker)
    }

    fn snapshots_between(
        &self,
        org: &OrgId,
        worker: &WorkerId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<TierSnapshot>, StoreError> {
        self.inner.snapshots_between(org, worker, from, to)
    }

    fn recent_snapshots(
        &self,
        org: &OrgId,
        worker: &WorkerId,
        limit: usize,
    ) -> Result<Vec<TierSnapshot>, StoreError> {
        self.inner.recent_snapshots(org, worker, limit)
    }

    fn apply_evaluation(
        &self,
        org: &OrgId,
        worker: &WorkerId,
        as_of_date: NaiveDate,
        update: EvaluationUpdate,
    ) -> Result<(), StoreError> {
        self.inner.apply_evaluation(org, worker, as_of_date, update)
    }

    fn tier_state(
        &self,
        org: &OrgId,
        worker: &WorkerId,
    ) -> Result<Option<WorkerTierState>, StoreError> {
        self.inner.tier_state(org, worker)
    }

    fn put_tier_state(&self, state: WorkerTierState) -> Result<(), StoreError> {
        self.inner.put_tier_state(state)
    }

    fn compensation(
        &self,
        org: &OrgId,
        worker: &WorkerId,
    ) -> Result<Option<CompensationRecord>, StoreError> {
        self.inner.compensation(org, worker)
    }

    fn put_compensation(&self, record: CompensationRecord) -> Result<(), StoreError> {
        self.inner.put_compensation(record)
    }

    fn workers_with_snapshot_since(
        &self,
        org: &OrgId,
        since: NaiveDate,
    ) -> Result<Vec<WorkerId>, StoreError> {
        self.inner.workers_with_snapshot_since(org, since)
    }
}

/// Event reader that is always unavailable.
pub(super) struct DownEventStore;

impl EventReader for DownEventStore {
    fn response_links(
        &self,
        _org: &OrgId,
        _worker: &WorkerId,
        _bounds: &WindowBounds,
    ) -> Result<Vec<ResponseLink>, StoreError> {
        Err(StoreError::Unavailable("event store offline".to_string()))
    }

    fn offers(
        &self,
        _org: &OrgId,
        _worker: &WorkerId,
        _bounds: &WindowBounds,
    ) -> Result<Vec<OfferEvent>, StoreError> {
        Err(StoreError::Unavailable("event store offline".to_string()))
    }

    fn visits(
        &self,
        _org: &OrgId,
        _worker: &WorkerId,
        _bounds: &WindowBounds,
    ) -> Result<Vec<VisitEvent>, StoreError> {
        Err(StoreError::Unavailable("event store offline".to_string()))
    }

    fn time_off(
        &self,
        _org: &OrgId,
        _worker: &WorkerId,
        _bounds: &WindowBounds,
    ) -> Result<Vec<crate::tiers::events::TimeOffPeriod>, StoreError> {
        Err(StoreError::Unavailable("event store offline".to_string()))
    }

    fn service_events(
        &self,
        _org: &OrgId,
        _worker: &WorkerId,
        _bounds: &WindowBounds,
    ) -> Result<Vec<ServiceEvent>, StoreError> {
        Err(StoreError::Unavailable("event store offline".to_string()))
    }

    fn active_workers(&self, _org: &OrgId) -> Result<Vec<WorkerId>, StoreError> {
        Err(StoreError::Unavailable("event store offline".to_string()))
    }
}

pub(super) async fn read_json_body(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
