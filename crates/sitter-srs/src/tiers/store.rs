//! Ports the tier engine depends on. Backends plug in behind these traits;
//! the in-memory adapters in [`super::memory`] are the reference
//! implementations and the test doubles.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use super::domain::{CompensationRecord, OrgId, Tier, TierSnapshot, WorkerId, WorkerTierState};
use super::events::{OfferEvent, ResponseLink, ServiceEvent, TimeOffPeriod, VisitEvent, WindowBounds};

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum AuditError {
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
}

/// Read access to the raw event streams that feed scoring.
///
/// Window semantics per category: response links match on
/// `requires_response_at`, offers on `offered_at`, visits on
/// `scheduled_start`, time-off periods on any overlap with the window, and
/// service events on being active during any part of the window.
pub trait EventReader: Send + Sync {
    fn response_links(
        &self,
        org: &OrgId,
        worker: &WorkerId,
        bounds: &WindowBounds,
    ) -> Result<Vec<ResponseLink>, StoreError>;

    fn offers(
        &self,
        org: &OrgId,
        worker: &WorkerId,
        bounds: &WindowBounds,
    ) -> Result<Vec<OfferEvent>, StoreError>;

    fn visits(
        &self,
        org: &OrgId,
        worker: &WorkerId,
        bounds: &WindowBounds,
    ) -> Result<Vec<VisitEvent>, StoreError>;

    fn time_off(
        &self,
        org: &OrgId,
        worker: &WorkerId,
        bounds: &WindowBounds,
    ) -> Result<Vec<TimeOffPeriod>, StoreError>;

    fn service_events(
        &self,
        org: &OrgId,
        worker: &WorkerId,
        bounds: &WindowBounds,
    ) -> Result<Vec<ServiceEvent>, StoreError>;

    /// Sitters known to the organization, in a stable order.
    fn active_workers(&self, org: &OrgId) -> Result<Vec<WorkerId>, StoreError>;
}

/// Fields the weekly evaluation stamps onto the most recent snapshot.
/// Measured values on the snapshot stay untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationUpdate {
    pub tier: Tier,
    pub at_risk: bool,
    pub at_risk_reason: Option<String>,
    pub last_promotion_at: Option<DateTime<Utc>>,
    pub last_demotion_at: Option<DateTime<Utc>>,
}

/// Persistence for snapshots, tier assignments, and compensation.
pub trait SnapshotStore: Send + Sync {
    /// Inserts a new snapshot; `Conflict` when one already exists for the
    /// sitter and date.
    fn insert_snapshot(&self, snapshot: TierSnapshot) -> Result<TierSnapshot, StoreError>;

    fn snapshot(
        &self,
        org: &OrgId,
        worker: &WorkerId,
        as_of_date: NaiveDate,
    ) -> Result<Option<TierSnapshot>, StoreError>;

    fn latest_snapshot(
        &self,
        org: &OrgId,
        worker: &WorkerId,
    ) -> Result<Option<TierSnapshot>, StoreError>;

    /// Snapshots with `from <= as_of_date <= to`, oldest first.
    fn snapshots_between(
        &self,
        org: &OrgId,
        worker: &WorkerId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<TierSnapshot>, StoreError>;

    /// Most recent snapshots, newest first, at most `limit`.
    fn recent_snapshots(
        &self,
        org: &OrgId,
        worker: &WorkerId,
        limit: usize,
    ) -> Result<Vec<TierSnapshot>, StoreError>;

    /// Stamps evaluation outcomes onto an existing snapshot; `NotFound`
    /// when no snapshot exists for the date.
    fn apply_evaluation(
        &self,
        org: &OrgId,
        worker: &WorkerId,
        as_of_date: NaiveDate,
        update: EvaluationUpdate,
    ) -> Result<(), StoreError>;

    fn tier_state(
        &self,
        org: &OrgId,
        worker: &WorkerId,
    ) -> Result<Option<WorkerTierState>, StoreError>;

    fn put_tier_state(&self, state: WorkerTierState) -> Result<(), StoreError>;

    fn compensation(
        &self,
        org: &OrgId,
        worker: &WorkerId,
    ) -> Result<Option<CompensationRecord>, StoreError>;

    fn put_compensation(&self, record: CompensationRecord) -> Result<(), StoreError>;

    /// Sitters with at least one snapshot dated `since` or later, in a
    /// stable order. Drives weekly evaluation fan-out.
    fn workers_with_snapshot_since(
        &self,
        org: &OrgId,
        since: NaiveDate,
    ) -> Result<Vec<WorkerId>, StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    SnapshotCreated,
    TierPromoted,
    TierDemoted,
    TierAtRisk,
    PayRaised,
    JobFailed,
}

impl AuditKind {
    pub const fn event_type(&self) -> &'static str {
        match self {
            AuditKind::SnapshotCreated => "sitter.srs.snapshot.created",
            AuditKind::TierPromoted => "sitter.tier.promoted",
            AuditKind::TierDemoted => "sitter.tier.demoted",
            AuditKind::TierAtRisk => "sitter.tier.at_risk",
            AuditKind::PayRaised => "sitter.pay.raised",
            AuditKind::JobFailed => "sitter.srs.job.failed",
        }
    }
}

/// One entry in the tier change history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditRecord {
    pub kind: AuditKind,
    pub org_id: OrgId,
    pub worker_id: WorkerId,
    pub recorded_at: DateTime<Utc>,
    pub tier_before: Option<Tier>,
    pub tier_after: Option<Tier>,
    pub score: Option<f64>,
    pub pay_before: Option<f64>,
    pub pay_after: Option<f64>,
    pub reason: Option<String>,
}

/// Destination for audit records. Kept separate from the snapshot store so
/// state changes stay traceable even when snapshot writes degrade.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: AuditRecord) -> Result<(), AuditError>;
}
