//! Sitter reliability scoring and tier evaluation.
//!
//! Daily snapshot jobs score a trailing 30-day event window into an
//! immutable [`TierSnapshot`]; weekly evaluation jobs apply the promotion,
//! demotion, at-risk, and pay-review rules against the snapshot history.
//! Event access, snapshot persistence, and audit output all sit behind
//! ports in [`store`].

pub mod archive;
pub mod domain;
pub mod events;
pub mod memory;
pub mod policy;
pub mod router;
pub mod scheduler;
pub mod scoring;
pub mod service;
pub mod store;

#[cfg(test)]
mod tests;

pub use archive::{ArchiveImportError, EventArchiveImporter, ImportSummary};
pub use domain::{BookingId, OrgId, Tier, TierPerks, TierSnapshot, WorkerId};
pub use memory::{InMemoryAuditSink, InMemoryEventStore, InMemorySnapshotStore};
pub use router::{tier_router, TierApi};
pub use scheduler::{
    fan_out_daily_snapshots, fan_out_weekly_evaluations, FanOutSummary, SchedulerHandle, SrsJob,
    SrsScheduler,
};
pub use service::{EvaluationReport, SnapshotOutcome, TierDetails, TierService, TierServiceError};
pub use store::{AuditKind, AuditRecord, AuditSink, EventReader, SnapshotStore, StoreError};
