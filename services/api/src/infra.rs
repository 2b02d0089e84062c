use chrono::NaiveDate;
use metrics_exporter_prometheus::PrometheusHandle;
use sitter_srs::error::AppError;
use sitter_srs::tiers::{
    EventArchiveImporter, ImportSummary, InMemoryAuditSink, InMemoryEventStore,
    InMemorySnapshotStore, OrgId, TierService,
};
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type MemoryTierService =
    TierService<InMemoryEventStore, InMemorySnapshotStore, InMemoryAuditSink>;

/// The engine and its in-memory backends, wired together.
pub(crate) struct Engine {
    pub(crate) events: Arc<InMemoryEventStore>,
    pub(crate) audit: Arc<InMemoryAuditSink>,
    pub(crate) service: Arc<MemoryTierService>,
}

pub(crate) fn build_engine() -> Engine {
    let events = Arc::new(InMemoryEventStore::default());
    let snapshots = Arc::new(InMemorySnapshotStore::default());
    let audit = Arc::new(InMemoryAuditSink::default());
    let service = Arc::new(TierService::new(
        events.clone(),
        snapshots,
        audit.clone(),
    ));
    Engine {
        events,
        audit,
        service,
    }
}

pub(crate) fn hydrate_archive(
    engine: &Engine,
    org: &OrgId,
    path: &Path,
) -> Result<ImportSummary, AppError> {
    let summary = EventArchiveImporter::from_path(path, org, &engine.events)?;
    Ok(summary)
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
