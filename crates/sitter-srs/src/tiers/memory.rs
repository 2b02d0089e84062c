//! In-memory adapters for the engine's ports. They back the demo binary,
//! the HTTP service's default wiring, and the test suites.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;

use super::domain::{CompensationRecord, OrgId, TierSnapshot, WorkerId, WorkerTierState};
use super::events::{OfferEvent, ResponseLink, ServiceEvent, TimeOffPeriod, VisitEvent, WindowBounds};
use super::store::{
    AuditError, AuditRecord, AuditSink, EvaluationUpdate, EventReader, SnapshotStore, StoreError,
};

type WorkerKey = (OrgId, WorkerId);

#[derive(Default)]
struct EventRows {
    workers: BTreeSet<WorkerKey>,
    response_links: HashMap<WorkerKey, Vec<ResponseLink>>,
    offers: HashMap<WorkerKey, Vec<OfferEvent>>,
    visits: HashMap<WorkerKey, Vec<VisitEvent>>,
    time_off: HashMap<WorkerKey, Vec<TimeOffPeriod>>,
    service_events: HashMap<WorkerKey, Vec<ServiceEvent>>,
}

/// Event streams held in process. Rows are keyed by organization and
/// sitter, so an event can never exist unscoped.
#[derive(Default, Clone)]
pub struct InMemoryEventStore {
    rows: Arc<Mutex<EventRows>>,
}

impl InMemoryEventStore {
    /// Makes a sitter visible to snapshot fan-out even before any event
    /// lands for them.
    pub fn register_worker(&self, org: &OrgId, worker: &WorkerId) {
        let mut rows = self.rows.lock().expect("event store mutex poisoned");
        rows.workers.insert((org.clone(), worker.clone()));
    }

    pub fn push_response_link(&self, org: &OrgId, worker: &WorkerId, link: ResponseLink) {
        let mut rows = self.rows.lock().expect("event store mutex poisoned");
        let key = (org.clone(), worker.clone());
        rows.workers.insert(key.clone());
        rows.response_links.entry(key).or_default().push(link);
    }

    pub fn push_offer(&self, org: &OrgId, worker: &WorkerId, offer: OfferEvent) {
        let mut rows = self.rows.lock().expect("event store mutex poisoned");
        let key = (org.clone(), worker.clone());
        rows.workers.insert(key.clone());
        rows.offers.entry(key).or_default().push(offer);
    }

    pub fn push_visit(&self, org: &OrgId, worker: &WorkerId, visit: VisitEvent) {
        let mut rows = self.rows.lock().expect("event store mutex poisoned");
        let key = (org.clone(), worker.clone());
        rows.workers.insert(key.clone());
        rows.visits.entry(key).or_default().push(visit);
    }

    pub fn push_time_off(&self, org: &OrgId, worker: &WorkerId, period: TimeOffPeriod) {
        let mut rows = self.rows.lock().expect("event store mutex poisoned");
        let key = (org.clone(), worker.clone());
        rows.workers.insert(key.clone());
        rows.time_off.entry(key).or_default().push(period);
    }

    pub fn push_service_event(&self, org: &OrgId, worker: &WorkerId, event: ServiceEvent) {
        let mut rows = self.rows.lock().expect("event store mutex poisoned");
        let key = (org.clone(), worker.clone());
        rows.workers.insert(key.clone());
        rows.service_events.entry(key).or_default().push(event);
    }
}

impl EventReader for InMemoryEventStore {
    fn response_links(
        &self,
        org: &OrgId,
        worker: &WorkerId,
        bounds: &WindowBounds,
    ) -> Result<Vec<ResponseLink>, StoreError> {
        let rows = self.rows.lock().expect("event store mutex poisoned");
        Ok(rows
            .response_links
            .get(&(org.clone(), worker.clone()))
            .map(|links| {
                links
                    .iter()
                    .filter(|link| bounds.contains(link.requires_response_at))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn offers(
        &self,
        org: &OrgId,
        worker: &WorkerId,
        bounds: &WindowBounds,
    ) -> Result<Vec<OfferEvent>, StoreError> {
        let rows = self.rows.lock().expect("event store mutex poisoned");
        Ok(rows
            .offers
            .get(&(org.clone(), worker.clone()))
            .map(|offers| {
                offers
                    .iter()
                    .filter(|offer| bounds.contains(offer.offered_at))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn visits(
        &self,
        org: &OrgId,
        worker: &WorkerId,
        bounds: &WindowBounds,
    ) -> Result<Vec<VisitEvent>, StoreError> {
        let rows = self.rows.lock().expect("event store mutex poisoned");
        Ok(rows
            .visits
            .get(&(org.clone(), worker.clone()))
            .map(|visits| {
                visits
                    .iter()
                    .filter(|visit| bounds.contains(visit.scheduled_start))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn time_off(
        &self,
        org: &OrgId,
        worker: &WorkerId,
        bounds: &WindowBounds,
    ) -> Result<Vec<TimeOffPeriod>, StoreError> {
        let rows = self.rows.lock().expect("event store mutex poisoned");
        Ok(rows
            .time_off
            .get(&(org.clone(), worker.clone()))
            .map(|periods| {
                periods
                    .iter()
                    .filter(|period| {
                        period.starts_at <= bounds.end && period.ends_at >= bounds.start
                    })
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn service_events(
        &self,
        org: &OrgId,
        worker: &WorkerId,
        bounds: &WindowBounds,
    ) -> Result<Vec<ServiceEvent>, StoreError> {
        let rows = self.rows.lock().expect("event store mutex poisoned");
        Ok(rows
            .service_events
            .get(&(org.clone(), worker.clone()))
            .map(|events| {
                events
                    .iter()
                    .filter(|event| event.active_during(bounds))
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn active_workers(&self, org: &OrgId) -> Result<Vec<WorkerId>, StoreError> {
        let rows = self.rows.lock().expect("event store mutex poisoned");
        Ok(rows
            .workers
            .iter()
            .filter(|(candidate, _)| candidate == org)
            .map(|(_, worker)| worker.clone())
            .collect())
    }
}

type SnapshotKey = (OrgId, WorkerId, NaiveDate);

#[derive(Default)]
struct SnapshotRows {
    snapshots: BTreeMap<SnapshotKey, TierSnapshot>,
    tier_states: HashMap<WorkerKey, WorkerTierState>,
    compensation: HashMap<WorkerKey, CompensationRecord>,
}

/// Snapshot, tier-state, and compensation persistence held in process.
#[derive(Default, Clone)]
pub struct InMemorySnapshotStore {
    rows: Arc<Mutex<SnapshotRows>>,
}

impl SnapshotStore for InMemorySnapshotStore {
    fn insert_snapshot(&self, snapshot: TierSnapshot) -> Result<TierSnapshot, StoreError> {
        let mut rows = self.rows.lock().expect("snapshot store mutex poisoned");
        let key = (
            snapshot.org_id.clone(),
            snapshot.worker_id.clone(),
            snapshot.as_of_date,
        );
        if rows.snapshots.contains_key(&key) {
            return Err(StoreError::Conflict);
        }
        rows.snapshots.insert(key, snapshot.clone());
        Ok(snapshot)
    }

    fn snapshot(
        &self,
        org: &OrgId,
        worker: &WorkerId,
        as_of_date: NaiveDate,
    ) -> Result<Option<TierSnapshot>, StoreError> {
        let rows = self.rows.lock().expect("snapshot store mutex poisoned");
        Ok(rows
            .snapshots
            .get(&(org.clone(), worker.clone(), as_of_date))
            .cloned())
    }

    fn latest_snapshot(
        &self,
        org: &OrgId,
        worker: &WorkerId,
    ) -> Result<Option<TierSnapshot>, StoreError> {
        let rows = self.rows.lock().expect("snapshot store mutex poisoned");
        Ok(rows
            .snapshots
            .range(worker_range(org, worker))
            .next_back()
            .map(|(_, snapshot)| snapshot.clone()))
    }

    fn snapshots_between(
        &self,
        org: &OrgId,
        worker: &WorkerId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<TierSnapshot>, StoreError> {
        let rows = self.rows.lock().expect("snapshot store mutex poisoned");
        let start = (org.clone(), worker.clone(), from);
        let end = (org.clone(), worker.clone(), to);
        Ok(rows
            .snapshots
            .range(start..=end)
            .map(|(_, snapshot)| snapshot.clone())
            .collect())
    }

    fn recent_snapshots(
        &self,
        org: &OrgId,
        worker: &WorkerId,
        limit: usize,
    ) -> Result<Vec<TierSnapshot>, StoreError> {
        let rows = self.rows.lock().expect("snapshot store mutex poisoned");
        Ok(rows
            .snapshots
            .range(worker_range(org, worker))
            .rev()
            .take(limit)
            .map(|(_, snapshot)| snapshot.clone())
            .collect())
    }

    fn apply_evaluation(
        &self,
        org: &OrgId,
        worker: &WorkerId,
        as_of_date: NaiveDate,
        update: EvaluationUpdate,
    ) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().expect("snapshot store mutex poisoned");
        let snapshot = rows
            .snapshots
            .get_mut(&(org.clone(), worker.clone(), as_of_date))
            .ok_or(StoreError::NotFound)?;
        snapshot.tier = update.tier;
        snapshot.at_risk = update.at_risk;
        snapshot.at_risk_reason = update.at_risk_reason;
        snapshot.last_promotion_at = update.last_promotion_at;
        snapshot.last_demotion_at = update.last_demotion_at;
        Ok(())
    }

    fn tier_state(
        &self,
        org: &OrgId,
        worker: &WorkerId,
    ) -> Result<Option<WorkerTierState>, StoreError> {
        let rows = self.rows.lock().expect("snapshot store mutex poisoned");
        Ok(rows.tier_states.get(&(org.clone(), worker.clone())).cloned())
    }

    fn put_tier_state(&self, state: WorkerTierState) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().expect("snapshot store mutex poisoned");
        rows.tier_states
            .insert((state.org_id.clone(), state.worker_id.clone()), state);
        Ok(())
    }

    fn compensation(
        &self,
        org: &OrgId,
        worker: &WorkerId,
    ) -> Result<Option<CompensationRecord>, StoreError> {
        let rows = self.rows.lock().expect("snapshot store mutex poisoned");
        Ok(rows.compensation.get(&(org.clone(), worker.clone())).cloned())
    }

    fn put_compensation(&self, record: CompensationRecord) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().expect("snapshot store mutex poisoned");
        rows.compensation
            .insert((record.org_id.clone(), record.worker_id.clone()), record);
        Ok(())
    }

    fn workers_with_snapshot_since(
        &self,
        org: &OrgId,
        since: NaiveDate,
    ) -> Result<Vec<WorkerId>, StoreError> {
        let rows = self.rows.lock().expect("snapshot store mutex poisoned");
        let mut workers = BTreeSet::new();
        for (candidate, worker, date) in rows.snapshots.keys() {
            if candidate == org && *date >= since {
                workers.insert(worker.clone());
            }
        }
        Ok(workers.into_iter().collect())
    }
}

fn worker_range(org: &OrgId, worker: &WorkerId) -> std::ops::RangeInclusive<SnapshotKey> {
    let start = (org.clone(), worker.clone(), NaiveDate::MIN);
    let end = (org.clone(), worker.clone(), NaiveDate::MAX);
    start..=end
}

/// Audit records held in process, in arrival order.
#[derive(Default, Clone)]
pub struct InMemoryAuditSink {
    records: Arc<Mutex<Vec<AuditRecord>>>,
}

impl InMemoryAuditSink {
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().expect("audit sink mutex poisoned").clone()
    }

    pub fn of_kind(&self, kind: super::store::AuditKind) -> Vec<AuditRecord> {
        self.records
            .lock()
            .expect("audit sink mutex poisoned")
            .iter()
            .filter(|record| record.kind == kind)
            .cloned()
            .collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, record: AuditRecord) -> Result<(), AuditError> {
        let mut records = self.records.lock().expect("audit sink mutex poisoned");
        records.push(record);
        Ok(())
    }
}
