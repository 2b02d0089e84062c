//! Orchestration over the scoring and policy layers: daily snapshots,
//! weekly evaluations, and the read views the API serves.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::domain::{
    CompensationRecord, OrgId, RollingAggregate, ScoreBreakdown, Tier, TierPerks, TierSnapshot,
    WorkerId, WorkerTierState,
};
use super::events::{EventWindow, WindowBounds};
use super::policy::{
    self, AtRiskDecision, DemotionDecision, PayRaiseDecision, PromotionDecision, PAY_CAP,
};
use super::scoring::{self, ScoreResult};
use super::store::{
    AuditError, AuditKind, AuditRecord, AuditSink, EvaluationUpdate, EventReader, SnapshotStore,
    StoreError,
};

/// Trailing days of events scored by a daily snapshot.
pub const SNAPSHOT_WINDOW_DAYS: i64 = 30;
/// Trailing days of snapshots consulted for promotion and demotion.
pub const HYSTERESIS_WINDOW_DAYS: i64 = 14;
/// Trailing days of snapshots consulted for at-risk flagging, and the
/// recency requirement for weekly evaluation fan-out.
pub const AT_RISK_WINDOW_DAYS: i64 = 7;
/// Trailing days covered by the 26-week rolling aggregate.
pub const ROLLING_WINDOW_DAYS: i64 = 182;
/// Trailing hours in which a severe service event bypasses hysteresis.
pub const SEVERITY_WINDOW_HOURS: i64 = 24;
/// Snapshot rows returned by the history view when no limit is given.
pub const HISTORY_DEFAULT_LIMIT: usize = 20;

#[derive(Debug, thiserror::Error)]
pub enum TierServiceError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Audit(#[from] AuditError),
}

impl TierServiceError {
    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TierServiceError::Store(StoreError::Unavailable(_))
                | TierServiceError::Audit(AuditError::Unavailable(_))
        )
    }
}

/// Result of a daily snapshot run. Re-running a date that already has a
/// snapshot is a no-op that returns the stored row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotOutcome {
    Created(TierSnapshot),
    AlreadyExists(TierSnapshot),
}

impl SnapshotOutcome {
    pub fn snapshot(&self) -> &TierSnapshot {
        match self {
            SnapshotOutcome::Created(snapshot) | SnapshotOutcome::AlreadyExists(snapshot) => {
                snapshot
            }
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, SnapshotOutcome::Created(_))
    }
}

/// Everything one weekly evaluation decided.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub org_id: OrgId,
    pub worker_id: WorkerId,
    pub as_of_date: NaiveDate,
    pub tier_before: Tier,
    pub tier_after: Tier,
    /// Latest snapshot score, absent when there was nothing to evaluate.
    pub score: Option<f64>,
    pub promotion: PromotionDecision,
    pub demotion: DemotionDecision,
    pub at_risk: AtRiskDecision,
    pub pay_raise: PayRaiseDecision,
}

impl EvaluationReport {
    pub fn tier_changed(&self) -> bool {
        self.tier_before != self.tier_after
    }

    fn skipped(org_id: OrgId, worker_id: WorkerId, as_of_date: NaiveDate, tier: Tier) -> Self {
        Self {
            org_id,
            worker_id,
            as_of_date,
            tier_before: tier,
            tier_after: tier,
            score: None,
            promotion: PromotionDecision::Hold {
                reason: "No snapshot on record".to_string(),
            },
            demotion: DemotionDecision::Keep,
            at_risk: AtRiskDecision::Clear,
            pay_raise: PayRaiseDecision::NotYet {
                reason: "No snapshot on record".to_string(),
            },
        }
    }
}

/// Distance to the next tier up.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TierProgress {
    pub tier: Tier,
    pub min_score: f64,
    pub points_needed: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompensationSummary {
    pub base_pay: f64,
    pub next_review_date: NaiveDate,
    pub last_raise_at: Option<DateTime<Utc>>,
    pub last_raise_amount: Option<f64>,
    pub at_cap: bool,
}

/// Read view combining tier state, the latest snapshot, perks, and pay.
#[derive(Debug, Clone, Serialize)]
pub struct TierDetails {
    pub org_id: OrgId,
    pub worker_id: WorkerId,
    pub tier: Tier,
    pub tier_label: String,
    pub as_of_date: Option<NaiveDate>,
    pub score: Option<f64>,
    pub breakdown: Option<ScoreBreakdown>,
    pub provisional: bool,
    pub visits_30d: u32,
    pub offers_30d: u32,
    pub rolling_26w: Option<RollingAggregate>,
    pub at_risk: bool,
    pub at_risk_reason: Option<String>,
    pub perks: TierPerks,
    pub next_tier: Option<TierProgress>,
    pub compensation: Option<CompensationSummary>,
}

/// Core engine service. Generic over its ports so tests and the binary can
/// wire in whatever backends they need.
pub struct TierService<E, S, A> {
    events: Arc<E>,
    snapshots: Arc<S>,
    audit: Arc<A>,
}

impl<E, S, A> TierService<E, S, A>
where
    E: EventReader,
    S: SnapshotStore,
    A: AuditSink,
{
    pub fn new(events: Arc<E>, snapshots: Arc<S>, audit: Arc<A>) -> Self {
        Self {
            events,
            snapshots,
            audit,
        }
    }

    /// Scores a sitter's trailing window without persisting anything.
    pub fn score_preview(
        &self,
        org: &OrgId,
        worker: &WorkerId,
        as_of_date: NaiveDate,
    ) -> Result<ScoreResult, TierServiceError> {
        let window = self.load_window(org, worker, day_start(as_of_date))?;
        let tier = self.current_tier(org, worker)?;
        Ok(scoring::compute_score(&window, tier))
    }

    /// Computes and stores the immutable daily snapshot for one sitter.
    /// Idempotent per sitter and date.
    pub fn run_daily_snapshot(
        &self,
        org: &OrgId,
        worker: &WorkerId,
        as_of_date: NaiveDate,
    ) -> Result<SnapshotOutcome, TierServiceError> {
        if let Some(existing) = self.snapshots.snapshot(org, worker, as_of_date)? {
            debug!(org = %org.0, sitter = %worker.0, date = %as_of_date, "snapshot already recorded");
            return Ok(SnapshotOutcome::AlreadyExists(existing));
        }

        let as_of = day_start(as_of_date);
        let window = self.load_window(org, worker, as_of)?;
        let tier = self.current_tier(org, worker)?;
        let result = scoring::compute_score(&window, tier);
        let rolling_26w = self.rolling_aggregate(org, worker, as_of_date)?;
        let state = self.snapshots.tier_state(org, worker)?;

        let snapshot = TierSnapshot {
            org_id: org.clone(),
            worker_id: worker.clone(),
            as_of_date,
            score: result.score,
            breakdown: result.breakdown,
            samples: result.samples,
            tier,
            tier_recommendation: result.tier_recommendation,
            provisional: result.provisional,
            visits_30d: result.visits_30d,
            offers_30d: result.offers_30d,
            rolling_26w,
            at_risk: false,
            at_risk_reason: None,
            last_promotion_at: state.as_ref().and_then(|state| state.last_promotion_at),
            last_demotion_at: state.as_ref().and_then(|state| state.last_demotion_at),
        };

        let stored = match self.snapshots.insert_snapshot(snapshot) {
            Ok(stored) => stored,
            Err(StoreError::Conflict) => {
                // Another job landed the same date between our existence
                // check and the insert.
                let existing = self
                    .snapshots
                    .snapshot(org, worker, as_of_date)?
                    .ok_or(StoreError::NotFound)?;
                return Ok(SnapshotOutcome::AlreadyExists(existing));
            }
            Err(err) => return Err(err.into()),
        };

        self.audit.record(AuditRecord {
            score: Some(stored.score),
            tier_before: Some(tier),
            tier_after: Some(tier),
            reason: stored
                .provisional
                .then(|| "Provisional: below monthly activity floor".to_string()),
            ..base_record(AuditKind::SnapshotCreated, org, worker, as_of)
        })?;
        info!(
            org = %org.0,
            sitter = %worker.0,
            date = %as_of_date,
            score = stored.score,
            tier = tier.label(),
            "daily snapshot recorded"
        );
        Ok(SnapshotOutcome::Created(stored))
    }

    /// Applies the tier rules and the pay review against the most recent
    /// snapshot. Rule order is fixed: promotion, demotion, at-risk, pay. A
    /// tier change clears the at-risk flag and skips the at-risk check.
    pub fn run_weekly_evaluation(
        &self,
        org: &OrgId,
        worker: &WorkerId,
        as_of_date: NaiveDate,
    ) -> Result<EvaluationReport, TierServiceError> {
        let as_of = day_start(as_of_date);
        let Some(latest) = self.snapshots.latest_snapshot(org, worker)? else {
            debug!(org = %org.0, sitter = %worker.0, "no snapshot on record; evaluation skipped");
            let tier = self.current_tier(org, worker)?;
            return Ok(EvaluationReport::skipped(
                org.clone(),
                worker.clone(),
                as_of_date,
                tier,
            ));
        };

        let state = self.snapshots.tier_state(org, worker)?;
        let current = state.as_ref().map(|state| state.tier).unwrap_or(latest.tier);
        let mut last_promotion_at = state
            .as_ref()
            .and_then(|state| state.last_promotion_at)
            .or(latest.last_promotion_at);
        let mut last_demotion_at = state
            .as_ref()
            .and_then(|state| state.last_demotion_at)
            .or(latest.last_demotion_at);

        let recent_14d = self.snapshots_window(org, worker, as_of_date, HYSTERESIS_WINDOW_DAYS)?;
        let month = WindowBounds::trailing_days(as_of, SNAPSHOT_WINDOW_DAYS);
        let conduct_30d = self.events.service_events(org, worker, &month)?;

        let mut tier_after = current;
        let target = Tier::from_score(latest.score);
        let promotion = policy::check_promotion(current, target, &recent_14d, &conduct_30d);
        if let PromotionDecision::Promote { to } = &promotion {
            tier_after = *to;
            last_promotion_at = Some(as_of);
            self.audit.record(AuditRecord {
                tier_before: Some(current),
                tier_after: Some(*to),
                score: Some(latest.score),
                reason: Some("Score threshold held for 2 consecutive weeks".to_string()),
                ..base_record(AuditKind::TierPromoted, org, worker, as_of)
            })?;
            info!(
                org = %org.0,
                sitter = %worker.0,
                from = current.label(),
                to = to.label(),
                score = latest.score,
                "sitter promoted"
            );
        }

        let demotion = if tier_after != current {
            DemotionDecision::Keep
        } else {
            let last_day = WindowBounds::trailing_hours(as_of, SEVERITY_WINDOW_HOURS);
            let events_24h = self.events.service_events(org, worker, &last_day)?;
            let decision = policy::check_demotion(current, &recent_14d, &events_24h, &last_day);
            if let DemotionDecision::Demote { to, reason } = &decision {
                tier_after = *to;
                last_demotion_at = Some(as_of);
                self.audit.record(AuditRecord {
                    tier_before: Some(current),
                    tier_after: Some(*to),
                    score: Some(latest.score),
                    reason: Some(reason.clone()),
                    ..base_record(AuditKind::TierDemoted, org, worker, as_of)
                })?;
                warn!(
                    org = %org.0,
                    sitter = %worker.0,
                    from = current.label(),
                    to = to.label(),
                    reason = reason.as_str(),
                    "sitter demoted"
                );
            }
            decision
        };

        let at_risk = if tier_after != current {
            AtRiskDecision::Clear
        } else {
            let recent_7d = self.snapshots_window(org, worker, as_of_date, AT_RISK_WINDOW_DAYS)?;
            let decision = policy::check_at_risk(current, &recent_7d);
            if let AtRiskDecision::AtRisk { reason } = &decision {
                self.audit.record(AuditRecord {
                    tier_before: Some(current),
                    tier_after: Some(current),
                    score: Some(latest.score),
                    reason: Some(reason.clone()),
                    ..base_record(AuditKind::TierAtRisk, org, worker, as_of)
                })?;
                warn!(
                    org = %org.0,
                    sitter = %worker.0,
                    tier = current.label(),
                    reason = reason.as_str(),
                    "sitter flagged at risk"
                );
            }
            decision
        };

        let (at_risk_flag, at_risk_reason) = match &at_risk {
            AtRiskDecision::AtRisk { reason } => (true, Some(reason.clone())),
            AtRiskDecision::Clear => (false, None),
        };
        self.snapshots.apply_evaluation(
            org,
            worker,
            latest.as_of_date,
            EvaluationUpdate {
                tier: tier_after,
                at_risk: at_risk_flag,
                at_risk_reason,
                last_promotion_at,
                last_demotion_at,
            },
        )?;
        self.snapshots.put_tier_state(WorkerTierState {
            org_id: org.clone(),
            worker_id: worker.clone(),
            tier: tier_after,
            last_promotion_at,
            last_demotion_at,
            updated_at: as_of,
        })?;

        let pay_raise = self.review_pay(org, worker, &latest, as_of_date, as_of)?;

        Ok(EvaluationReport {
            org_id: org.clone(),
            worker_id: worker.clone(),
            as_of_date,
            tier_before: current,
            tier_after,
            score: Some(latest.score),
            promotion,
            demotion,
            at_risk,
            pay_raise,
        })
    }

    /// Current tier, latest measurements, perks, and pay for one sitter.
    pub fn tier_details(
        &self,
        org: &OrgId,
        worker: &WorkerId,
    ) -> Result<TierDetails, TierServiceError> {
        let state = self.snapshots.tier_state(org, worker)?;
        let latest = self.snapshots.latest_snapshot(org, worker)?;
        if state.is_none() && latest.is_none() {
            return Err(StoreError::NotFound.into());
        }

        let tier = state
            .as_ref()
            .map(|state| state.tier)
            .or(latest.as_ref().map(|snapshot| snapshot.tier))
            .unwrap_or(Tier::Foundation);
        let compensation = self.snapshots.compensation(org, worker)?.map(|record| {
            CompensationSummary {
                base_pay: record.base_pay,
                next_review_date: record.next_review_date,
                last_raise_at: record.last_raise_at,
                last_raise_amount: record.last_raise_amount,
                at_cap: record.base_pay >= PAY_CAP,
            }
        });
        let next_tier = tier.next_up().map(|next| TierProgress {
            tier: next,
            min_score: next.min_score(),
            points_needed: latest
                .as_ref()
                .map(|snapshot| (next.min_score() - snapshot.score).max(0.0))
                .unwrap_or(next.min_score()),
        });

        Ok(TierDetails {
            org_id: org.clone(),
            worker_id: worker.clone(),
            tier,
            tier_label: tier.label().to_string(),
            as_of_date: latest.as_ref().map(|snapshot| snapshot.as_of_date),
            score: latest.as_ref().map(|snapshot| snapshot.score),
            breakdown: latest.as_ref().map(|snapshot| snapshot.breakdown),
            provisional: latest
                .as_ref()
                .map(|snapshot| snapshot.provisional)
                .unwrap_or(true),
            visits_30d: latest
                .as_ref()
                .map(|snapshot| snapshot.visits_30d)
                .unwrap_or(0),
            offers_30d: latest
                .as_ref()
                .map(|snapshot| snapshot.offers_30d)
                .unwrap_or(0),
            rolling_26w: latest.as_ref().and_then(|snapshot| snapshot.rolling_26w),
            at_risk: latest
                .as_ref()
                .map(|snapshot| snapshot.at_risk)
                .unwrap_or(false),
            at_risk_reason: latest.and_then(|snapshot| snapshot.at_risk_reason),
            perks: tier.perks(),
            next_tier,
            compensation,
        })
    }

    /// Most recent snapshots, newest first.
    pub fn tier_history(
        &self,
        org: &OrgId,
        worker: &WorkerId,
        limit: usize,
    ) -> Result<Vec<TierSnapshot>, TierServiceError> {
        Ok(self.snapshots.recent_snapshots(org, worker, limit)?)
    }

    /// Sitters a daily snapshot fan-out should cover.
    pub fn snapshot_targets(&self, org: &OrgId) -> Result<Vec<WorkerId>, TierServiceError> {
        Ok(self.events.active_workers(org)?)
    }

    /// Sitters a weekly evaluation fan-out should cover: anyone with a
    /// snapshot inside the at-risk window.
    pub fn evaluation_targets(
        &self,
        org: &OrgId,
        as_of_date: NaiveDate,
    ) -> Result<Vec<WorkerId>, TierServiceError> {
        let since = as_of_date - Duration::days(AT_RISK_WINDOW_DAYS);
        Ok(self.snapshots.workers_with_snapshot_since(org, since)?)
    }

    /// Leaves a permanent trace when a job exhausts its retries. Best
    /// effort: a failing audit sink is logged, not escalated.
    pub fn record_job_failure(&self, org: &OrgId, worker: &WorkerId, job_key: &str, message: &str) {
        let record = AuditRecord {
            reason: Some(format!("{job_key}: {message}")),
            ..base_record(AuditKind::JobFailed, org, worker, Utc::now())
        };
        if let Err(err) = self.audit.record(record) {
            error!(job = job_key, error = %err, "job failure could not be audited");
        }
    }

    fn load_window(
        &self,
        org: &OrgId,
        worker: &WorkerId,
        as_of: DateTime<Utc>,
    ) -> Result<EventWindow, TierServiceError> {
        let bounds = WindowBounds::trailing_days(as_of, SNAPSHOT_WINDOW_DAYS);
        Ok(EventWindow {
            org_id: org.clone(),
            worker_id: worker.clone(),
            response_links: self.events.response_links(org, worker, &bounds)?,
            offers: self.events.offers(org, worker, &bounds)?,
            visits: self.events.visits(org, worker, &bounds)?,
            time_off: self.events.time_off(org, worker, &bounds)?,
            service_events: self.events.service_events(org, worker, &bounds)?,
            bounds,
        })
    }

    fn current_tier(&self, org: &OrgId, worker: &WorkerId) -> Result<Tier, TierServiceError> {
        if let Some(state) = self.snapshots.tier_state(org, worker)? {
            return Ok(state.tier);
        }
        Ok(self
            .snapshots
            .latest_snapshot(org, worker)?
            .map(|snapshot| snapshot.tier)
            .unwrap_or(Tier::Foundation))
    }

    fn rolling_aggregate(
        &self,
        org: &OrgId,
        worker: &WorkerId,
        as_of_date: NaiveDate,
    ) -> Result<Option<RollingAggregate>, TierServiceError> {
        let from = as_of_date - Duration::days(ROLLING_WINDOW_DAYS);
        let snapshots = self.snapshots.snapshots_between(org, worker, from, as_of_date)?;
        Ok(scoring::rolling_26_week(&snapshots))
    }

    /// Snapshots over the trailing `days`, newest first.
    fn snapshots_window(
        &self,
        org: &OrgId,
        worker: &WorkerId,
        as_of_date: NaiveDate,
        days: i64,
    ) -> Result<Vec<TierSnapshot>, TierServiceError> {
        let from = as_of_date - Duration::days(days);
        let mut snapshots = self.snapshots.snapshots_between(org, worker, from, as_of_date)?;
        snapshots.reverse();
        Ok(snapshots)
    }

    fn review_pay(
        &self,
        org: &OrgId,
        worker: &WorkerId,
        latest: &TierSnapshot,
        as_of_date: NaiveDate,
        as_of: DateTime<Utc>,
    ) -> Result<PayRaiseDecision, TierServiceError> {
        let Some(record) = self.snapshots.compensation(org, worker)? else {
            let seeded = policy::seed_compensation(org.clone(), worker.clone(), as_of_date);
            let review = seeded.next_review_date;
            self.snapshots.put_compensation(seeded)?;
            info!(org = %org.0, sitter = %worker.0, next_review = %review, "compensation record created");
            return Ok(PayRaiseDecision::NotYet {
                reason: "Compensation record created; first review pending".to_string(),
            });
        };

        let rolling = self.rolling_aggregate(org, worker, as_of_date)?;
        let review_window = WindowBounds::trailing_days(as_of, ROLLING_WINDOW_DAYS);
        let events = self.events.service_events(org, worker, &review_window)?;
        let decision = policy::check_pay_raise(
            &record,
            rolling.as_ref(),
            &events,
            &review_window,
            latest,
            as_of_date,
        );

        if let PayRaiseDecision::Raise { new_pay, amount } = &decision {
            let pay_before = record.base_pay;
            let updated = CompensationRecord {
                base_pay: *new_pay,
                last_raise_at: Some(as_of),
                last_raise_amount: Some(*amount),
                next_review_date: policy::advance_review_date(as_of_date),
                ..record
            };
            self.snapshots.put_compensation(updated)?;
            self.audit.record(AuditRecord {
                pay_before: Some(pay_before),
                pay_after: Some(*new_pay),
                score: rolling.as_ref().map(|aggregate| aggregate.score),
                reason: Some("Semiannual review passed".to_string()),
                ..base_record(AuditKind::PayRaised, org, worker, as_of)
            })?;
            info!(
                org = %org.0,
                sitter = %worker.0,
                from = pay_before,
                to = *new_pay,
                "base pay raised"
            );
        }

        Ok(decision)
    }
}

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

fn base_record(
    kind: AuditKind,
    org: &OrgId,
    worker: &WorkerId,
    recorded_at: DateTime<Utc>,
) -> AuditRecord {
    AuditRecord {
        kind,
        org_id: org.clone(),
        worker_id: worker.clone(),
        recorded_at,
        tier_before: None,
        tier_after: None,
        score: None,
        pay_before: None,
        pay_after: None,
        reason: None,
    }
}
