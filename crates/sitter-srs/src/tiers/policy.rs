//! Tier movement and pay raise rules applied by the weekly evaluation.
//!
//! All checks here are pure decisions over already-fetched snapshots and
//! service events; persisting the outcome is the service's job. Hysteresis
//! is deliberate: a single bad or good week never moves a tier by itself,
//! only the severity bypass reacts inside a week.

use chrono::{Months, NaiveDate};
use serde::Serialize;

use super::domain::{CompensationRecord, OrgId, RollingAggregate, Tier, TierSnapshot, WorkerId};
use super::events::{ServiceEvent, WindowBounds};
use super::scoring::MIN_MONTHLY_VISITS;

/// Starting hourly base pay for a new compensation record.
pub const BASE_PAY_START: f64 = 12.50;
/// Percentage applied to base pay on a successful review.
pub const PAY_RAISE_PERCENT: f64 = 2.5;
/// Hourly base pay ceiling; raises never push past it.
pub const PAY_CAP: f64 = 16.25;
/// Months between pay reviews.
pub const PAY_REVIEW_INTERVAL_MONTHS: u32 = 6;
/// Rolling 26-week score a sitter must hold to qualify for a raise.
pub const PAY_ROLLING_SCORE_FLOOR: f64 = 80.0;

/// Consecutive qualifying snapshots required before a tier moves.
pub const CONSECUTIVE_SNAPSHOTS: usize = 2;
/// Week-over-week score drop that flags a sitter as at risk on its own.
pub const AT_RISK_DROP_POINTS: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionDecision {
    Promote { to: Tier },
    Hold { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DemotionDecision {
    Demote { to: Tier, reason: String },
    Keep,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AtRiskDecision {
    AtRisk { reason: String },
    Clear,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PayRaiseDecision {
    Raise { new_pay: f64, amount: f64 },
    NotYet { reason: String },
}

/// Promotion gate. `recent` holds the trailing 14 days of snapshots,
/// newest first; `conduct` holds the service events active in the trailing
/// 30 days.
pub fn check_promotion(
    current: Tier,
    target: Tier,
    recent: &[TierSnapshot],
    conduct: &[ServiceEvent],
) -> PromotionDecision {
    if target <= current {
        return PromotionDecision::Hold {
            reason: "New tier must be higher than current tier".to_string(),
        };
    }
    if recent.len() < CONSECUTIVE_SNAPSHOTS {
        return PromotionDecision::Hold {
            reason: "Need 2 consecutive weekly evaluations".to_string(),
        };
    }

    let floor = target.min_score();
    if !recent
        .iter()
        .take(CONSECUTIVE_SNAPSHOTS)
        .all(|snapshot| snapshot.score >= floor)
    {
        return PromotionDecision::Hold {
            reason: "Score threshold not met for 2 consecutive weeks".to_string(),
        };
    }
    if conduct.iter().any(|event| event.level.is_severe()) {
        return PromotionDecision::Hold {
            reason: "Corrective action in last 30 days".to_string(),
        };
    }

    let latest = &recent[0];
    if latest.visits_30d < MIN_MONTHLY_VISITS {
        return PromotionDecision::Hold {
            reason: "Insufficient activity (need 15+ visits in 30 days)".to_string(),
        };
    }

    PromotionDecision::Promote { to: target }
}

/// Demotion gate. A severe service event recorded inside `last_day` drops
/// the sitter straight to foundation; otherwise two consecutive snapshots
/// below the current tier's floor demote to whatever tier the latest score
/// maps to.
pub fn check_demotion(
    current: Tier,
    recent: &[TierSnapshot],
    events: &[ServiceEvent],
    last_day: &WindowBounds,
) -> DemotionDecision {
    let severe_today = events
        .iter()
        .any(|event| event.level.is_severe() && event.started_within(last_day));
    if severe_today {
        if current == Tier::Foundation {
            return DemotionDecision::Keep;
        }
        return DemotionDecision::Demote {
            to: Tier::Foundation,
            reason: "Corrective action or probation in last 24 hours".to_string(),
        };
    }

    if recent.len() >= CONSECUTIVE_SNAPSHOTS {
        let floor = current.min_score();
        let sustained_below = recent
            .iter()
            .take(CONSECUTIVE_SNAPSHOTS)
            .all(|snapshot| snapshot.score < floor);
        if sustained_below {
            return DemotionDecision::Demote {
                to: Tier::from_score(recent[0].score),
                reason: "Score below tier minimum for 2 consecutive weeks".to_string(),
            };
        }
    }

    DemotionDecision::Keep
}

/// At-risk flagging over the trailing 7 days of snapshots, newest first.
/// Needs two snapshots to compare; a lone snapshot proves nothing.
pub fn check_at_risk(current: Tier, recent: &[TierSnapshot]) -> AtRiskDecision {
    if recent.len() < CONSECUTIVE_SNAPSHOTS {
        return AtRiskDecision::Clear;
    }

    let latest = &recent[0];
    let previous = &recent[1];
    let floor = current.min_score();

    if latest.score < floor && previous.score >= floor {
        return AtRiskDecision::AtRisk {
            reason: "Score dropped below tier minimum".to_string(),
        };
    }
    if previous.score - latest.score >= AT_RISK_DROP_POINTS {
        return AtRiskDecision::AtRisk {
            reason: "Significant score drop detected".to_string(),
        };
    }

    AtRiskDecision::Clear
}

/// Pay review. `events` holds service events fetched over the trailing 26
/// weeks (`review_window`); only severe events that became effective inside
/// that window block a raise.
pub fn check_pay_raise(
    record: &CompensationRecord,
    rolling: Option<&RollingAggregate>,
    events: &[ServiceEvent],
    review_window: &WindowBounds,
    latest: &TierSnapshot,
    as_of_date: NaiveDate,
) -> PayRaiseDecision {
    if record.base_pay >= PAY_CAP {
        return PayRaiseDecision::NotYet {
            reason: "At pay cap; additional value comes through tier perks".to_string(),
        };
    }
    if as_of_date < record.next_review_date {
        return PayRaiseDecision::NotYet {
            reason: "Next review date not reached".to_string(),
        };
    }

    let rolling_score = rolling.map(|aggregate| aggregate.score).unwrap_or(0.0);
    if rolling_score < PAY_ROLLING_SCORE_FLOOR {
        return PayRaiseDecision::NotYet {
            reason: "Rolling 26-week score below 80".to_string(),
        };
    }
    if events
        .iter()
        .any(|event| event.level.is_severe() && event.started_within(review_window))
    {
        return PayRaiseDecision::NotYet {
            reason: "Corrective action within review period".to_string(),
        };
    }
    if latest.visits_30d < MIN_MONTHLY_VISITS {
        return PayRaiseDecision::NotYet {
            reason: "Insufficient activity (need 15+ visits in 30 days)".to_string(),
        };
    }

    let uncapped = record.base_pay * (1.0 + PAY_RAISE_PERCENT / 100.0);
    let new_pay = uncapped.min(PAY_CAP);
    PayRaiseDecision::Raise {
        new_pay,
        amount: new_pay - record.base_pay,
    }
}

/// First compensation record for a sitter, created on their first weekly
/// evaluation.
pub fn seed_compensation(org_id: OrgId, worker_id: WorkerId, as_of_date: NaiveDate) -> CompensationRecord {
    CompensationRecord {
        org_id,
        worker_id,
        base_pay: BASE_PAY_START,
        last_raise_at: None,
        last_raise_amount: None,
        next_review_date: advance_review_date(as_of_date),
    }
}

/// Next review date after a review lands. Saturates at the calendar edge.
pub fn advance_review_date(from: NaiveDate) -> NaiveDate {
    from.checked_add_months(Months::new(PAY_REVIEW_INTERVAL_MONTHS))
        .unwrap_or(from)
}
