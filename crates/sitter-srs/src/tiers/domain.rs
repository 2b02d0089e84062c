use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Organization identifier. Every event, snapshot, job, and audit record is
/// scoped to exactly one organization; there is no cross-org fallback lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrgId(pub String);

/// Sitter identifier, unique within an organization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerId(pub String);

/// Booking identifier, used to join accepted offers to their visits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BookingId(pub String);

/// Standing ladder for sitters. Ordering follows tier rank, so comparisons
/// like `target > current` express "strictly higher tier".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Foundation,
    Reliant,
    Trusted,
    Preferred,
}

/// Monthly visit quota band for a tier. The engagement factor measures
/// completed visits against `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitQuota {
    pub min: u32,
    pub max: u32,
}

/// Perk set unlocked by a tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierPerks {
    pub priority_booking_access: bool,
    pub holiday_rate_multiplier: f64,
    pub mentorship_eligible: bool,
    pub reduced_oversight: bool,
}

impl Tier {
    pub const fn label(&self) -> &'static str {
        match self {
            Tier::Foundation => "foundation",
            Tier::Reliant => "reliant",
            Tier::Trusted => "trusted",
            Tier::Preferred => "preferred",
        }
    }

    /// Lowest composite score that keeps a sitter in this tier.
    pub const fn min_score(&self) -> f64 {
        match self {
            Tier::Foundation => 0.0,
            Tier::Reliant => 70.0,
            Tier::Trusted => 80.0,
            Tier::Preferred => 90.0,
        }
    }

    /// Tier a composite score maps to.
    pub fn from_score(score: f64) -> Tier {
        if score >= Tier::Preferred.min_score() {
            Tier::Preferred
        } else if score >= Tier::Trusted.min_score() {
            Tier::Trusted
        } else if score >= Tier::Reliant.min_score() {
            Tier::Reliant
        } else {
            Tier::Foundation
        }
    }

    pub const fn visit_quota(&self) -> VisitQuota {
        match self {
            Tier::Foundation => VisitQuota { min: 20, max: 30 },
            Tier::Reliant => VisitQuota { min: 35, max: 45 },
            Tier::Trusted => VisitQuota { min: 55, max: 65 },
            Tier::Preferred => VisitQuota { min: 70, max: 80 },
        }
    }

    pub const fn next_up(&self) -> Option<Tier> {
        match self {
            Tier::Foundation => Some(Tier::Reliant),
            Tier::Reliant => Some(Tier::Trusted),
            Tier::Trusted => Some(Tier::Preferred),
            Tier::Preferred => None,
        }
    }

    pub const fn perks(&self) -> TierPerks {
        match self {
            Tier::Preferred => TierPerks {
                priority_booking_access: true,
                holiday_rate_multiplier: 2.0,
                mentorship_eligible: true,
                reduced_oversight: true,
            },
            Tier::Trusted => TierPerks {
                priority_booking_access: true,
                holiday_rate_multiplier: 1.5,
                mentorship_eligible: true,
                reduced_oversight: true,
            },
            Tier::Reliant => TierPerks {
                priority_booking_access: true,
                holiday_rate_multiplier: 1.0,
                mentorship_eligible: false,
                reduced_oversight: false,
            },
            Tier::Foundation => TierPerks {
                priority_booking_access: false,
                holiday_rate_multiplier: 1.0,
                mentorship_eligible: false,
                reduced_oversight: false,
            },
        }
    }
}

/// Per-factor points making up the composite score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub responsiveness: f64,
    pub acceptance: f64,
    pub completion: f64,
    pub timeliness: f64,
    pub accuracy: f64,
    pub engagement: f64,
    pub conduct: f64,
}

impl ScoreBreakdown {
    /// Unrounded sum of the seven factors.
    pub fn composite(&self) -> f64 {
        self.responsiveness
            + self.acceptance
            + self.completion
            + self.timeliness
            + self.accuracy
            + self.engagement
            + self.conduct
    }
}

/// How many events fed each factor, kept alongside the points so a low
/// score backed by two samples can be read differently from one backed by
/// two hundred.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactorSamples {
    pub responsiveness: u32,
    pub acceptance: u32,
    pub completion: u32,
    pub timeliness: u32,
    pub accuracy: u32,
    pub engagement: u32,
    pub conduct: u32,
}

/// Mean score and mean factor points over the trailing 26 weeks of
/// snapshots. Absent until at least one snapshot exists in that window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RollingAggregate {
    pub score: f64,
    pub breakdown: ScoreBreakdown,
}

/// Immutable daily scoring record. One row per sitter per calendar day; the
/// weekly evaluator later stamps tier and at-risk outcomes onto the most
/// recent row but never rewrites the measured values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierSnapshot {
    pub org_id: OrgId,
    pub worker_id: WorkerId,
    pub as_of_date: NaiveDate,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
    pub samples: FactorSamples,
    /// Tier the sitter held when the snapshot was taken.
    pub tier: Tier,
    /// Tier the composite score maps to, before any rule gating.
    pub tier_recommendation: Tier,
    /// Fewer than the monthly activity floor of completed visits.
    pub provisional: bool,
    pub visits_30d: u32,
    pub offers_30d: u32,
    pub rolling_26w: Option<RollingAggregate>,
    pub at_risk: bool,
    pub at_risk_reason: Option<String>,
    pub last_promotion_at: Option<DateTime<Utc>>,
    pub last_demotion_at: Option<DateTime<Utc>>,
}

/// Current tier assignment for a sitter. Only the weekly evaluator writes
/// this record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerTierState {
    pub org_id: OrgId,
    pub worker_id: WorkerId,
    pub tier: Tier,
    pub last_promotion_at: Option<DateTime<Utc>>,
    pub last_demotion_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Base pay ledger entry for a sitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompensationRecord {
    pub org_id: OrgId,
    pub worker_id: WorkerId,
    pub base_pay: f64,
    pub last_raise_at: Option<DateTime<Utc>>,
    pub last_raise_amount: Option<f64>,
    pub next_review_date: NaiveDate,
}
