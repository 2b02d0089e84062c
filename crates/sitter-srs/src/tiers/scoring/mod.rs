//! Composite reliability scoring over a trailing 30-day event window.
//!
//! Seven factors contribute fixed point budgets that sum to 100:
//! responsiveness 20, acceptance 12, completion 8, timeliness 20,
//! accuracy 20, engagement 10, and conduct 10. Each factor degrades to a
//! defined default when it has no samples, so a quiet month still produces
//! a finite score.

mod factors;

use serde::Serialize;

use super::domain::{FactorSamples, RollingAggregate, ScoreBreakdown, Tier, TierSnapshot};
use super::events::EventWindow;

/// Completed visits per 30 days below which a sitter's standing is
/// provisional and tier movement is deferred.
pub const MIN_MONTHLY_VISITS: u32 = 15;

/// Outcome of scoring one event window.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreResult {
    pub score: f64,
    pub breakdown: ScoreBreakdown,
    pub samples: FactorSamples,
    pub tier_recommendation: Tier,
    pub provisional: bool,
    pub visits_30d: u32,
    pub offers_30d: u32,
}

/// Scores one sitter's window. Pure: the same window and tier always
/// produce the same result.
pub fn compute_score(window: &EventWindow, current_tier: Tier) -> ScoreResult {
    let responsiveness = factors::responsiveness(window);
    let acceptance = factors::acceptance(window);
    let completion = factors::completion(window);
    let timeliness = factors::timeliness(window);
    let accuracy = factors::accuracy(window);
    let engagement = factors::engagement(window, current_tier);
    let conduct = factors::conduct(window);

    let breakdown = ScoreBreakdown {
        responsiveness: responsiveness.points,
        acceptance: acceptance.points,
        completion: completion.points,
        timeliness: timeliness.points,
        accuracy: accuracy.points,
        engagement: engagement.points,
        conduct: conduct.points,
    };
    let samples = FactorSamples {
        responsiveness: responsiveness.samples,
        acceptance: acceptance.samples,
        completion: completion.samples,
        timeliness: timeliness.samples,
        accuracy: accuracy.samples,
        engagement: engagement.samples,
        conduct: conduct.samples,
    };

    let score = round2(breakdown.composite());
    let visits_30d = engagement.samples;

    ScoreResult {
        score,
        breakdown,
        samples,
        tier_recommendation: Tier::from_score(score),
        provisional: visits_30d < MIN_MONTHLY_VISITS,
        visits_30d,
        offers_30d: acceptance.samples,
    }
}

/// Mean score and mean factor points over a set of snapshots, usually the
/// trailing 26 weeks. `None` when there is nothing to average.
pub fn rolling_26_week(snapshots: &[TierSnapshot]) -> Option<RollingAggregate> {
    if snapshots.is_empty() {
        return None;
    }

    let count = snapshots.len() as f64;
    let mean = |field: fn(&ScoreBreakdown) -> f64| {
        round2(
            snapshots
                .iter()
                .map(|snapshot| field(&snapshot.breakdown))
                .sum::<f64>()
                / count,
        )
    };

    Some(RollingAggregate {
        score: round2(snapshots.iter().map(|snapshot| snapshot.score).sum::<f64>() / count),
        breakdown: ScoreBreakdown {
            responsiveness: mean(|b| b.responsiveness),
            acceptance: mean(|b| b.acceptance),
            completion: mean(|b| b.completion),
            timeliness: mean(|b| b.timeliness),
            accuracy: mean(|b| b.accuracy),
            engagement: mean(|b| b.engagement),
            conduct: mean(|b| b.conduct),
        },
    })
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
