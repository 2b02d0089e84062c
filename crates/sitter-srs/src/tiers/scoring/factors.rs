use std::collections::HashSet;

use super::super::domain::{BookingId, Tier};
use super::super::events::{EventWindow, OfferEvent, ServiceLevel, VisitEvent, VisitStatus};

/// Points awarded by one factor plus the number of events behind them.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FactorOutcome {
    pub(crate) points: f64,
    pub(crate) samples: u32,
}

impl FactorOutcome {
    fn empty(points: f64) -> Self {
        Self { points, samples: 0 }
    }
}

/// Upper-median reply latency in whole minutes, banded to 0..=20 points.
/// Links outside the assignment window, inside approved time off, excluded,
/// or with a reply recorded before the message are all dropped first.
pub(crate) fn responsiveness(window: &EventWindow) -> FactorOutcome {
    let mut latencies: Vec<i64> = window
        .response_links
        .iter()
        .filter(|link| !link.excluded && link.within_assignment_window)
        .filter(|link| window.bounds.contains(link.requires_response_at))
        .filter(|link| {
            !window
                .time_off
                .iter()
                .any(|period| period.covers(link.requires_response_at))
        })
        .filter_map(|link| link.latency_minutes())
        .collect();

    if latencies.is_empty() {
        return FactorOutcome::empty(0.0);
    }

    latencies.sort_unstable();
    let median = latencies[latencies.len() / 2];
    let points = if median <= 5 {
        20.0
    } else if median <= 10 {
        16.0
    } else if median <= 20 {
        12.0
    } else if median <= 45 {
        8.0
    } else if median <= 90 {
        4.0
    } else {
        0.0
    };

    FactorOutcome {
        points,
        samples: latencies.len() as u32,
    }
}

pub(crate) fn acceptance(window: &EventWindow) -> FactorOutcome {
    let offers: Vec<&OfferEvent> = scored_offers(window);
    if offers.is_empty() {
        return FactorOutcome::empty(0.0);
    }

    let accepted = offers.iter().filter(|offer| offer.is_accepted()).count();
    let rate = accepted as f64 / offers.len() as f64;
    let points = if rate >= 0.90 {
        12.0
    } else if rate >= 0.85 {
        10.0
    } else if rate >= 0.80 {
        8.0
    } else if rate >= 0.75 {
        6.0
    } else if rate >= 0.70 {
        4.0
    } else {
        0.0
    };

    FactorOutcome {
        points,
        samples: offers.len() as u32,
    }
}

/// Completion rate over visits belonging to bookings the sitter accepted in
/// the window. No joined visits counts as a perfect rate, not a zero.
pub(crate) fn completion(window: &EventWindow) -> FactorOutcome {
    let accepted_bookings: HashSet<&BookingId> = scored_offers(window)
        .into_iter()
        .filter(|offer| offer.is_accepted())
        .filter_map(|offer| offer.booking_id.as_ref())
        .collect();

    let joined: Vec<&VisitEvent> = scored_visits(window)
        .into_iter()
        .filter(|visit| accepted_bookings.contains(&visit.booking_id))
        .collect();

    let rate = if joined.is_empty() {
        1.0
    } else {
        joined.iter().filter(|visit| visit.is_completed()).count() as f64 / joined.len() as f64
    };
    let points = if rate >= 0.99 {
        8.0
    } else if rate >= 0.97 {
        6.0
    } else if rate >= 0.95 {
        4.0
    } else if rate >= 0.92 {
        2.0
    } else {
        0.0
    };

    FactorOutcome {
        points,
        samples: joined.len() as u32,
    }
}

/// Per-visit punctuality points averaged and mapped onto 0..=20.
pub(crate) fn timeliness(window: &EventWindow) -> FactorOutcome {
    let visits = scored_visits(window);
    if visits.is_empty() {
        return FactorOutcome::empty(0.0);
    }

    let total: i64 = visits.iter().map(|visit| punctuality_points(visit)).sum();
    let mean = total as f64 / visits.len() as f64;
    FactorOutcome {
        points: (mean * 20.0 + 10.0).clamp(0.0, 20.0),
        samples: visits.len() as u32,
    }
}

fn punctuality_points(visit: &VisitEvent) -> i64 {
    match visit.status {
        VisitStatus::Missed => -6,
        VisitStatus::Completed => {
            if visit.late_minutes > 15 {
                -2
            } else if visit.late_minutes > 5 {
                0
            } else {
                1
            }
        }
    }
}

/// Reporting-quality penalties per ten completed visits, subtracted from a
/// full 20 points. A sitter with no completed visits has nothing to hold
/// against them and keeps the full score.
pub(crate) fn accuracy(window: &EventWindow) -> FactorOutcome {
    let completed: Vec<&VisitEvent> = scored_visits(window)
        .into_iter()
        .filter(|visit| visit.is_completed())
        .collect();
    if completed.is_empty() {
        return FactorOutcome::empty(20.0);
    }

    let penalty: f64 = completed
        .iter()
        .map(|visit| {
            f64::from(visit.checklist_missed_count)
                + f64::from(visit.media_missing_count)
                + if visit.complaint_verified { 3.0 } else { 0.0 }
                + if visit.safety_flag { 5.0 } else { 0.0 }
        })
        .sum();
    let per_ten_visits = penalty / (completed.len() as f64 / 10.0);

    FactorOutcome {
        points: (20.0 - per_ten_visits).max(0.0),
        samples: completed.len() as u32,
    }
}

/// Completed visits measured against the ceiling of the current tier's
/// monthly quota band.
pub(crate) fn engagement(window: &EventWindow, current_tier: Tier) -> FactorOutcome {
    let completed = scored_visits(window)
        .into_iter()
        .filter(|visit| visit.is_completed())
        .count() as u32;

    let quota = current_tier.visit_quota().max;
    let percent = f64::from(completed) / f64::from(quota) * 100.0;
    let points = if percent >= 100.0 {
        10.0
    } else if percent >= 90.0 {
        8.0
    } else if percent >= 80.0 {
        6.0
    } else if percent >= 70.0 {
        4.0
    } else {
        0.0
    };

    FactorOutcome {
        points,
        samples: completed,
    }
}

/// Conduct standing from service events active in the window. The worst
/// active level wins; coaching only stacks against itself.
pub(crate) fn conduct(window: &EventWindow) -> FactorOutcome {
    let active: Vec<_> = window
        .service_events
        .iter()
        .filter(|event| event.active_during(&window.bounds))
        .collect();

    let has_level = |level: ServiceLevel| active.iter().any(|event| event.level == level);
    let coaching_count = active
        .iter()
        .filter(|event| event.level == ServiceLevel::Coaching)
        .count();

    let points = if has_level(ServiceLevel::Probation) {
        0.0
    } else if has_level(ServiceLevel::Corrective) {
        2.0
    } else if coaching_count >= 2 {
        5.0
    } else if coaching_count == 1 {
        7.0
    } else {
        10.0
    };

    FactorOutcome {
        points,
        samples: active.len() as u32,
    }
}

fn scored_offers(window: &EventWindow) -> Vec<&OfferEvent> {
    window
        .offers
        .iter()
        .filter(|offer| !offer.excluded && window.bounds.contains(offer.offered_at))
        .collect()
}

fn scored_visits(window: &EventWindow) -> Vec<&VisitEvent> {
    window
        .visits
        .iter()
        .filter(|visit| !visit.excluded && window.bounds.contains(visit.scheduled_start))
        .collect()
}
