use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{BookingId, OrgId, WorkerId};

/// Closed interval of instants. Both endpoints are inclusive so that an
/// event landing exactly on the as-of instant still counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowBounds {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl WindowBounds {
    pub fn trailing_days(end: DateTime<Utc>, days: i64) -> Self {
        Self {
            start: end - Duration::days(days),
            end,
        }
    }

    pub fn trailing_hours(end: DateTime<Utc>, hours: i64) -> Self {
        Self {
            start: end - Duration::hours(hours),
            end,
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant <= self.end
    }
}

/// A client message paired with the sitter's reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseLink {
    pub requires_response_at: DateTime<Utc>,
    pub responded_at: DateTime<Utc>,
    /// Message arrived while the sitter held an active assignment.
    pub within_assignment_window: bool,
    pub excluded: bool,
}

impl ResponseLink {
    /// Whole minutes between the message and the reply, floored. `None`
    /// when the recorded reply predates the message.
    pub fn latency_minutes(&self) -> Option<i64> {
        let minutes = (self.responded_at - self.requires_response_at)
            .num_seconds()
            .div_euclid(60);
        if minutes < 0 {
            None
        } else {
            Some(minutes)
        }
    }
}

/// A booking offer extended to the sitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferEvent {
    pub offered_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub declined_at: Option<DateTime<Utc>>,
    pub booking_id: Option<BookingId>,
    pub excluded: bool,
}

impl OfferEvent {
    pub fn is_accepted(&self) -> bool {
        self.accepted_at.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitStatus {
    Completed,
    Missed,
}

impl VisitStatus {
    pub const fn label(&self) -> &'static str {
        match self {
            VisitStatus::Completed => "completed",
            VisitStatus::Missed => "missed",
        }
    }
}

/// A scheduled visit and what actually happened during it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitEvent {
    pub booking_id: BookingId,
    pub scheduled_start: DateTime<Utc>,
    pub status: VisitStatus,
    /// Minutes past the scheduled start, zero when on time or missed.
    pub late_minutes: u32,
    pub checklist_missed_count: u32,
    pub media_missing_count: u32,
    pub complaint_verified: bool,
    pub safety_flag: bool,
    pub excluded: bool,
}

impl VisitEvent {
    pub fn is_completed(&self) -> bool {
        self.status == VisitStatus::Completed
    }
}

/// Approved time off. Messages that land inside one of these periods do not
/// count against responsiveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeOffPeriod {
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

impl TimeOffPeriod {
    pub fn covers(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.starts_at && instant <= self.ends_at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceLevel {
    Coaching,
    Corrective,
    Probation,
}

impl ServiceLevel {
    pub const fn label(&self) -> &'static str {
        match self {
            ServiceLevel::Coaching => "coaching",
            ServiceLevel::Corrective => "corrective",
            ServiceLevel::Probation => "probation",
        }
    }

    /// Corrective and probation events trigger gates the coaching level
    /// does not.
    pub const fn is_severe(&self) -> bool {
        matches!(self, ServiceLevel::Corrective | ServiceLevel::Probation)
    }
}

/// A conduct intervention recorded against the sitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEvent {
    pub level: ServiceLevel,
    pub effective_from: DateTime<Utc>,
    pub effective_to: Option<DateTime<Utc>>,
}

impl ServiceEvent {
    /// Open during any part of the window.
    pub fn active_during(&self, bounds: &WindowBounds) -> bool {
        self.effective_from <= bounds.end
            && self.effective_to.map_or(true, |closed| closed >= bounds.start)
    }

    /// Became effective inside the window.
    pub fn started_within(&self, bounds: &WindowBounds) -> bool {
        bounds.contains(self.effective_from)
    }
}

/// Everything the score calculator needs for one sitter over one window,
/// fetched once up front.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventWindow {
    pub org_id: OrgId,
    pub worker_id: WorkerId,
    pub bounds: WindowBounds,
    pub response_links: Vec<ResponseLink>,
    pub offers: Vec<OfferEvent>,
    pub visits: Vec<VisitEvent>,
    pub time_off: Vec<TimeOffPeriod>,
    pub service_events: Vec<ServiceEvent>,
}
