//! CSV event-archive loader. One flat file carries every event kind; the
//! `kind` column picks the target table. Rows with bad values are skipped
//! and reported, a structurally broken file aborts the import.

use std::io::Read;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Deserializer};

use super::domain::{BookingId, OrgId, WorkerId};
use super::events::{
    OfferEvent, ResponseLink, ServiceEvent, ServiceLevel, TimeOffPeriod, VisitEvent, VisitStatus,
};
use super::memory::InMemoryEventStore;

#[derive(Debug)]
pub enum ArchiveImportError {
    Io(std::io::Error),
    Csv(csv::Error),
}

impl std::fmt::Display for ArchiveImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArchiveImportError::Io(err) => write!(f, "failed to read event archive: {}", err),
            ArchiveImportError::Csv(err) => write!(f, "invalid event archive CSV data: {}", err),
        }
    }
}

impl std::error::Error for ArchiveImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ArchiveImportError::Io(err) => Some(err),
            ArchiveImportError::Csv(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for ArchiveImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for ArchiveImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

/// A row the import kept going past.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportIssue {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct ImportSummary {
    pub response_links: usize,
    pub offers: usize,
    pub visits: usize,
    pub time_off: usize,
    pub service_events: usize,
    pub skipped: Vec<ImportIssue>,
}

impl ImportSummary {
    pub fn imported(&self) -> usize {
        self.response_links + self.offers + self.visits + self.time_off + self.service_events
    }
}

pub struct EventArchiveImporter;

impl EventArchiveImporter {
    pub fn from_path<P: AsRef<Path>>(
        path: P,
        org: &OrgId,
        store: &InMemoryEventStore,
    ) -> Result<ImportSummary, ArchiveImportError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file, org, store)
    }

    pub fn from_reader<R: Read>(
        reader: R,
        org: &OrgId,
        store: &InMemoryEventStore,
    ) -> Result<ImportSummary, ArchiveImportError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut summary = ImportSummary::default();

        for (index, record) in csv_reader.deserialize::<ArchiveRow>().enumerate() {
            let row = record?;
            // Header occupies line 1.
            let line = index + 2;
            if let Err(message) = apply_row(row, org, store, &mut summary) {
                summary.skipped.push(ImportIssue { line, message });
            }
        }

        Ok(summary)
    }
}

#[derive(Debug, Deserialize)]
struct ArchiveRow {
    #[serde(default, deserialize_with = "empty_string_as_none")]
    kind: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    sitter: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    occurred_at: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    responded_at: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    within_window: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    excluded: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    accepted_at: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    declined_at: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    booking_id: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    status: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    late_minutes: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    checklist_missed: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    media_missing: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    complaint_verified: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    safety_flag: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    ends_at: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    level: Option<String>,
}

fn apply_row(
    row: ArchiveRow,
    org: &OrgId,
    store: &InMemoryEventStore,
    summary: &mut ImportSummary,
) -> Result<(), String> {
    let kind = row.kind.as_deref().ok_or("missing kind")?.to_string();
    let sitter = WorkerId(row.sitter.ok_or("missing sitter")?);
    let occurred_at = parse_instant(row.occurred_at.as_deref().ok_or("missing occurred_at")?)?;

    match kind.as_str() {
        "response" => {
            let responded_at =
                parse_instant(row.responded_at.as_deref().ok_or("missing responded_at")?)?;
            store.push_response_link(
                org,
                &sitter,
                ResponseLink {
                    requires_response_at: occurred_at,
                    responded_at,
                    within_assignment_window: parse_flag(row.within_window.as_deref(), true)?,
                    excluded: parse_flag(row.excluded.as_deref(), false)?,
                },
            );
            summary.response_links += 1;
        }
        "offer" => {
            let accepted_at = row.accepted_at.as_deref().map(parse_instant).transpose()?;
            let declined_at = row.declined_at.as_deref().map(parse_instant).transpose()?;
            store.push_offer(
                org,
                &sitter,
                OfferEvent {
                    offered_at: occurred_at,
                    accepted_at,
                    declined_at,
                    booking_id: row.booking_id.map(BookingId),
                    excluded: parse_flag(row.excluded.as_deref(), false)?,
                },
            );
            summary.offers += 1;
        }
        "visit" => {
            let booking_id = BookingId(row.booking_id.ok_or("missing booking_id")?);
            let status = match row.status.as_deref().ok_or("missing status")? {
                "completed" => VisitStatus::Completed,
                "missed" => VisitStatus::Missed,
                other => return Err(format!("unknown visit status: {other}")),
            };
            store.push_visit(
                org,
                &sitter,
                VisitEvent {
                    booking_id,
                    scheduled_start: occurred_at,
                    status,
                    late_minutes: parse_count(row.late_minutes.as_deref(), "late_minutes")?,
                    checklist_missed_count: parse_count(
                        row.checklist_missed.as_deref(),
                        "checklist_missed",
                    )?,
                    media_missing_count: parse_count(
                        row.media_missing.as_deref(),
                        "media_missing",
                    )?,
                    complaint_verified: parse_flag(row.complaint_verified.as_deref(), false)?,
                    safety_flag: parse_flag(row.safety_flag.as_deref(), false)?,
                    excluded: parse_flag(row.excluded.as_deref(), false)?,
                },
            );
            summary.visits += 1;
        }
        "time_off" => {
            let ends_at = parse_instant(row.ends_at.as_deref().ok_or("missing ends_at")?)?;
            store.push_time_off(
                org,
                &sitter,
                TimeOffPeriod {
                    starts_at: occurred_at,
                    ends_at,
                },
            );
            summary.time_off += 1;
        }
        "service" => {
            let level = match row.level.as_deref().ok_or("missing level")? {
                "coaching" => ServiceLevel::Coaching,
                "corrective" => ServiceLevel::Corrective,
                "probation" => ServiceLevel::Probation,
                other => return Err(format!("unknown service level: {other}")),
            };
            let effective_to = row.ends_at.as_deref().map(parse_instant).transpose()?;
            store.push_service_event(
                org,
                &sitter,
                ServiceEvent {
                    level,
                    effective_from: occurred_at,
                    effective_to,
                },
            );
            summary.service_events += 1;
        }
        other => return Err(format!("unknown event kind: {other}")),
    }

    Ok(())
}

fn parse_instant(value: &str) -> Result<DateTime<Utc>, String> {
    let trimmed = value.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(instant.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN).and_utc());
    }
    Err(format!("unrecognized timestamp: {trimmed}"))
}

fn parse_flag(value: Option<&str>, default: bool) -> Result<bool, String> {
    let Some(raw) = value else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(format!("unrecognized flag: {other}")),
    }
}

fn parse_count(value: Option<&str>, name: &str) -> Result<u32, String> {
    match value {
        None => Ok(0),
        Some(raw) => raw
            .trim()
            .parse::<u32>()
            .map_err(|_| format!("invalid {name}: {raw}")),
    }
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}
