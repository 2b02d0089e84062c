use crate::infra::{build_engine, Engine};
use crate::ops::print_evaluation;
use chrono::{DateTime, Duration, Local, NaiveDate, NaiveTime, Utc};
use clap::Args;
use sitter_srs::config::SchedulerConfig;
use sitter_srs::error::AppError;
use sitter_srs::tiers::events::{
    OfferEvent, ResponseLink, ServiceEvent, ServiceLevel, VisitEvent, VisitStatus,
};
use sitter_srs::tiers::{
    fan_out_daily_snapshots, AuditKind, BookingId, OrgId, SrsScheduler, WorkerId,
};

/// Days of events seeded ahead of the scored stretch so every trailing
/// window is fully populated from day one.
const SEED_SPAN_DAYS: i64 = 57;
/// Days covered by the daily snapshot loop.
const DEMO_DAYS: i64 = 28;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Final scored date (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) as_of: Option<NaiveDate>,
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs { as_of } = args;
    let anchor = as_of.unwrap_or_else(|| Local::now().date_naive());
    let demo_start = anchor - Duration::days(DEMO_DAYS - 1);
    let org = OrgId("org-seattle".to_string());
    let avery = WorkerId("sitter-avery".to_string());
    let blake = WorkerId("sitter-blake".to_string());

    let engine = build_engine();
    seed_history(&engine, &org, &avery, &blake, anchor);

    println!("Sitter reliability demo");
    println!(
        "Scoring window: {} -> {} (org {})",
        demo_start, anchor, org.0
    );
    println!("Seeded sitters:");
    println!("- {}: 3 min replies, every offer accepted, every visit completed on time", avery.0);
    println!(
        "- {}: 8 min replies, occasional declines, lighter visit load, corrective action on {}",
        blake.0,
        demo_start + Duration::days(20)
    );

    let mut week = 0;
    for offset in 0..DEMO_DAYS {
        let day = demo_start + Duration::days(offset);
        engine.service.run_daily_snapshot(&org, &avery, day)?;
        engine.service.run_daily_snapshot(&org, &blake, day)?;

        if offset % 7 != 6 {
            continue;
        }
        week += 1;
        println!("\nWeek {} evaluation ({})", week, day);
        for worker in [&avery, &blake] {
            let report = engine.service.run_weekly_evaluation(&org, worker, day)?;
            let score = report.score.unwrap_or(0.0);
            print_evaluation(worker, score, &report);
        }
    }

    println!("\nAudit trail (tier events)");
    let records = engine.audit.records();
    for record in records
        .iter()
        .filter(|record| record.kind != AuditKind::SnapshotCreated)
    {
        let movement = match (record.tier_before, record.tier_after) {
            (Some(before), Some(after)) => format!(" {} -> {}", before.label(), after.label()),
            _ => String::new(),
        };
        println!(
            "- {} {} {}{} | {}",
            record.recorded_at.date_naive(),
            record.kind.event_type(),
            record.worker_id.0,
            movement,
            record.reason.as_deref().unwrap_or("-")
        );
    }

    println!("\nScheduler fan-out for {}", anchor);
    let scheduler = SrsScheduler::start(engine.service.clone(), SchedulerConfig::default());
    let first = fan_out_daily_snapshots(&scheduler, engine.service.as_ref(), &org, anchor).await?;
    let second = fan_out_daily_snapshots(&scheduler, engine.service.as_ref(), &org, anchor).await?;
    scheduler.shutdown().await;
    println!(
        "- first pass: {} queued, {} duplicates",
        first.accepted, first.duplicates
    );
    println!(
        "- second pass: {} queued, {} duplicates",
        second.accepted, second.duplicates
    );

    Ok(())
}

/// Seeds two contrasting sitters. Avery runs a flawless book; Blake keeps a
/// lighter schedule, declines the odd offer, and picks up a corrective
/// action three weeks into the scored stretch.
fn seed_history(engine: &Engine, org: &OrgId, avery: &WorkerId, blake: &WorkerId, anchor: NaiveDate) {
    engine.events.register_worker(org, avery);
    engine.events.register_worker(org, blake);

    let seed_start = anchor - Duration::days(SEED_SPAN_DAYS);
    for i in 0..=SEED_SPAN_DAYS {
        let day = seed_start + Duration::days(i);

        engine.events.push_response_link(
            org,
            avery,
            ResponseLink {
                requires_response_at: at(day, 9, 0),
                responded_at: at(day, 9, 3),
                within_assignment_window: true,
                excluded: false,
            },
        );
        let avery_booking = BookingId(format!("avery-bk-{i}"));
        engine.events.push_offer(
            org,
            avery,
            OfferEvent {
                offered_at: at(day, 8, 0),
                accepted_at: Some(at(day, 8, 30)),
                declined_at: None,
                booking_id: Some(avery_booking.clone()),
                excluded: false,
            },
        );
        engine.events.push_visit(
            org,
            avery,
            VisitEvent {
                booking_id: avery_booking,
                scheduled_start: at(day, 14, 0),
                status: VisitStatus::Completed,
                late_minutes: 0,
                checklist_missed_count: 0,
                media_missing_count: 0,
                complaint_verified: false,
                safety_flag: false,
                excluded: false,
            },
        );

        engine.events.push_response_link(
            org,
            blake,
            ResponseLink {
                requires_response_at: at(day, 9, 0),
                responded_at: at(day, 9, 8),
                within_assignment_window: true,
                excluded: false,
            },
        );
        let blake_booking = BookingId(format!("blake-bk-{i}"));
        engine.events.push_offer(
            org,
            blake,
            OfferEvent {
                offered_at: at(day, 8, 0),
                accepted_at: Some(at(day, 8, 45)),
                declined_at: None,
                booking_id: Some(blake_booking.clone()),
                excluded: false,
            },
        );
        if i % 6 == 0 {
            engine.events.push_offer(
                org,
                blake,
                OfferEvent {
                    offered_at: at(day, 11, 0),
                    accepted_at: None,
                    declined_at: Some(at(day, 11, 20)),
                    booking_id: None,
                    excluded: false,
                },
            );
        }
        if i % 3 != 0 {
            engine.events.push_visit(
                org,
                blake,
                VisitEvent {
                    booking_id: blake_booking,
                    scheduled_start: at(day, 15, 0),
                    status: VisitStatus::Completed,
                    late_minutes: 0,
                    checklist_missed_count: 0,
                    media_missing_count: 0,
                    complaint_verified: false,
                    safety_flag: false,
                    excluded: false,
                },
            );
        }
    }

    // Lands two hours before the week-three evaluation instant, inside the
    // trailing 24 hour severity window.
    let demo_start = anchor - Duration::days(DEMO_DAYS - 1);
    let corrective_day = demo_start + Duration::days(20);
    engine.events.push_service_event(
        org,
        blake,
        ServiceEvent {
            level: ServiceLevel::Corrective,
            effective_from: at(corrective_day, 0, 0) - Duration::hours(2),
            effective_to: None,
        },
    );
}

fn at(date: NaiveDate, hour: i64, minute: i64) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc() + Duration::hours(hour) + Duration::minutes(minute)
}
