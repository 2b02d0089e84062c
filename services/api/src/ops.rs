use crate::infra::{build_engine, hydrate_archive};
use chrono::{Local, NaiveDate};
use clap::Args;
use sitter_srs::config::AppConfig;
use sitter_srs::error::AppError;
use sitter_srs::tiers::policy::{
    AtRiskDecision, DemotionDecision, PayRaiseDecision, PromotionDecision,
};
use sitter_srs::tiers::{
    fan_out_daily_snapshots, AuditKind, EvaluationReport, ImportSummary, OrgId, SrsScheduler,
    WorkerId,
};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub(crate) struct SnapshotArgs {
    /// Event archive CSV to score
    #[arg(long)]
    pub(crate) archive: PathBuf,
    /// Organization the archive rows belong to
    #[arg(long, default_value = "org-main")]
    pub(crate) org: String,
    /// Snapshot date (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) as_of: Option<NaiveDate>,
}

#[derive(Args, Debug)]
pub(crate) struct EvaluateArgs {
    /// Event archive CSV to score
    #[arg(long)]
    pub(crate) archive: PathBuf,
    /// Organization the archive rows belong to
    #[arg(long, default_value = "org-main")]
    pub(crate) org: String,
    /// Evaluation date (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) as_of: Option<NaiveDate>,
}

#[derive(Args, Debug)]
pub(crate) struct BackfillArgs {
    /// Event archive CSV to score
    #[arg(long)]
    pub(crate) archive: PathBuf,
    /// Organization the archive rows belong to
    #[arg(long, default_value = "org-main")]
    pub(crate) org: String,
    /// First snapshot date, inclusive (YYYY-MM-DD)
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) from: NaiveDate,
    /// Last snapshot date, inclusive (YYYY-MM-DD)
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) to: NaiveDate,
}

pub(crate) fn run_snapshot(args: SnapshotArgs) -> Result<(), AppError> {
    let SnapshotArgs { archive, org, as_of } = args;
    let as_of = as_of.unwrap_or_else(|| Local::now().date_naive());
    let org = OrgId(org);

    let engine = build_engine();
    let summary = hydrate_archive(&engine, &org, &archive)?;
    println!("Daily snapshot run for {} on {}", org.0, as_of);
    print_import_summary(&summary);

    let workers = engine.service.snapshot_targets(&org)?;
    if workers.is_empty() {
        println!("No registered sitters in this archive.");
        return Ok(());
    }

    println!("\nScores");
    for worker in workers {
        let outcome = engine.service.run_daily_snapshot(&org, &worker, as_of)?;
        let snapshot = outcome.snapshot();
        let status = if outcome.was_created() {
            "scored"
        } else {
            "already recorded"
        };
        let provisional = if snapshot.provisional {
            " (provisional)"
        } else {
            ""
        };
        println!(
            "- {}: {:.2} -> {}{} | {}",
            worker.0,
            snapshot.score,
            snapshot.tier_recommendation.label(),
            provisional,
            status
        );
    }

    Ok(())
}

pub(crate) fn run_evaluate(args: EvaluateArgs) -> Result<(), AppError> {
    let EvaluateArgs { archive, org, as_of } = args;
    let as_of = as_of.unwrap_or_else(|| Local::now().date_naive());
    let org = OrgId(org);

    let engine = build_engine();
    let summary = hydrate_archive(&engine, &org, &archive)?;
    println!("Weekly evaluation run for {} on {}", org.0, as_of);
    print_import_summary(&summary);

    let workers = engine.service.snapshot_targets(&org)?;
    if workers.is_empty() {
        println!("No registered sitters in this archive.");
        return Ok(());
    }

    println!("\nEvaluations");
    for worker in workers {
        let outcome = engine.service.run_daily_snapshot(&org, &worker, as_of)?;
        let report = engine.service.run_weekly_evaluation(&org, &worker, as_of)?;
        print_evaluation(&worker, outcome.snapshot().score, &report);
    }

    Ok(())
}

pub(crate) async fn run_backfill(args: BackfillArgs) -> Result<(), AppError> {
    let BackfillArgs {
        archive,
        org,
        from,
        to,
    } = args;
    let org = OrgId(org);

    let config = AppConfig::load()?;
    let engine = build_engine();
    let summary = hydrate_archive(&engine, &org, &archive)?;
    println!("Backfill for {}: {} through {}", org.0, from, to);
    print_import_summary(&summary);

    let scheduler = SrsScheduler::start(engine.service.clone(), config.scheduler.clone());
    let mut accepted = 0usize;
    let mut duplicates = 0usize;
    let mut day = from;
    while day <= to {
        let batch = fan_out_daily_snapshots(&scheduler, engine.service.as_ref(), &org, day).await?;
        accepted += batch.accepted;
        duplicates += batch.duplicates;
        day = match day.succ_opt() {
            Some(next) => next,
            None => break,
        };
    }
    scheduler.shutdown().await;

    let scored = engine.audit.of_kind(AuditKind::SnapshotCreated).len();
    println!(
        "\nQueued {} jobs ({} duplicates dropped) | {} snapshots recorded",
        accepted, duplicates, scored
    );

    Ok(())
}

fn print_import_summary(summary: &ImportSummary) {
    println!(
        "Archive: {} rows imported, {} skipped",
        summary.imported(),
        summary.skipped.len()
    );
    for issue in &summary.skipped {
        println!("  - line {}: {}", issue.line, issue.message);
    }
}

pub(crate) fn print_evaluation(worker: &WorkerId, score: f64, report: &EvaluationReport) {
    if report.tier_changed() {
        println!(
            "- {}: {:.2} | {} -> {}",
            worker.0,
            score,
            report.tier_before.label(),
            report.tier_after.label()
        );
    } else {
        println!(
            "- {}: {:.2} | held at {}",
            worker.0,
            score,
            report.tier_after.label()
        );
    }

    match &report.promotion {
        PromotionDecision::Promote { to } => println!("    promoted to {}", to.label()),
        PromotionDecision::Hold { reason } => println!("    promotion hold: {}", reason),
    }
    if let DemotionDecision::Demote { to, reason } = &report.demotion {
        println!("    demoted to {}: {}", to.label(), reason);
    }
    if let AtRiskDecision::AtRisk { reason } = &report.at_risk {
        println!("    at risk: {}", reason);
    }
    match &report.pay_raise {
        PayRaiseDecision::Raise { new_pay, amount } => {
            println!("    pay raised by {:.2} to {:.2}/hr", amount, new_pay)
        }
        PayRaiseDecision::NotYet { reason } => println!("    pay review: {}", reason),
    }
}
