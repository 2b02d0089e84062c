//! In-process job queue for snapshot and evaluation runs: a bounded
//! channel fanned out to a fixed pool of workers, with key-based
//! deduplication, retry with backoff for transient failures, and a
//! drain-then-stop shutdown.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::domain::{OrgId, WorkerId};
use super::service::{TierService, TierServiceError};
use super::store::{AuditSink, EventReader, SnapshotStore};
use crate::config::SchedulerConfig;

/// Jobs the queue will hold before submitters start waiting.
pub const QUEUE_DEPTH: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    DailySnapshot,
    WeeklyEvaluation,
}

impl JobKind {
    pub fn label(&self) -> &'static str {
        match self {
            JobKind::DailySnapshot => "daily-snapshot",
            JobKind::WeeklyEvaluation => "weekly-evaluation",
        }
    }

    fn key_prefix(&self) -> &'static str {
        match self {
            JobKind::DailySnapshot => "srs-snapshot",
            JobKind::WeeklyEvaluation => "srs-eval",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SrsJob {
    pub kind: JobKind,
    pub org_id: OrgId,
    pub worker_id: WorkerId,
    pub as_of_date: NaiveDate,
}

impl SrsJob {
    pub fn daily_snapshot(org_id: OrgId, worker_id: WorkerId, as_of_date: NaiveDate) -> Self {
        Self {
            kind: JobKind::DailySnapshot,
            org_id,
            worker_id,
            as_of_date,
        }
    }

    pub fn weekly_evaluation(org_id: OrgId, worker_id: WorkerId, as_of_date: NaiveDate) -> Self {
        Self {
            kind: JobKind::WeeklyEvaluation,
            org_id,
            worker_id,
            as_of_date,
        }
    }

    /// Deduplication key. One job per kind, sitter, and date.
    pub fn key(&self) -> String {
        format!(
            "{}-{}-{}-{}",
            self.kind.key_prefix(),
            self.org_id.0,
            self.worker_id.0,
            self.as_of_date
        )
    }
}

enum QueueMessage {
    Run(SrsJob),
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Accepted,
    Duplicate,
    Closed,
}

/// Counts from queueing one fan-out batch.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct FanOutSummary {
    pub accepted: usize,
    pub duplicates: usize,
}

pub struct SrsScheduler;

impl SrsScheduler {
    /// Spawns the worker pool and returns the handle used to submit jobs.
    pub fn start<E, S, A>(
        service: Arc<TierService<E, S, A>>,
        config: SchedulerConfig,
    ) -> SchedulerHandle
    where
        E: EventReader + 'static,
        S: SnapshotStore + 'static,
        A: AuditSink + 'static,
    {
        let (sender, receiver) = mpsc::channel(QUEUE_DEPTH);
        let queue = Arc::new(AsyncMutex::new(receiver));
        let concurrency = config.concurrency.max(1);
        let mut workers = Vec::with_capacity(concurrency);
        for index in 0..concurrency {
            workers.push(tokio::spawn(worker_loop(
                index,
                Arc::clone(&queue),
                Arc::clone(&service),
                config.clone(),
            )));
        }
        info!(workers = concurrency, "scheduler started");
        SchedulerHandle {
            sender,
            seen: Arc::new(StdMutex::new(HashSet::new())),
            closed: Arc::new(AtomicBool::new(false)),
            workers: Arc::new(AsyncMutex::new(workers)),
        }
    }
}

#[derive(Clone)]
pub struct SchedulerHandle {
    sender: mpsc::Sender<QueueMessage>,
    seen: Arc<StdMutex<HashSet<String>>>,
    closed: Arc<AtomicBool>,
    workers: Arc<AsyncMutex<Vec<JoinHandle<()>>>>,
}

impl SchedulerHandle {
    /// Submits a job. A key already seen is dropped as a duplicate; waits
    /// for queue room when the channel is full.
    pub async fn enqueue(&self, job: SrsJob) -> EnqueueOutcome {
        if self.closed.load(Ordering::Acquire) {
            return EnqueueOutcome::Closed;
        }
        let key = job.key();
        {
            let mut seen = self.seen.lock().expect("job dedup set mutex poisoned");
            if !seen.insert(key.clone()) {
                debug!(job = key.as_str(), "duplicate job dropped");
                return EnqueueOutcome::Duplicate;
            }
        }
        match self.sender.send(QueueMessage::Run(job)).await {
            Ok(()) => {
                debug!(job = key.as_str(), "job queued");
                EnqueueOutcome::Accepted
            }
            Err(_) => {
                let mut seen = self.seen.lock().expect("job dedup set mutex poisoned");
                seen.remove(&key);
                warn!(job = key.as_str(), "job queue closed; submission dropped");
                EnqueueOutcome::Closed
            }
        }
    }

    /// Stops accepting jobs, lets the workers finish everything already
    /// queued, and waits for them to exit.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        let mut workers = self.workers.lock().await;
        for _ in 0..workers.len() {
            if self.sender.send(QueueMessage::Shutdown).await.is_err() {
                break;
            }
        }
        for handle in workers.drain(..) {
            if let Err(err) = handle.await {
                error!(error = %err, "scheduler worker panicked");
            }
        }
        info!("scheduler drained");
    }
}

async fn worker_loop<E, S, A>(
    index: usize,
    queue: Arc<AsyncMutex<mpsc::Receiver<QueueMessage>>>,
    service: Arc<TierService<E, S, A>>,
    config: SchedulerConfig,
) where
    E: EventReader,
    S: SnapshotStore,
    A: AuditSink,
{
    loop {
        // Hold the receiver lock only for the take, never while running.
        let message = {
            let mut receiver = queue.lock().await;
            receiver.recv().await
        };
        match message {
            Some(QueueMessage::Run(job)) => run_with_retry(&job, &service, &config).await,
            Some(QueueMessage::Shutdown) | None => break,
        }
    }
    debug!(worker = index, "scheduler worker stopped");
}

async fn run_with_retry<E, S, A>(
    job: &SrsJob,
    service: &TierService<E, S, A>,
    config: &SchedulerConfig,
) where
    E: EventReader,
    S: SnapshotStore,
    A: AuditSink,
{
    let attempts = config.retry_attempts.max(1);
    let mut backoff = Duration::from_millis(config.retry_base_delay_ms);
    for attempt in 1..=attempts {
        match execute(job, service) {
            Ok(summary) => {
                debug!(job = %job.key(), attempt, summary = summary.as_str(), "job completed");
                return;
            }
            Err(err) if err.is_transient() && attempt < attempts => {
                warn!(job = %job.key(), attempt, error = %err, "transient failure; retrying");
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
            Err(err) => {
                error!(job = %job.key(), attempt, error = %err, "job failed");
                service.record_job_failure(
                    &job.org_id,
                    &job.worker_id,
                    &job.key(),
                    &err.to_string(),
                );
                return;
            }
        }
    }
}

fn execute<E, S, A>(job: &SrsJob, service: &TierService<E, S, A>) -> Result<String, TierServiceError>
where
    E: EventReader,
    S: SnapshotStore,
    A: AuditSink,
{
    match job.kind {
        JobKind::DailySnapshot => {
            let outcome = service.run_daily_snapshot(&job.org_id, &job.worker_id, job.as_of_date)?;
            Ok(if outcome.was_created() {
                format!("snapshot scored {:.2}", outcome.snapshot().score)
            } else {
                "snapshot already recorded".to_string()
            })
        }
        JobKind::WeeklyEvaluation => {
            let report =
                service.run_weekly_evaluation(&job.org_id, &job.worker_id, job.as_of_date)?;
            Ok(if report.tier_changed() {
                format!(
                    "tier moved {} to {}",
                    report.tier_before.label(),
                    report.tier_after.label()
                )
            } else {
                format!("tier held at {}", report.tier_after.label())
            })
        }
    }
}

/// Queues one daily snapshot job per active sitter in the org.
pub async fn fan_out_daily_snapshots<E, S, A>(
    handle: &SchedulerHandle,
    service: &TierService<E, S, A>,
    org: &OrgId,
    as_of_date: NaiveDate,
) -> Result<FanOutSummary, TierServiceError>
where
    E: EventReader,
    S: SnapshotStore,
    A: AuditSink,
{
    let mut summary = FanOutSummary::default();
    for worker in service.snapshot_targets(org)? {
        match handle
            .enqueue(SrsJob::daily_snapshot(org.clone(), worker, as_of_date))
            .await
        {
            EnqueueOutcome::Accepted => summary.accepted += 1,
            EnqueueOutcome::Duplicate => summary.duplicates += 1,
            EnqueueOutcome::Closed => {
                warn!(org = %org.0, "scheduler closed mid fan-out");
                break;
            }
        }
    }
    info!(
        org = %org.0,
        date = %as_of_date,
        accepted = summary.accepted,
        duplicates = summary.duplicates,
        "daily snapshot fan-out queued"
    );
    Ok(summary)
}

/// Queues one weekly evaluation job per sitter with a recent snapshot.
pub async fn fan_out_weekly_evaluations<E, S, A>(
    handle: &SchedulerHandle,
    service: &TierService<E, S, A>,
    org: &OrgId,
    as_of_date: NaiveDate,
) -> Result<FanOutSummary, TierServiceError>
where
    E: EventReader,
    S: SnapshotStore,
    A: AuditSink,
{
    let mut summary = FanOutSummary::default();
    for worker in service.evaluation_targets(org, as_of_date)? {
        match handle
            .enqueue(SrsJob::weekly_evaluation(org.clone(), worker, as_of_date))
            .await
        {
            EnqueueOutcome::Accepted => summary.accepted += 1,
            EnqueueOutcome::Duplicate => summary.duplicates += 1,
            EnqueueOutcome::Closed => {
                warn!(org = %org.0, "scheduler closed mid fan-out");
                break;
            }
        }
    }
    info!(
        org = %org.0,
        date = %as_of_date,
        accepted = summary.accepted,
        duplicates = summary.duplicates,
        "weekly evaluation fan-out queued"
    );
    Ok(summary)
}
