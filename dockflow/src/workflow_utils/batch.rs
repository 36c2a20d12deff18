//! Bounded parallel execution of independent work items
//!
//! Every item runs as its own tokio task behind a shared semaphore, so at most
//! `limit` items execute at once. Item failures, panics and time-outs are turned
//! into [`Outcome`] values; nothing an item does can cancel its siblings or
//! abort the batch.

use futures::{stream::FuturesUnordered, Future, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

use dockflow_sdk::log_progress;

/// Context provided to each task in a batch
#[derive(Debug, Clone, Copy)]
pub struct TaskContext {
    /// Phase number (for logging)
    pub phase: usize,
    /// Task number (1-indexed for display)
    pub task_number: usize,
    /// Total number of tasks in this batch
    pub total_tasks: usize,
}

/// One independent unit of work
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem<T> {
    /// Normalized identity key, unique within a batch
    pub key: String,
    /// Optional grouping key (e.g. the protein a pose belongs to)
    pub group: Option<String>,
    pub payload: T,
}

impl<T> WorkItem<T> {
    pub fn new(key: impl Into<String>, payload: T) -> Self {
        Self {
            key: key.into(),
            group: None,
            payload,
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }
}

/// Terminal result of processing one work item
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<R> {
    Success(R),
    Failed(String),
    TimedOut(Duration),
    Skipped(String),
}

impl<R> Outcome<R> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn artifact(&self) -> Option<&R> {
        match self {
            Outcome::Success(r) => Some(r),
            _ => None,
        }
    }

    /// Error or skip reason; `None` for successes
    pub fn detail(&self) -> Option<String> {
        match self {
            Outcome::Success(_) => None,
            Outcome::Failed(e) => Some(e.clone()),
            Outcome::TimedOut(d) => Some(format!("timed out after {:.0}s", d.as_secs_f64())),
            Outcome::Skipped(reason) => Some(reason.clone()),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(R) -> U) -> Outcome<U> {
        match self {
            Outcome::Success(r) => Outcome::Success(f(r)),
            Outcome::Failed(e) => Outcome::Failed(e),
            Outcome::TimedOut(d) => Outcome::TimedOut(d),
            Outcome::Skipped(s) => Outcome::Skipped(s),
        }
    }

    /// Split off the success value; any other outcome carries over unchanged
    pub fn into_result<U>(self) -> Result<R, Outcome<U>> {
        match self {
            Outcome::Success(r) => Ok(r),
            Outcome::Failed(e) => Err(Outcome::Failed(e)),
            Outcome::TimedOut(d) => Err(Outcome::TimedOut(d)),
            Outcome::Skipped(s) => Err(Outcome::Skipped(s)),
        }
    }

    /// Chain a follow-up step that only runs on success
    pub async fn and_then<U, Fut>(self, f: impl FnOnce(R) -> Fut) -> Outcome<U>
    where
        Fut: Future<Output = Outcome<U>>,
    {
        match self {
            Outcome::Success(r) => f(r).await,
            Outcome::Failed(e) => Outcome::Failed(e),
            Outcome::TimedOut(d) => Outcome::TimedOut(d),
            Outcome::Skipped(s) => Outcome::Skipped(s),
        }
    }
}

/// Outcome of one item together with its identity and wall time
#[derive(Debug, Clone)]
pub struct ItemReport<R> {
    pub key: String,
    pub group: Option<String>,
    pub outcome: Outcome<R>,
    pub elapsed: Duration,
}

/// How item futures are driven
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerKind {
    /// Runtime worker threads; for items that mostly wait on subprocesses
    Async,
    /// Dedicated blocking-pool thread per item; for CPU-heavy in-process work
    Blocking,
}

/// Worker pool parameters shared by every stage
#[derive(Debug, Clone, Copy)]
pub struct DispatchConfig {
    pub kind: WorkerKind,
    pub limit: usize,
    pub item_timeout: Option<Duration>,
}

impl DispatchConfig {
    pub fn new(kind: WorkerKind, limit: usize) -> Self {
        Self {
            kind,
            limit: limit.max(1),
            item_timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.item_timeout = Some(timeout);
        self
    }
}

/// Host core count minus two, never below one
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .saturating_sub(2)
        .max(1)
}

async fn run_with_timeout<R, Fut>(fut: Fut, timeout: Option<Duration>) -> Outcome<R>
where
    Fut: Future<Output = Outcome<R>>,
{
    match timeout {
        // Dropping the inner future on expiry drops any child process it owns.
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(outcome) => outcome,
            Err(_) => Outcome::TimedOut(limit),
        },
        None => fut.await,
    }
}

/// Execute work items with bounded concurrency
///
/// # Arguments
/// - `phase`: Phase number for task context
/// - `items`: Work items, consumed exactly once
/// - `config`: Worker kind, concurrency limit and per-item timeout
/// - `task_executor`: Processes one item and returns its outcome
/// - `on_complete`: Called once per finished item, from a single consumer loop
///
/// # Returns
/// One report per input item, in completion order (not input order)
///
/// # Example
/// ```rust,ignore
/// let reports = dispatch(
///     4,
///     items,
///     &DispatchConfig::new(WorkerKind::Async, 4).with_timeout(Duration::from_secs(600)),
///     |item, ctx| async move { dock_receptor(item, ctx).await },
///     |report| docking_log.append_report(report),
/// ).await;
/// ```
pub async fn dispatch<T, R, F, Fut, C>(
    phase: usize,
    items: Vec<WorkItem<T>>,
    config: &DispatchConfig,
    task_executor: F,
    mut on_complete: C,
) -> Vec<ItemReport<R>>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(WorkItem<T>, TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Outcome<R>> + Send + 'static,
    C: FnMut(&ItemReport<R>),
{
    let total = items.len();
    let sem = Arc::new(Semaphore::new(config.limit.max(1)));
    let executor = Arc::new(task_executor);
    let kind = config.kind;
    let timeout = config.item_timeout;
    let mut tasks = FuturesUnordered::new();

    for (idx, item) in items.into_iter().enumerate() {
        let sem = sem.clone();
        let executor = executor.clone();
        let key = item.key.clone();
        let group = item.group.clone();
        let ctx = TaskContext {
            phase,
            task_number: idx + 1,
            total_tasks: total,
        };

        let handle = tokio::spawn(async move {
            // Acquire permit (waits while `limit` items are running)
            let _permit = sem.acquire_owned().await;
            let started = Instant::now();

            let fut = executor(item, ctx);
            let outcome = match kind {
                WorkerKind::Async => run_with_timeout(fut, timeout).await,
                WorkerKind::Blocking => {
                    let rt = tokio::runtime::Handle::current();
                    tokio::task::spawn_blocking(move || rt.block_on(run_with_timeout(fut, timeout)))
                        .await
                        .unwrap_or_else(|e| Outcome::Failed(format!("worker thread failed: {}", e)))
                }
            };
            (outcome, started.elapsed())
        });

        let submitted = Instant::now();
        tasks.push(async move {
            let (outcome, elapsed) = match handle.await {
                Ok(done) => done,
                Err(e) => (
                    Outcome::Failed(format!("worker task failed: {}", e)),
                    submitted.elapsed(),
                ),
            };
            ItemReport {
                key,
                group,
                outcome,
                elapsed,
            }
        });
    }

    let mut reports = Vec::with_capacity(total);
    while let Some(report) = tasks.next().await {
        on_complete(&report);
        reports.push(report);
        log_progress!(reports.len(), total, "items");
    }

    reports
}

/// Restore a deterministic order after out-of-order completion
pub fn sort_reports<R>(reports: &mut [ItemReport<R>]) {
    reports.sort_by(|a, b| a.key.cmp(&b.key));
}

/// Per-status tallies for one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub skipped: usize,
}

impl OutcomeCounts {
    pub fn from_reports<R>(reports: &[ItemReport<R>]) -> Self {
        let mut counts = Self::default();
        for report in reports {
            counts.record(&report.outcome);
        }
        counts
    }

    pub fn record<R>(&mut self, outcome: &Outcome<R>) {
        match outcome {
            Outcome::Success(_) => self.succeeded += 1,
            Outcome::Failed(_) => self.failed += 1,
            Outcome::TimedOut(_) => self.timed_out += 1,
            Outcome::Skipped(_) => self.skipped += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.timed_out + self.skipped
    }
}
