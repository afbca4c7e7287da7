//! Worker pool for reconciliation
//!
//! A fixed number of tokio tasks pull records from a shared queue, reconcile
//! them and push results into a channel. The aggregator collects results in
//! completion order. Each record goes to exactly one worker, once.

use crate::cancel::CancelSignal;
use crate::error::{ReconcileError, RecordFailure};
use crate::reconciler::{Reconciled, Reconciler};
use crate::types::{Outcome, Record};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Per-outcome tallies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeCounts {
    /// Tag added
    pub tagged: usize,
    /// Tag already present
    pub already_tagged: usize,
    /// No gateway
    pub skipped_no_gateway: usize,
    /// Reconciliation failed
    pub failed: usize,
}

impl OutcomeCounts {
    /// Count one outcome
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Tagged => self.tagged += 1,
            Outcome::AlreadyTagged => self.already_tagged += 1,
            Outcome::SkippedNoGateway => self.skipped_no_gateway += 1,
            Outcome::Failed => self.failed += 1,
        }
    }

    /// Records that reached a terminal outcome
    #[must_use]
    pub fn total(&self) -> usize {
        self.tagged + self.already_tagged + self.skipped_no_gateway + self.failed
    }
}

/// Result of running the pool over a record set
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Records with an included outcome, in completion order
    pub included: Vec<Record>,
    /// Records that failed
    pub failures: Vec<RecordFailure>,
    /// Outcome tallies
    pub counts: OutcomeCounts,
    /// Records never handed to a worker because the run was cancelled
    pub not_dispatched: usize,
}

impl RunReport {
    /// Summary for a run that fetched `fetched` records
    #[must_use]
    pub fn summary(&self, fetched: usize) -> RunSummary {
        RunSummary {
            fetched,
            included: self.included.len(),
            excluded: fetched.saturating_sub(self.included.len()),
            counts: self.counts,
            not_dispatched: self.not_dispatched,
            output: None,
        }
    }
}

/// Terminal summary of one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Records fetched
    pub fetched: usize,
    /// Records in the final result set
    pub included: usize,
    /// Records left out (failed or never dispatched)
    pub excluded: usize,
    /// Outcome tallies
    pub counts: OutcomeCounts,
    /// Records skipped by cancellation
    pub not_dispatched: usize,
    /// Result file, if one was written
    pub output: Option<PathBuf>,
}

/// Runs the reconciler over many records with bounded concurrency
#[derive(Debug, Clone)]
pub struct Orchestrator {
    reconciler: Arc<Reconciler>,
    concurrency: usize,
    cancel: CancelSignal,
}

impl Orchestrator {
    /// Create orchestrator with `concurrency` workers
    #[must_use]
    pub fn new(reconciler: Reconciler, concurrency: usize) -> Self {
        Self {
            reconciler: Arc::new(reconciler),
            concurrency: concurrency.max(1),
            cancel: CancelSignal::new(),
        }
    }

    /// With a cancellation signal shared with the caller
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    /// Worker pool width
    #[inline]
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Reconcile every record and aggregate the outcomes
    pub async fn run(&self, records: Vec<Record>) -> RunReport {
        let total = records.len();
        let mut report = RunReport::default();
        if total == 0 {
            return report;
        }

        let (task_tx, task_rx) = mpsc::unbounded_channel();
        for record in records {
            // Receiver is alive until the workers are spawned
            let _ = task_tx.send(record);
        }
        drop(task_tx);
        let queue = Arc::new(Mutex::new(task_rx));

        let (result_tx, mut result_rx) = mpsc::unbounded_channel();
        let workers: Vec<_> = (0..self.concurrency.min(total))
            .map(|worker| {
                tokio::spawn(worker_loop(
                    worker,
                    Arc::clone(&self.reconciler),
                    Arc::clone(&queue),
                    result_tx.clone(),
                    self.cancel.clone(),
                ))
            })
            .collect();
        drop(result_tx);

        while let Some(result) = result_rx.recv().await {
            match result {
                Ok(Reconciled { record, outcome }) => {
                    report.counts.record(outcome);
                    report.included.push(record);
                }
                Err(failure) => {
                    report.counts.record(Outcome::Failed);
                    report.failures.push(failure);
                }
            }
        }

        for joined in futures::future::join_all(workers).await {
            if let Err(e) = joined {
                tracing::error!("worker task ended abnormally: {}", e);
            }
        }

        report.not_dispatched = total - report.counts.total();
        if report.not_dispatched > 0 {
            tracing::warn!(
                "Run cancelled | {} orders were not processed",
                report.not_dispatched
            );
        }

        let summary = report.summary(total);
        tracing::info!(
            "Reconciliation finished | Fetched: {} | Included: {} | Excluded: {} | Tagged: {} | Already tagged: {} | No gateway: {} | Failed: {}",
            summary.fetched,
            summary.included,
            summary.excluded,
            summary.counts.tagged,
            summary.counts.already_tagged,
            summary.counts.skipped_no_gateway,
            summary.counts.failed
        );
        report
    }
}

async fn worker_loop(
    worker: usize,
    reconciler: Arc<Reconciler>,
    queue: Arc<Mutex<mpsc::UnboundedReceiver<Record>>>,
    results: mpsc::UnboundedSender<Result<Reconciled, RecordFailure>>,
    cancel: CancelSignal,
) {
    loop {
        if cancel.is_cancelled() {
            tracing::debug!(worker, "worker stopping on cancellation");
            break;
        }
        let next = queue.lock().await.recv().await;
        let Some(record) = next else { break };

        let result = reconcile_guarded(&reconciler, record).await;
        if results.send(result).is_err() {
            break;
        }
    }
}

/// Reconcile one record; a panic becomes a failed outcome
async fn reconcile_guarded(
    reconciler: &Reconciler,
    record: Record,
) -> Result<Reconciled, RecordFailure> {
    let id = record.id.clone();
    let name = record.name.clone();

    match AssertUnwindSafe(reconciler.reconcile(record))
        .catch_unwind()
        .await
    {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::info!("Order: {} (ID: {}) | Status: ERROR - {}", name, id, message);
            tracing::error!("Error processing order {}: {}", name, message);
            Err(RecordFailure {
                id,
                name,
                error: ReconcileError::Panicked(message),
            })
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
