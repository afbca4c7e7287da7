//! End-to-end tagging run
//!
//! Fetch every record first, then reconcile them on the worker pool, then
//! persist the included records. Fetch and reconcile never overlap.

use crate::cancel::CancelSignal;
use crate::config::TaggerConfig;
use crate::error::{EndpointError, RunError};
use crate::orchestrator::{Orchestrator, RunSummary};
use crate::output::OutputWriter;
use crate::paginator::Paginator;
use crate::reconciler::Reconciler;
use crate::transport::{Endpoint, HttpEndpoint, ShopApi, Transport};
use std::sync::Arc;

/// The order tagger
#[derive(Clone)]
pub struct Tagger {
    endpoint: Arc<dyn Endpoint>,
    config: TaggerConfig,
    output: OutputWriter,
    cancel: CancelSignal,
}

impl std::fmt::Debug for Tagger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tagger")
            .field("config", &self.config)
            .field("output", &self.output)
            .field("cancel", &self.cancel)
            .finish_non_exhaustive()
    }
}

impl Tagger {
    /// Create tagger talking to the configured store over HTTPS
    ///
    /// # Errors
    /// `EndpointError` if the HTTP client cannot be built
    pub fn connect(config: &TaggerConfig) -> Result<Self, EndpointError> {
        let endpoint = HttpEndpoint::new(config)?;
        Ok(Self::with_endpoint(config, Arc::new(endpoint)))
    }

    /// Create tagger over any endpoint
    #[must_use]
    pub fn with_endpoint(config: &TaggerConfig, endpoint: Arc<dyn Endpoint>) -> Self {
        Self {
            endpoint,
            config: config.clone(),
            output: OutputWriter::new(config.output_dir()),
            cancel: CancelSignal::new(),
        }
    }

    /// With a cancellation signal
    ///
    /// The signal stops pagination between pages, ends backoff waits and
    /// keeps workers from taking new records.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run once over all records, or the first `limit`
    ///
    /// A failure to write the result file is logged and leaves
    /// `RunSummary::output` empty; it does not fail the run.
    ///
    /// # Errors
    /// - `RunError::Cancelled` when cancelled before reconciliation starts
    /// - `RunError::NothingFetched` when pagination yields no records
    pub async fn run(&self, limit: Option<usize>) -> Result<RunSummary, RunError> {
        let api = ShopApi::new(
            Transport::new(Arc::clone(&self.endpoint), self.config.retry)
                .with_cancel(self.cancel.clone()),
        );

        let fetched = Paginator::new(api.clone(), self.config.page_size)
            .with_cancel(self.cancel.clone())
            .fetch_all(limit)
            .await;
        if self.cancel.is_cancelled() {
            tracing::warn!(
                "Run cancelled | {} fetched orders were not processed",
                fetched.records.len()
            );
            return Err(RunError::Cancelled {
                fetched: fetched.records.len(),
            });
        }
        if fetched.records.is_empty() {
            tracing::error!("No orders fetched. Exiting.");
            return Err(RunError::NothingFetched {
                cause: fetched.interrupted,
            });
        }
        if let Some(cause) = &fetched.interrupted {
            tracing::warn!(
                "Pagination stopped early ({}); processing {} fetched orders",
                cause,
                fetched.records.len()
            );
        }

        let total = fetched.records.len();
        let report = Orchestrator::new(Reconciler::new(api), self.config.concurrency)
            .with_cancel(self.cancel.clone())
            .run(fetched.records)
            .await;
        let mut summary = report.summary(total);

        if report.included.is_empty() {
            tracing::info!(
                "Summary | Total Orders: {} | Processed: 0 | Status: No orders successfully processed",
                total
            );
        } else {
            match self.output.write(&report.included) {
                Ok(path) => {
                    tracing::info!(
                        "Summary | Total Orders: {} | Processed: {} | Saved to: {}",
                        total,
                        summary.included,
                        path.display()
                    );
                    summary.output = Some(path);
                }
                Err(e) => {
                    tracing::error!("Error saving orders to JSON: {}", e);
                    tracing::info!(
                        "Summary | Total Orders: {} | Processed: {} | Status: Results not saved",
                        total,
                        summary.included
                    );
                }
            }
        }

        tracing::info!("Order Tagger Completed");
        Ok(summary)
    }
}
