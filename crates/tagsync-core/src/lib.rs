//! tagsync core - order tagging engine
//!
//! Fetches every order of a store through its paginated GraphQL API, derives
//! a payment-gateway tag from each order's first transaction, and adds that
//! tag where it is missing:
//! - Transport with bounded retries and rate-limit backoff
//! - Cursor pagination
//! - Gateway classification
//! - Read-check-mutate-verify reconciliation per order
//! - Bounded worker pool over all orders
//!
//! # Example
//!
//! ```rust,ignore
//! use tagsync_core::{Tagger, TaggerConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = TaggerConfig::load(None)?;
//! let tagger = Tagger::connect(&config)?;
//!
//! let summary = tagger.run(Some(100)).await?;
//! println!("Processed {} of {} orders", summary.included, summary.fetched);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

// Core modules
pub mod cancel;
pub mod classifier;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod output;
pub mod paginator;
pub mod reconciler;
pub mod tagger;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use cancel::CancelSignal;
pub use classifier::classify;
pub use config::{RetryPolicy, TaggerConfig};
pub use error::{
    ConfigError, EndpointError, OutputError, PaginationError, ReconcileError, RecordFailure,
    RunError, TransportError, UserError,
};
pub use orchestrator::{Orchestrator, OutcomeCounts, RunReport, RunSummary};
pub use output::OutputWriter;
pub use paginator::{Fetched, Paginator};
pub use reconciler::{Reconciled, Reconciler};
pub use tagger::Tagger;
pub use transport::{Endpoint, GraphQlRequest, HttpEndpoint, RawResponse, ShopApi, Transport};
pub use types::{Outcome, Page, PageCursor, Record, RecordId, RunId, TagSet, Transaction};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with tagsync
    pub use crate::{
        classify, CancelSignal, Orchestrator, Outcome, Paginator, Reconciler, Record, ShopApi,
        Tagger, TaggerConfig, Transport,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
