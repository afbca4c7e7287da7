//! Per-record tag reconciliation
//!
//! For one record:
//! 1. classify it; an empty tag means nothing to do
//! 2. re-read the tags currently on the server
//! 3. stop if the tag is already there
//! 4. write `current ∪ {tag}`
//! 5. read the tags back and keep that as the record's final state
//!
//! The tag list is never written from the copy fetched during pagination,
//! only from the read that immediately precedes the mutation.

use crate::classifier::classify;
use crate::error::{ReconcileError, RecordFailure};
use crate::transport::{ShopApi, TagUpdate};
use crate::types::{Outcome, Record, TagSet};

/// A record that came through reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    /// Record with tags reflecting the last known server state
    pub record: Record,
    /// What happened
    pub outcome: Outcome,
}

/// Reads, decides and writes tags for single records
#[derive(Debug, Clone)]
pub struct Reconciler {
    api: ShopApi,
}

impl Reconciler {
    /// Create reconciler
    #[inline]
    #[must_use]
    pub fn new(api: ShopApi) -> Self {
        Self { api }
    }

    /// Reconcile one record
    ///
    /// # Errors
    /// `RecordFailure` when the tags could not be read, the mutation failed,
    /// or the store returned `userErrors`. The failure is already logged.
    pub async fn reconcile(&self, mut record: Record) -> Result<Reconciled, RecordFailure> {
        let tag = classify(&record);

        if tag.is_empty() {
            tracing::info!(
                "Order: {} (ID: {}) | Gateway: empty | Current Tags: [{}] | Status: No tag added (unknown gateway)",
                record.name,
                record.id,
                record.tags
            );
            return Ok(Reconciled {
                record,
                outcome: Outcome::SkippedNoGateway,
            });
        }

        let current = match self.api.current_tags(&record.id).await {
            Ok(tags) => tags,
            Err(e) => {
                tracing::error!("Failed to get current tags for order {}: {}", record.id, e);
                return Err(failure(&record, ReconcileError::ReadTags(e)));
            }
        };

        if current.contains(&tag) {
            tracing::info!(
                "Order: {} (ID: {}) | Gateway: {} | Current Tags: [{}] | Status: Tag already exists, no update needed",
                record.name,
                record.id,
                tag,
                current
            );
            record.tags = current;
            return Ok(Reconciled {
                record,
                outcome: Outcome::AlreadyTagged,
            });
        }

        let desired = current.with_appended(&tag);
        let echoed = match self.api.update_tags(&record.id, &desired).await {
            Ok(TagUpdate::Applied(echoed)) => echoed,
            Ok(TagUpdate::Rejected(errors)) => {
                let err = ReconcileError::UserErrors(errors);
                log_update_failure(&record, &tag, &current, &err);
                return Err(failure(&record, err));
            }
            Err(e) => {
                let err = ReconcileError::UpdateTags(e);
                log_update_failure(&record, &tag, &current, &err);
                return Err(failure(&record, err));
            }
        };

        record.tags = match self.api.current_tags(&record.id).await {
            Ok(final_tags) => final_tags,
            Err(e) => {
                let fallback = echoed.unwrap_or(desired);
                tracing::warn!(
                    "Order: {} (ID: {}) | Added Tag: {} | Final tags could not be verified ({}); assuming [{}]",
                    record.name,
                    record.id,
                    tag,
                    e,
                    fallback
                );
                fallback
            }
        };

        tracing::info!(
            "Order: {} (ID: {}) | Gateway: {} | Current Tags: [{}] | Added Tag: {} | Final Tags: [{}]",
            record.name,
            record.id,
            tag,
            current,
            tag,
            record.tags
        );
        Ok(Reconciled {
            record,
            outcome: Outcome::Tagged,
        })
    }
}

fn log_update_failure(record: &Record, tag: &str, current: &TagSet, err: &ReconcileError) {
    tracing::info!(
        "Order: {} (ID: {}) | Gateway: {} | Current Tags: [{}] | Added Tag: {} | Status: FAILED to update tags",
        record.name,
        record.id,
        tag,
        current,
        tag
    );
    tracing::error!("Failed to update tags for order {}: {}", record.name, err);
}

fn failure(record: &Record, error: ReconcileError) -> RecordFailure {
    RecordFailure {
        id: record.id.clone(),
        name: record.name.clone(),
        error,
    }
}
