//! Gateway classification

use crate::types::Record;

/// Classification tag for a record
///
/// The gateway of the first transaction, or an empty string when there are
/// no transactions or the first one carries no gateway.
#[must_use]
pub fn classify(record: &Record) -> String {
    let Some(first) = record.transactions.first() else {
        return String::new();
    };

    match first.gateway.as_deref() {
        Some(gateway) => gateway.to_string(),
        None => {
            tracing::debug!(
                order = %record.name,
                id = %record.id,
                "first transaction has no gateway"
            );
            String::new()
        }
    }
}
