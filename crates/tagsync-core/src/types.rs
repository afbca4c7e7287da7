//! Core types for tagsync
//!
//! Defines the records pulled from the store:
//! - Record identifiers and records
//! - Tag sets (ordered, duplicate-free)
//! - Embedded transactions
//! - Pagination cursors and pages
//! - Per-record outcomes

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Opaque remote identifier (a GraphQL global ID such as `gid://shopify/Order/1`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl RecordId {
    /// Create record ID
    #[inline]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow as str
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier of one tagging run (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunId(pub Ulid);

impl RunId {
    /// Generate new run ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ordered set of tags
///
/// Keeps insertion order and never holds the same tag twice. Decoding a list
/// with duplicates keeps the first occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct TagSet(Vec<String>);

impl TagSet {
    /// Create empty tag set
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check membership
    #[inline]
    #[must_use]
    pub fn contains(&self, tag: &str) -> bool {
        self.0.iter().any(|t| t == tag)
    }

    /// Append a tag unless already present; returns whether it was added
    pub fn insert(&mut self, tag: impl Into<String>) -> bool {
        let tag = tag.into();
        if self.contains(&tag) {
            return false;
        }
        self.0.push(tag);
        true
    }

    /// `self ∪ {tag}`, keeping existing order and putting `tag` last
    #[must_use]
    pub fn with_appended(&self, tag: &str) -> Self {
        let mut next = self.clone();
        next.insert(tag);
        next
    }

    /// Number of tags
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate in order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Borrow as slice
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl From<Vec<String>> for TagSet {
    fn from(tags: Vec<String>) -> Self {
        let mut set = Self(Vec::with_capacity(tags.len()));
        for tag in tags {
            set.insert(tag);
        }
        set
    }
}

impl From<TagSet> for Vec<String> {
    fn from(set: TagSet) -> Self {
        set.0
    }
}

impl<S: Into<String>> FromIterator<S> for TagSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::new();
        for tag in iter {
            set.insert(tag);
        }
        set
    }
}

impl std::fmt::Display for TagSet {
    /// Renders as `a, b, c`, or `none` when empty
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            f.write_str("none")
        } else {
            f.write_str(&self.0.join(", "))
        }
    }
}

/// Payment attempt embedded in a record at fetch time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Gateway identifier (may be absent or empty)
    #[serde(default)]
    pub gateway: Option<String>,
    /// Transaction status as reported by the store
    #[serde(default)]
    pub status: Option<String>,
}

impl Transaction {
    /// Create transaction with gateway
    #[inline]
    pub fn with_gateway(gateway: impl Into<String>) -> Self {
        Self {
            gateway: Some(gateway.into()),
            status: None,
        }
    }

    /// With status
    #[inline]
    #[must_use]
    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }
}

/// A remote record (an order) being classified and tagged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Remote identifier
    pub id: RecordId,
    /// Display name (e.g. `#1001`)
    #[serde(default = "unknown_name")]
    pub name: String,
    /// Tags as last seen on the server
    #[serde(default, deserialize_with = "nullable_tags")]
    pub tags: TagSet,
    /// Embedded transactions, oldest first
    #[serde(default, deserialize_with = "nullable_transactions")]
    pub transactions: Vec<Transaction>,
}

impl Record {
    /// Create record without tags or transactions
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: RecordId::new(id),
            name: name.into(),
            tags: TagSet::new(),
            transactions: Vec::new(),
        }
    }

    /// With tags
    #[must_use]
    pub fn with_tags<S: Into<String>>(mut self, tags: impl IntoIterator<Item = S>) -> Self {
        self.tags = tags.into_iter().collect();
        self
    }

    /// With transactions
    #[must_use]
    pub fn with_transactions(mut self, transactions: Vec<Transaction>) -> Self {
        self.transactions = transactions;
        self
    }
}

fn unknown_name() -> String {
    "Unknown".to_string()
}

fn nullable_tags<'de, D>(deserializer: D) -> Result<TagSet, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<TagSet>::deserialize(deserializer)?.unwrap_or_default())
}

fn nullable_transactions<'de, D>(deserializer: D) -> Result<Vec<Transaction>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<Transaction>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Opaque pagination token issued by the store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageCursor(pub String);

impl std::fmt::Display for PageCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One page of a cursor-based connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    /// Items in server order
    pub items: Vec<T>,
    /// Whether another page follows
    pub has_next_page: bool,
    /// Cursor to continue from (meaningful when `has_next_page`)
    pub end_cursor: Option<PageCursor>,
}

/// Terminal per-record result of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    /// Classification tag was added
    Tagged,
    /// Classification tag was already present
    AlreadyTagged,
    /// Record has no gateway, nothing to add
    SkippedNoGateway,
    /// Record could not be reconciled
    Failed,
}

impl Outcome {
    /// Whether the record belongs in the final result set
    #[inline]
    #[must_use]
    pub fn is_included(self) -> bool {
        !matches!(self, Self::Failed)
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Tagged => "tagged",
            Self::AlreadyTagged => "already-tagged",
            Self::SkippedNoGateway => "skipped-no-gateway",
            Self::Failed => "failed",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn tag_set_deduplicates_on_decode() {
        let tags: TagSet = serde_json::from_str(r#"["vip", "paypal", "vip"]"#).unwrap();
        assert_eq!(tags.as_slice(), ["vip", "paypal"]);
    }

    #[test]
    fn tag_set_append_keeps_order() {
        let tags: TagSet = ["wholesale", "vip"].into_iter().collect();
        let next = tags.with_appended("stripe");
        assert_eq!(next.as_slice(), ["wholesale", "vip", "stripe"]);
        assert_eq!(next.with_appended("vip"), next);
    }

    #[test]
    fn tag_set_display() {
        assert_eq!(TagSet::new().to_string(), "none");
        let tags: TagSet = ["a", "b"].into_iter().collect();
        assert_eq!(tags.to_string(), "a, b");
    }

    #[test]
    fn record_decodes_nulls() {
        let record: Record = serde_json::from_str(
            r##"{"id":"gid://shopify/Order/1","name":"#1001","tags":null,"transactions":null}"##,
        )
        .unwrap();
        assert!(record.tags.is_empty());
        assert!(record.transactions.is_empty());
    }

    #[test]
    fn record_roundtrips_in_fetch_shape() {
        let record = Record::new("gid://shopify/Order/7", "#1007")
            .with_tags(["vip"])
            .with_transactions(vec![Transaction::with_gateway("paypal").status("SUCCESS")]);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["id"], "gid://shopify/Order/7");
        assert_eq!(json["tags"], serde_json::json!(["vip"]));
        assert_eq!(json["transactions"][0]["gateway"], "paypal");
        let back: Record = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn outcome_inclusion() {
        assert!(Outcome::Tagged.is_included());
        assert!(Outcome::SkippedNoGateway.is_included());
        assert!(!Outcome::Failed.is_included());
        assert_eq!(Outcome::AlreadyTagged.to_string(), "already-tagged");
    }

    proptest! {
        #[test]
        fn prop_tag_set_never_holds_duplicates(tags in proptest::collection::vec("[a-c]{1,2}", 0..20)) {
            let set = TagSet::from(tags.clone());
            let mut seen = std::collections::HashSet::new();
            for tag in set.iter() {
                prop_assert!(seen.insert(tag.to_string()));
            }
            for tag in &tags {
                prop_assert!(set.contains(tag));
            }
        }

        #[test]
        fn prop_append_grows_by_at_most_one(tags in proptest::collection::vec("[a-d]", 0..8), tag in "[a-f]") {
            let set = TagSet::from(tags);
            let next = set.with_appended(&tag);
            prop_assert!(next.contains(&tag));
            prop_assert_eq!(next.len(), set.len() + usize::from(!set.contains(&tag)));
            prop_assert_eq!(&next.as_slice()[..set.len()], set.as_slice());
        }
    }
}
