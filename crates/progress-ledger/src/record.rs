//! Persisted progress record.
//!
//! Layout on disk (pretty JSON):
//!
//! ```json
//! {
//!   "version": 1,
//!   "cursor": "eyJsYXN0X2lkIjo...",
//!   "items": {
//!     "8123": { "status": "done", "images": "applied", "price": "applied", ... }
//!   },
//!   "stats": { "runs": 3, "requests": 412, "retries": 2, "rate_limited": 1 },
//!   "updated_at": "2026-10-19T08:00:00Z"
//! }
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const RECORD_VERSION: u32 = 1;

/// Terminal outcome of one item attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Done,
    Failed,
    Skipped,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Done => "done",
            ItemStatus::Failed => "failed",
            ItemStatus::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one sub-mutation (image order or price)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AspectStatus {
    /// Sent and accepted
    Applied,
    /// Remote value already matched; nothing sent
    Unchanged,
    /// Dry-run: would have been sent
    Planned,
    Failed,
    /// The run stopped while this mutation was in flight; it may or may
    /// not have landed remotely
    Interrupted,
}

/// Ledger entry for a single item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemProgress {
    pub status: ItemStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<AspectStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<AspectStatus>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<String>,
    /// Leading image ids the product has once the swap has landed; kept
    /// while the swap is `interrupted` so the next run can tell
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swap_target: Option<Vec<String>>,
    pub updated_at: DateTime<Utc>,
}

impl ItemProgress {
    pub fn new(status: ItemStatus) -> Self {
        Self {
            status,
            images: None,
            price: None,
            reasons: Vec::new(),
            swap_target: None,
            updated_at: Utc::now(),
        }
    }

    pub fn done() -> Self {
        Self::new(ItemStatus::Done)
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self::new(ItemStatus::Failed).with_reason(reason)
    }

    pub fn skipped() -> Self {
        Self::new(ItemStatus::Skipped)
    }

    pub fn with_images(mut self, status: AspectStatus) -> Self {
        self.images = Some(status);
        self
    }

    pub fn with_price(mut self, status: AspectStatus) -> Self {
        self.price = Some(status);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reasons.push(reason.into());
        self
    }

    pub fn with_swap_target<I, S>(mut self, leading: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.swap_target = Some(leading.into_iter().map(Into::into).collect());
        self
    }
}

/// Request counters accumulated across runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub runs: u64,
    pub requests: u64,
    pub retries: u64,
    pub rate_limited: u64,
}

impl RunStats {
    pub fn absorb(&mut self, other: &RunStats) {
        self.runs += other.runs;
        self.requests += other.requests;
        self.retries += other.retries;
        self.rate_limited += other.rate_limited;
    }
}

/// Per-status item counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub done: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.done + self.failed + self.skipped
    }

    pub fn add(&mut self, status: ItemStatus) {
        match status {
            ItemStatus::Done => self.done += 1,
            ItemStatus::Failed => self.failed += 1,
            ItemStatus::Skipped => self.skipped += 1,
        }
    }
}

/// Full persisted state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    #[serde(default = "default_version")]
    pub version: u32,
    /// Where the next run resumes listing; `None` is the start of the catalog
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default)]
    pub items: BTreeMap<String, ItemProgress>,
    #[serde(default)]
    pub stats: RunStats,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_version() -> u32 {
    RECORD_VERSION
}

impl Default for ProgressRecord {
    fn default() -> Self {
        Self {
            version: RECORD_VERSION,
            cursor: None,
            items: BTreeMap::new(),
            stats: RunStats::default(),
            updated_at: None,
        }
    }
}

impl ProgressRecord {
    pub fn is_done(&self, item_id: &str) -> bool {
        self.items
            .get(item_id)
            .map(|p| p.status == ItemStatus::Done)
            .unwrap_or(false)
    }

    pub fn status_of(&self, item_id: &str) -> Option<ItemStatus> {
        self.items.get(item_id).map(|p| p.status)
    }

    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for progress in self.items.values() {
            counts.add(progress.status);
        }
        counts
    }

    /// Failed items with their recorded reasons, for reporting.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.items
            .iter()
            .filter(|(_, p)| p.status == ItemStatus::Failed)
            .map(|(id, p)| (id.as_str(), p.reasons.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_record_starts_at_beginning() {
        let record = ProgressRecord::default();
        assert_eq!(record.cursor, None);
        assert!(record.items.is_empty());
        assert_eq!(record.counts().total(), 0);
    }

    #[test]
    fn test_only_done_counts_as_processed() {
        let mut record = ProgressRecord::default();
        record.items.insert("1".into(), ItemProgress::done());
        record.items.insert("2".into(), ItemProgress::failed("insufficient_images"));
        record.items.insert("3".into(), ItemProgress::skipped());

        assert!(record.is_done("1"));
        assert!(!record.is_done("2"));
        assert!(!record.is_done("3"));
        assert!(!record.is_done("4"));

        let counts = record.counts();
        assert_eq!((counts.done, counts.failed, counts.skipped), (1, 1, 1));
        assert_eq!(counts.total(), 3);
    }

    #[test]
    fn test_failures_lists_reasons() {
        let mut record = ProgressRecord::default();
        record.items.insert(
            "7".into(),
            ItemProgress::failed("images: insufficient_images").with_images(AspectStatus::Failed),
        );
        let failures: Vec<_> = record.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "7");
        assert_eq!(failures[0].1, ["images: insufficient_images".to_string()]);
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let progress = ItemProgress::done()
            .with_images(AspectStatus::Applied)
            .with_price(AspectStatus::Unchanged);
        let json = serde_json::to_value(&progress).unwrap();
        assert_eq!(json["status"], "done");
        assert_eq!(json["images"], "applied");
        assert_eq!(json["price"], "unchanged");
        assert!(json.get("reasons").is_none());
        assert!(json.get("swap_target").is_none());
    }

    #[test]
    fn test_interrupted_swap_keeps_target() {
        let progress = ItemProgress::failed("images: run aborted")
            .with_images(AspectStatus::Interrupted)
            .with_swap_target(["b", "a"]);
        let json = serde_json::to_value(&progress).unwrap();
        assert_eq!(json["images"], "interrupted");
        assert_eq!(json["swap_target"], serde_json::json!(["b", "a"]));

        let back: ItemProgress = serde_json::from_value(json).unwrap();
        assert_eq!(back, progress);
    }

    #[test]
    fn test_loads_minimal_document() {
        let record: ProgressRecord = serde_json::from_str(r#"{"cursor":"abc"}"#).unwrap();
        assert_eq!(record.version, RECORD_VERSION);
        assert_eq!(record.cursor.as_deref(), Some("abc"));
        assert!(record.items.is_empty());
    }

    #[test]
    fn test_stats_absorb() {
        let mut total = RunStats {
            runs: 1,
            requests: 10,
            retries: 1,
            rate_limited: 0,
        };
        total.absorb(&RunStats {
            runs: 1,
            requests: 5,
            retries: 0,
            rate_limited: 2,
        });
        assert_eq!(total.runs, 2);
        assert_eq!(total.requests, 15);
        assert_eq!(total.rate_limited, 2);
    }
}
