//! The `ProgressLedger` trait.

use crate::record::{ItemProgress, ItemStatus, ProgressRecord, RunStats, StatusCounts};
use crate::LedgerResult;

/// What `mark` did with an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    /// Entry written and persisted
    Recorded,
    /// Item was already `done`; nothing changed
    AlreadyDone,
}

/// Durable record of which items have been processed.
///
/// Guarantees:
/// - Every mutating call has persisted the full record when it returns `Ok`.
/// - Once an item is `done` it stays `done` until `reset`.
/// - `is_processed` is true only for `done` items; failed and skipped items
///   are picked up again by the next run.
pub trait ProgressLedger: Send {
    /// Current in-memory view of the record.
    fn record(&self) -> &ProgressRecord;

    /// Record the outcome of an item attempt.
    fn mark(&mut self, item_id: &str, progress: ItemProgress) -> LedgerResult<MarkOutcome>;

    /// Record where the next listing should resume. `None` restarts from
    /// the beginning of the catalog.
    fn advance_cursor(&mut self, cursor: Option<&str>) -> LedgerResult<()>;

    /// Fold one run's counters into the cumulative stats.
    fn record_stats(&mut self, stats: &RunStats) -> LedgerResult<()>;

    /// Forget every entry and the cursor.
    fn reset(&mut self) -> LedgerResult<()>;

    fn cursor(&self) -> Option<&str> {
        self.record().cursor.as_deref()
    }

    fn is_processed(&self, item_id: &str) -> bool {
        self.record().is_done(item_id)
    }

    fn status_of(&self, item_id: &str) -> Option<ItemStatus> {
        self.record().status_of(item_id)
    }

    fn counts(&self) -> StatusCounts {
        self.record().counts()
    }
}

/// Apply `mark` semantics to a record in place. Returns `AlreadyDone`
/// without touching the record when the item is finished.
pub(crate) fn apply_mark(
    record: &mut ProgressRecord,
    item_id: &str,
    progress: ItemProgress,
) -> MarkOutcome {
    if record.is_done(item_id) {
        return MarkOutcome::AlreadyDone;
    }
    record.items.insert(item_id.to_string(), progress);
    MarkOutcome::Recorded
}
