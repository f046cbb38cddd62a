//! In-memory ledger (testing only)

use crate::error::LedgerError;
use crate::ledger::{apply_mark, MarkOutcome, ProgressLedger};
use crate::record::{ItemProgress, ProgressRecord, RunStats};
use crate::LedgerResult;

/// Ledger kept entirely in memory.
///
/// Counts persisted writes and can be told to fail after a number of them,
/// which lets tests simulate a disk that fills up mid-run.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    record: ProgressRecord,
    writes: usize,
    fail_after: Option<usize>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing record, as if it had been loaded from disk.
    pub fn with_record(record: ProgressRecord) -> Self {
        Self {
            record,
            ..Self::default()
        }
    }

    /// Fail every write after the first `writes` succeed.
    pub fn fail_after(mut self, writes: usize) -> Self {
        self.fail_after = Some(writes);
        self
    }

    /// Number of successful writes so far.
    pub fn writes(&self) -> usize {
        self.writes
    }

    fn persist(&mut self) -> LedgerResult<()> {
        if let Some(limit) = self.fail_after {
            if self.writes >= limit {
                return Err(LedgerError::Simulated {
                    writes: self.writes,
                });
            }
        }
        self.writes += 1;
        Ok(())
    }
}

impl ProgressLedger for MemoryLedger {
    fn record(&self) -> &ProgressRecord {
        &self.record
    }

    fn mark(&mut self, item_id: &str, progress: ItemProgress) -> LedgerResult<MarkOutcome> {
        if self.record.is_done(item_id) {
            return Ok(MarkOutcome::AlreadyDone);
        }
        self.persist()?;
        Ok(apply_mark(&mut self.record, item_id, progress))
    }

    fn advance_cursor(&mut self, cursor: Option<&str>) -> LedgerResult<()> {
        self.persist()?;
        self.record.cursor = cursor.map(str::to_string);
        Ok(())
    }

    fn record_stats(&mut self, stats: &RunStats) -> LedgerResult<()> {
        self.persist()?;
        self.record.stats.absorb(stats);
        Ok(())
    }

    fn reset(&mut self) -> LedgerResult<()> {
        self.persist()?;
        self.record = ProgressRecord::default();
        Ok(())
    }
}
