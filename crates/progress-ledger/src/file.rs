//! File-backed ledger.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::LedgerError;
use crate::ledger::{apply_mark, MarkOutcome, ProgressLedger};
use crate::record::{ItemProgress, ProgressRecord, RunStats};
use crate::LedgerResult;

/// Ledger stored as a single JSON document.
///
/// Every write goes to a temporary file in the same directory, is fsynced,
/// and is then renamed over the ledger file, so a crash leaves either the
/// previous or the new record on disk, never a torn one.
#[derive(Debug)]
pub struct FileLedger {
    path: PathBuf,
    record: ProgressRecord,
}

impl FileLedger {
    /// Open the ledger at `path`, starting empty if the file does not exist.
    ///
    /// Nothing is written until the first mutating call.
    pub fn open(path: impl AsRef<Path>) -> LedgerResult<Self> {
        let path = path.as_ref().to_path_buf();
        let record = Self::load(&path)?;
        if record.items.is_empty() && record.cursor.is_none() {
            debug!(path = %path.display(), "starting with an empty ledger");
        } else {
            let counts = record.counts();
            info!(
                path = %path.display(),
                done = counts.done,
                failed = counts.failed,
                skipped = counts.skipped,
                resume_cursor = record.cursor.is_some(),
                "resuming from ledger"
            );
        }
        Ok(Self { path, record })
    }

    /// Read the record at `path`; a missing file yields an empty record.
    pub fn load(path: &Path) -> LedgerResult<ProgressRecord> {
        match fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| LedgerError::Corrupt {
                path: path.to_path_buf(),
                source,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ProgressRecord::default()),
            Err(e) => Err(LedgerError::io(path, e)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `next` and adopt it only once it is on disk, so a failed
    /// write leaves the in-memory view matching the file.
    fn commit(&mut self, mut next: ProgressRecord) -> LedgerResult<()> {
        next.updated_at = Some(Utc::now());
        let bytes = serde_json::to_vec_pretty(&next)?;
        write_atomic(&self.path, &bytes)?;
        self.record = next;
        Ok(())
    }
}

impl ProgressLedger for FileLedger {
    fn record(&self) -> &ProgressRecord {
        &self.record
    }

    fn mark(&mut self, item_id: &str, progress: ItemProgress) -> LedgerResult<MarkOutcome> {
        let mut next = self.record.clone();
        let outcome = apply_mark(&mut next, item_id, progress);
        if outcome == MarkOutcome::Recorded {
            self.commit(next)?;
        }
        Ok(outcome)
    }

    fn advance_cursor(&mut self, cursor: Option<&str>) -> LedgerResult<()> {
        let mut next = self.record.clone();
        next.cursor = cursor.map(str::to_string);
        self.commit(next)
    }

    fn record_stats(&mut self, stats: &RunStats) -> LedgerResult<()> {
        let mut next = self.record.clone();
        next.stats.absorb(stats);
        self.commit(next)
    }

    fn reset(&mut self) -> LedgerResult<()> {
        info!(path = %self.path.display(), "resetting ledger");
        self.commit(ProgressRecord::default())
    }
}

/// Write `bytes` to `path` via temp file + fsync + rename.
fn write_atomic(path: &Path, bytes: &[u8]) -> LedgerResult<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(|e| LedgerError::io(&dir, e))?;

    let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| LedgerError::io(&dir, e))?;
    tmp.write_all(bytes).map_err(|e| LedgerError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| LedgerError::io(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| LedgerError::io(path, e.error))?;

    sync_dir(&dir)
}

/// The rename itself is only durable once the directory entry is flushed.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> LedgerResult<()> {
    fs::File::open(dir)
        .and_then(|handle| handle.sync_all())
        .map_err(|e| LedgerError::io(dir, e))
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> LedgerResult<()> {
    Ok(())
}
