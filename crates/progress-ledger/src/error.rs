//! Error types for progress-ledger

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading or persisting the ledger
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Reading, writing or renaming the ledger file failed
    #[error("ledger I/O failed at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The ledger file exists but is not a valid record
    #[error("ledger file {} is corrupt: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Record could not be serialized
    #[error("failed to serialize ledger: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Injected by `MemoryLedger` to simulate a full disk
    #[error("simulated write failure after {writes} writes")]
    Simulated { writes: usize },
}

impl LedgerError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LedgerError::Io {
            path: path.into(),
            source,
        }
    }
}
