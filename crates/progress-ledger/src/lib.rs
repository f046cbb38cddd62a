//! Progress-Ledger: durable progress tracking for catfix
//!
//! Records which catalog items a run has finished, failed or skipped and
//! where listing should resume, so an interrupted job can be restarted
//! without repeating finished work.
//!
//! ## Key Components
//!
//! - [`ProgressLedger`]: the trait the batch driver writes through
//! - [`FileLedger`]: JSON file with atomic, fsynced rewrites
//! - [`fakes::MemoryLedger`]: in-memory ledger for tests

mod error;
pub mod fakes;
mod file;
mod ledger;
pub mod record;

pub use error::LedgerError;
pub use file::FileLedger;
pub use ledger::{MarkOutcome, ProgressLedger};
pub use record::{
    AspectStatus, ItemProgress, ItemStatus, ProgressRecord, RunStats, StatusCounts,
};

/// Result type for ledger operations
pub type LedgerResult<T> = std::result::Result<T, LedgerError>;
