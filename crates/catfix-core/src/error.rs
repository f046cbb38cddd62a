//! Fatal run errors

use catalog_client::ClientError;
use progress_ledger::LedgerError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that stop a run. Per-item rejections never surface here; they
/// are recorded in the ledger and the run continues.
#[derive(Error, Debug)]
pub enum DriverError {
    /// Credentials rejected; nothing further can succeed
    #[error("catalog rejected credentials: {0}")]
    Auth(ClientError),

    #[error("{operation} still failing after {attempts} attempts: {source}")]
    TransientExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: ClientError,
    },

    /// Unexpected response shape or client setup failure
    #[error("catalog client error: {0}")]
    Client(ClientError),

    /// Progress can no longer be recorded
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, DriverError>;
