//! Catfix Core Library
//!
//! The resumable batch job that corrects one vendor's catalog: the first
//! two product images are exchanged and the price is reset to 1.75 × unit
//! cost. Progress lives in a [`progress_ledger::ProgressLedger`], so a run
//! can be interrupted and restarted without repeating finished items.

pub mod config;
pub mod driver;
pub mod error;
pub mod obs;
pub mod plan;
pub mod retry;
pub mod telemetry;

pub use config::{AppConfig, ConfigError, DEFAULT_LEDGER_PATH};
pub use driver::{Driver, ItemOutcome, RunConfig, RunMode, RunSummary};
pub use error::{DriverError, Result};
pub use plan::{ImageSwap, MutationPlan, PlanError, PriceChange};
pub use retry::{retry_transient, RetryError, RetryPolicy};
pub use telemetry::init_tracing;
