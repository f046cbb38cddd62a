//! Log output for `catfix`.
//!
//! The default is `INFO`: run start and summary, pages, planned and applied
//! corrections, retries. `--verbose` maps to `DEBUG` and adds each HTTP
//! call and ledger bookkeeping. `--json` switches to one JSON object per
//! event, for piping a run into `jq` or a log store next to the ledger.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber. A second call is a no-op.
///
/// A `RUST_LOG` directive such as `catfix_core=debug,catalog_client=warn`
/// overrides `level`.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(fmt::layer().with_target(false).json())
            .try_init()
            .ok();
    } else {
        registry
            .with(fmt::layer().with_target(false))
            .try_init()
            .ok();
    }
}
