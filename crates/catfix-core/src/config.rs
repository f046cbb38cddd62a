//! Environment-driven configuration.
//!
//! | Variable              | Default              |
//! |-----------------------|----------------------|
//! | `SHOPIFY_DOMAIN`      | required             |
//! | `SHOPIFY_TOKEN`       | required             |
//! | `SHOPIFY_API_VERSION` | `2024-07`            |
//! | `CATFIX_VENDOR`       | `Venture Design`     |
//! | `CATFIX_LEDGER`       | `logs/progress.json` |
//! | `CATFIX_THROTTLE_MS`  | `1500`               |
//! | `CATFIX_PAGE_SIZE`    | `25` (1..=250)       |
//! | `CATFIX_MAX_RETRIES`  | `3`                  |
//! | `CATFIX_TIMEOUT_SECS` | `30`                 |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use catalog_client::ShopifyConfig;
use thiserror::Error;

use crate::retry::RetryPolicy;

pub const DEFAULT_VENDOR: &str = "Venture Design";
pub const DEFAULT_API_VERSION: &str = "2024-07";
pub const DEFAULT_LEDGER_PATH: &str = "logs/progress.json";
pub const DEFAULT_THROTTLE_MS: u64 = 1500;
pub const DEFAULT_PAGE_SIZE: u32 = 25;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Configuration errors, all fatal at startup
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("{key}={value:?} is invalid: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Everything the job needs besides the command line
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub domain: String,
    pub token: String,
    pub api_version: String,
    pub vendor: String,
    pub ledger_path: PathBuf,
    pub throttle: Duration,
    pub page_size: u32,
    pub max_retries: u32,
    pub timeout: Duration,
}

impl AppConfig {
    /// Load from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup, so tests need not touch the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // empty values count as unset
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let domain = get("SHOPIFY_DOMAIN").ok_or(ConfigError::Missing("SHOPIFY_DOMAIN"))?;
        let token = get("SHOPIFY_TOKEN").ok_or(ConfigError::Missing("SHOPIFY_TOKEN"))?;

        let api_version =
            get("SHOPIFY_API_VERSION").unwrap_or_else(|| DEFAULT_API_VERSION.to_string());
        let vendor = get("CATFIX_VENDOR").unwrap_or_else(|| DEFAULT_VENDOR.to_string());
        let ledger_path = PathBuf::from(
            get("CATFIX_LEDGER").unwrap_or_else(|| DEFAULT_LEDGER_PATH.to_string()),
        );

        let throttle_ms: u64 = parse_or(
            "CATFIX_THROTTLE_MS",
            get("CATFIX_THROTTLE_MS"),
            DEFAULT_THROTTLE_MS,
        )?;
        let page_size: u32 = parse_or(
            "CATFIX_PAGE_SIZE",
            get("CATFIX_PAGE_SIZE"),
            DEFAULT_PAGE_SIZE,
        )?;
        if !(1..=250).contains(&page_size) {
            return Err(ConfigError::Invalid {
                key: "CATFIX_PAGE_SIZE",
                value: page_size.to_string(),
                reason: "must be between 1 and 250".to_string(),
            });
        }
        let max_retries: u32 = parse_or(
            "CATFIX_MAX_RETRIES",
            get("CATFIX_MAX_RETRIES"),
            DEFAULT_MAX_RETRIES,
        )?;
        if max_retries == 0 {
            return Err(ConfigError::Invalid {
                key: "CATFIX_MAX_RETRIES",
                value: "0".to_string(),
                reason: "at least one attempt is required".to_string(),
            });
        }
        let timeout_secs: u64 = parse_or(
            "CATFIX_TIMEOUT_SECS",
            get("CATFIX_TIMEOUT_SECS"),
            DEFAULT_TIMEOUT_SECS,
        )?;

        Ok(Self {
            domain: domain.trim().to_string(),
            token,
            api_version,
            vendor,
            ledger_path,
            throttle: Duration::from_millis(throttle_ms),
            page_size,
            max_retries,
            timeout: Duration::from_secs(timeout_secs),
        })
    }

    /// Connection settings for [`catalog_client::ShopifyClient`]
    pub fn shopify_config(&self) -> ShopifyConfig {
        ShopifyConfig::new(&self.domain, &self.token)
            .with_api_version(&self.api_version)
            .with_vendor(&self.vendor)
            .with_page_size(self.page_size)
            .with_timeout(self.timeout)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default().with_max_attempts(self.max_retries)
    }
}

fn parse_or<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
            value,
        }),
    }
}
