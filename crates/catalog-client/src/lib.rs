//! Catalog-Client: remote product catalog access for catfix
//!
//! This crate talks to the hosted catalog. It lists products of a single
//! vendor page by page and sends the two corrections catfix performs
//! (image re-ordering and price updates), translating transport failures
//! into [`ClientError`] variants the batch driver can act on.
//!
//! ## Key Components
//!
//! - [`CatalogClient`]: the async seam the driver is written against
//! - [`ShopifyClient`]: Admin API implementation (GraphQL listing, REST updates)
//! - [`fakes::FakeCatalog`]: scripted in-memory catalog for tests

mod error;
pub mod fakes;
pub mod shopify;
pub mod types;

use async_trait::async_trait;

pub use error::ClientError;
pub use shopify::{ShopifyClient, ShopifyConfig};
pub use types::{
    CatalogItem, ClientStats, Cursor, ImageRef, Money, MoneyParseError, Mutation, Page,
    VariantRef,
};

/// Result type for catalog operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Remote catalog operations needed by the batch driver.
///
/// Guarantees expected from implementations:
/// - `list_page(None)` starts at the beginning of the catalog.
/// - Items are already filtered to the configured vendor.
/// - `Page::next == None` means the catalog is exhausted.
/// - Per-item rejections come back as [`ClientError::Item`], never as
///   [`ClientError::Auth`] or [`ClientError::Transient`].
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Fetch the page that starts at `cursor`.
    async fn list_page(&self, cursor: Option<&Cursor>) -> Result<Page>;

    /// Apply one mutation to the item with `item_id`.
    async fn apply_mutation(&self, item_id: &str, mutation: &Mutation) -> Result<()>;

    /// Request counters accumulated so far.
    fn stats(&self) -> ClientStats {
        ClientStats::default()
    }
}
