//! Shopify Admin API client
//!
//! Products are listed through the GraphQL endpoint (cursor pagination,
//! server-side vendor search) and corrected through the REST image and
//! variant endpoints.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

use crate::error::ClientError;
use crate::types::{
    CatalogItem, ClientStats, Cursor, ImageRef, Money, Mutation, Page, VariantRef,
};
use crate::{CatalogClient, Result};

const TOKEN_HEADER: &str = "X-Shopify-Access-Token";

const PRODUCTS_QUERY: &str = r#"
query CatalogPage($first: Int!, $cursor: String, $query: String!) {
  products(first: $first, after: $cursor, query: $query) {
    pageInfo { hasNextPage endCursor }
    edges {
      node {
        legacyResourceId
        title
        vendor
        images(first: 10) { edges { node { id url } } }
        variants(first: 1) {
          edges {
            node {
              legacyResourceId
              price
              inventoryItem { unitCost { amount } }
            }
          }
        }
      }
    }
  }
}
"#;

/// Shopify connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShopifyConfig {
    /// Shop domain, e.g. `example.myshopify.com`
    pub domain: String,
    /// Admin API access token
    #[serde(skip_serializing)]
    pub token: String,
    /// Admin API version (default: "2024-07")
    pub api_version: String,
    /// Vendor whose products are listed
    pub vendor: String,
    /// Products per page (1..=250)
    pub page_size: u32,
    /// Per-request timeout
    pub timeout: Duration,
    /// Overrides `https://{domain}`; used to point the client at a local server
    pub base_url: Option<String>,
}

impl ShopifyConfig {
    /// Create a config with the default API version, vendor and page size
    pub fn new(domain: impl Into<String>, token: impl Into<String>) -> Self {
        ShopifyConfig {
            domain: domain.into(),
            token: token.into(),
            api_version: "2024-07".to_string(),
            vendor: "Venture Design".to_string(),
            page_size: 25,
            timeout: Duration::from_secs(30),
            base_url: None,
        }
    }

    pub fn with_vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendor = vendor.into();
        self
    }

    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, 250);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Root of the versioned Admin API, without a trailing slash
    pub fn api_root(&self) -> String {
        let base = match &self.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://{}", self.domain),
        };
        format!("{}/admin/api/{}", base, self.api_version)
    }

    fn vendor_query(&self) -> String {
        format!("vendor:\"{}\"", self.vendor.replace('"', "\\\""))
    }
}

/// Admin API client
pub struct ShopifyClient {
    config: ShopifyConfig,
    http: reqwest::Client,
    requests: AtomicU64,
    rate_limited: AtomicU64,
}

impl ShopifyClient {
    /// Create a new client
    pub fn new(config: ShopifyConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("catfix/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClientError::Setup(e.to_string()))?;

        Ok(ShopifyClient {
            config,
            http,
            requests: AtomicU64::new(0),
            rate_limited: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &ShopifyConfig {
        &self.config
    }

    fn graphql_url(&self) -> String {
        format!("{}/graphql.json", self.config.api_root())
    }

    /// Send a request and classify any non-2xx status.
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let response = request
            .header(TOKEN_HEADER, &self.config.token)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            self.rate_limited.fetch_add(1, Ordering::Relaxed);
        }

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, retry_after, &body))
    }

    async fn put_json(&self, url: String, body: Value) -> Result<()> {
        debug!(%url, "PUT");
        self.send(self.http.put(&url).json(&body)).await?;
        Ok(())
    }

    async fn swap_images(&self, product_id: &str, first: &str, second: &str) -> Result<()> {
        let root = self.config.api_root();
        // Moving the first image to position 2 already shifts the second one
        // up; the second call pins it explicitly.
        self.put_json(
            format!("{root}/products/{product_id}/images/{first}.json"),
            json!({ "image": { "id": id_value(first), "position": 2 } }),
        )
        .await?;
        self.put_json(
            format!("{root}/products/{product_id}/images/{second}.json"),
            json!({ "image": { "id": id_value(second), "position": 1 } }),
        )
        .await
    }

    async fn set_price(&self, variant_id: &str, price: Money) -> Result<()> {
        let root = self.config.api_root();
        self.put_json(
            format!("{root}/variants/{variant_id}.json"),
            json!({ "variant": { "id": id_value(variant_id), "price": price.to_string() } }),
        )
        .await
    }
}

#[async_trait]
impl CatalogClient for ShopifyClient {
    #[instrument(skip(self), fields(vendor = %self.config.vendor))]
    async fn list_page(&self, cursor: Option<&Cursor>) -> Result<Page> {
        let body = json!({
            "query": PRODUCTS_QUERY,
            "variables": {
                "first": self.config.page_size,
                "cursor": cursor.map(Cursor::as_str),
                "query": self.config.vendor_query(),
            }
        });

        let response = self.send(self.http.post(self.graphql_url()).json(&body)).await?;
        let envelope: GraphQlResponse<ProductsData> = response
            .json()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))?;

        if let Some(err) = classify_graphql_errors(&envelope.errors) {
            return Err(err);
        }
        let connection = envelope
            .data
            .ok_or_else(|| ClientError::Decode("response has no data".to_string()))?
            .products;

        let items = connection
            .edges
            .into_iter()
            .map(|edge| edge.node.into_item())
            .filter(|item| item.vendor.to_lowercase() == self.config.vendor.to_lowercase())
            .collect();

        let next = match (connection.page_info.has_next_page, connection.page_info.end_cursor) {
            (false, _) => None,
            (true, Some(end)) => Some(Cursor(end)),
            (true, None) => {
                return Err(ClientError::Decode(
                    "hasNextPage without endCursor".to_string(),
                ))
            }
        };

        Ok(Page { items, next })
    }

    #[instrument(skip(self, mutation), fields(aspect = mutation.aspect()))]
    async fn apply_mutation(&self, item_id: &str, mutation: &Mutation) -> Result<()> {
        match mutation {
            Mutation::SwapImages { first, second } => {
                self.swap_images(item_id, first, second).await
            }
            Mutation::SetPrice { variant_id, price } => self.set_price(variant_id, *price).await,
        }
    }

    fn stats(&self) -> ClientStats {
        ClientStats {
            requests: self.requests.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
        }
    }
}

/// Map a non-success HTTP status onto the error taxonomy.
pub(crate) fn classify_status(
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &str,
) -> ClientError {
    let code = status.as_u16();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ClientError::Auth { status: code },
        StatusCode::TOO_MANY_REQUESTS => ClientError::Transient {
            message: "rate limited (HTTP 429)".to_string(),
            retry_after,
        },
        StatusCode::REQUEST_TIMEOUT => ClientError::transient("request timeout (HTTP 408)"),
        s if s.is_server_error() => ClientError::Transient {
            message: format!("HTTP {code}"),
            retry_after,
        },
        s if s.is_client_error() => ClientError::item(format!("HTTP {code}: {}", snippet(body))),
        _ => ClientError::Decode(format!("unexpected HTTP status {code}")),
    }
}

fn classify_graphql_errors(errors: &[GraphQlError]) -> Option<ClientError> {
    if errors.is_empty() {
        return None;
    }
    let code = |e: &GraphQlError| {
        e.extensions
            .as_ref()
            .and_then(|x| x.get("code"))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    if errors.iter().any(|e| code(e).as_deref() == Some("ACCESS_DENIED")) {
        return Some(ClientError::Auth { status: 403 });
    }
    let message = errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ");
    warn!(%message, "GraphQL errors");
    Some(ClientError::transient(format!("GraphQL: {message}")))
}

fn parse_retry_after(value: &str) -> Option<Duration> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(|secs| Duration::from_secs_f64(secs.min(3600.0)))
}

/// REST payloads carry numeric ids; fall back to the raw string otherwise.
fn id_value(id: &str) -> Value {
    id.parse::<u64>().map(Value::from).unwrap_or_else(|_| Value::from(id))
}

/// `gid://shopify/ProductImage/123` -> `123`
fn legacy_id(gid: &str) -> &str {
    gid.rsplit('/').next().unwrap_or(gid)
}

fn snippet(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() > 200 {
        format!("{}...", trimmed.chars().take(200).collect::<String>())
    } else {
        trimmed.to_string()
    }
}

fn parse_money(raw: Option<String>) -> Option<Money> {
    let raw = raw?;
    match raw.parse() {
        Ok(m) => Some(m),
        Err(e) => {
            warn!(error = %e, "ignoring unparseable amount");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
    #[serde(default)]
    extensions: Option<serde_json::Map<String, Value>>,
}

#[derive(Deserialize)]
struct ProductsData {
    products: Connection<ProductNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Connection<T> {
    #[serde(default)]
    page_info: PageInfo,
    edges: Vec<Edge<T>>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[derive(Deserialize)]
struct Edge<T> {
    node: T,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProductNode {
    legacy_resource_id: String,
    title: String,
    #[serde(default)]
    vendor: String,
    images: Connection<ImageNode>,
    variants: Connection<VariantNode>,
}

#[derive(Deserialize)]
struct ImageNode {
    id: String,
    url: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VariantNode {
    legacy_resource_id: String,
    price: Option<String>,
    inventory_item: Option<InventoryItemNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InventoryItemNode {
    unit_cost: Option<MoneyNode>,
}

#[derive(Deserialize)]
struct MoneyNode {
    amount: Option<String>,
}

impl ProductNode {
    fn into_item(self) -> CatalogItem {
        let images = self
            .images
            .edges
            .into_iter()
            .map(|edge| ImageRef {
                id: legacy_id(&edge.node.id).to_string(),
                src: edge.node.url,
            })
            .collect();

        let variant = self.variants.edges.into_iter().next().map(|edge| {
            let node = edge.node;
            let cost = node
                .inventory_item
                .and_then(|inv| inv.unit_cost)
                .and_then(|c| c.amount);
            VariantRef {
                id: node.legacy_resource_id,
                price: parse_money(node.price),
                cost: parse_money(cost),
            }
        });

        CatalogItem {
            id: self.legacy_resource_id,
            title: self.title,
            vendor: self.vendor,
            images,
            variant,
        }
    }
}
