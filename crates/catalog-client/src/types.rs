//! Catalog data types shared by the client, the fakes and the batch driver.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Money
// ---------------------------------------------------------------------------

/// Amount in currency minor units (two decimal places).
///
/// Serialized as the decimal string the Admin API uses, e.g. `"175.00"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Money {
    minor: i64,
}

/// Returned when a decimal string cannot be read as an amount.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid money amount: {0:?}")]
pub struct MoneyParseError(pub String);

impl Money {
    pub const ZERO: Money = Money { minor: 0 };

    pub fn from_minor(minor: i64) -> Self {
        Money { minor }
    }

    pub fn minor(&self) -> i64 {
        self.minor
    }

    pub fn is_positive(&self) -> bool {
        self.minor > 0
    }

    /// Multiply by `numerator / denominator`, rounding half away from zero.
    ///
    /// Returns `None` on overflow or a zero denominator.
    pub fn checked_mul_ratio(self, numerator: i64, denominator: i64) -> Option<Money> {
        if denominator == 0 {
            return None;
        }
        let product = i128::from(self.minor) * i128::from(numerator);
        let den = i128::from(denominator);
        let mut quotient = product / den;
        let remainder = product % den;
        if remainder.abs() * 2 >= den.abs() {
            quotient += product.signum() * den.signum();
        }
        i64::try_from(quotient).ok().map(Money::from_minor)
    }
}

impl FromStr for Money {
    type Err = MoneyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || MoneyParseError(s.to_string());
        let trimmed = s.trim();
        let (negative, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let (whole, frac) = digits.split_once('.').unwrap_or((digits, ""));
        if whole.is_empty() && frac.is_empty() {
            return Err(invalid());
        }
        if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }

        let units: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };
        let frac = frac.as_bytes();
        let digit = |i: usize| frac.get(i).map(|b| i64::from(b - b'0')).unwrap_or(0);
        let mut cents = digit(0) * 10 + digit(1);
        if digit(2) >= 5 {
            cents += 1;
        }

        let minor = units
            .checked_mul(100)
            .and_then(|v| v.checked_add(cents))
            .ok_or_else(invalid)?;
        Ok(Money {
            minor: if negative { -minor } else { minor },
        })
    }
}

impl TryFrom<String> for Money {
    type Error = MoneyParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Money> for String {
    fn from(m: Money) -> Self {
        m.to_string()
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.minor < 0 { "-" } else { "" };
        let abs = self.minor.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

// ---------------------------------------------------------------------------
// Catalog items
// ---------------------------------------------------------------------------

/// Opaque pagination position returned by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(pub String);

impl Cursor {
    pub fn new(s: impl Into<String>) -> Self {
        Cursor(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A product image as listed by the catalog, in display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    /// Numeric image id accepted by the REST image endpoints
    pub id: String,
    pub src: Option<String>,
}

impl ImageRef {
    pub fn new(id: impl Into<String>) -> Self {
        ImageRef {
            id: id.into(),
            src: None,
        }
    }
}

/// The variant whose price is recomputed (the first one of the product).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantRef {
    pub id: String,
    pub price: Option<Money>,
    /// Unit cost from the inventory item
    pub cost: Option<Money>,
}

/// Transient in-memory copy of a remote product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: String,
    pub title: String,
    pub vendor: String,
    pub images: Vec<ImageRef>,
    pub variant: Option<VariantRef>,
}

impl CatalogItem {
    pub fn new(id: impl Into<String>, title: impl Into<String>, vendor: impl Into<String>) -> Self {
        CatalogItem {
            id: id.into(),
            title: title.into(),
            vendor: vendor.into(),
            images: Vec::new(),
            variant: None,
        }
    }

    pub fn with_images<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.images = ids.into_iter().map(ImageRef::new).collect();
        self
    }

    pub fn with_variant(
        mut self,
        id: impl Into<String>,
        price: Option<Money>,
        cost: Option<Money>,
    ) -> Self {
        self.variant = Some(VariantRef {
            id: id.into(),
            price,
            cost,
        });
        self
    }
}

/// One page of vendor-filtered items.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    pub items: Vec<CatalogItem>,
    /// `None` once the end of the catalog has been reached
    pub next: Option<Cursor>,
}

/// A single remote update. Image order and price are sent separately so
/// each can succeed or fail on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Mutation {
    /// Move `first` to position 2 and `second` to position 1
    SwapImages { first: String, second: String },
    SetPrice { variant_id: String, price: Money },
}

impl Mutation {
    /// Short name of the aspect this mutation touches, used in logs and the ledger.
    pub fn aspect(&self) -> &'static str {
        match self {
            Mutation::SwapImages { .. } => "images",
            Mutation::SetPrice { .. } => "price",
        }
    }
}

/// Request counters kept by a client for the run summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientStats {
    pub requests: u64,
    pub rate_limited: u64,
}
