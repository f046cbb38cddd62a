//! Per-item correction planning.
//!
//! A plan is computed from the listed item alone and has two independent
//! aspects: the image swap and the price change. Each aspect is either
//! applicable or carries the reason it cannot be applied.

use catalog_client::{CatalogItem, ImageRef, Money, Mutation};
use serde::Serialize;

/// Price = cost × 175 / 100
pub const MARKUP_NUMERATOR: i64 = 175;
pub const MARKUP_DENOMINATOR: i64 = 100;

/// Why an aspect cannot be applied to an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanError {
    InsufficientImages,
    MissingVariant,
    MissingCost,
    NonPositiveCost,
    PriceOutOfRange,
}

impl PlanError {
    /// Stable reason string stored in the ledger
    pub fn reason(&self) -> &'static str {
        match self {
            PlanError::InsufficientImages => "insufficient_images",
            PlanError::MissingVariant => "missing_variant",
            PlanError::MissingCost => "missing_cost",
            PlanError::NonPositiveCost => "non_positive_cost",
            PlanError::PriceOutOfRange => "price_out_of_range",
        }
    }
}

impl std::fmt::Display for PlanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.reason())
    }
}

/// New image order with the first two entries exchanged
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageSwap {
    pub order: Vec<String>,
    pub first: String,
    pub second: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriceChange {
    pub variant_id: String,
    pub from: Option<Money>,
    pub to: Money,
}

impl PriceChange {
    /// The listed price already equals the target
    pub fn is_noop(&self) -> bool {
        self.from == Some(self.to)
    }
}

/// Both aspects of the correction for one item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationPlan {
    pub item_id: String,
    pub images: Result<ImageSwap, PlanError>,
    pub price: Result<PriceChange, PlanError>,
}

impl MutationPlan {
    pub fn for_item(item: &CatalogItem) -> Self {
        Self {
            item_id: item.id.clone(),
            images: plan_images(&item.images),
            price: plan_price(item),
        }
    }

    /// Remote mutations this plan would send, in send order. A price that
    /// is already correct sends nothing.
    pub fn mutations(&self) -> Vec<Mutation> {
        let mut out = Vec::with_capacity(2);
        if let Ok(swap) = &self.images {
            out.push(swap.to_mutation());
        }
        if let Ok(change) = &self.price {
            if !change.is_noop() {
                out.push(change.to_mutation());
            }
        }
        out
    }

    /// `"<aspect>: <reason>"` for every inapplicable aspect
    pub fn reasons(&self) -> Vec<String> {
        let mut reasons = Vec::new();
        if let Err(e) = &self.images {
            reasons.push(format!("images: {e}"));
        }
        if let Err(e) = &self.price {
            reasons.push(format!("price: {e}"));
        }
        reasons
    }
}

impl ImageSwap {
    pub fn to_mutation(&self) -> Mutation {
        Mutation::SwapImages {
            first: self.first.clone(),
            second: self.second.clone(),
        }
    }

    /// The first two image ids once the swap has landed
    pub fn leading(&self) -> Vec<String> {
        vec![self.second.clone(), self.first.clone()]
    }
}

impl PriceChange {
    pub fn to_mutation(&self) -> Mutation {
        Mutation::SetPrice {
            variant_id: self.variant_id.clone(),
            price: self.to,
        }
    }
}

/// Exchange positions 0 and 1, keeping the rest in place.
pub fn swap_first_two<T: Clone>(items: &[T]) -> Option<Vec<T>> {
    if items.len() < 2 {
        return None;
    }
    let mut out = items.to_vec();
    out.swap(0, 1);
    Some(out)
}

pub fn markup(cost: Money) -> Option<Money> {
    cost.checked_mul_ratio(MARKUP_NUMERATOR, MARKUP_DENOMINATOR)
}

fn plan_images(images: &[ImageRef]) -> Result<ImageSwap, PlanError> {
    let ids: Vec<String> = images.iter().map(|i| i.id.clone()).collect();
    let order = swap_first_two(&ids).ok_or(PlanError::InsufficientImages)?;
    Ok(ImageSwap {
        first: ids[0].clone(),
        second: ids[1].clone(),
        order,
    })
}

fn plan_price(item: &CatalogItem) -> Result<PriceChange, PlanError> {
    let variant = item.variant.as_ref().ok_or(PlanError::MissingVariant)?;
    let cost = variant.cost.ok_or(PlanError::MissingCost)?;
    if !cost.is_positive() {
        return Err(PlanError::NonPositiveCost);
    }
    let to = markup(cost).ok_or(PlanError::PriceOutOfRange)?;
    Ok(PriceChange {
        variant_id: variant.id.clone(),
        from: variant.price,
        to,
    })
}
