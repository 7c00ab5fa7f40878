use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Quantity band with either an override price or a percentage discount.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeTier {
    pub min_qty: Decimal,
    #[serde(default)]
    pub max_qty: Option<Decimal>,
    #[serde(default)]
    pub discount_pct: Decimal,
    #[serde(default)]
    pub special_price: Option<Decimal>,
}

impl VolumeTier {
    pub fn contains(&self, quantity: Decimal) -> bool {
        self.min_qty <= quantity && self.max_qty.map_or(true, |max| quantity <= max)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TierIssue {
    InvertedRange { index: usize },
    DiscountOutOfRange { index: usize },
    NegativeSpecialPrice { index: usize },
    Overlap { first: usize, second: usize },
}

impl TierIssue {
    /// Overlaps are tolerated at pricing time: declared order decides.
    pub fn is_blocking(&self) -> bool {
        !matches!(self, Self::Overlap { .. })
    }
}

/// First tier in declared order whose range contains `quantity`.
pub fn resolve_tier(quantity: Decimal, tiers: &[VolumeTier]) -> Option<&VolumeTier> {
    tiers.iter().find(|tier| tier.contains(quantity))
}

pub fn validate_tiers(tiers: &[VolumeTier]) -> Vec<TierIssue> {
    let mut issues = Vec::new();

    for (index, tier) in tiers.iter().enumerate() {
        if tier.max_qty.is_some_and(|max| max < tier.min_qty) {
            issues.push(TierIssue::InvertedRange { index });
        }
        if tier.discount_pct < Decimal::ZERO || tier.discount_pct > Decimal::ONE_HUNDRED {
            issues.push(TierIssue::DiscountOutOfRange { index });
        }
        if tier.special_price.is_some_and(|price| price < Decimal::ZERO) {
            issues.push(TierIssue::NegativeSpecialPrice { index });
        }
    }

    for (first, a) in tiers.iter().enumerate() {
        for (offset, b) in tiers[first + 1..].iter().enumerate() {
            if ranges_overlap(a, b) {
                issues.push(TierIssue::Overlap { first, second: first + 1 + offset });
            }
        }
    }

    issues
}

fn ranges_overlap(a: &VolumeTier, b: &VolumeTier) -> bool {
    let a_below_b = a.max_qty.is_some_and(|max| max < b.min_qty);
    let b_below_a = b.max_qty.is_some_and(|max| max < a.min_qty);
    !a_below_b && !b_below_a
}
