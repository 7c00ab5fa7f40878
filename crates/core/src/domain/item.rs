use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemId(pub String);

/// A tradeable stock item as carried in the catalog.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub code: String,
    pub name: String,
    pub category: Option<String>,
    pub cost_price: Decimal,
    /// Overrides the customer-type default markup when set.
    pub markup_pct: Option<Decimal>,
}
