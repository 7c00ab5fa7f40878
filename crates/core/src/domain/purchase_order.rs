use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::quotation::{QuotationId, QuotationItemId};
use crate::pricing::round_money;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PurchaseOrderId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseOrderStatus {
    Received,
    Validated,
    RequiresReview,
}

impl PurchaseOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Validated => "validated",
            Self::RequiresReview => "requires_review",
        }
    }
}

impl std::str::FromStr for PurchaseOrderStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "received" => Ok(Self::Received),
            "validated" => Ok(Self::Validated),
            "requires_review" => Ok(Self::RequiresReview),
            other => Err(format!("unknown purchase order status `{other}`")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoLineItem {
    pub id: String,
    pub quotation_item_id: Option<QuotationItemId>,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

impl PoLineItem {
    pub fn line_total(&self) -> Decimal {
        round_money(self.quantity * self.unit_price)
    }
}

/// Customer-issued purchase order placed against a quotation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub id: PurchaseOrderId,
    pub quotation_id: QuotationId,
    pub po_number: String,
    pub po_date: Option<NaiveDate>,
    pub status: PurchaseOrderStatus,
    pub total_amount: Decimal,
    pub lines: Vec<PoLineItem>,
    pub created_at: DateTime<Utc>,
}

impl PurchaseOrder {
    pub fn lines_total(&self) -> Decimal {
        self.lines.iter().map(PoLineItem::line_total).sum()
    }
}
