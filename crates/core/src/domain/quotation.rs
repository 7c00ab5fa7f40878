use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::customer::CustomerId;
use crate::domain::item::ItemId;
use crate::domain::new_id;
use crate::errors::DomainError;
use crate::pricing::round_money;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuotationId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QuotationItemId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotationStatus {
    Draft,
    Sent,
    Accepted,
    Rejected,
    Expired,
}

impl QuotationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Sent => "sent",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
        }
    }
}

impl std::str::FromStr for QuotationStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "sent" => Ok(Self::Sent),
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            "expired" => Ok(Self::Expired),
            other => Err(format!("unknown quotation status `{other}`")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuotationItem {
    pub id: QuotationItemId,
    pub item_id: Option<ItemId>,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

impl QuotationItem {
    pub fn new(
        item_id: Option<ItemId>,
        description: impl Into<String>,
        quantity: Decimal,
        unit_price: Decimal,
    ) -> Self {
        Self {
            id: QuotationItemId(new_id("QI")),
            item_id,
            description: description.into(),
            quantity,
            unit_price,
            line_total: round_money(quantity * unit_price),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quotation {
    pub id: QuotationId,
    pub quotation_number: String,
    pub customer_id: CustomerId,
    pub status: QuotationStatus,
    pub currency: String,
    pub revision: u32,
    pub parent_id: Option<QuotationId>,
    pub items: Vec<QuotationItem>,
    pub subtotal: Decimal,
    pub valid_until: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Quotation {
    pub fn draft(
        quotation_number: impl Into<String>,
        customer_id: CustomerId,
        currency: impl Into<String>,
        items: Vec<QuotationItem>,
    ) -> Self {
        let now = Utc::now();
        let mut quotation = Self {
            id: QuotationId(new_id("QTN")),
            quotation_number: quotation_number.into(),
            customer_id,
            status: QuotationStatus::Draft,
            currency: currency.into(),
            revision: 0,
            parent_id: None,
            items,
            subtotal: Decimal::ZERO,
            valid_until: None,
            notes: None,
            created_at: now,
            updated_at: now,
        };
        quotation.recalculate_totals();
        quotation
    }

    pub fn item(&self, id: &QuotationItemId) -> Option<&QuotationItem> {
        self.items.iter().find(|item| &item.id == id)
    }

    pub fn recalculate_totals(&mut self) {
        for item in &mut self.items {
            item.line_total = round_money(item.quantity * item.unit_price);
        }
        self.subtotal = self.items.iter().map(|item| item.line_total).sum();
    }

    pub fn can_transition_to(&self, next: QuotationStatus) -> bool {
        matches!(
            (self.status, next),
            (QuotationStatus::Draft, QuotationStatus::Sent)
                | (QuotationStatus::Sent, QuotationStatus::Accepted)
                | (QuotationStatus::Sent, QuotationStatus::Rejected)
                | (QuotationStatus::Accepted, QuotationStatus::Accepted)
                | (QuotationStatus::Draft, QuotationStatus::Expired)
                | (QuotationStatus::Sent, QuotationStatus::Expired)
        )
    }

    pub fn transition_to(&mut self, next: QuotationStatus) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.status = next;
            self.updated_at = Utc::now();
            return Ok(());
        }

        Err(DomainError::InvalidQuotationTransition { from: self.status, to: next })
    }

    /// Child revision in Draft, linked back through `parent_id`. Items get fresh
    /// ids so acceptances of the parent never resolve against the child.
    /// Numbers stay unique only while each quotation is revised at most once.
    pub fn revise(&self) -> Quotation {
        let now = Utc::now();
        let revision = self.revision + 1;
        let items = self
            .items
            .iter()
            .map(|item| {
                QuotationItem::new(
                    item.item_id.clone(),
                    item.description.clone(),
                    item.quantity,
                    item.unit_price,
                )
            })
            .collect();

        let mut child = Quotation {
            id: QuotationId(new_id("QTN")),
            quotation_number: format!("{}-R{revision}", base_number(&self.quotation_number)),
            customer_id: self.customer_id.clone(),
            status: QuotationStatus::Draft,
            currency: self.currency.clone(),
            revision,
            parent_id: Some(self.id.clone()),
            items,
            subtotal: Decimal::ZERO,
            valid_until: self.valid_until,
            notes: self.notes.clone(),
            created_at: now,
            updated_at: now,
        };
        child.recalculate_totals();
        child
    }
}

fn base_number(number: &str) -> &str {
    match number.rsplit_once("-R") {
        Some((base, suffix)) if suffix.chars().all(|ch| ch.is_ascii_digit()) => base,
        _ => number,
    }
}
