use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::quotation::{QuotationId, QuotationItemId};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AcceptanceId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcceptanceType {
    Full,
    Partial,
}

impl AcceptanceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Partial => "partial",
        }
    }
}

impl std::str::FromStr for AcceptanceType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "partial" => Ok(Self::Partial),
            other => Err(format!("unknown acceptance type `{other}`")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcceptanceStatus {
    Active,
    Superseded,
    Cancelled,
}

impl AcceptanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Superseded => "superseded",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for AcceptanceStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "superseded" => Ok(Self::Superseded),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown acceptance status `{other}`")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotationItemAcceptance {
    pub id: String,
    pub quotation_item_id: QuotationItemId,
    pub is_accepted: bool,
    pub accepted_quantity: Decimal,
    pub notes: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerAcceptance {
    pub id: AcceptanceId,
    pub quotation_id: QuotationId,
    pub acceptance_type: AcceptanceType,
    pub status: AcceptanceStatus,
    pub accepted_by: String,
    pub notes: Option<String>,
    pub accepted_at: DateTime<Utc>,
    pub items: Vec<QuotationItemAcceptance>,
}

impl CustomerAcceptance {
    pub fn is_active(&self) -> bool {
        self.status == AcceptanceStatus::Active
    }

    /// Entry for `id` only when it is flagged accepted.
    pub fn accepted_item(&self, id: &QuotationItemId) -> Option<&QuotationItemAcceptance> {
        self.items.iter().find(|entry| &entry.quotation_item_id == id && entry.is_accepted)
    }

    pub fn accepted_items(&self) -> impl Iterator<Item = &QuotationItemAcceptance> {
        self.items.iter().filter(|entry| entry.is_accepted)
    }
}
