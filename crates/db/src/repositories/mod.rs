use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use tradeflow_core::domain::acceptance::{AcceptanceId, CustomerAcceptance};
use tradeflow_core::domain::customer::{Customer, CustomerId};
use tradeflow_core::domain::item::{Item, ItemId};
use tradeflow_core::domain::purchase_order::{PurchaseOrder, PurchaseOrderId};
use tradeflow_core::domain::quotation::{Quotation, QuotationId};

pub mod acceptance;
pub mod customer;
pub mod item;
pub mod memory;
pub mod purchase_order;
pub mod quotation;

pub use acceptance::SqlAcceptanceRepository;
pub use customer::SqlCustomerRepository;
pub use item::SqlItemRepository;
pub use memory::{
    InMemoryAcceptanceRepository, InMemoryCustomerRepository, InMemoryItemRepository,
    InMemoryPurchaseOrderRepository, InMemoryQuotationRepository,
};
pub use purchase_order::SqlPurchaseOrderRepository;
pub use quotation::SqlQuotationRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(sqlx::Error),
    /// A uniqueness rule rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(error: sqlx::Error) -> Self {
        match &error {
            sqlx::Error::Database(database) if database.is_unique_violation() => {
                Self::Conflict(database.message().to_string())
            }
            _ => Self::Database(error),
        }
    }
}

#[async_trait]
pub trait CustomerRepository: Send + Sync {
    async fn find_by_id(&self, id: &CustomerId) -> Result<Option<Customer>, RepositoryError>;
    async fn save(&self, customer: Customer) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ItemRepository: Send + Sync {
    async fn find_by_id(&self, id: &ItemId) -> Result<Option<Item>, RepositoryError>;
    async fn save(&self, item: Item) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait QuotationRepository: Send + Sync {
    async fn find_by_id(&self, id: &QuotationId) -> Result<Option<Quotation>, RepositoryError>;
    /// Upserts the header and its lines; lines missing from `quotation` are removed.
    async fn save(&self, quotation: Quotation) -> Result<(), RepositoryError>;
    /// Direct child revisions, oldest first.
    async fn list_revisions(&self, parent_id: &QuotationId)
        -> Result<Vec<Quotation>, RepositoryError>;
}

#[async_trait]
pub trait AcceptanceRepository: Send + Sync {
    /// Supersedes every Active acceptance of the quotation and inserts `acceptance`
    /// as one unit. Returns the ids that were superseded.
    async fn record(
        &self,
        acceptance: CustomerAcceptance,
    ) -> Result<Vec<AcceptanceId>, RepositoryError>;

    async fn find_by_id(
        &self,
        id: &AcceptanceId,
    ) -> Result<Option<CustomerAcceptance>, RepositoryError>;

    async fn find_active(
        &self,
        quotation_id: &QuotationId,
    ) -> Result<Option<CustomerAcceptance>, RepositoryError>;

    /// Newest first.
    async fn list_for_quotation(
        &self,
        quotation_id: &QuotationId,
    ) -> Result<Vec<CustomerAcceptance>, RepositoryError>;

    /// Active -> Cancelled. Returns false when the acceptance is missing or not Active.
    async fn cancel(&self, id: &AcceptanceId) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait PurchaseOrderRepository: Send + Sync {
    async fn find_by_id(
        &self,
        id: &PurchaseOrderId,
    ) -> Result<Option<PurchaseOrder>, RepositoryError>;
    async fn save(&self, purchase_order: PurchaseOrder) -> Result<(), RepositoryError>;
    async fn list_for_quotation(
        &self,
        quotation_id: &QuotationId,
    ) -> Result<Vec<PurchaseOrder>, RepositoryError>;
}

pub(crate) fn parse_decimal(column: &str, value: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(value).map_err(|error| {
        RepositoryError::Decode(format!("invalid decimal in `{column}`: `{value}` ({error})"))
    })
}

pub(crate) fn parse_optional_decimal(
    column: &str,
    value: Option<String>,
) -> Result<Option<Decimal>, RepositoryError> {
    value.map(|raw| parse_decimal(column, &raw)).transpose()
}

pub(crate) fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, &timestamp)).transpose()
}

pub(crate) fn parse_optional_date(
    column: &str,
    value: Option<String>,
) -> Result<Option<NaiveDate>, RepositoryError> {
    value
        .map(|raw| {
            NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|error| {
                RepositoryError::Decode(format!("invalid date in `{column}`: `{raw}` ({error})"))
            })
        })
        .transpose()
}

pub(crate) fn parse_enum<T>(column: &str, value: &str) -> Result<T, RepositoryError>
where
    T: FromStr<Err = String>,
{
    value.parse::<T>().map_err(|error| RepositoryError::Decode(format!("`{column}`: {error}")))
}
