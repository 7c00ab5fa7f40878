//! Workflow orchestration over the repositories and the pricing engine.
//!
//! Handlers stay thin: they parse the request, call one method here and map
//! the result. Every mutating step emits a `tracing` event carrying the
//! caller's correlation id.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use tradeflow_core::acceptance::{build_acceptance, summarize, AcceptanceRequest, AcceptanceSummary};
use tradeflow_core::domain::acceptance::{AcceptanceId, CustomerAcceptance};
use tradeflow_core::domain::customer::{Customer, CustomerId};
use tradeflow_core::domain::item::{Item, ItemId};
use tradeflow_core::domain::new_id;
use tradeflow_core::domain::purchase_order::{
    PoLineItem, PurchaseOrder, PurchaseOrderId, PurchaseOrderStatus,
};
use tradeflow_core::domain::quotation::{Quotation, QuotationId, QuotationItemId, QuotationStatus};
use tradeflow_core::errors::{ApplicationError, DomainError, InterfaceError};
use tradeflow_core::pricing::tiers::VolumeTier;
use tradeflow_core::pricing::{
    price_quotation_line, DemandLevel, PriceBreakdown, PricingEngine, PricingError, PricingMethod,
    PricingRequest,
};
use tradeflow_core::reconcile::{reconcile, ReconciliationReport};
use tradeflow_core::AcceptanceError;
use tradeflow_db::repositories::{
    AcceptanceRepository, CustomerRepository, InMemoryAcceptanceRepository,
    InMemoryCustomerRepository, InMemoryItemRepository, InMemoryPurchaseOrderRepository,
    InMemoryQuotationRepository, ItemRepository, PurchaseOrderRepository, QuotationRepository,
    SqlAcceptanceRepository, SqlCustomerRepository, SqlItemRepository,
    SqlPurchaseOrderRepository, SqlQuotationRepository,
};
use tradeflow_db::{DbPool, RepositoryError};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<PricingError> for ServiceError {
    fn from(error: PricingError) -> Self {
        Self::Domain(DomainError::Pricing(error))
    }
}

impl From<AcceptanceError> for ServiceError {
    fn from(error: AcceptanceError) -> Self {
        Self::Domain(DomainError::Acceptance(error))
    }
}

impl ServiceError {
    pub fn into_interface(self, correlation_id: &str) -> InterfaceError {
        match self {
            Self::NotFound(message) => {
                ApplicationError::NotFound(message).into_interface(correlation_id)
            }
            Self::Validation(message) => {
                InterfaceError::BadRequest { message, correlation_id: correlation_id.to_string() }
            }
            Self::Domain(error) => ApplicationError::Domain(error).into_interface(correlation_id),
            Self::Repository(RepositoryError::Conflict(message)) => InterfaceError::BadRequest {
                message: format!("Conflicting record: {message}"),
                correlation_id: correlation_id.to_string(),
            },
            Self::Repository(error) => {
                ApplicationError::Persistence(error.to_string()).into_interface(correlation_id)
            }
        }
    }
}

/// The repository set the workflows run against.
#[derive(Clone)]
pub struct Repositories {
    pub customers: Arc<dyn CustomerRepository>,
    pub items: Arc<dyn ItemRepository>,
    pub quotations: Arc<dyn QuotationRepository>,
    pub acceptances: Arc<dyn AcceptanceRepository>,
    pub purchase_orders: Arc<dyn PurchaseOrderRepository>,
}

impl Repositories {
    pub fn sql(pool: DbPool) -> Self {
        Self {
            customers: Arc::new(SqlCustomerRepository::new(pool.clone())),
            items: Arc::new(SqlItemRepository::new(pool.clone())),
            quotations: Arc::new(SqlQuotationRepository::new(pool.clone())),
            acceptances: Arc::new(SqlAcceptanceRepository::new(pool.clone())),
            purchase_orders: Arc::new(SqlPurchaseOrderRepository::new(pool)),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            customers: Arc::new(InMemoryCustomerRepository::default()),
            items: Arc::new(InMemoryItemRepository::default()),
            quotations: Arc::new(InMemoryQuotationRepository::default()),
            acceptances: Arc::new(InMemoryAcceptanceRepository::default()),
            purchase_orders: Arc::new(InMemoryPurchaseOrderRepository::default()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotationLineRequest {
    pub item_id: ItemId,
    pub quantity: Decimal,
    #[serde(default)]
    pub method: PricingMethod,
    #[serde(default)]
    pub markup_pct: Option<Decimal>,
    #[serde(default)]
    pub target_margin_pct: Option<Decimal>,
    #[serde(default)]
    pub competitor_prices: Vec<Decimal>,
    #[serde(default)]
    pub volume_tiers: Vec<VolumeTier>,
    #[serde(default)]
    pub demand: DemandLevel,
    #[serde(default)]
    pub contract_price: Option<Decimal>,
    #[serde(default)]
    pub min_price: Option<Decimal>,
    #[serde(default)]
    pub max_price: Option<Decimal>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateQuotationRequest {
    pub customer_id: CustomerId,
    #[serde(default)]
    pub quotation_number: Option<String>,
    /// Falls back to the engine's base currency.
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
    pub lines: Vec<QuotationLineRequest>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PricedQuotation {
    pub quotation: Quotation,
    pub breakdowns: Vec<PriceBreakdown>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AcceptanceOutcome {
    pub acceptance: CustomerAcceptance,
    pub superseded: Vec<AcceptanceId>,
    pub summary: AcceptanceSummary,
    pub quotation_status: QuotationStatus,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ActiveAcceptance {
    pub acceptance: CustomerAcceptance,
    pub summary: AcceptanceSummary,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoLineRequest {
    #[serde(default)]
    pub quotation_item_id: Option<QuotationItemId>,
    #[serde(default)]
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoUploadRequest {
    pub quotation_id: QuotationId,
    pub po_number: String,
    #[serde(default)]
    pub po_date: Option<NaiveDate>,
    pub lines: Vec<PoLineRequest>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PoUploadOutcome {
    pub purchase_order: PurchaseOrder,
    pub reconciliation: ReconciliationReport,
}

pub struct WorkflowService {
    repositories: Repositories,
    engine: Arc<dyn PricingEngine>,
    base_currency: String,
}

impl WorkflowService {
    pub fn new(
        repositories: Repositories,
        engine: Arc<dyn PricingEngine>,
        base_currency: impl Into<String>,
    ) -> Self {
        Self { repositories, engine, base_currency: base_currency.into() }
    }

    pub fn price(&self, request: &PricingRequest) -> Result<PriceBreakdown, ServiceError> {
        Ok(self.engine.price(request)?)
    }

    pub async fn upsert_customer(&self, customer: Customer) -> Result<Customer, ServiceError> {
        if customer.id.0.trim().is_empty() || customer.name.trim().is_empty() {
            return Err(ServiceError::Validation("Customer id and name are required".to_string()));
        }
        self.repositories.customers.save(customer.clone()).await?;
        Ok(customer)
    }

    pub async fn upsert_item(&self, item: Item) -> Result<Item, ServiceError> {
        if item.id.0.trim().is_empty() || item.code.trim().is_empty() {
            return Err(ServiceError::Validation("Item id and code are required".to_string()));
        }
        if item.cost_price < Decimal::ZERO {
            return Err(ServiceError::Validation("Cost price cannot be negative".to_string()));
        }
        self.repositories.items.save(item.clone()).await?;
        Ok(item)
    }

    pub async fn create_quotation(
        &self,
        request: CreateQuotationRequest,
        correlation_id: &str,
    ) -> Result<PricedQuotation, ServiceError> {
        if request.lines.is_empty() {
            return Err(ServiceError::Validation(
                "A quotation needs at least one line".to_string(),
            ));
        }
        let customer = self
            .repositories
            .customers
            .find_by_id(&request.customer_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Customer not found".to_string()))?;
        let currency = request
            .currency
            .map(|code| code.trim().to_ascii_uppercase())
            .unwrap_or_else(|| self.base_currency.clone());

        let mut lines = Vec::with_capacity(request.lines.len());
        let mut breakdowns = Vec::with_capacity(request.lines.len());
        for line in &request.lines {
            let item = self
                .repositories
                .items
                .find_by_id(&line.item_id)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("Item {} not found", line.item_id.0)))?;
            let pricing = line_pricing_request(&item, &customer, line, &currency);
            let (quoted, breakdown) = price_quotation_line(self.engine.as_ref(), &item, &pricing)?;
            lines.push(quoted);
            breakdowns.push(breakdown);
        }

        let number = request.quotation_number.unwrap_or_else(|| new_id("QT"));
        let mut quotation = Quotation::draft(number, customer.id, currency, lines);
        quotation.valid_until = request.valid_until;
        quotation.notes = request.notes;
        self.repositories.quotations.save(quotation.clone()).await?;

        info!(
            event_name = "workflow.quotation.created",
            correlation_id,
            quotation_id = %quotation.id.0,
            line_count = quotation.items.len(),
            subtotal = %quotation.subtotal,
            "quotation created"
        );
        Ok(PricedQuotation { quotation, breakdowns })
    }

    pub async fn get_quotation(&self, id: &QuotationId) -> Result<Quotation, ServiceError> {
        self.load_quotation(id).await
    }

    pub async fn transition_quotation(
        &self,
        id: &QuotationId,
        next: QuotationStatus,
        correlation_id: &str,
    ) -> Result<Quotation, ServiceError> {
        let mut quotation = self.load_quotation(id).await?;
        let from = quotation.status;
        quotation.transition_to(next)?;
        self.repositories.quotations.save(quotation.clone()).await?;

        info!(
            event_name = "workflow.quotation.transitioned",
            correlation_id,
            quotation_id = %quotation.id.0,
            from = from.as_str(),
            to = next.as_str(),
            "quotation status changed"
        );
        Ok(quotation)
    }

    pub async fn revise_quotation(
        &self,
        id: &QuotationId,
        correlation_id: &str,
    ) -> Result<Quotation, ServiceError> {
        let parent = self.load_quotation(id).await?;
        let existing = self.repositories.quotations.list_revisions(&parent.id).await?;
        if let Some(latest) = existing.last() {
            return Err(ServiceError::Validation(format!(
                "Quotation {} was already revised as {}",
                parent.quotation_number, latest.quotation_number
            )));
        }
        let revision = parent.revise();
        self.repositories.quotations.save(revision.clone()).await?;

        info!(
            event_name = "workflow.quotation.revised",
            correlation_id,
            quotation_id = %revision.id.0,
            parent_id = %parent.id.0,
            revision = revision.revision,
            "quotation revision created"
        );
        Ok(revision)
    }

    /// Records a new acceptance, supersedes the previous active one and marks
    /// the quotation Accepted.
    pub async fn record_acceptance(
        &self,
        quotation_id: &QuotationId,
        request: AcceptanceRequest,
        correlation_id: &str,
    ) -> Result<AcceptanceOutcome, ServiceError> {
        let mut quotation = self.load_quotation(quotation_id).await?;
        let acceptance = build_acceptance(&quotation, &request)?;
        let superseded = self.repositories.acceptances.record(acceptance.clone()).await?;

        info!(
            event_name = "workflow.acceptance.recorded",
            correlation_id,
            quotation_id = %quotation.id.0,
            acceptance_id = %acceptance.id.0,
            acceptance_type = acceptance.acceptance_type.as_str(),
            superseded = superseded.len(),
            "customer acceptance recorded"
        );

        if quotation.status != QuotationStatus::Accepted {
            quotation.transition_to(QuotationStatus::Accepted)?;
            self.repositories.quotations.save(quotation.clone()).await?;
        }

        let summary = summarize(&quotation, &acceptance);
        Ok(AcceptanceOutcome {
            acceptance,
            superseded,
            summary,
            quotation_status: quotation.status,
        })
    }

    pub async fn active_acceptance(
        &self,
        quotation_id: &QuotationId,
    ) -> Result<ActiveAcceptance, ServiceError> {
        let quotation = self.load_quotation(quotation_id).await?;
        let acceptance = self
            .repositories
            .acceptances
            .find_active(&quotation.id)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound("No active acceptance for this quotation".to_string())
            })?;
        let summary = summarize(&quotation, &acceptance);
        Ok(ActiveAcceptance { acceptance, summary })
    }

    pub async fn acceptance_history(
        &self,
        quotation_id: &QuotationId,
    ) -> Result<Vec<CustomerAcceptance>, ServiceError> {
        let quotation = self.load_quotation(quotation_id).await?;
        Ok(self.repositories.acceptances.list_for_quotation(&quotation.id).await?)
    }

    pub async fn cancel_acceptance(
        &self,
        id: &AcceptanceId,
        correlation_id: &str,
    ) -> Result<CustomerAcceptance, ServiceError> {
        let acceptance = self
            .repositories
            .acceptances
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Acceptance not found".to_string()))?;
        if !self.repositories.acceptances.cancel(id).await? {
            return Err(ServiceError::Validation(format!(
                "Only active acceptances can be cancelled (status is {})",
                acceptance.status.as_str()
            )));
        }

        info!(
            event_name = "workflow.acceptance.cancelled",
            correlation_id,
            quotation_id = %acceptance.quotation_id.0,
            acceptance_id = %acceptance.id.0,
            "customer acceptance cancelled"
        );
        self.repositories
            .acceptances
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Acceptance not found".to_string()))
    }

    /// Stores the PO whatever reconciliation finds; issues only flip the
    /// status to RequiresReview.
    pub async fn upload_purchase_order(
        &self,
        request: PoUploadRequest,
        correlation_id: &str,
    ) -> Result<PoUploadOutcome, ServiceError> {
        let quotation = self.load_quotation(&request.quotation_id).await?;
        if quotation.status != QuotationStatus::Accepted {
            return Err(ServiceError::Validation(
                "Quotation must be Accepted before uploading PO".to_string(),
            ));
        }
        if request.po_number.trim().is_empty() {
            return Err(ServiceError::Validation("PO number is required".to_string()));
        }
        if request.lines.is_empty() {
            return Err(ServiceError::Validation(
                "A purchase order needs at least one line".to_string(),
            ));
        }
        if request.lines.iter().any(|line| line.quantity <= Decimal::ZERO) {
            return Err(ServiceError::Validation(
                "PO line quantities must be greater than zero".to_string(),
            ));
        }

        let lines: Vec<PoLineItem> = request
            .lines
            .into_iter()
            .map(|line| PoLineItem {
                id: new_id("POL"),
                quotation_item_id: line.quotation_item_id,
                description: line.description,
                quantity: line.quantity,
                unit_price: line.unit_price,
            })
            .collect();

        let acceptance = self.repositories.acceptances.find_active(&quotation.id).await?;
        let reconciliation = reconcile(&lines, &quotation, acceptance.as_ref());

        let mut purchase_order = PurchaseOrder {
            id: PurchaseOrderId(new_id("PO")),
            quotation_id: quotation.id.clone(),
            po_number: request.po_number.trim().to_string(),
            po_date: request.po_date,
            status: reconciliation.status,
            total_amount: Decimal::ZERO,
            lines,
            created_at: Utc::now(),
        };
        purchase_order.total_amount = purchase_order.lines_total();
        self.repositories.purchase_orders.save(purchase_order.clone()).await?;

        log_reconciliation("workflow.po.uploaded", correlation_id, &purchase_order, &reconciliation);
        Ok(PoUploadOutcome { purchase_order, reconciliation })
    }

    /// Re-checks a stored PO against the current active acceptance and
    /// persists the resulting status.
    pub async fn reconcile_purchase_order(
        &self,
        id: &PurchaseOrderId,
        correlation_id: &str,
    ) -> Result<PoUploadOutcome, ServiceError> {
        let mut purchase_order = self
            .repositories
            .purchase_orders
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Purchase order not found".to_string()))?;
        let quotation = self.load_quotation(&purchase_order.quotation_id).await?;
        let acceptance = self.repositories.acceptances.find_active(&quotation.id).await?;
        let reconciliation = reconcile(&purchase_order.lines, &quotation, acceptance.as_ref());

        if purchase_order.status != reconciliation.status {
            purchase_order.status = reconciliation.status;
            self.repositories.purchase_orders.save(purchase_order.clone()).await?;
        }

        log_reconciliation(
            "workflow.po.reconciled",
            correlation_id,
            &purchase_order,
            &reconciliation,
        );
        Ok(PoUploadOutcome { purchase_order, reconciliation })
    }

    /// Stored POs of a quotation with their persisted reconciliation status.
    pub async fn purchase_orders_for_quotation(
        &self,
        quotation_id: &QuotationId,
    ) -> Result<Vec<PurchaseOrder>, ServiceError> {
        let quotation = self.load_quotation(quotation_id).await?;
        Ok(self.repositories.purchase_orders.list_for_quotation(&quotation.id).await?)
    }

    async fn load_quotation(&self, id: &QuotationId) -> Result<Quotation, ServiceError> {
        self.repositories
            .quotations
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Quotation not found".to_string()))
    }
}

fn line_pricing_request(
    item: &Item,
    customer: &Customer,
    line: &QuotationLineRequest,
    currency: &str,
) -> PricingRequest {
    let mut request = PricingRequest::for_item(item, customer, line.quantity);
    request.method = line.method;
    if line.markup_pct.is_some() {
        request.markup_pct = line.markup_pct;
    }
    request.target_margin_pct = line.target_margin_pct;
    request.competitor_prices = line.competitor_prices.clone();
    request.volume_tiers = line.volume_tiers.clone();
    request.demand = line.demand;
    request.contract_price = line.contract_price;
    request.min_price = line.min_price;
    request.max_price = line.max_price;
    request.currency = Some(currency.to_string());
    request
}

fn log_reconciliation(
    event_name: &'static str,
    correlation_id: &str,
    purchase_order: &PurchaseOrder,
    reconciliation: &ReconciliationReport,
) {
    if reconciliation.status == PurchaseOrderStatus::RequiresReview {
        warn!(
            event_name,
            correlation_id,
            quotation_id = %purchase_order.quotation_id.0,
            purchase_order_id = %purchase_order.id.0,
            issues = reconciliation.issues.len(),
            "purchase order requires review"
        );
    } else {
        info!(
            event_name,
            correlation_id,
            quotation_id = %purchase_order.quotation_id.0,
            purchase_order_id = %purchase_order.id.0,
            checked_lines = reconciliation.checked_lines,
            "purchase order validated"
        );
    }
}
