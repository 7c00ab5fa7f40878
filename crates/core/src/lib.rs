pub mod acceptance;
pub mod config;
pub mod domain;
pub mod errors;
pub mod pricing;
pub mod reconcile;

pub use acceptance::{
    build_acceptance, summarize, AcceptanceError, AcceptanceRequest, AcceptanceSummary,
    ItemSelection,
};
pub use domain::acceptance::{
    AcceptanceId, AcceptanceStatus, AcceptanceType, CustomerAcceptance, QuotationItemAcceptance,
};
pub use domain::customer::{Customer, CustomerId, CustomerType};
pub use domain::item::{Item, ItemId};
pub use domain::purchase_order::{PoLineItem, PurchaseOrder, PurchaseOrderId, PurchaseOrderStatus};
pub use domain::quotation::{
    Quotation, QuotationId, QuotationItem, QuotationItemId, QuotationStatus,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use pricing::{
    DeterministicPricingEngine, PriceBreakdown, PricingEngine, PricingError, PricingMethod,
    PricingRequest,
};
pub use reconcile::{reconcile, IssueKind, ReconciliationIssue, ReconciliationReport};
