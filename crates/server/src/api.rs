//! JSON API routes.
//!
//! - `POST /api/pricing/calculate`                   run the pricing engine
//! - `POST /api/customers`, `POST /api/items`         master data upsert
//! - `POST /api/quotations`                           create a priced quotation
//! - `GET  /api/quotations/{id}`                      fetch a quotation
//! - `POST /api/quotations/{id}/status`               lifecycle transition
//! - `POST /api/quotations/{id}/revise`               create a revision
//! - `POST /api/customer-acceptances`                 record an acceptance
//! - `GET  /api/quotations/{id}/acceptance`           active acceptance + summary
//! - `GET  /api/quotations/{id}/acceptances`          acceptance history
//! - `POST /api/customer-acceptances/{id}/cancel`     cancel an acceptance
//! - `POST /api/customer-po-upload`                   upload and reconcile a PO
//! - `GET  /api/quotations/{id}/purchase-orders`      stored POs of a quotation
//! - `GET  /api/purchase-orders/{id}/reconciliation`  re-run reconciliation

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use tradeflow_core::acceptance::{AcceptanceRequest, ItemSelection};
use tradeflow_core::domain::acceptance::{AcceptanceId, AcceptanceType, CustomerAcceptance};
use tradeflow_core::domain::customer::Customer;
use tradeflow_core::domain::item::Item;
use tradeflow_core::domain::new_id;
use tradeflow_core::domain::purchase_order::{PurchaseOrder, PurchaseOrderId};
use tradeflow_core::domain::quotation::{Quotation, QuotationId, QuotationStatus};
use tradeflow_core::errors::InterfaceError;
use tradeflow_core::pricing::{PriceBreakdown, PricingRequest};

use crate::services::{
    AcceptanceOutcome, ActiveAcceptance, CreateQuotationRequest, PoUploadOutcome,
    PoUploadRequest, PricedQuotation, ServiceError, WorkflowService,
};

#[derive(Clone)]
pub struct ApiState {
    service: Arc<WorkflowService>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub correlation_id: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusChangeRequest {
    pub status: QuotationStatus,
}

#[derive(Debug, Deserialize)]
pub struct RecordAcceptanceRequest {
    pub quotation_id: QuotationId,
    pub acceptance_type: AcceptanceType,
    pub accepted_by: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub items: Vec<ItemSelection>,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorBody>)>;

pub fn router(service: Arc<WorkflowService>) -> Router {
    Router::new()
        .route("/api/pricing/calculate", post(calculate_price))
        .route("/api/customers", post(upsert_customer))
        .route("/api/items", post(upsert_item))
        .route("/api/quotations", post(create_quotation))
        .route("/api/quotations/{id}", get(get_quotation))
        .route("/api/quotations/{id}/status", post(change_status))
        .route("/api/quotations/{id}/revise", post(revise_quotation))
        .route("/api/quotations/{id}/acceptance", get(active_acceptance))
        .route("/api/quotations/{id}/acceptances", get(acceptance_history))
        .route("/api/customer-acceptances", post(record_acceptance))
        .route("/api/customer-acceptances/{id}/cancel", post(cancel_acceptance))
        .route("/api/customer-po-upload", post(upload_purchase_order))
        .route("/api/quotations/{id}/purchase-orders", get(purchase_orders))
        .route("/api/purchase-orders/{id}/reconciliation", get(reconcile_purchase_order))
        .with_state(ApiState { service })
}

async fn calculate_price(
    State(state): State<ApiState>,
    Json(body): Json<PricingRequest>,
) -> ApiResult<PriceBreakdown> {
    let correlation_id = new_id("req");
    state.service.price(&body).map(Json).map_err(|error| reject(error, &correlation_id))
}

async fn upsert_customer(
    State(state): State<ApiState>,
    Json(body): Json<Customer>,
) -> ApiResult<Customer> {
    let correlation_id = new_id("req");
    state
        .service
        .upsert_customer(body)
        .await
        .map(Json)
        .map_err(|error| reject(error, &correlation_id))
}

async fn upsert_item(State(state): State<ApiState>, Json(body): Json<Item>) -> ApiResult<Item> {
    let correlation_id = new_id("req");
    state.service.upsert_item(body).await.map(Json).map_err(|error| reject(error, &correlation_id))
}

async fn create_quotation(
    State(state): State<ApiState>,
    Json(body): Json<CreateQuotationRequest>,
) -> ApiResult<PricedQuotation> {
    let correlation_id = new_id("req");
    state
        .service
        .create_quotation(body, &correlation_id)
        .await
        .map(Json)
        .map_err(|error| reject(error, &correlation_id))
}

async fn get_quotation(
    Path(id): Path<String>,
    State(state): State<ApiState>,
) -> ApiResult<Quotation> {
    let correlation_id = new_id("req");
    state
        .service
        .get_quotation(&QuotationId(id))
        .await
        .map(Json)
        .map_err(|error| reject(error, &correlation_id))
}

async fn change_status(
    Path(id): Path<String>,
    State(state): State<ApiState>,
    Json(body): Json<StatusChangeRequest>,
) -> ApiResult<Quotation> {
    let correlation_id = new_id("req");
    state
        .service
        .transition_quotation(&QuotationId(id), body.status, &correlation_id)
        .await
        .map(Json)
        .map_err(|error| reject(error, &correlation_id))
}

async fn revise_quotation(
    Path(id): Path<String>,
    State(state): State<ApiState>,
) -> ApiResult<Quotation> {
    let correlation_id = new_id("req");
    state
        .service
        .revise_quotation(&QuotationId(id), &correlation_id)
        .await
        .map(Json)
        .map_err(|error| reject(error, &correlation_id))
}

async fn record_acceptance(
    State(state): State<ApiState>,
    Json(body): Json<RecordAcceptanceRequest>,
) -> ApiResult<AcceptanceOutcome> {
    let correlation_id = new_id("req");
    let request = AcceptanceRequest {
        acceptance_type: body.acceptance_type,
        accepted_by: body.accepted_by,
        notes: body.notes,
        items: body.items,
    };
    state
        .service
        .record_acceptance(&body.quotation_id, request, &correlation_id)
        .await
        .map(Json)
        .map_err(|error| reject(error, &correlation_id))
}

async fn active_acceptance(
    Path(id): Path<String>,
    State(state): State<ApiState>,
) -> ApiResult<ActiveAcceptance> {
    let correlation_id = new_id("req");
    state
        .service
        .active_acceptance(&QuotationId(id))
        .await
        .map(Json)
        .map_err(|error| reject(error, &correlation_id))
}

async fn acceptance_history(
    Path(id): Path<String>,
    State(state): State<ApiState>,
) -> ApiResult<Vec<CustomerAcceptance>> {
    let correlation_id = new_id("req");
    state
        .service
        .acceptance_history(&QuotationId(id))
        .await
        .map(Json)
        .map_err(|error| reject(error, &correlation_id))
}

async fn cancel_acceptance(
    Path(id): Path<String>,
    State(state): State<ApiState>,
) -> ApiResult<CustomerAcceptance> {
    let correlation_id = new_id("req");
    state
        .service
        .cancel_acceptance(&AcceptanceId(id), &correlation_id)
        .await
        .map(Json)
        .map_err(|error| reject(error, &correlation_id))
}

async fn upload_purchase_order(
    State(state): State<ApiState>,
    Json(body): Json<PoUploadRequest>,
) -> ApiResult<PoUploadOutcome> {
    let correlation_id = new_id("req");
    state
        .service
        .upload_purchase_order(body, &correlation_id)
        .await
        .map(Json)
        .map_err(|error| reject(error, &correlation_id))
}

async fn purchase_orders(
    Path(id): Path<String>,
    State(state): State<ApiState>,
) -> ApiResult<Vec<PurchaseOrder>> {
    let correlation_id = new_id("req");
    state
        .service
        .purchase_orders_for_quotation(&QuotationId(id))
        .await
        .map(Json)
        .map_err(|error| reject(error, &correlation_id))
}

async fn reconcile_purchase_order(
    Path(id): Path<String>,
    State(state): State<ApiState>,
) -> ApiResult<PoUploadOutcome> {
    let correlation_id = new_id("req");
    state
        .service
        .reconcile_purchase_order(&PurchaseOrderId(id), &correlation_id)
        .await
        .map(Json)
        .map_err(|error| reject(error, &correlation_id))
}

fn reject(error: ServiceError, correlation_id: &str) -> (StatusCode, Json<ErrorBody>) {
    let interface = error.into_interface(correlation_id);
    let status = match &interface {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };

    warn!(
        event_name = "api.request.rejected",
        correlation_id,
        status = status.as_u16(),
        error = %interface.message(),
        "request rejected"
    );

    (
        status,
        Json(ErrorBody {
            error: interface.message().to_string(),
            correlation_id: interface.correlation_id().to_string(),
        }),
    )
}
