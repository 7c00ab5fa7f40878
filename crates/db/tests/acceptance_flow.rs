use chrono::Utc;
use rust_decimal::Decimal;

use tradeflow_core::acceptance::{build_acceptance, AcceptanceRequest, ItemSelection};
use tradeflow_core::domain::acceptance::AcceptanceType;
use tradeflow_core::domain::customer::{Customer, CustomerId, CustomerType};
use tradeflow_core::domain::purchase_order::{
    PoLineItem, PurchaseOrder, PurchaseOrderId, PurchaseOrderStatus,
};
use tradeflow_core::domain::quotation::{Quotation, QuotationItem, QuotationStatus};
use tradeflow_core::reconcile::{reconcile, IssueKind};
use tradeflow_db::repositories::{
    AcceptanceRepository, CustomerRepository, PurchaseOrderRepository, QuotationRepository,
    SqlAcceptanceRepository, SqlCustomerRepository, SqlPurchaseOrderRepository,
    SqlQuotationRepository,
};
use tradeflow_db::{connect_with_settings, migrations, DbPool};

type FlowTestResult<T = ()> = Result<T, String>;

macro_rules! require {
    ($cond:expr, $($arg:tt)*) => {
        if !$cond {
            return Err(format!($($arg)*));
        }
    };
}

macro_rules! require_eq {
    ($left:expr, $right:expr) => {
        if $left != $right {
            return Err(format!(
                "assertion failed: `left == right` (`{:?}` != `{:?}`)",
                $left,
                $right
            ));
        }
    };
}

async fn setup() -> FlowTestResult<DbPool> {
    let pool = connect_with_settings("sqlite::memory:", 1, 30)
        .await
        .map_err(|error| format!("connect: {error}"))?;
    migrations::run_pending(&pool).await.map_err(|error| format!("migrate: {error}"))?;
    Ok(pool)
}

async fn sent_quotation(pool: &DbPool) -> FlowTestResult<Quotation> {
    SqlCustomerRepository::new(pool.clone())
        .save(Customer {
            id: CustomerId("CUS-GM".to_string()),
            name: "Gulf Marine Supplies".to_string(),
            customer_type: CustomerType::Wholesale,
            classification: None,
        })
        .await
        .map_err(|error| format!("save customer: {error}"))?;

    let mut quotation = Quotation::draft(
        "QT-2026-0500",
        CustomerId("CUS-GM".to_string()),
        "USD",
        vec![
            QuotationItem::new(None, "Mooring rope 24mm", Decimal::new(100, 0), Decimal::new(1200, 2)),
            QuotationItem::new(None, "Shackle 10t", Decimal::new(20, 0), Decimal::new(6500, 2)),
            QuotationItem::new(None, "Fender 600mm", Decimal::new(6, 0), Decimal::new(41000, 2)),
        ],
    );
    quotation.transition_to(QuotationStatus::Sent).map_err(|error| error.to_string())?;
    SqlQuotationRepository::new(pool.clone())
        .save(quotation.clone())
        .await
        .map_err(|error| format!("save quotation: {error}"))?;
    Ok(quotation)
}

#[tokio::test]
async fn partial_acceptance_then_po_reconciliation() -> FlowTestResult {
    let pool = setup().await?;
    let mut quotation = sent_quotation(&pool).await?;
    let acceptances = SqlAcceptanceRepository::new(pool.clone());

    let acceptance = build_acceptance(
        &quotation,
        &AcceptanceRequest {
            acceptance_type: AcceptanceType::Partial,
            accepted_by: "ops@gulfmarine.example".to_string(),
            notes: None,
            items: vec![
                ItemSelection {
                    quotation_item_id: quotation.items[0].id.clone(),
                    quantity: Some(Decimal::new(60, 0)),
                    notes: None,
                },
                ItemSelection {
                    quotation_item_id: quotation.items[2].id.clone(),
                    quantity: Some(Decimal::new(10, 0)),
                    notes: Some("only six quoted".to_string()),
                },
            ],
        },
    )
    .map_err(|error| error.to_string())?;
    acceptances.record(acceptance).await.map_err(|error| format!("record: {error}"))?;

    quotation.transition_to(QuotationStatus::Accepted).map_err(|error| error.to_string())?;
    SqlQuotationRepository::new(pool.clone())
        .save(quotation.clone())
        .await
        .map_err(|error| format!("save accepted quotation: {error}"))?;

    let active = acceptances
        .find_active(&quotation.id)
        .await
        .map_err(|error| format!("find active: {error}"))?
        .ok_or_else(|| "active acceptance should exist".to_string())?;
    let fender = active
        .accepted_item(&quotation.items[2].id)
        .ok_or_else(|| "fender should be accepted".to_string())?;
    require_eq!(fender.accepted_quantity, Decimal::new(6, 0));
    require!(active.accepted_item(&quotation.items[1].id).is_none(), "shackle was not selected");

    let lines = vec![
        PoLineItem {
            id: "POL-1".to_string(),
            quotation_item_id: Some(quotation.items[0].id.clone()),
            description: "Mooring rope".to_string(),
            quantity: Decimal::new(60, 0),
            unit_price: Decimal::new(1200, 2),
        },
        PoLineItem {
            id: "POL-2".to_string(),
            quotation_item_id: Some(quotation.items[1].id.clone()),
            description: "Shackle".to_string(),
            quantity: Decimal::new(5, 0),
            unit_price: Decimal::new(6500, 2),
        },
    ];
    let report = reconcile(&lines, &quotation, Some(&active));
    require_eq!(report.status, PurchaseOrderStatus::RequiresReview);
    require_eq!(report.issues.len(), 1);
    require_eq!(report.issues[0].kind, IssueKind::ItemNotAccepted);

    let orders = SqlPurchaseOrderRepository::new(pool.clone());
    let mut order = PurchaseOrder {
        id: PurchaseOrderId("PO-GM-1".to_string()),
        quotation_id: quotation.id.clone(),
        po_number: "GM-7781".to_string(),
        po_date: None,
        status: report.status,
        total_amount: Decimal::ZERO,
        lines,
        created_at: Utc::now(),
    };
    order.total_amount = order.lines_total();
    orders.save(order.clone()).await.map_err(|error| format!("save po: {error}"))?;

    let stored = orders
        .find_by_id(&order.id)
        .await
        .map_err(|error| format!("find po: {error}"))?
        .ok_or_else(|| "po should exist".to_string())?;
    require_eq!(stored.status, PurchaseOrderStatus::RequiresReview);
    require_eq!(stored.total_amount, Decimal::new(104500, 2));
    Ok(())
}

#[tokio::test]
async fn only_one_active_acceptance_can_exist_per_quotation() -> FlowTestResult {
    let pool = setup().await?;
    let quotation = sent_quotation(&pool).await?;
    let request = AcceptanceRequest {
        acceptance_type: AcceptanceType::Full,
        accepted_by: "ops@gulfmarine.example".to_string(),
        notes: None,
        items: Vec::new(),
    };
    let first = build_acceptance(&quotation, &request).map_err(|error| error.to_string())?;
    let second = build_acceptance(&quotation, &request).map_err(|error| error.to_string())?;

    // Bypasses the repository to hit the partial unique index directly.
    sqlx::query(
        "INSERT INTO customer_acceptance (id, quotation_id, acceptance_type, status, accepted_by, accepted_at)
         VALUES (?, ?, 'full', 'active', 'x', ?), (?, ?, 'full', 'active', 'y', ?)",
    )
    .bind(&first.id.0)
    .bind(&quotation.id.0)
    .bind(first.accepted_at.to_rfc3339())
    .bind(&second.id.0)
    .bind(&quotation.id.0)
    .bind(second.accepted_at.to_rfc3339())
    .execute(&pool)
    .await
    .err()
    .ok_or_else(|| "second active row should violate the unique index".to_string())?;

    let acceptances = SqlAcceptanceRepository::new(pool);
    acceptances.record(first).await.map_err(|error| format!("record first: {error}"))?;
    acceptances.record(second.clone()).await.map_err(|error| format!("record second: {error}"))?;
    let history = acceptances
        .list_for_quotation(&quotation.id)
        .await
        .map_err(|error| format!("history: {error}"))?;
    require_eq!(history.iter().filter(|entry| entry.is_active()).count(), 1);
    require_eq!(history[0].id, second.id);
    Ok(())
}
