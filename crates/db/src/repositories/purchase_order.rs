use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use tradeflow_core::domain::purchase_order::{PoLineItem, PurchaseOrder, PurchaseOrderId};
use tradeflow_core::domain::quotation::{QuotationId, QuotationItemId};

use super::{
    parse_decimal, parse_enum, parse_optional_date, parse_timestamp, PurchaseOrderRepository,
    RepositoryError,
};
use crate::DbPool;

const PURCHASE_ORDER_COLUMNS: &str =
    "id, quotation_id, po_number, po_date, status, total_amount, created_at";

pub struct SqlPurchaseOrderRepository {
    pool: DbPool,
}

impl SqlPurchaseOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn hydrate(&self, row: &SqliteRow) -> Result<PurchaseOrder, RepositoryError> {
        let mut purchase_order = header_from_row(row)?;
        let rows = sqlx::query(
            "SELECT id, quotation_item_id, description, quantity, unit_price
             FROM po_line_item WHERE purchase_order_id = ? ORDER BY line_no ASC",
        )
        .bind(&purchase_order.id.0)
        .fetch_all(&self.pool)
        .await?;

        purchase_order.lines = rows.iter().map(line_from_row).collect::<Result<Vec<_>, _>>()?;
        Ok(purchase_order)
    }
}

fn header_from_row(row: &SqliteRow) -> Result<PurchaseOrder, RepositoryError> {
    let status: String = row.try_get("status")?;
    let total_amount: String = row.try_get("total_amount")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(PurchaseOrder {
        id: PurchaseOrderId(row.try_get("id")?),
        quotation_id: QuotationId(row.try_get("quotation_id")?),
        po_number: row.try_get("po_number")?,
        po_date: parse_optional_date("po_date", row.try_get("po_date")?)?,
        status: parse_enum("status", &status)?,
        total_amount: parse_decimal("total_amount", &total_amount)?,
        lines: Vec::new(),
        created_at: parse_timestamp("created_at", &created_at)?,
    })
}

fn line_from_row(row: &SqliteRow) -> Result<PoLineItem, RepositoryError> {
    let quantity: String = row.try_get("quantity")?;
    let unit_price: String = row.try_get("unit_price")?;

    Ok(PoLineItem {
        id: row.try_get("id")?,
        quotation_item_id: row
            .try_get::<Option<String>, _>("quotation_item_id")?
            .map(QuotationItemId),
        description: row.try_get("description")?,
        quantity: parse_decimal("quantity", &quantity)?,
        unit_price: parse_decimal("unit_price", &unit_price)?,
    })
}

#[async_trait::async_trait]
impl PurchaseOrderRepository for SqlPurchaseOrderRepository {
    async fn find_by_id(
        &self,
        id: &PurchaseOrderId,
    ) -> Result<Option<PurchaseOrder>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {PURCHASE_ORDER_COLUMNS} FROM purchase_order WHERE id = ?"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    /// Header fields are upserted; lines are replaced wholesale.
    async fn save(&self, purchase_order: PurchaseOrder) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO purchase_order (id, quotation_id, po_number, po_date, status,
                                         total_amount, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 po_number = excluded.po_number,
                 po_date = excluded.po_date,
                 status = excluded.status,
                 total_amount = excluded.total_amount",
        )
        .bind(&purchase_order.id.0)
        .bind(&purchase_order.quotation_id.0)
        .bind(&purchase_order.po_number)
        .bind(purchase_order.po_date.map(|date| date.format("%Y-%m-%d").to_string()))
        .bind(purchase_order.status.as_str())
        .bind(purchase_order.total_amount.to_string())
        .bind(purchase_order.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM po_line_item WHERE purchase_order_id = ?")
            .bind(&purchase_order.id.0)
            .execute(&mut *tx)
            .await?;

        for (line_no, line) in purchase_order.lines.iter().enumerate() {
            sqlx::query(
                "INSERT INTO po_line_item (id, purchase_order_id, line_no, quotation_item_id,
                                           description, quantity, unit_price)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&line.id)
            .bind(&purchase_order.id.0)
            .bind(line_no as i64)
            .bind(line.quotation_item_id.as_ref().map(|id| id.0.clone()))
            .bind(&line.description)
            .bind(line.quantity.to_string())
            .bind(line.unit_price.to_string())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_for_quotation(
        &self,
        quotation_id: &QuotationId,
    ) -> Result<Vec<PurchaseOrder>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {PURCHASE_ORDER_COLUMNS} FROM purchase_order
             WHERE quotation_id = ? ORDER BY rowid ASC"
        ))
        .bind(&quotation_id.0)
        .fetch_all(&self.pool)
        .await?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in &rows {
            orders.push(self.hydrate(row).await?);
        }
        Ok(orders)
    }
}
