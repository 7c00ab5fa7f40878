use std::collections::HashSet;

use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use tradeflow_core::domain::customer::CustomerId;
use tradeflow_core::domain::item::ItemId;
use tradeflow_core::domain::quotation::{Quotation, QuotationId, QuotationItem, QuotationItemId};

use super::{
    parse_decimal, parse_enum, parse_optional_timestamp, parse_timestamp, QuotationRepository,
    RepositoryError,
};
use crate::DbPool;

const QUOTATION_COLUMNS: &str = "id, quotation_number, customer_id, status, currency, revision,
     parent_id, subtotal, valid_until, notes, created_at, updated_at";

pub struct SqlQuotationRepository {
    pool: DbPool,
}

impl SqlQuotationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load_items(&self, quotation_id: &str) -> Result<Vec<QuotationItem>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, item_id, description, quantity, unit_price, line_total
             FROM quotation_item WHERE quotation_id = ? ORDER BY line_no ASC",
        )
        .bind(quotation_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(item_from_row).collect()
    }

    async fn hydrate(&self, row: &SqliteRow) -> Result<Quotation, RepositoryError> {
        let mut quotation = header_from_row(row)?;
        quotation.items = self.load_items(&quotation.id.0).await?;
        Ok(quotation)
    }
}

fn header_from_row(row: &SqliteRow) -> Result<Quotation, RepositoryError> {
    let status: String = row.try_get("status")?;
    let revision: i64 = row.try_get("revision")?;
    let subtotal: String = row.try_get("subtotal")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Quotation {
        id: QuotationId(row.try_get("id")?),
        quotation_number: row.try_get("quotation_number")?,
        customer_id: CustomerId(row.try_get("customer_id")?),
        status: parse_enum("status", &status)?,
        currency: row.try_get("currency")?,
        revision: u32::try_from(revision).map_err(|_| {
            RepositoryError::Decode(format!("invalid value for `revision`: {revision}"))
        })?,
        parent_id: row.try_get::<Option<String>, _>("parent_id")?.map(QuotationId),
        items: Vec::new(),
        subtotal: parse_decimal("subtotal", &subtotal)?,
        valid_until: parse_optional_timestamp("valid_until", row.try_get("valid_until")?)?,
        notes: row.try_get("notes")?,
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
    })
}

fn item_from_row(row: &SqliteRow) -> Result<QuotationItem, RepositoryError> {
    let quantity: String = row.try_get("quantity")?;
    let unit_price: String = row.try_get("unit_price")?;
    let line_total: String = row.try_get("line_total")?;

    Ok(QuotationItem {
        id: QuotationItemId(row.try_get("id")?),
        item_id: row.try_get::<Option<String>, _>("item_id")?.map(ItemId),
        description: row.try_get("description")?,
        quantity: parse_decimal("quantity", &quantity)?,
        unit_price: parse_decimal("unit_price", &unit_price)?,
        line_total: parse_decimal("line_total", &line_total)?,
    })
}

#[async_trait::async_trait]
impl QuotationRepository for SqlQuotationRepository {
    async fn find_by_id(&self, id: &QuotationId) -> Result<Option<Quotation>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {QUOTATION_COLUMNS} FROM quotation WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    async fn save(&self, quotation: Quotation) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO quotation (id, quotation_number, customer_id, status, currency, revision,
                                    parent_id, subtotal, valid_until, notes, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 quotation_number = excluded.quotation_number,
                 status = excluded.status,
                 currency = excluded.currency,
                 subtotal = excluded.subtotal,
                 valid_until = excluded.valid_until,
                 notes = excluded.notes,
                 updated_at = excluded.updated_at",
        )
        .bind(&quotation.id.0)
        .bind(&quotation.quotation_number)
        .bind(&quotation.customer_id.0)
        .bind(quotation.status.as_str())
        .bind(&quotation.currency)
        .bind(i64::from(quotation.revision))
        .bind(quotation.parent_id.as_ref().map(|parent| parent.0.clone()))
        .bind(quotation.subtotal.to_string())
        .bind(quotation.valid_until.map(|valid_until| valid_until.to_rfc3339()))
        .bind(&quotation.notes)
        .bind(quotation.created_at.to_rfc3339())
        .bind(quotation.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        let existing: Vec<String> =
            sqlx::query_scalar("SELECT id FROM quotation_item WHERE quotation_id = ?")
                .bind(&quotation.id.0)
                .fetch_all(&mut *tx)
                .await?;
        let current: HashSet<&str> = quotation.items.iter().map(|item| item.id.0.as_str()).collect();
        for stale in existing.iter().filter(|id| !current.contains(id.as_str())) {
            sqlx::query("DELETE FROM quotation_item WHERE id = ?")
                .bind(stale)
                .execute(&mut *tx)
                .await?;
        }

        for (line_no, item) in quotation.items.iter().enumerate() {
            sqlx::query(
                "INSERT INTO quotation_item (id, quotation_id, line_no, item_id, description,
                                             quantity, unit_price, line_total)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                     line_no = excluded.line_no,
                     item_id = excluded.item_id,
                     description = excluded.description,
                     quantity = excluded.quantity,
                     unit_price = excluded.unit_price,
                     line_total = excluded.line_total",
            )
            .bind(&item.id.0)
            .bind(&quotation.id.0)
            .bind(line_no as i64)
            .bind(item.item_id.as_ref().map(|id| id.0.clone()))
            .bind(&item.description)
            .bind(item.quantity.to_string())
            .bind(item.unit_price.to_string())
            .bind(item.line_total.to_string())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_revisions(
        &self,
        parent_id: &QuotationId,
    ) -> Result<Vec<Quotation>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {QUOTATION_COLUMNS} FROM quotation WHERE parent_id = ? ORDER BY revision ASC"
        ))
        .bind(&parent_id.0)
        .fetch_all(&self.pool)
        .await?;

        let mut revisions = Vec::with_capacity(rows.len());
        for row in &rows {
            revisions.push(self.hydrate(row).await?);
        }
        Ok(revisions)
    }
}
