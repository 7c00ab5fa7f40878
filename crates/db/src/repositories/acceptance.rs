use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use tradeflow_core::domain::acceptance::{
    AcceptanceId, AcceptanceStatus, CustomerAcceptance, QuotationItemAcceptance,
};
use tradeflow_core::domain::quotation::{QuotationId, QuotationItemId};

use super::{parse_decimal, parse_enum, parse_timestamp, AcceptanceRepository, RepositoryError};
use crate::DbPool;

const ACCEPTANCE_COLUMNS: &str =
    "id, quotation_id, acceptance_type, status, accepted_by, notes, accepted_at";

pub struct SqlAcceptanceRepository {
    pool: DbPool,
}

impl SqlAcceptanceRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn hydrate(&self, row: &SqliteRow) -> Result<CustomerAcceptance, RepositoryError> {
        let mut acceptance = header_from_row(row)?;
        let rows = sqlx::query(
            "SELECT id, quotation_item_id, is_accepted, accepted_quantity, notes
             FROM quotation_item_acceptance WHERE acceptance_id = ? ORDER BY line_no ASC",
        )
        .bind(&acceptance.id.0)
        .fetch_all(&self.pool)
        .await?;

        acceptance.items = rows.iter().map(item_from_row).collect::<Result<Vec<_>, _>>()?;
        Ok(acceptance)
    }

    async fn hydrate_all(
        &self,
        rows: &[SqliteRow],
    ) -> Result<Vec<CustomerAcceptance>, RepositoryError> {
        let mut acceptances = Vec::with_capacity(rows.len());
        for row in rows {
            acceptances.push(self.hydrate(row).await?);
        }
        Ok(acceptances)
    }
}

fn header_from_row(row: &SqliteRow) -> Result<CustomerAcceptance, RepositoryError> {
    let acceptance_type: String = row.try_get("acceptance_type")?;
    let status: String = row.try_get("status")?;
    let accepted_at: String = row.try_get("accepted_at")?;

    Ok(CustomerAcceptance {
        id: AcceptanceId(row.try_get("id")?),
        quotation_id: QuotationId(row.try_get("quotation_id")?),
        acceptance_type: parse_enum("acceptance_type", &acceptance_type)?,
        status: parse_enum("status", &status)?,
        accepted_by: row.try_get("accepted_by")?,
        notes: row.try_get("notes")?,
        accepted_at: parse_timestamp("accepted_at", &accepted_at)?,
        items: Vec::new(),
    })
}

fn item_from_row(row: &SqliteRow) -> Result<QuotationItemAcceptance, RepositoryError> {
    let accepted_quantity: String = row.try_get("accepted_quantity")?;
    let is_accepted: i64 = row.try_get("is_accepted")?;

    Ok(QuotationItemAcceptance {
        id: row.try_get("id")?,
        quotation_item_id: QuotationItemId(row.try_get("quotation_item_id")?),
        is_accepted: is_accepted != 0,
        accepted_quantity: parse_decimal("accepted_quantity", &accepted_quantity)?,
        notes: row.try_get("notes")?,
    })
}

#[async_trait::async_trait]
impl AcceptanceRepository for SqlAcceptanceRepository {
    async fn record(
        &self,
        acceptance: CustomerAcceptance,
    ) -> Result<Vec<AcceptanceId>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let superseded: Vec<String> = sqlx::query_scalar(
            "SELECT id FROM customer_acceptance WHERE quotation_id = ? AND status = 'active'",
        )
        .bind(&acceptance.quotation_id.0)
        .fetch_all(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE customer_acceptance SET status = ? WHERE quotation_id = ? AND status = 'active'",
        )
        .bind(AcceptanceStatus::Superseded.as_str())
        .bind(&acceptance.quotation_id.0)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO customer_acceptance (id, quotation_id, acceptance_type, status,
                                              accepted_by, notes, accepted_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&acceptance.id.0)
        .bind(&acceptance.quotation_id.0)
        .bind(acceptance.acceptance_type.as_str())
        .bind(acceptance.status.as_str())
        .bind(&acceptance.accepted_by)
        .bind(&acceptance.notes)
        .bind(acceptance.accepted_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        for (line_no, item) in acceptance.items.iter().enumerate() {
            sqlx::query(
                "INSERT INTO quotation_item_acceptance (id, acceptance_id, quotation_item_id,
                                                        line_no, is_accepted, accepted_quantity, notes)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&item.id)
            .bind(&acceptance.id.0)
            .bind(&item.quotation_item_id.0)
            .bind(line_no as i64)
            .bind(i64::from(item.is_accepted))
            .bind(item.accepted_quantity.to_string())
            .bind(&item.notes)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(superseded.into_iter().map(AcceptanceId).collect())
    }

    async fn find_by_id(
        &self,
        id: &AcceptanceId,
    ) -> Result<Option<CustomerAcceptance>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {ACCEPTANCE_COLUMNS} FROM customer_acceptance WHERE id = ?"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    async fn find_active(
        &self,
        quotation_id: &QuotationId,
    ) -> Result<Option<CustomerAcceptance>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {ACCEPTANCE_COLUMNS} FROM customer_acceptance
             WHERE quotation_id = ? AND status = 'active'"
        ))
        .bind(&quotation_id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    async fn list_for_quotation(
        &self,
        quotation_id: &QuotationId,
    ) -> Result<Vec<CustomerAcceptance>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {ACCEPTANCE_COLUMNS} FROM customer_acceptance
             WHERE quotation_id = ? ORDER BY rowid DESC"
        ))
        .bind(&quotation_id.0)
        .fetch_all(&self.pool)
        .await?;

        self.hydrate_all(&rows).await
    }

    async fn cancel(&self, id: &AcceptanceId) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE customer_acceptance SET status = ? WHERE id = ? AND status = 'active'",
        )
        .bind(AcceptanceStatus::Cancelled.as_str())
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
