use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use tradeflow_core::domain::item::{Item, ItemId};

use super::{parse_decimal, parse_optional_decimal, ItemRepository, RepositoryError};
use crate::DbPool;

pub struct SqlItemRepository {
    pool: DbPool,
}

impl SqlItemRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn item_from_row(row: &SqliteRow) -> Result<Item, RepositoryError> {
    let cost_price: String = row.try_get("cost_price")?;
    Ok(Item {
        id: ItemId(row.try_get("id")?),
        code: row.try_get("code")?,
        name: row.try_get("name")?,
        category: row.try_get("category")?,
        cost_price: parse_decimal("cost_price", &cost_price)?,
        markup_pct: parse_optional_decimal("markup_pct", row.try_get("markup_pct")?)?,
    })
}

#[async_trait::async_trait]
impl ItemRepository for SqlItemRepository {
    async fn find_by_id(&self, id: &ItemId) -> Result<Option<Item>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, code, name, category, cost_price, markup_pct FROM item WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(item_from_row).transpose()
    }

    async fn save(&self, item: Item) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO item (id, code, name, category, cost_price, markup_pct)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 code = excluded.code,
                 name = excluded.name,
                 category = excluded.category,
                 cost_price = excluded.cost_price,
                 markup_pct = excluded.markup_pct",
        )
        .bind(&item.id.0)
        .bind(&item.code)
        .bind(&item.name)
        .bind(&item.category)
        .bind(item.cost_price.to_string())
        .bind(item.markup_pct.map(|markup| markup.to_string()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use tradeflow_core::domain::item::{Item, ItemId};

    use super::SqlItemRepository;
    use crate::repositories::test_support::setup;
    use crate::repositories::ItemRepository;

    fn valve() -> Item {
        Item {
            id: ItemId("ITM-VLV-050".to_string()),
            code: "VLV-050".to_string(),
            name: "Gate valve 50mm".to_string(),
            category: Some("valves".to_string()),
            cost_price: Decimal::new(18250, 2),
            markup_pct: Some(Decimal::new(175, 1)),
        }
    }

    #[tokio::test]
    async fn decimals_survive_storage_exactly() {
        let repo = SqlItemRepository::new(setup().await);
        let item = valve();

        repo.save(item.clone()).await.expect("save");
        let found = repo.find_by_id(&item.id).await.expect("find").expect("exists");

        assert_eq!(found, item);
        assert_eq!(found.cost_price.to_string(), "182.50");
    }

    #[tokio::test]
    async fn clearing_markup_override_is_persisted() {
        let repo = SqlItemRepository::new(setup().await);
        let mut item = valve();
        repo.save(item.clone()).await.expect("save");

        item.markup_pct = None;
        repo.save(item.clone()).await.expect("upsert");

        let found = repo.find_by_id(&item.id).await.expect("find").expect("exists");
        assert_eq!(found.markup_pct, None);
    }
}
