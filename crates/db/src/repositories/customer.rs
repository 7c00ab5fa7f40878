use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use tradeflow_core::domain::customer::{Customer, CustomerId};

use super::{parse_enum, CustomerRepository, RepositoryError};
use crate::DbPool;

pub struct SqlCustomerRepository {
    pool: DbPool,
}

impl SqlCustomerRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn customer_from_row(row: &SqliteRow) -> Result<Customer, RepositoryError> {
    let customer_type: String = row.try_get("customer_type")?;
    Ok(Customer {
        id: CustomerId(row.try_get("id")?),
        name: row.try_get("name")?,
        customer_type: parse_enum("customer_type", &customer_type)?,
        classification: row.try_get("classification")?,
    })
}

#[async_trait::async_trait]
impl CustomerRepository for SqlCustomerRepository {
    async fn find_by_id(&self, id: &CustomerId) -> Result<Option<Customer>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, customer_type, classification FROM customer WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(customer_from_row).transpose()
    }

    async fn save(&self, customer: Customer) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO customer (id, name, customer_type, classification)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 customer_type = excluded.customer_type,
                 classification = excluded.classification",
        )
        .bind(&customer.id.0)
        .bind(&customer.name)
        .bind(customer.customer_type.as_str())
        .bind(&customer.classification)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tradeflow_core::domain::customer::{CustomerId, CustomerType};

    use super::SqlCustomerRepository;
    use crate::repositories::test_support::{customer, setup};
    use crate::repositories::CustomerRepository;

    #[tokio::test]
    async fn save_and_find_by_id() {
        let repo = SqlCustomerRepository::new(setup().await);
        let customer = customer("CUS-100");

        repo.save(customer.clone()).await.expect("save");
        let found = repo.find_by_id(&customer.id).await.expect("find");

        assert_eq!(found, Some(customer));
    }

    #[tokio::test]
    async fn save_upserts_on_conflict() {
        let repo = SqlCustomerRepository::new(setup().await);
        let mut customer = customer("CUS-100");
        repo.save(customer.clone()).await.expect("save");

        customer.customer_type = CustomerType::Retail;
        customer.classification = None;
        repo.save(customer.clone()).await.expect("upsert");

        let found = repo.find_by_id(&customer.id).await.expect("find").expect("exists");
        assert_eq!(found.customer_type, CustomerType::Retail);
        assert_eq!(found.classification, None);
    }

    #[tokio::test]
    async fn missing_customer_is_none() {
        let repo = SqlCustomerRepository::new(setup().await);
        let found = repo.find_by_id(&CustomerId("CUS-404".to_string())).await.expect("find");
        assert!(found.is_none());
    }
}
