use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;
use tradeflow_core::config::DatabaseConfig;

pub type DbPool = sqlx::SqlitePool;

pub async fn connect(database_url: &str) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(database_url, 5, 30).await
}

pub async fn connect_from_config(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(&config.url, config.max_connections, config.timeout_secs).await
}

/// Opens a pool with foreign keys enforced on every connection. In-memory
/// databases are pinned to one connection.
pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    let url = normalize_url(database_url);
    let max_connections = if is_in_memory(&url) { 1 } else { max_connections.max(1) };

    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                sqlx::query("PRAGMA busy_timeout = 5000").execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect(&url)
        .await
}

pub async fn ping(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await.map(|_| ())
}

/// File URLs get `mode=rwc` so a fresh deployment creates its database.
fn normalize_url(database_url: &str) -> String {
    let url = database_url.trim();
    if url == ":memory:" {
        return "sqlite::memory:".to_string();
    }
    if url.starts_with("sqlite://") && !url.contains("mode=") {
        let separator = if url.contains('?') { '&' } else { '?' };
        return format!("{url}{separator}mode=rwc");
    }
    url.to_string()
}

fn is_in_memory(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

#[cfg(test)]
mod tests {
    use super::{connect_with_settings, is_in_memory, normalize_url, ping};

    #[test]
    fn file_urls_are_created_on_demand() {
        assert_eq!(normalize_url("sqlite://tradeflow.db"), "sqlite://tradeflow.db?mode=rwc");
        assert_eq!(
            normalize_url("sqlite://tradeflow.db?cache=shared"),
            "sqlite://tradeflow.db?cache=shared&mode=rwc"
        );
        assert_eq!(normalize_url("sqlite://ro.db?mode=ro"), "sqlite://ro.db?mode=ro");
        assert_eq!(normalize_url(":memory:"), "sqlite::memory:");
        assert_eq!(normalize_url("sqlite::memory:"), "sqlite::memory:");
        assert!(is_in_memory("sqlite::memory:"));
        assert!(is_in_memory("sqlite://scratch?mode=memory"));
        assert!(!is_in_memory("sqlite://tradeflow.db?mode=rwc"));
    }

    #[tokio::test]
    async fn in_memory_pool_answers_ping() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("connect");
        ping(&pool).await.expect("ping");

        let enabled: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .expect("read pragma");
        assert_eq!(enabled, 1);
    }
}
