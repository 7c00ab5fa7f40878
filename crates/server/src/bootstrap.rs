use std::sync::Arc;

use axum::Router;
use thiserror::Error;
use tracing::info;
use tradeflow_core::config::{AppConfig, ConfigError, LoadOptions};
use tradeflow_core::pricing::DeterministicPricingEngine;
use tradeflow_db::{connect_from_config, migrations, DbPool};

use crate::services::{Repositories, WorkflowService};
use crate::{api, health};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub service: Arc<WorkflowService>,
}

impl Application {
    /// API routes plus `/health`.
    pub fn router(&self) -> Router {
        api::router(self.service.clone()).merge(health::router(self.db_pool.clone()))
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool =
        connect_from_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        bundled = migrations::bundled_count(),
        "database migrations applied"
    );

    let engine = Arc::new(DeterministicPricingEngine::new(config.pricing.clone()));
    let service = Arc::new(WorkflowService::new(
        Repositories::sql(db_pool.clone()),
        engine,
        config.pricing.base_currency.clone(),
    ));

    Ok(Application { config, db_pool, service })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;
    use tracing::field::{Field, Visit};
    use tracing::{Event, Subscriber};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
    use tradeflow_core::config::{ConfigOverrides, LoadOptions};

    use crate::bootstrap::bootstrap;

    fn in_memory() -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    /// Records the field names of every event, keyed by `event_name`.
    #[derive(Clone, Default)]
    struct EventFields(Arc<Mutex<Vec<(String, Vec<String>)>>>);

    #[derive(Default)]
    struct FieldVisitor {
        event_name: String,
        names: Vec<String>,
    }

    impl Visit for FieldVisitor {
        fn record_str(&mut self, field: &Field, value: &str) {
            if field.name() == "event_name" {
                self.event_name = value.to_string();
            }
            self.names.push(field.name().to_string());
        }

        fn record_debug(&mut self, field: &Field, _value: &dyn std::fmt::Debug) {
            self.names.push(field.name().to_string());
        }
    }

    impl<S: Subscriber> Layer<S> for EventFields {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            let mut visitor = FieldVisitor::default();
            event.record(&mut visitor);
            if let Ok(mut events) = self.0.lock() {
                events.push((visitor.event_name, visitor.names));
            }
        }
    }

    #[tokio::test]
    async fn lifecycle_events_carry_no_quotation_placeholder() {
        let fields = EventFields::default();
        let subscriber = tracing_subscriber::registry().with(fields.clone());
        let _guard = tracing::subscriber::set_default(subscriber);

        let app = bootstrap(in_memory()).await.expect("bootstrap should succeed");
        app.db_pool.close().await;

        let events = fields.0.lock().expect("events").clone();
        let bootstrap_events: Vec<&(String, Vec<String>)> =
            events.iter().filter(|(name, _)| name.starts_with("system.bootstrap.")).collect();
        assert!(bootstrap_events.len() >= 3, "{events:?}");
        for (name, names) in bootstrap_events {
            assert!(names.iter().any(|field| field == "correlation_id"), "{name}: {names:?}");
            assert!(!names.iter().any(|field| field == "quotation_id"), "{name}: {names:?}");
        }
    }

    #[tokio::test]
    async fn bootstrap_rejects_invalid_base_currency() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                base_currency: Some("DOLLARS".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        let message = result.err().expect("error").to_string();
        assert!(message.contains("pricing.base_currency"));
    }

    #[tokio::test]
    async fn bootstrapped_app_has_schema_and_serves_health() {
        let app = bootstrap(in_memory()).await.expect("bootstrap should succeed");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('quotation', 'customer_acceptance', 'purchase_order')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("schema should exist after bootstrap");
        assert_eq!(table_count, 3);

        let response = app
            .router()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let payload: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(payload["status"], "ready");

        app.db_pool.close().await;
    }
}
