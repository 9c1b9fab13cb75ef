use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use edara_core::config::{AppConfig, ConfigError, LoadOptions, NotificationConfig};
use edara_core::notify::{LoggingNotifier, Notifier, NotifyError, WebhookNotifier};
use edara_core::ActionTokenSigner;
use edara_db::{connect_with_config, migrations, DbPool};

use crate::state::AppState;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub state: AppState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("notification transport setup failed: {0}")]
    Notifier(#[source] NotifyError),
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
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let notifier = notifier_for(&config.notifications).map_err(BootstrapError::Notifier)?;
    let state = AppState::from_pool(
        db_pool.clone(),
        ActionTokenSigner::new(config.action_links.signing_secret.clone()),
        config.server.public_base_url.clone(),
        notifier,
    );

    Ok(Application { config, db_pool, state })
}

fn notifier_for(config: &NotificationConfig) -> Result<Arc<dyn Notifier>, NotifyError> {
    match (config.enabled, config.webhook_url.as_deref()) {
        (true, Some(url)) => {
            info!(
                event_name = "system.bootstrap.notifier",
                correlation_id = "bootstrap",
                transport = "webhook",
                "notifications delivered through webhook"
            );
            let notifier = WebhookNotifier::new(url, Duration::from_secs(config.timeout_secs))?;
            Ok(Arc::new(notifier))
        }
        (enabled, _) => {
            if enabled {
                warn!(
                    event_name = "system.bootstrap.notifier",
                    correlation_id = "bootstrap",
                    "notifications enabled without webhook url, logging only"
                );
            }
            Ok(Arc::new(LoggingNotifier))
        }
    }
}

#[cfg(test)]
mod tests {
    use edara_core::config::{ConfigOverrides, LoadOptions};

    use crate::bootstrap::bootstrap;

    fn overrides(database_url: &str, secret: Option<&str>) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                signing_secret: secret.map(str::to_string),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_without_signing_secret() {
        let result = bootstrap(overrides("sqlite::memory:", None)).await;

        let message = result.err().expect("error").to_string();
        assert!(message.contains("action_links.signing_secret"));
    }

    #[tokio::test]
    async fn bootstrap_migrates_and_wires_repositories() {
        let options = overrides("sqlite::memory:?cache=shared", Some("bootstrap-secret-0001"));
        let app = bootstrap(options).await.expect("bootstrap should succeed with valid overrides");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' \
             AND name IN ('ticket', 'department_admin', 'ticket_activity', 'audit_event')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("approval tables should exist after bootstrap");
        assert_eq!(table_count, 4);

        let pending = app
            .state
            .tickets
            .list_pending(&edara_core::DepartmentId("DEP-1".to_string()), 10)
            .await
            .expect("repository reachable");
        assert!(pending.is_empty());

        app.db_pool.close().await;
    }
}
