use std::sync::Arc;

use kodbook_core::config::{AppConfig, ConfigError, LoadOptions};
use kodbook_core::{ConversationEngine, SessionStore};
use kodbook_db::{connect_from_config, migrations, DbPool};
use kodbook_telegram::{BotApiClient, ClientError};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub engine: ConversationEngine,
    pub sessions: Arc<SessionStore>,
    pub telegram: Arc<BotApiClient>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("conversation.utc_offset_minutes `{0}` is not a valid offset")]
    UtcOffset(i32),
    #[error("telegram client setup failed: {0}")]
    Telegram(#[source] ClientError),
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
        "database migrations applied"
    );

    let offset = config.conversation.utc_offset_minutes;
    let engine = ConversationEngine::from_utc_offset_minutes(offset)
        .ok_or(BootstrapError::UtcOffset(offset))?;
    let telegram = BotApiClient::new(&config.telegram).map_err(BootstrapError::Telegram)?;

    Ok(Application {
        config,
        db_pool,
        engine,
        sessions: Arc::new(SessionStore::new()),
        telegram: Arc::new(telegram),
    })
}
