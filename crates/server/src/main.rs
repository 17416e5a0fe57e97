mod bootstrap;
mod conversation;
mod dispatch;
mod health;
mod sweeper;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use kodbook_core::config::{AppConfig, LoadOptions};
use kodbook_db::SqlOrderRepository;
use kodbook_telegram::{PollingRunner, ReconnectPolicy};

use crate::conversation::ConversationService;
use crate::dispatch::KeyedDispatcher;
use crate::sweeper::IdleSweeper;

const CHAT_WORKER_IDLE: Duration = Duration::from_secs(300);

fn init_logging(config: &AppConfig) {
    use kodbook_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        app.db_pool.clone(),
        app.sessions.clone(),
    )
    .await?;

    let sweeper = IdleSweeper::new(app.sessions.clone(), &app.config.conversation)?.spawn();

    let service = Arc::new(ConversationService::new(
        app.engine.clone(),
        app.sessions.clone(),
        Arc::new(SqlOrderRepository::new(app.db_pool.clone())),
        app.telegram.clone(),
    ));
    let dispatcher = Arc::new(KeyedDispatcher::new(service, CHAT_WORKER_IDLE));
    let runner =
        PollingRunner::new(app.telegram.clone(), dispatcher.clone(), ReconnectPolicy::default());

    match app.telegram.get_me().await {
        Ok(identity) => tracing::info!(
            event_name = "telegram.bot.identified",
            correlation_id = "bootstrap",
            bot_id = identity.id,
            username = identity.username.as_deref().unwrap_or("-"),
            "telegram bot identified"
        ),
        Err(error) => tracing::warn!(
            event_name = "telegram.bot.identify_failed",
            correlation_id = "bootstrap",
            error = %error,
            "could not reach telegram yet; polling will keep retrying"
        ),
    }

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        utc_offset_minutes = app.config.conversation.utc_offset_minutes,
        "kodbook-server started"
    );

    let outcome = tokio::select! {
        polled = runner.start() => {
            if let Err(error) = &polled {
                tracing::error!(
                    event_name = "system.server.polling_failed",
                    correlation_id = "runtime",
                    error = %error,
                    "telegram polling stopped; exiting so the supervisor can restart"
                );
            }
            polled
        }
        signal = wait_for_shutdown() => signal,
    };

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "kodbook-server stopping"
    );
    dispatcher.shutdown(Duration::from_secs(app.config.server.graceful_shutdown_secs)).await;
    sweeper.abort();
    app.db_pool.close().await;

    outcome
}

#[cfg(unix)]
async fn wait_for_shutdown() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        interrupted = tokio::signal::ctrl_c() => interrupted?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
