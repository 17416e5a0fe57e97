use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use kodbook_core::config::ConversationConfig;
use kodbook_core::SessionStore;

/// Periodically discards sessions nobody has touched for `max_idle`.
pub struct IdleSweeper {
    sessions: Arc<SessionStore>,
    max_idle: chrono::Duration,
    interval: Duration,
}

impl IdleSweeper {
    pub fn new(
        sessions: Arc<SessionStore>,
        config: &ConversationConfig,
    ) -> Result<Self, chrono::OutOfRangeError> {
        Ok(Self {
            sessions,
            max_idle: chrono::Duration::from_std(config.session_idle())?,
            interval: config.sweep_interval(),
        })
    }

    pub async fn sweep_once(&self, now: DateTime<Utc>) -> usize {
        let expired = self.sessions.sweep_idle(now, self.max_idle).await;
        if expired > 0 {
            info!(
                event_name = "conversation.session.expired",
                correlation_id = "sweeper",
                expired,
                "discarded idle sessions"
            );
        } else {
            debug!(event_name = "conversation.session.sweep", "no idle sessions");
        }
        expired
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.sweep_once(Utc::now()).await;
            }
        })
    }
}
