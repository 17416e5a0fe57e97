use std::{sync::Arc, time::Duration};

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::updates::{decode_update, DecodedUpdate, InboundHandler, Update};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("update poll failed: {0}")]
    Poll(String),
    #[error("callback answer failed: {0}")]
    Answer(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 8, base_delay_ms: 500, max_delay_ms: 30_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// Where updates come from. `Ok(None)` means the source is closed for good.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    async fn fetch_updates(&self, offset: Option<i64>)
        -> Result<Option<Vec<Update>>, TransportError>;
    async fn answer_callback(&self, callback_query_id: &str) -> Result<(), TransportError>;
}

pub struct PollingRunner {
    source: Arc<dyn UpdateSource>,
    handler: Arc<dyn InboundHandler>,
    reconnect_policy: ReconnectPolicy,
}

impl PollingRunner {
    pub fn new(
        source: Arc<dyn UpdateSource>,
        handler: Arc<dyn InboundHandler>,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { source, handler, reconnect_policy }
    }

    /// Polls until the source closes. Consecutive failures back off; once
    /// `max_retries` is exceeded the runner returns an error so the process can exit
    /// and be restarted instead of idling without a poller.
    pub async fn start(&self) -> Result<()> {
        let mut offset = None;
        let mut failures = 0_u32;

        loop {
            match self.source.fetch_updates(offset).await {
                Ok(Some(updates)) => {
                    failures = 0;
                    for update in updates {
                        offset = Some(update.update_id + 1);
                        self.deliver(update).await;
                    }
                }
                Ok(None) => {
                    info!(event_name = "ingress.telegram.source_closed", "update source closed");
                    return Ok(());
                }
                Err(transport_error) => {
                    warn!(
                        event_name = "ingress.telegram.poll_failed",
                        attempt = failures,
                        max_retries = self.reconnect_policy.max_retries,
                        error = %transport_error,
                        "telegram update poll failed"
                    );

                    if failures >= self.reconnect_policy.max_retries {
                        let attempts = failures + 1;
                        bail!("telegram polling gave up after {attempts} tries: {transport_error}");
                    }

                    let delay = self.reconnect_policy.backoff(failures);
                    failures += 1;
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }

    async fn deliver(&self, update: Update) {
        if let Some(query_id) = update.callback_query_id() {
            if let Err(error) = self.source.answer_callback(query_id).await {
                warn!(
                    event_name = "ingress.telegram.callback_answered",
                    update_id = update.update_id,
                    error = %error,
                    "failed to answer callback query"
                );
            }
        }

        match decode_update(&update, Utc::now()) {
            DecodedUpdate::Event(event) => {
                info!(
                    event_name = "ingress.telegram.update_received",
                    update_id = update.update_id,
                    correlation_id = %event.correlation_id,
                    chat_key = %event.chat_key,
                    "received telegram update"
                );
                let correlation_id = event.correlation_id.clone();
                if let Err(error) = self.handler.dispatch(event).await {
                    warn!(
                        correlation_id = %correlation_id,
                        error = %error,
                        "event dispatch failed; continuing poll loop"
                    );
                }
            }
            DecodedUpdate::Undecodable { chat_key, payload } => {
                warn!(
                    event_name = "ingress.telegram.callback_rejected",
                    update_id = update.update_id,
                    chat_key = %chat_key,
                    payload = %payload,
                    "dropping undecodable callback payload"
                );
            }
            DecodedUpdate::Ignored => {
                debug!(update_id = update.update_id, "ignoring unsupported telegram update");
            }
        }
    }
}
