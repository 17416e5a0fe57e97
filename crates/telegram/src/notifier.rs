use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use kodbook_core::flows::OutboundMessage;
use kodbook_core::ChatKey;

use crate::client::BotApiClient;
use crate::keyboard::SendMessageRequest;

/// Outbound delivery. Failures stay inside the implementation.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_message(&self, chat_key: &ChatKey, message: &OutboundMessage);
}

#[async_trait]
impl Notifier for BotApiClient {
    async fn send_message(&self, chat_key: &ChatKey, message: &OutboundMessage) {
        let request = match SendMessageRequest::build(chat_key, message) {
            Ok(request) => request,
            Err(error) => {
                warn!(
                    event_name = "egress.telegram.message_rejected",
                    chat_key = %chat_key,
                    error = %error,
                    "reply keyboard could not be rendered"
                );
                return;
            }
        };

        match self.post_message(&request).await {
            Ok(()) => debug!(
                event_name = "egress.telegram.message_sent",
                chat_key = %chat_key,
                "reply delivered"
            ),
            Err(error) => warn!(
                event_name = "egress.telegram.message_failed",
                chat_key = %chat_key,
                error = %error,
                "reply delivery failed"
            ),
        }
    }
}

/// Keeps every message instead of sending it.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(ChatKey, OutboundMessage)>>,
}

impl RecordingNotifier {
    pub async fn sent(&self) -> Vec<(ChatKey, OutboundMessage)> {
        self.sent.lock().await.clone()
    }

    pub async fn texts_for(&self, chat_key: &ChatKey) -> Vec<String> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|(key, _)| key == chat_key)
            .map(|(_, message)| message.text.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_message(&self, chat_key: &ChatKey, message: &OutboundMessage) {
        self.sent.lock().await.push((chat_key.clone(), message.clone()));
    }
}
