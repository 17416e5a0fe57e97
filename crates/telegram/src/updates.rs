use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use kodbook_core::flows::{ButtonAction, Command, EventKind, InboundEvent};
use kodbook_core::ChatKey;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct User {
    pub id: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub data: Option<String>,
}

impl Update {
    pub fn callback_query_id(&self) -> Option<&str> {
        self.callback_query.as_ref().map(|query| query.id.as_str())
    }
}

/// What a raw update turned into.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodedUpdate {
    Event(InboundEvent),
    Undecodable { chat_key: ChatKey, payload: String },
    Ignored,
}

/// Normalizes a raw update. Photos, stickers and other non-text messages are ignored.
pub fn decode_update(update: &Update, received_at: DateTime<Utc>) -> DecodedUpdate {
    let correlation_id = format!("tg-{}", update.update_id);

    if let Some(query) = &update.callback_query {
        let chat_key = query
            .message
            .as_ref()
            .map(|message| ChatKey::from(message.chat.id))
            .unwrap_or_else(|| ChatKey::from(query.from.id));
        let payload = query.data.clone().unwrap_or_default();

        return match payload.parse::<ButtonAction>() {
            Ok(action) => DecodedUpdate::Event(
                InboundEvent::new(chat_key, EventKind::Button(action), received_at)
                    .with_correlation_id(correlation_id),
            ),
            Err(_) => DecodedUpdate::Undecodable { chat_key, payload },
        };
    }

    let Some(message) = &update.message else {
        return DecodedUpdate::Ignored;
    };
    let Some(text) = message.text.as_deref() else {
        return DecodedUpdate::Ignored;
    };

    let kind = match Command::parse(text) {
        Some(command) => EventKind::Command(command),
        None => EventKind::Text(text.to_owned()),
    };
    DecodedUpdate::Event(
        InboundEvent::new(ChatKey::from(message.chat.id), kind, received_at)
            .with_correlation_id(correlation_id),
    )
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("inbound queue closed for chat {0}")]
    QueueClosed(String),
}

/// Receives every decoded event, in the order updates arrived.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    async fn dispatch(&self, event: InboundEvent) -> Result<(), DispatchError>;
}
