//! Telegram Bot API transport for kodbook.
//!
//! - **Updates** (`updates`) - raw `getUpdates` payloads and their decoding into `InboundEvent`
//! - **Keyboards** (`keyboard`) - rendering engine keyboards into reply markup
//! - **Client** (`client`) - HTTP calls against the Bot API
//! - **Notifier** (`notifier`) - outbound delivery seam used by the conversation service
//! - **Polling** (`polling`) - long-poll loop with reconnect backoff
//!
//! ```text
//! getUpdates → PollingRunner → decode → InboundHandler → conversation service
//!                                              ↓
//!                     sendMessage ← Notifier ← replies
//! ```

pub mod client;
pub mod keyboard;
pub mod notifier;
pub mod polling;
pub mod updates;

pub use client::{BotApiClient, BotIdentity, ClientError};
pub use notifier::{Notifier, RecordingNotifier};
pub use polling::{PollingRunner, ReconnectPolicy, TransportError, UpdateSource};
pub use updates::{decode_update, DecodedUpdate, DispatchError, InboundHandler, Update};
