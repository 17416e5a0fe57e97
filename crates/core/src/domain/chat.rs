use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identity of one conversation, derived from the chat the updates arrive in.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChatKey(pub String);

impl ChatKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for ChatKey {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}
