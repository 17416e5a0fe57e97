use serde::Serialize;
use thiserror::Error;

use kodbook_core::flows::{Keyboard, OutboundMessage};
use kodbook_core::ChatKey;

/// Bot API rejects callback payloads longer than this many bytes.
pub const CALLBACK_DATA_LIMIT: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyboardError {
    #[error("callback payload `{payload}` exceeds {CALLBACK_DATA_LIMIT} bytes")]
    CallbackTooLong { payload: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InlineKeyboardButton {
    pub text: String,
    pub callback_data: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct KeyboardButton {
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ReplyMarkup {
    Inline {
        inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
    },
    Reply {
        keyboard: Vec<Vec<KeyboardButton>>,
        one_time_keyboard: bool,
        resize_keyboard: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        input_field_placeholder: Option<String>,
    },
    Remove {
        remove_keyboard: bool,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SendMessageRequest {
    pub chat_id: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_markup: Option<ReplyMarkup>,
}

impl SendMessageRequest {
    pub fn build(chat_key: &ChatKey, message: &OutboundMessage) -> Result<Self, KeyboardError> {
        Ok(Self {
            chat_id: chat_key.as_str().to_owned(),
            text: message.text.clone(),
            reply_markup: render(&message.keyboard)?,
        })
    }
}

pub fn render(keyboard: &Keyboard) -> Result<Option<ReplyMarkup>, KeyboardError> {
    match keyboard {
        Keyboard::None => Ok(None),
        Keyboard::Remove => Ok(Some(ReplyMarkup::Remove { remove_keyboard: true })),
        Keyboard::Reply { rows, placeholder } => Ok(Some(ReplyMarkup::Reply {
            keyboard: rows
                .iter()
                .map(|row| row.iter().map(|label| KeyboardButton { text: label.clone() }).collect())
                .collect(),
            one_time_keyboard: true,
            resize_keyboard: true,
            input_field_placeholder: placeholder.clone(),
        })),
        Keyboard::Inline { rows } => {
            let mut inline_keyboard = Vec::with_capacity(rows.len());
            for row in rows {
                let mut buttons = Vec::with_capacity(row.len());
                for button in row {
                    let callback_data = button.action.callback_data();
                    if callback_data.len() > CALLBACK_DATA_LIMIT {
                        return Err(KeyboardError::CallbackTooLong { payload: callback_data });
                    }
                    buttons.push(InlineKeyboardButton {
                        text: button.label.clone(),
                        callback_data,
                    });
                }
                inline_keyboard.push(buttons);
            }
            Ok(Some(ReplyMarkup::Inline { inline_keyboard }))
        }
    }
}
