use serde::{Deserialize, Serialize};

use crate::flows::states::ButtonAction;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineButton {
    pub label: String,
    pub action: ButtonAction,
}

impl InlineButton {
    pub fn new(label: impl Into<String>, action: ButtonAction) -> Self {
        Self { label: label.into(), action }
    }
}

/// Keyboard attached to a reply, independent of how a chat platform draws it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Keyboard {
    #[default]
    None,
    Remove,
    Reply {
        rows: Vec<Vec<String>>,
        placeholder: Option<String>,
    },
    Inline {
        rows: Vec<Vec<InlineButton>>,
    },
}

impl Keyboard {
    pub fn inline_actions(&self) -> Vec<&ButtonAction> {
        match self {
            Self::Inline { rows } => rows.iter().flatten().map(|button| &button.action).collect(),
            _ => Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub text: String,
    pub keyboard: Keyboard,
}

impl OutboundMessage {
    pub fn plain(text: impl Into<String>) -> Self {
        Self { text: text.into(), keyboard: Keyboard::None }
    }

    /// Puts `line` above the existing text, separated by a blank line.
    pub fn prefixed(mut self, line: impl AsRef<str>) -> Self {
        self.text = format!("{}\n\n{}", line.as_ref(), self.text);
        self
    }
}

pub struct MessageBuilder {
    lines: Vec<String>,
    keyboard: Keyboard,
}

impl MessageBuilder {
    pub fn new(first_line: impl Into<String>) -> Self {
        Self { lines: vec![first_line.into()], keyboard: Keyboard::None }
    }

    pub fn line(mut self, text: impl Into<String>) -> Self {
        self.lines.push(text.into());
        self
    }

    pub fn blank(self) -> Self {
        self.line("")
    }

    pub fn inline_row<F>(mut self, build: F) -> Self
    where
        F: FnOnce(&mut RowBuilder),
    {
        let mut builder = RowBuilder::default();
        build(&mut builder);
        if builder.buttons.is_empty() {
            return self;
        }

        match &mut self.keyboard {
            Keyboard::Inline { rows } => rows.push(builder.buttons),
            other => *other = Keyboard::Inline { rows: vec![builder.buttons] },
        }
        self
    }

    pub fn reply_keyboard<I, S>(mut self, labels: I, placeholder: Option<&str>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keyboard = Keyboard::Reply {
            rows: vec![labels.into_iter().map(Into::into).collect()],
            placeholder: placeholder.map(str::to_owned),
        };
        self
    }

    pub fn remove_keyboard(mut self) -> Self {
        self.keyboard = Keyboard::Remove;
        self
    }

    pub fn build(self) -> OutboundMessage {
        OutboundMessage { text: self.lines.join("\n"), keyboard: self.keyboard }
    }
}

#[derive(Default)]
pub struct RowBuilder {
    buttons: Vec<InlineButton>,
}

impl RowBuilder {
    pub fn button(&mut self, label: impl Into<String>, action: ButtonAction) -> &mut Self {
        self.buttons.push(InlineButton::new(label, action));
        self
    }
}
