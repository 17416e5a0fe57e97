use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::chat::ChatKey;
use crate::domain::order::{
    AssignmentOutcome, DateChoice, ExistingOrder, OrderCode, OrderField, OrderRecord,
};
use crate::flows::messages::OutboundMessage;
use crate::session::Session;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConversationState {
    SelectingAction,
    SelectingDate,
    SelectingCode,
    ConfirmingOverwrite,
    EnteringAddress,
    EnteringTransport,
    EnteringPhone,
    EnteringCard,
    EnteringAmount,
    ReviewSummary,
    EditingField,
    Committed,
    Cancelled,
}

impl ConversationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::Cancelled)
    }

    /// The field a sequential entry state collects.
    pub fn collects(self) -> Option<OrderField> {
        match self {
            Self::EnteringAddress => Some(OrderField::Address),
            Self::EnteringTransport => Some(OrderField::Transport),
            Self::EnteringPhone => Some(OrderField::Phone),
            Self::EnteringCard => Some(OrderField::Card),
            Self::EnteringAmount => Some(OrderField::Amount),
            _ => None,
        }
    }

    pub fn next_entry(self) -> Option<Self> {
        match self {
            Self::EnteringAddress => Some(Self::EnteringTransport),
            Self::EnteringTransport => Some(Self::EnteringPhone),
            Self::EnteringPhone => Some(Self::EnteringCard),
            Self::EnteringCard => Some(Self::EnteringAmount),
            Self::EnteringAmount => Some(Self::ReviewSummary),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SelectingAction => "selecting_action",
            Self::SelectingDate => "selecting_date",
            Self::SelectingCode => "selecting_code",
            Self::ConfirmingOverwrite => "confirming_overwrite",
            Self::EnteringAddress => "entering_address",
            Self::EnteringTransport => "entering_transport",
            Self::EnteringPhone => "entering_phone",
            Self::EnteringCard => "entering_card",
            Self::EnteringAmount => "entering_amount",
            Self::ReviewSummary => "review_summary",
            Self::EditingField => "editing_field",
            Self::Committed => "committed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ConversationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    Start,
    Cancel,
    Help,
    Change,
    Unknown(String),
}

impl Command {
    /// Parses `/name` or `/name@botname`, ignoring trailing arguments.
    /// Text that does not start with a slash is not a command.
    pub fn parse(text: &str) -> Option<Self> {
        let rest = text.trim().strip_prefix('/')?;
        let token = rest.split_whitespace().next().unwrap_or_default();
        let name = token.split('@').next().unwrap_or_default().to_ascii_lowercase();

        Some(match name.as_str() {
            "start" => Self::Start,
            "cancel" => Self::Cancel,
            "help" => Self::Help,
            "change" => Self::Change,
            _ => Self::Unknown(name),
        })
    }
}

/// A button press, decoded from the callback payload once at the transport edge.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ButtonAction {
    Date(DateChoice),
    Code(OrderCode),
    Back,
    ChangeAction,
    Overwrite,
    Edit,
    EditField(OrderField),
    Confirm,
    SaveAll,
}

impl ButtonAction {
    pub fn callback_data(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ButtonAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Date(choice) => write!(f, "date:{}", choice.as_str()),
            Self::Code(code) => write!(f, "code:{code}"),
            Self::Back => f.write_str("nav:back"),
            Self::ChangeAction => f.write_str("nav:change_action"),
            Self::Overwrite => f.write_str("conflict:overwrite"),
            Self::Edit => f.write_str("conflict:edit"),
            Self::EditField(field) => write!(f, "summary:edit:{field}"),
            Self::Confirm => f.write_str("summary:confirm"),
            Self::SaveAll => f.write_str("picker:save_all"),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unrecognised callback payload `{payload}`")]
pub struct ButtonDecodeError {
    pub payload: String,
}

impl FromStr for ButtonAction {
    type Err = ButtonDecodeError;

    fn from_str(payload: &str) -> Result<Self, Self::Err> {
        let rejected = || ButtonDecodeError { payload: payload.to_owned() };
        let (namespace, value) = payload.split_once(':').ok_or_else(rejected)?;

        match (namespace, value) {
            ("date", value) => DateChoice::parse(value).map(Self::Date).ok_or_else(rejected),
            ("code", value) if !value.trim().is_empty() => Ok(Self::Code(OrderCode::new(value))),
            ("nav", "back") => Ok(Self::Back),
            ("nav", "change_action") => Ok(Self::ChangeAction),
            ("conflict", "overwrite") => Ok(Self::Overwrite),
            ("conflict", "edit") => Ok(Self::Edit),
            ("summary", "confirm") => Ok(Self::Confirm),
            ("summary", value) => value
                .strip_prefix("edit:")
                .and_then(OrderField::parse)
                .map(Self::EditField)
                .ok_or_else(rejected),
            ("picker", "save_all") => Ok(Self::SaveAll),
            _ => Err(rejected()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Text(String),
    Button(ButtonAction),
    Command(Command),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub chat_key: ChatKey,
    pub kind: EventKind,
    pub received_at: DateTime<Utc>,
    pub correlation_id: String,
}

impl InboundEvent {
    pub fn new(chat_key: ChatKey, kind: EventKind, received_at: DateTime<Utc>) -> Self {
        let correlation_id = format!("{chat_key}-{}", received_at.timestamp_millis());
        Self { chat_key, kind, received_at, correlation_id }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EffectKind {
    ListCodes,
    LookupOrder,
    Commit,
}

impl EffectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ListCodes => "list_codes",
            Self::LookupOrder => "lookup_order",
            Self::Commit => "commit",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitMode {
    Insert,
    Update,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitPlan {
    pub mode: CommitMode,
    pub record: OrderRecord,
    pub phone_digits: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignmentStatus {
    Applied(AssignmentOutcome),
    Failed(String),
    Skipped,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitReport {
    pub mode: CommitMode,
    pub record: OrderRecord,
    pub saved: bool,
    pub assignment: AssignmentStatus,
}

/// Everything the engine can be fed: user events, and results of effects it asked for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FlowInput {
    Event(InboundEvent),
    CodesLoaded { date: NaiveDate, codes: Vec<OrderCode> },
    OrderLookedUp { code: OrderCode, date: NaiveDate, existing: Option<ExistingOrder> },
    CommitFinished(CommitReport),
    EffectFailed { effect: EffectKind, reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutboundAction {
    Reply(OutboundMessage),
    ListCodes { date: NaiveDate, only_unassigned: bool },
    LookupOrder { code: OrderCode, date: NaiveDate },
    Commit(CommitPlan),
}

impl OutboundAction {
    pub fn effect_kind(&self) -> Option<EffectKind> {
        match self {
            Self::Reply(_) => None,
            Self::ListCodes { .. } => Some(EffectKind::ListCodes),
            Self::LookupOrder { .. } => Some(EffectKind::LookupOrder),
            Self::Commit(_) => Some(EffectKind::Commit),
        }
    }
}

/// Result of one engine call. `session` is `None` once the conversation is over.
#[derive(Clone, Debug, PartialEq)]
pub struct Step {
    pub session: Option<Session>,
    pub actions: Vec<OutboundAction>,
    pub ended: Option<ConversationState>,
}

impl Step {
    pub(crate) fn stay(session: Session, actions: Vec<OutboundAction>) -> Self {
        Self { session: Some(session), actions, ended: None }
    }

    pub(crate) fn end(terminal: ConversationState, actions: Vec<OutboundAction>) -> Self {
        Self { session: None, actions, ended: Some(terminal) }
    }

    pub(crate) fn detached(actions: Vec<OutboundAction>) -> Self {
        Self { session: None, actions, ended: None }
    }

    pub fn replies(&self) -> impl Iterator<Item = &OutboundMessage> {
        self.actions.iter().filter_map(|action| match action {
            OutboundAction::Reply(message) => Some(message),
            _ => None,
        })
    }

    pub fn effects(&self) -> impl Iterator<Item = &OutboundAction> {
        self.actions.iter().filter(|action| action.effect_kind().is_some())
    }

    pub fn state(&self) -> Option<ConversationState> {
        self.session.as_ref().map(|session| session.state).or(self.ended)
    }
}
