pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod session;
pub mod validators;

pub use domain::chat::ChatKey;
pub use domain::order::{
    ActionKind, AssignmentOutcome, DateChoice, ExistingOrder, OrderCode, OrderField, OrderRecord,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{
    AssignmentStatus, ButtonAction, Command, CommitMode, CommitPlan, CommitReport,
    ConversationEngine, ConversationState, EffectKind, EventKind, FlowInput, InboundEvent,
    Keyboard, NavigationStack, OutboundAction, OutboundMessage, Step,
};
pub use session::{OrderDraft, Session, SessionEntry, SessionStore};
pub use validators::{Amount, FieldValue, PhoneNumber, ValidationError};
