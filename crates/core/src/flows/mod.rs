pub mod engine;
pub mod messages;
pub mod navigation;
pub mod prompts;
pub mod states;

pub use engine::{ConversationEngine, DEFAULT_UTC_OFFSET_MINUTES};
pub use messages::{InlineButton, Keyboard, MessageBuilder, OutboundMessage};
pub use navigation::NavigationStack;
pub use states::{
    AssignmentStatus, ButtonAction, ButtonDecodeError, Command, CommitMode, CommitPlan,
    CommitReport, ConversationState, EffectKind, EventKind, FlowInput, InboundEvent,
    OutboundAction, Step,
};
