pub mod store;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::chat::ChatKey;
use crate::domain::order::{ActionKind, ExistingOrder, OrderCode, OrderField, OrderRecord};
use crate::errors::DomainError;
use crate::flows::navigation::NavigationStack;
use crate::flows::states::{CommitMode, CommitPlan, ConversationState};
use crate::validators::{self, Amount, FieldValue, PhoneNumber};

pub use store::{SessionEntry, SessionStore};

/// Answers collected so far. Each field holds at most one value; storing again replaces it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDraft {
    pub action: Option<ActionKind>,
    pub date: Option<NaiveDate>,
    pub code: Option<OrderCode>,
    pub address: Option<String>,
    pub transport: Option<String>,
    pub phone: Option<PhoneNumber>,
    pub card: Option<String>,
    pub amount: Option<Amount>,
}

impl OrderDraft {
    pub fn store(&mut self, value: FieldValue) {
        match value {
            FieldValue::Address(address) => self.address = Some(address),
            FieldValue::Transport(transport) => self.transport = Some(transport),
            FieldValue::Phone(phone) => self.phone = Some(phone),
            FieldValue::Card(card) => self.card = Some(card),
            FieldValue::Amount(amount) => self.amount = Some(amount),
        }
    }

    pub fn display_value(&self, field: OrderField) -> Option<&str> {
        match field {
            OrderField::Address => self.address.as_deref(),
            OrderField::Transport => self.transport.as_deref(),
            OrderField::Phone => self.phone.as_ref().map(|phone| phone.raw.as_str()),
            OrderField::Card => self.card.as_deref(),
            OrderField::Amount => self.amount.as_ref().map(|amount| amount.display.as_str()),
        }
    }

    pub fn clear_collected(&mut self) {
        self.address = None;
        self.transport = None;
        self.phone = None;
        self.card = None;
        self.amount = None;
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub chat_key: ChatKey,
    pub state: ConversationState,
    pub stack: NavigationStack,
    pub fields: OrderDraft,
    pub offered_codes: Vec<OrderCode>,
    pub conflict_snapshot: Option<ExistingOrder>,
    pub editing_field: Option<OrderField>,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    pub fn new(chat_key: ChatKey, now: DateTime<Utc>) -> Self {
        Self {
            chat_key,
            state: ConversationState::SelectingAction,
            stack: NavigationStack::new(),
            fields: OrderDraft::default(),
            offered_codes: Vec::new(),
            conflict_snapshot: None,
            editing_field: None,
            started_at: now,
            last_activity: now,
        }
    }

    /// Forward transition: the current state goes onto the stack.
    pub fn advance(&mut self, next: ConversationState) {
        self.stack.push(self.state);
        self.state = next;
    }

    /// Backward transition. Returns `false` when there is nowhere to go back to.
    pub fn retreat(&mut self) -> bool {
        match self.stack.pop() {
            Some(previous) => {
                self.state = previous;
                true
            }
            None => false,
        }
    }

    /// Moves sideways without recording history, used when an edit replaces the picker.
    pub fn settle(&mut self, state: ConversationState) {
        self.state = state;
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_activity {
            self.last_activity = now;
        }
    }

    pub fn is_idle(&self, now: DateTime<Utc>, max_idle: Duration) -> bool {
        now - self.last_activity >= max_idle
    }

    /// Back to the action choice with everything but the identity forgotten.
    pub fn reset_to_action(&mut self) {
        self.state = ConversationState::SelectingAction;
        self.stack.clear();
        self.fields = OrderDraft::default();
        self.offered_codes.clear();
        self.conflict_snapshot = None;
        self.editing_field = None;
    }

    pub fn lookup_key(&self) -> Option<(OrderCode, NaiveDate)> {
        Some((self.fields.code.clone()?, self.fields.date?))
    }

    /// Draft value when present, otherwise the stored record's value.
    pub fn merged_value(&self, field: OrderField) -> String {
        self.fields
            .display_value(field)
            .or_else(|| self.conflict_snapshot.as_ref().map(|existing| existing.value(field)))
            .unwrap_or_default()
            .to_owned()
    }

    pub fn build_record(&self) -> Result<OrderRecord, DomainError> {
        let (code, date) = self.lookup_key().ok_or_else(|| {
            DomainError::InvariantViolation("order record requires both code and date".to_owned())
        })?;
        let amount_value = match &self.fields.amount {
            Some(amount) => Some(amount.value),
            None => self
                .conflict_snapshot
                .as_ref()
                .and_then(|existing| validators::parse_amount(&existing.amount).ok())
                .map(|amount| amount.value),
        };

        Ok(OrderRecord {
            date,
            code,
            address: self.merged_value(OrderField::Address),
            transport: self.merged_value(OrderField::Transport),
            phone: self.merged_value(OrderField::Phone),
            card: self.merged_value(OrderField::Card),
            amount: self.merged_value(OrderField::Amount),
            amount_value,
        })
    }

    /// An update when a stored record was found for the key, an insert otherwise.
    pub fn commit_plan(&self) -> Result<CommitPlan, DomainError> {
        let record = self.build_record()?;
        let phone_digits = match &self.fields.phone {
            Some(phone) => phone.digits.clone(),
            None => validators::phone_digits(&record.phone),
        };
        let mode = match self.conflict_snapshot {
            Some(_) => CommitMode::Update,
            None => CommitMode::Insert,
        };
        Ok(CommitPlan { mode, record, phone_digits })
    }
}
