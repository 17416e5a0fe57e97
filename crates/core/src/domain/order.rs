use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderCode(pub String);

impl OrderCode {
    /// Longest code, in bytes, whose `code:<code>` button payload stays within 64 bytes.
    pub const MAX_LEN: usize = 59;

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn fits_button(&self) -> bool {
        self.0.len() <= Self::MAX_LEN
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The first choice of a conversation. It decides which codes the listing offers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    New,
    Existing,
}

impl ActionKind {
    pub const ALL: [Self; 2] = [Self::New, Self::Existing];

    pub fn label(self) -> &'static str {
        match self {
            Self::New => "Yangi Buyurtma",
            Self::Existing => "Eski Buyurtma",
        }
    }

    pub fn from_label(input: &str) -> Option<Self> {
        let input = input.trim();
        Self::ALL.into_iter().find(|kind| kind.label().eq_ignore_ascii_case(input))
    }

    /// New orders are placed on codes that have no transport or phone yet.
    pub fn lists_unassigned_codes(self) -> bool {
        matches!(self, Self::New)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DateChoice {
    Yesterday,
    Today,
    Tomorrow,
}

impl DateChoice {
    pub const ALL: [Self; 3] = [Self::Yesterday, Self::Today, Self::Tomorrow];

    pub fn offset_days(self) -> i64 {
        match self {
            Self::Yesterday => -1,
            Self::Today => 0,
            Self::Tomorrow => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Yesterday => "yesterday",
            Self::Today => "today",
            Self::Tomorrow => "tomorrow",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|choice| choice.as_str() == value)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Yesterday => "Kecha",
            Self::Today => "Bugun",
            Self::Tomorrow => "Ertaga",
        }
    }

    /// Calendar date of this choice as seen by a clock in `reference` at instant `now`.
    pub fn resolve(self, now: DateTime<Utc>, reference: FixedOffset) -> NaiveDate {
        now.with_timezone(&reference).date_naive() + Duration::days(self.offset_days())
    }
}

/// Fields collected after a code has been chosen, in entry order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OrderField {
    Address,
    Transport,
    Phone,
    Card,
    Amount,
}

impl OrderField {
    pub const ALL: [Self; 5] =
        [Self::Address, Self::Transport, Self::Phone, Self::Card, Self::Amount];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Address => "address",
            Self::Transport => "transport",
            Self::Phone => "phone",
            Self::Card => "card",
            Self::Amount => "amount",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.as_str() == value)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Address => "Manzil",
            Self::Transport => "Transport raqami",
            Self::Phone => "Haydovchi telefon",
            Self::Card => "Karta raqami",
            Self::Amount => "To'lov summasi",
        }
    }

    /// Accusative form used inside "please enter ..." prompts.
    pub fn prompt_noun(self) -> &'static str {
        match self {
            Self::Address => "manzilni",
            Self::Transport => "transport raqamini",
            Self::Phone => "haydovchi telefon raqamini",
            Self::Card => "karta raqamini",
            Self::Amount => "to'lov summasini",
        }
    }
}

impl fmt::Display for OrderField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record already stored for a `(code, date)` pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingOrder {
    pub code: OrderCode,
    pub date: NaiveDate,
    pub address: String,
    pub transport: String,
    pub phone: String,
    pub card: String,
    pub amount: String,
    pub raw_fields: BTreeMap<String, String>,
}

impl ExistingOrder {
    pub fn value(&self, field: OrderField) -> &str {
        match field {
            OrderField::Address => &self.address,
            OrderField::Transport => &self.transport,
            OrderField::Phone => &self.phone,
            OrderField::Card => &self.card,
            OrderField::Amount => &self.amount,
        }
    }
}

/// The row written on commit. `amount` carries the display form, `amount_value` the number.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub date: NaiveDate,
    pub code: OrderCode,
    pub address: String,
    pub transport: String,
    pub phone: String,
    pub card: String,
    pub amount: String,
    pub amount_value: Option<Decimal>,
}

impl OrderRecord {
    pub fn value(&self, field: OrderField) -> &str {
        match field {
            OrderField::Address => &self.address,
            OrderField::Transport => &self.transport,
            OrderField::Phone => &self.phone,
            OrderField::Card => &self.card,
            OrderField::Amount => &self.amount,
        }
    }
}

/// Result of pushing transport and phone back into the code listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentOutcome {
    pub updated: bool,
    pub message: String,
}
