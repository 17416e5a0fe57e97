//! Normalisation of free-text answers. Nothing here touches a session.

use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::order::OrderField;

pub const MIN_PHONE_DIGITS: usize = 9;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    EmptyInput { field: OrderField },
    #[error("phone number has {found} digits, at least {required} required")]
    PhoneTooShort { found: usize, required: usize },
    #[error("amount `{input}` is not a number")]
    MalformedAmount { input: String },
}

impl ValidationError {
    pub fn field(&self) -> OrderField {
        match self {
            Self::EmptyInput { field } => *field,
            Self::PhoneTooShort { .. } => OrderField::Phone,
            Self::MalformedAmount { .. } => OrderField::Amount,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::EmptyInput { field } => {
                format!("❌ {} bo'sh bo'lishi mumkin emas. Iltimos, qayta kiriting:", field.label())
            }
            Self::PhoneTooShort { required, .. } => format!(
                "❌ Telefon raqami noto'g'ri. Kamida {required} ta raqam bo'lishi kerak.\n\
                 Iltimos, qayta kiriting (masalan: 99 008 44 06):"
            ),
            Self::MalformedAmount { .. } => "❌ Summa noto'g'ri formatda. Faqat raqam kiriting \
                 (masalan: 1 500 000 yoki 1500000):"
                .to_owned(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneNumber {
    pub raw: String,
    pub digits: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount {
    pub raw: String,
    pub value: Decimal,
    pub display: String,
}

/// A validated answer for one field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldValue {
    Address(String),
    Transport(String),
    Phone(PhoneNumber),
    Card(String),
    Amount(Amount),
}

impl FieldValue {
    pub fn field(&self) -> OrderField {
        match self {
            Self::Address(_) => OrderField::Address,
            Self::Transport(_) => OrderField::Transport,
            Self::Phone(_) => OrderField::Phone,
            Self::Card(_) => OrderField::Card,
            Self::Amount(_) => OrderField::Amount,
        }
    }
}

pub fn validate_field(field: OrderField, input: &str) -> Result<FieldValue, ValidationError> {
    Ok(match field {
        OrderField::Address => FieldValue::Address(validate_text(field, input)?),
        OrderField::Transport => FieldValue::Transport(validate_text(field, input)?),
        OrderField::Phone => FieldValue::Phone(validate_phone(input)?),
        // Card numbers are stored as typed.
        OrderField::Card => FieldValue::Card(validate_text(field, input)?),
        OrderField::Amount => FieldValue::Amount(parse_amount(input)?),
    })
}

pub fn validate_text(field: OrderField, input: &str) -> Result<String, ValidationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyInput { field });
    }
    Ok(trimmed.to_owned())
}

pub fn validate_phone(input: &str) -> Result<PhoneNumber, ValidationError> {
    let raw = validate_text(OrderField::Phone, input)?;
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.len() < MIN_PHONE_DIGITS {
        return Err(ValidationError::PhoneTooShort {
            found: digits.len(),
            required: MIN_PHONE_DIGITS,
        });
    }
    Ok(PhoneNumber { raw, digits })
}

/// Digits of an already stored phone, falling back to the text when it has none.
pub fn phone_digits(stored: &str) -> String {
    let digits: String = stored.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        stored.trim().to_owned()
    } else {
        digits
    }
}

pub fn parse_amount(input: &str) -> Result<Amount, ValidationError> {
    let raw = validate_text(OrderField::Amount, input)?;
    let compact: String = raw.chars().filter(|ch| !ch.is_whitespace() && *ch != ',').collect();
    let normalized = collapse_grouping_dots(&compact);
    let value = parse_plain_decimal(&normalized)
        .ok_or_else(|| ValidationError::MalformedAmount { input: raw.clone() })?;

    Ok(Amount { display: format_amount(value), raw, value })
}

/// Space-grouped display: `1 500 000` for whole values, `1 500 000.50` otherwise.
pub fn format_amount(value: Decimal) -> String {
    if value.fract().is_zero() {
        return group_thousands(&value.trunc().normalize().to_string());
    }

    let rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven);
    let text = rounded.to_string();
    let (whole, fraction) = text.split_once('.').unwrap_or((text.as_str(), ""));
    format!("{}.{:0<2}", group_thousands(whole), fraction)
}

// With several dots only a trailing group of one or two digits is a decimal part.
fn collapse_grouping_dots(compact: &str) -> String {
    if compact.matches('.').count() <= 1 {
        return compact.to_owned();
    }

    let segments: Vec<&str> = compact.split('.').collect();
    match segments.split_last() {
        Some((last, head)) if !last.is_empty() && last.len() <= 2 => {
            format!("{}.{}", head.concat(), last)
        }
        _ => segments.concat(),
    }
}

fn parse_plain_decimal(text: &str) -> Option<Decimal> {
    let (whole, fraction) = match text.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (text, ""),
    };
    let all_digits = |part: &str| part.chars().all(|ch| ch.is_ascii_digit());
    if !all_digits(whole) || !all_digits(fraction) || (whole.is_empty() && fraction.is_empty()) {
        return None;
    }

    let whole = if whole.is_empty() { "0" } else { whole };
    if fraction.is_empty() {
        Decimal::from_str(whole).ok()
    } else {
        Decimal::from_str(&format!("{whole}.{fraction}")).ok()
    }
}

fn group_thousands(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(ch);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{
        format_amount, parse_amount, phone_digits, validate_field, validate_phone, FieldValue,
        ValidationError,
    };
    use crate::domain::order::OrderField;

    #[test]
    fn grouped_amounts_share_one_value_and_display() {
        for input in ["1 500 000", "1,500,000", "1500000", "1.500.000"] {
            let amount = parse_amount(input).expect("amount should parse");
            assert_eq!(amount.value, Decimal::from(1_500_000), "input {input}");
            assert_eq!(amount.display, "1 500 000", "input {input}");
            assert_eq!(amount.raw, input);
        }
    }

    #[test]
    fn decimal_amount_keeps_two_places() {
        let amount = parse_amount("1500000.50").expect("amount should parse");
        assert_eq!(amount.value, Decimal::new(15_000_005, 1));
        assert_eq!(amount.display, "1 500 000.50");
    }

    #[test]
    fn trailing_short_group_after_several_dots_is_decimal() {
        let amount = parse_amount("1.500.25").expect("amount should parse");
        assert_eq!(amount.value, Decimal::new(150_025, 2));
        assert_eq!(amount.display, "1 500.25");
    }

    #[test]
    fn amount_with_letters_is_rejected() {
        let error = parse_amount("15 ming").expect_err("letters must be rejected");
        assert!(matches!(error, ValidationError::MalformedAmount { .. }));
        assert_eq!(error.field(), OrderField::Amount);

        assert!(parse_amount(".").is_err());
        assert!(matches!(
            parse_amount("   ").expect_err("blank"),
            ValidationError::EmptyInput { field: OrderField::Amount }
        ));
    }

    #[test]
    fn small_values_are_not_grouped() {
        assert_eq!(format_amount(Decimal::from(950)), "950");
        assert_eq!(format_amount(Decimal::new(5, 1)), "0.50");
        assert_eq!(format_amount(Decimal::new(1_234_567_891, 3)), "1 234 567.89");
    }

    #[test]
    fn formatted_and_plain_phones_normalise_to_same_digits() {
        let formatted = validate_phone("99 008 44 06").expect("formatted phone");
        let plain = validate_phone("990084406").expect("plain phone");

        assert_eq!(formatted.digits, "990084406");
        assert_eq!(plain.digits, "990084406");
        assert_eq!(formatted.raw, "99 008 44 06");
    }

    #[test]
    fn short_phone_is_rejected_with_digit_count() {
        let error = validate_phone("12345").expect_err("five digits is too short");
        assert_eq!(error, ValidationError::PhoneTooShort { found: 5, required: 9 });
        assert!(error.user_message().contains('9'));
    }

    #[test]
    fn stored_phone_digits_fall_back_to_text() {
        assert_eq!(phone_digits("+998 (99) 008-44-06"), "998990084406");
        assert_eq!(phone_digits(" n/a "), "n/a");
    }

    #[test]
    fn card_accepts_any_non_empty_text() {
        let value = validate_field(OrderField::Card, " 8600 1234 **** 5678 ").expect("card");
        assert_eq!(value, FieldValue::Card("8600 1234 **** 5678".to_owned()));
        assert_eq!(value.field(), OrderField::Card);

        assert!(validate_field(OrderField::Address, "\n").is_err());
    }
}
