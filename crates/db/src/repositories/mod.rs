use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use kodbook_core::domain::order::{
    AssignmentOutcome, ExistingOrder, OrderCode, OrderField, OrderRecord,
};

pub mod memory;
pub mod order;

pub use memory::InMemoryOrderRepository;
pub use order::SqlOrderRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("no order stored for code `{code}` on {date}")]
    NotFound { code: OrderCode, date: NaiveDate },
    #[error("an order for code `{code}` on {date} already exists")]
    Duplicate { code: OrderCode, date: NaiveDate },
    #[error("code `{code}` is longer than {max} bytes", max = OrderCode::MAX_LEN)]
    CodeTooLong { code: OrderCode },
}

/// Record store the conversation commits into.
///
/// The listing holds the codes offered per date; a code counts as assigned once
/// either its transport or its phone is filled in.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn list_available_codes(
        &self,
        date: NaiveDate,
        only_unassigned: bool,
    ) -> Result<Vec<OrderCode>, RepositoryError>;

    async fn find_existing_order(
        &self,
        code: &OrderCode,
        date: NaiveDate,
    ) -> Result<Option<ExistingOrder>, RepositoryError>;

    async fn add_order(&self, record: &OrderRecord) -> Result<(), RepositoryError>;

    async fn update_order(
        &self,
        code: &OrderCode,
        record: &OrderRecord,
    ) -> Result<(), RepositoryError>;

    async fn propagate_assignment(
        &self,
        code: &OrderCode,
        transport: &str,
        phone: &str,
        date: NaiveDate,
    ) -> Result<AssignmentOutcome, RepositoryError>;

    /// Adds codes to the listing for `date`; returns how many were new.
    async fn register_codes(
        &self,
        date: NaiveDate,
        codes: &[OrderCode],
    ) -> Result<usize, RepositoryError>;
}

/// Listing codes must fit a picker button.
pub(crate) fn ensure_listable(codes: &[OrderCode]) -> Result<(), RepositoryError> {
    match codes.iter().find(|code| !code.fits_button()) {
        Some(code) => Err(RepositoryError::CodeTooLong { code: code.clone() }),
        None => Ok(()),
    }
}

pub(crate) fn is_assigned(transport: Option<&str>, phone: Option<&str>) -> bool {
    let filled = |value: Option<&str>| value.is_some_and(|v| !v.trim().is_empty());
    filled(transport) || filled(phone)
}

pub(crate) fn assignment_outcome(
    code: &OrderCode,
    date: NaiveDate,
    updated: bool,
) -> AssignmentOutcome {
    let message = if updated {
        format!("✅ KOD ro'yxatida '{code}' uchun transport va telefon yangilandi.")
    } else {
        format!("⚠️ {date} sanasi uchun KOD ro'yxatida '{code}' topilmadi.")
    };
    AssignmentOutcome { updated, message }
}

pub(crate) fn existing_order(record: OrderRecord) -> ExistingOrder {
    let mut raw_fields = BTreeMap::new();
    raw_fields.insert("date".to_owned(), record.date.to_string());
    raw_fields.insert("code".to_owned(), record.code.to_string());
    for field in OrderField::ALL {
        raw_fields.insert(field.as_str().to_owned(), record.value(field).to_owned());
    }
    if let Some(value) = record.amount_value {
        raw_fields.insert("amount_value".to_owned(), value.to_string());
    }

    ExistingOrder {
        code: record.code,
        date: record.date,
        address: record.address,
        transport: record.transport,
        phone: record.phone,
        card: record.card,
        amount: record.amount,
        raw_fields,
    }
}
