use std::str::FromStr;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::Row;

use kodbook_core::domain::order::{AssignmentOutcome, ExistingOrder, OrderCode, OrderRecord};

use super::{assignment_outcome, ensure_listable, existing_order, OrderRepository, RepositoryError};
use crate::DbPool;

const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct SqlOrderRepository {
    pool: DbPool,
}

impl SqlOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn date_key(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<OrderRecord, RepositoryError> {
    let code: String = row.try_get("code").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let order_date: String =
        row.try_get("order_date").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let address: String =
        row.try_get("address").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let transport: String =
        row.try_get("transport").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let phone: String = row.try_get("phone").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let card: String = row.try_get("card").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let amount_display: String =
        row.try_get("amount_display").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let amount_value: Option<String> =
        row.try_get("amount_value").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let date = NaiveDate::parse_from_str(&order_date, DATE_FORMAT).map_err(|e| {
        RepositoryError::Decode(format!("order_date `{order_date}` is not a date: {e}"))
    })?;
    let amount_value = amount_value
        .map(|raw| {
            Decimal::from_str(&raw).map_err(|e| {
                RepositoryError::Decode(format!("amount_value `{raw}` is not a decimal: {e}"))
            })
        })
        .transpose()?;

    Ok(OrderRecord {
        date,
        code: OrderCode(code),
        address,
        transport,
        phone,
        card,
        amount: amount_display,
        amount_value,
    })
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait::async_trait]
impl OrderRepository for SqlOrderRepository {
    async fn list_available_codes(
        &self,
        date: NaiveDate,
        only_unassigned: bool,
    ) -> Result<Vec<OrderCode>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT code FROM code_listing
             WHERE order_date = ?
               AND ((TRIM(IFNULL(transport, '')) = '' AND TRIM(IFNULL(phone, '')) = '') = ?)
             ORDER BY code",
        )
        .bind(date_key(date))
        .bind(only_unassigned)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("code")
                    .map(OrderCode)
                    .map_err(|e| RepositoryError::Decode(e.to_string()))
            })
            .collect()
    }

    async fn find_existing_order(
        &self,
        code: &OrderCode,
        date: NaiveDate,
    ) -> Result<Option<ExistingOrder>, RepositoryError> {
        let row = sqlx::query(
            "SELECT code, order_date, address, transport, phone, card,
                    amount_display, amount_value
             FROM order_record WHERE code = ? AND order_date = ?",
        )
        .bind(code.as_str())
        .bind(date_key(date))
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(existing_order(row_to_record(r)?))),
            None => Ok(None),
        }
    }

    async fn add_order(&self, record: &OrderRecord) -> Result<(), RepositoryError> {
        let now = Utc::now().to_rfc3339();

        let inserted = sqlx::query(
            "INSERT INTO order_record (code, order_date, address, transport, phone, card,
                                       amount_display, amount_value, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.code.as_str())
        .bind(date_key(record.date))
        .bind(&record.address)
        .bind(&record.transport)
        .bind(&record.phone)
        .bind(&record.card)
        .bind(&record.amount)
        .bind(record.amount_value.map(|value| value.to_string()))
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => Ok(()),
            Err(error) if is_unique_violation(&error) => {
                Err(RepositoryError::Duplicate { code: record.code.clone(), date: record.date })
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn update_order(
        &self,
        code: &OrderCode,
        record: &OrderRecord,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE order_record
             SET address = ?, transport = ?, phone = ?, card = ?,
                 amount_display = ?, amount_value = ?, updated_at = ?
             WHERE code = ? AND order_date = ?",
        )
        .bind(&record.address)
        .bind(&record.transport)
        .bind(&record.phone)
        .bind(&record.card)
        .bind(&record.amount)
        .bind(record.amount_value.map(|value| value.to_string()))
        .bind(Utc::now().to_rfc3339())
        .bind(code.as_str())
        .bind(date_key(record.date))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound { code: code.clone(), date: record.date });
        }
        Ok(())
    }

    async fn propagate_assignment(
        &self,
        code: &OrderCode,
        transport: &str,
        phone: &str,
        date: NaiveDate,
    ) -> Result<AssignmentOutcome, RepositoryError> {
        let result = sqlx::query(
            "UPDATE code_listing
             SET transport = ?, phone = ?, assigned_at = ?
             WHERE order_date = ? AND code = ?",
        )
        .bind(transport)
        .bind(phone)
        .bind(Utc::now().to_rfc3339())
        .bind(date_key(date))
        .bind(code.as_str())
        .execute(&self.pool)
        .await?;

        Ok(assignment_outcome(code, date, result.rows_affected() > 0))
    }

    async fn register_codes(
        &self,
        date: NaiveDate,
        codes: &[OrderCode],
    ) -> Result<usize, RepositoryError> {
        ensure_listable(codes)?;
        let mut tx = self.pool.begin().await?;
        let now = Utc::now().to_rfc3339();
        let mut added = 0;

        for code in codes {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO code_listing (order_date, code, created_at)
                 VALUES (?, ?, ?)",
            )
            .bind(date_key(date))
            .bind(code.as_str())
            .bind(&now)
            .execute(&mut *tx)
            .await?;
            added += result.rows_affected() as usize;
        }

        tx.commit().await?;
        Ok(added)
    }
}
