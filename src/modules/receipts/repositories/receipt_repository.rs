// MySQL persistence for fee receipts.
//
// The receipt_number column carries a unique index; an insert that loses the
// numbering race comes back as NumberingCollision so the service can retry
// with a fresh sequence. Cancellation is a conditional update keyed on the
// active status, so two concurrent cancels cannot both succeed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::MySqlPool;
use std::str::FromStr;

use crate::core::{AppError, Result};
use crate::modules::collections::models::PaymentMethod;
use crate::modules::receipts::models::{ChequeDetails, FeeReceipt, ReceiptStatus};

/// Filters for receipt listings and statistics
#[derive(Debug, Clone, Default)]
pub struct ReceiptListFilter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub payment_method: Option<PaymentMethod>,
    pub limit: i64,
    pub offset: i64,
}

/// Aggregates over receipts; totals cover active receipts only
#[derive(Debug, Clone, Serialize)]
pub struct ReceiptStats {
    pub receipt_count: i64,
    pub cancelled_count: i64,
    pub total_amount: Decimal,
    pub average_amount: Decimal,
}

/// Persistence port for fee receipts
#[async_trait]
pub trait ReceiptRepository: Send + Sync {
    /// Persist a new receipt; a receipt-number clash maps to
    /// `NumberingCollision`
    async fn create(&self, receipt: &FeeReceipt) -> Result<()>;

    /// Compensating delete for a receipt whose payment never landed
    async fn delete(&self, school_id: &str, id: &str) -> Result<()>;

    async fn find_by_id(&self, school_id: &str, id: &str) -> Result<Option<FeeReceipt>>;

    async fn find_by_number(
        &self,
        school_id: &str,
        receipt_number: &str,
    ) -> Result<Option<FeeReceipt>>;

    async fn find_active_by_collection(
        &self,
        school_id: &str,
        collection_id: &str,
    ) -> Result<Vec<FeeReceipt>>;

    async fn list_by_student(
        &self,
        school_id: &str,
        student_id: &str,
    ) -> Result<Vec<FeeReceipt>>;

    async fn list(&self, school_id: &str, filter: &ReceiptListFilter) -> Result<Vec<FeeReceipt>>;

    /// Receipts created by the school in the given calendar month,
    /// cancelled ones included (they consumed a number)
    async fn count_for_month(&self, school_id: &str, year: i32, month: u32) -> Result<i64>;

    /// Atomically flip an active receipt to cancelled; `Conflict` when it
    /// already is
    async fn mark_cancelled(
        &self,
        school_id: &str,
        id: &str,
        cancelled_by: &str,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<FeeReceipt>;

    async fn stats(&self, school_id: &str, filter: &ReceiptListFilter) -> Result<ReceiptStats>;
}

/// MySQL implementation
pub struct MySqlReceiptRepository {
    pool: MySqlPool,
}

impl MySqlReceiptRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

const RECEIPT_COLUMNS: &str = r#"
    id, receipt_number, school_id, student_id, collection_id, structure_id,
    academic_year, amount, payment_date, payment_method, transaction_ref,
    cheque_number, cheque_date, cheque_bank, collected_by, status,
    cancelled_at, cancelled_by, cancellation_reason, created_at, updated_at
"#;

#[async_trait]
impl ReceiptRepository for MySqlReceiptRepository {
    async fn create(&self, receipt: &FeeReceipt) -> Result<()> {
        let (cheque_number, cheque_date, cheque_bank) = match &receipt.cheque {
            Some(c) => (
                Some(c.number.clone()),
                Some(c.date),
                Some(c.bank_name.clone()),
            ),
            None => (None, None, None),
        };

        sqlx::query(
            r#"
            INSERT INTO fee_receipts (
                id, receipt_number, school_id, student_id, collection_id, structure_id,
                academic_year, amount, payment_date, payment_method, transaction_ref,
                cheque_number, cheque_date, cheque_bank, collected_by, status,
                cancelled_at, cancelled_by, cancellation_reason, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&receipt.id)
        .bind(&receipt.receipt_number)
        .bind(&receipt.school_id)
        .bind(&receipt.student_id)
        .bind(&receipt.collection_id)
        .bind(&receipt.structure_id)
        .bind(&receipt.academic_year)
        .bind(receipt.amount)
        .bind(receipt.payment_date)
        .bind(receipt.payment_method.to_string())
        .bind(&receipt.transaction_ref)
        .bind(cheque_number)
        .bind(cheque_date)
        .bind(cheque_bank)
        .bind(&receipt.collected_by)
        .bind(receipt.status.to_string())
        .bind(receipt.cancelled_at)
        .bind(&receipt.cancelled_by)
        .bind(&receipt.cancellation_reason)
        .bind(receipt.created_at)
        .bind(receipt.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let Some(db_err) = e.as_database_error() {
                if db_err.is_unique_violation() {
                    return AppError::NumberingCollision(format!(
                        "Receipt number '{}' is already taken",
                        receipt.receipt_number
                    ));
                }
            }
            AppError::Database(e)
        })?;

        Ok(())
    }

    async fn delete(&self, school_id: &str, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM fee_receipts WHERE id = ? AND school_id = ?")
            .bind(id)
            .bind(school_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!("Receipt '{}' not found", id)));
        }

        Ok(())
    }

    async fn find_by_id(&self, school_id: &str, id: &str) -> Result<Option<FeeReceipt>> {
        let row = sqlx::query_as::<_, ReceiptRow>(&format!(
            "SELECT {} FROM fee_receipts WHERE id = ? AND school_id = ?",
            RECEIPT_COLUMNS
        ))
        .bind(id)
        .bind(school_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ReceiptRow::into_receipt).transpose()
    }

    async fn find_by_number(
        &self,
        school_id: &str,
        receipt_number: &str,
    ) -> Result<Option<FeeReceipt>> {
        let row = sqlx::query_as::<_, ReceiptRow>(&format!(
            "SELECT {} FROM fee_receipts WHERE receipt_number = ? AND school_id = ?",
            RECEIPT_COLUMNS
        ))
        .bind(receipt_number)
        .bind(school_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ReceiptRow::into_receipt).transpose()
    }

    async fn find_active_by_collection(
        &self,
        school_id: &str,
        collection_id: &str,
    ) -> Result<Vec<FeeReceipt>> {
        let rows = sqlx::query_as::<_, ReceiptRow>(&format!(
            r#"
            SELECT {}
            FROM fee_receipts
            WHERE school_id = ? AND collection_id = ? AND status = 'active'
            ORDER BY created_at
            "#,
            RECEIPT_COLUMNS
        ))
        .bind(school_id)
        .bind(collection_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ReceiptRow::into_receipt).collect()
    }

    async fn list_by_student(
        &self,
        school_id: &str,
        student_id: &str,
    ) -> Result<Vec<FeeReceipt>> {
        let rows = sqlx::query_as::<_, ReceiptRow>(&format!(
            r#"
            SELECT {}
            FROM fee_receipts
            WHERE school_id = ? AND student_id = ?
            ORDER BY payment_date DESC, created_at DESC
            "#,
            RECEIPT_COLUMNS
        ))
        .bind(school_id)
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ReceiptRow::into_receipt).collect()
    }

    async fn list(&self, school_id: &str, filter: &ReceiptListFilter) -> Result<Vec<FeeReceipt>> {
        let limit = if filter.limit > 0 {
            filter.limit.min(100)
        } else {
            50
        };
        let method = filter.payment_method.map(|m| m.to_string());

        let rows = sqlx::query_as::<_, ReceiptRow>(&format!(
            r#"
            SELECT {}
            FROM fee_receipts
            WHERE school_id = ?
              AND (? IS NULL OR payment_date >= ?)
              AND (? IS NULL OR payment_date <= ?)
              AND (? IS NULL OR payment_method = ?)
            ORDER BY payment_date DESC, created_at DESC
            LIMIT ? OFFSET ?
            "#,
            RECEIPT_COLUMNS
        ))
        .bind(school_id)
        .bind(filter.from)
        .bind(filter.from)
        .bind(filter.to)
        .bind(filter.to)
        .bind(&method)
        .bind(&method)
        .bind(limit)
        .bind(filter.offset.max(0))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ReceiptRow::into_receipt).collect()
    }

    async fn count_for_month(&self, school_id: &str, year: i32, month: u32) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM fee_receipts
            WHERE school_id = ? AND YEAR(created_at) = ? AND MONTH(created_at) = ?
            "#,
        )
        .bind(school_id)
        .bind(year)
        .bind(month)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn mark_cancelled(
        &self,
        school_id: &str,
        id: &str,
        cancelled_by: &str,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<FeeReceipt> {
        if reason.trim().is_empty() {
            return Err(AppError::validation("Cancellation reason is required"));
        }

        let result = sqlx::query(
            r#"
            UPDATE fee_receipts
            SET status = 'cancelled', cancelled_at = ?, cancelled_by = ?,
                cancellation_reason = ?, updated_at = ?
            WHERE id = ? AND school_id = ? AND status = 'active'
            "#,
        )
        .bind(at)
        .bind(cancelled_by)
        .bind(reason)
        .bind(at)
        .bind(id)
        .bind(school_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Distinguish a missing receipt from a lost cancellation race
            return match self.find_by_id(school_id, id).await? {
                Some(receipt) => Err(AppError::conflict(format!(
                    "Receipt '{}' is already cancelled",
                    receipt.receipt_number
                ))),
                None => Err(AppError::not_found(format!("Receipt '{}' not found", id))),
            };
        }

        self.find_by_id(school_id, id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Receipt '{}' not found", id)))
    }

    async fn stats(&self, school_id: &str, filter: &ReceiptListFilter) -> Result<ReceiptStats> {
        let row = sqlx::query_as::<_, ReceiptStatsRow>(
            r#"
            SELECT COUNT(*)                                                    AS receipt_count,
                   CAST(COALESCE(SUM(status = 'cancelled'), 0) AS SIGNED)      AS cancelled_count,
                   COALESCE(SUM(CASE WHEN status = 'active' THEN amount END), 0) AS total_amount,
                   AVG(CASE WHEN status = 'active' THEN amount END)            AS average_amount
            FROM fee_receipts
            WHERE school_id = ?
              AND (? IS NULL OR payment_date >= ?)
              AND (? IS NULL OR payment_date <= ?)
            "#,
        )
        .bind(school_id)
        .bind(filter.from)
        .bind(filter.from)
        .bind(filter.to)
        .bind(filter.to)
        .fetch_one(&self.pool)
        .await?;

        Ok(ReceiptStats {
            receipt_count: row.receipt_count,
            cancelled_count: row.cancelled_count,
            total_amount: row.total_amount,
            average_amount: row.average_amount.unwrap_or(Decimal::ZERO).round_dp(2),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ReceiptStatsRow {
    receipt_count: i64,
    cancelled_count: i64,
    total_amount: Decimal,
    average_amount: Option<Decimal>,
}

#[derive(Debug, sqlx::FromRow)]
struct ReceiptRow {
    id: String,
    receipt_number: String,
    school_id: String,
    student_id: String,
    collection_id: String,
    structure_id: String,
    academic_year: String,
    amount: Decimal,
    payment_date: DateTime<Utc>,
    payment_method: String,
    transaction_ref: Option<String>,
    cheque_number: Option<String>,
    cheque_date: Option<DateTime<Utc>>,
    cheque_bank: Option<String>,
    collected_by: String,
    status: String,
    cancelled_at: Option<DateTime<Utc>>,
    cancelled_by: Option<String>,
    cancellation_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ReceiptRow {
    fn into_receipt(self) -> Result<FeeReceipt> {
        let payment_method = PaymentMethod::from_str(&self.payment_method).map_err(|e| {
            AppError::internal(format!("Invalid payment method in database: {}", e))
        })?;
        let status = ReceiptStatus::from_str(&self.status)
            .map_err(|e| AppError::internal(format!("Invalid status in database: {}", e)))?;

        let cheque = match (self.cheque_number, self.cheque_date, self.cheque_bank) {
            (Some(number), Some(date), Some(bank_name)) => Some(ChequeDetails {
                number,
                date,
                bank_name,
            }),
            _ => None,
        };

        Ok(FeeReceipt {
            id: self.id,
            receipt_number: self.receipt_number,
            school_id: self.school_id,
            student_id: self.student_id,
            collection_id: self.collection_id,
            structure_id: self.structure_id,
            academic_year: self.academic_year,
            amount: self.amount,
            payment_date: self.payment_date,
            payment_method,
            transaction_ref: self.transaction_ref,
            cheque,
            collected_by: self.collected_by,
            status,
            cancelled_at: self.cancelled_at,
            cancelled_by: self.cancelled_by,
            cancellation_reason: self.cancellation_reason,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
