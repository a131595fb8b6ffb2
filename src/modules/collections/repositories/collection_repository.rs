// MySQL persistence for fee collections and their ledger entries.
//
// Payment application and reversal are version-guarded conditional updates:
// the row is re-read, the mutation re-validated against the fresh state and
// the UPDATE keyed on the version that was read. A concurrent writer makes
// the UPDATE match zero rows and the whole read-validate-write cycle is
// retried, so two payments landing on the same collection can never lose an
// update.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{MySql, MySqlPool, Transaction};
use std::str::FromStr;

use crate::core::{AppError, Result};
use crate::modules::collections::models::{
    CollectionStatus, EntrySource, FeeCollection, LedgerEntry, PaymentMethod,
};

/// Attempts before a version conflict is surfaced to the caller
const VERSION_RETRY_ATTEMPTS: u32 = 5;

/// Patch for the non-payment fields of a collection
#[derive(Debug, Clone, Default)]
pub struct CollectionPatch {
    pub due_date: Option<DateTime<Utc>>,
    pub remarks: Option<String>,
    pub late_fee_amount: Option<Decimal>,
}

/// Filters for collection statistics
#[derive(Debug, Clone, Default)]
pub struct CollectionStatsFilter {
    pub academic_year: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// Aggregates over non-cancelled collections
#[derive(Debug, Clone, Serialize)]
pub struct CollectionStats {
    pub collection_count: i64,
    pub total_billed: Decimal,
    pub total_paid: Decimal,
    pub total_due: Decimal,
    pub average_payment: Decimal,
}

/// Persistence port for fee collections
#[async_trait]
pub trait CollectionRepository: Send + Sync {
    async fn create(&self, collection: &FeeCollection) -> Result<()>;

    async fn find_by_id(&self, school_id: &str, id: &str) -> Result<Option<FeeCollection>>;

    /// Id of the non-cancelled collection occupying the billing tuple, if any
    async fn find_active_for_tuple(
        &self,
        school_id: &str,
        student_id: &str,
        structure_id: &str,
        academic_year: &str,
        month: Option<u8>,
    ) -> Result<Option<String>>;

    async fn count_by_structure(&self, school_id: &str, structure_id: &str) -> Result<i64>;

    /// Atomically append a payment entry and re-derive the balance
    async fn apply_payment(&self, school_id: &str, entry: LedgerEntry) -> Result<FeeCollection>;

    /// Atomically deactivate the entry backed by `receipt_id` and re-derive
    async fn reverse_receipt_entry(
        &self,
        school_id: &str,
        collection_id: &str,
        receipt_id: &str,
    ) -> Result<FeeCollection>;

    async fn cancel(
        &self,
        school_id: &str,
        collection_id: &str,
        reason: &str,
    ) -> Result<FeeCollection>;

    async fn update_details(
        &self,
        school_id: &str,
        collection_id: &str,
        patch: CollectionPatch,
    ) -> Result<FeeCollection>;

    /// Physical delete; only legal for collections without payments
    async fn delete(&self, school_id: &str, id: &str) -> Result<()>;

    async fn list_by_student(
        &self,
        school_id: &str,
        student_id: &str,
    ) -> Result<Vec<FeeCollection>>;

    /// Collections still owing money, soonest due date first
    async fn list_due(
        &self,
        school_id: &str,
        academic_year: Option<&str>,
    ) -> Result<Vec<FeeCollection>>;

    async fn list_overdue(&self, school_id: &str) -> Result<Vec<FeeCollection>>;

    async fn stats(
        &self,
        school_id: &str,
        filter: &CollectionStatsFilter,
    ) -> Result<CollectionStats>;
}

/// MySQL implementation
pub struct MySqlCollectionRepository {
    pool: MySqlPool,
}

impl MySqlCollectionRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn load(&self, school_id: &str, id: &str) -> Result<FeeCollection> {
        self.find_by_id(school_id, id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Collection '{}' not found", id)))
    }

    async fn fetch_entries(&self, collection_id: &str) -> Result<Vec<LedgerEntry>> {
        let rows = sqlx::query_as::<_, EntryRow>(
            r#"
            SELECT id, collection_id, source_kind, receipt_id, method,
                   transaction_ref, collected_by, amount, paid_on, active, created_at
            FROM ledger_entries
            WHERE collection_id = ?
            ORDER BY created_at, id
            "#,
        )
        .bind(collection_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(EntryRow::into_entry).collect()
    }

    async fn insert_entry(
        tx: &mut Transaction<'_, MySql>,
        entry: &LedgerEntry,
    ) -> Result<()> {
        let (source_kind, receipt_id, method, transaction_ref, collected_by) =
            match &entry.source {
                EntrySource::Adhoc {
                    method,
                    transaction_ref,
                    collected_by,
                } => (
                    "adhoc",
                    None,
                    Some(method.to_string()),
                    transaction_ref.clone(),
                    Some(collected_by.clone()),
                ),
                EntrySource::Receipt { receipt_id } => {
                    ("receipt", Some(receipt_id.clone()), None, None, None)
                }
            };

        sqlx::query(
            r#"
            INSERT INTO ledger_entries (
                id, collection_id, source_kind, receipt_id, method,
                transaction_ref, collected_by, amount, paid_on, active, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.collection_id)
        .bind(source_kind)
        .bind(receipt_id)
        .bind(method)
        .bind(transaction_ref)
        .bind(collected_by)
        .bind(entry.amount)
        .bind(entry.paid_on)
        .bind(entry.active)
        .bind(entry.created_at)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Version-guarded write of the mutable columns. Returns false when a
    /// concurrent writer bumped the version first.
    async fn save_guarded(
        tx: &mut Transaction<'_, MySql>,
        collection: &FeeCollection,
        expected_version: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE fee_collections
            SET paid_amount = ?, due_amount = ?, late_fee_amount = ?,
                status = ?, remarks = ?, due_date = ?,
                version = version + 1, updated_at = ?
            WHERE id = ? AND school_id = ? AND version = ?
            "#,
        )
        .bind(collection.paid_amount)
        .bind(collection.due_amount)
        .bind(collection.late_fee_amount)
        .bind(collection.status.to_string())
        .bind(&collection.remarks)
        .bind(collection.due_date)
        .bind(collection.updated_at)
        .bind(&collection.id)
        .bind(&collection.school_id)
        .bind(expected_version)
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl CollectionRepository for MySqlCollectionRepository {
    async fn create(&self, collection: &FeeCollection) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO fee_collections (
                id, school_id, student_id, structure_id, academic_year, month,
                total_amount, discount_amount, late_fee_amount, paid_amount, due_amount,
                due_date, status, remarks, version, created_by, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&collection.id)
        .bind(&collection.school_id)
        .bind(&collection.student_id)
        .bind(&collection.structure_id)
        .bind(&collection.academic_year)
        .bind(collection.month.map(|m| m as i16))
        .bind(collection.total_amount)
        .bind(collection.discount_amount)
        .bind(collection.late_fee_amount)
        .bind(collection.paid_amount)
        .bind(collection.due_amount)
        .bind(collection.due_date)
        .bind(collection.status.to_string())
        .bind(&collection.remarks)
        .bind(collection.version)
        .bind(&collection.created_by)
        .bind(collection.created_at)
        .bind(collection.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let Some(db_err) = e.as_database_error() {
                // Backstop for the (student, structure, year, month) slot;
                // the service pre-check can race with a concurrent create
                if db_err.is_unique_violation() {
                    return AppError::DuplicateBilling(
                        "A non-cancelled collection already exists for this student, \
                         structure and period"
                            .to_string(),
                    );
                }
            }
            AppError::Database(e)
        })?;

        Ok(())
    }

    async fn find_by_id(&self, school_id: &str, id: &str) -> Result<Option<FeeCollection>> {
        let row = sqlx::query_as::<_, CollectionRow>(
            r#"
            SELECT id, school_id, student_id, structure_id, academic_year, month,
                   total_amount, discount_amount, late_fee_amount, paid_amount, due_amount,
                   due_date, status, remarks, version, created_by, created_at, updated_at
            FROM fee_collections
            WHERE id = ? AND school_id = ?
            "#,
        )
        .bind(id)
        .bind(school_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let entries = self.fetch_entries(id).await?;

        Ok(Some(row.into_collection(entries)?))
    }

    async fn find_active_for_tuple(
        &self,
        school_id: &str,
        student_id: &str,
        structure_id: &str,
        academic_year: &str,
        month: Option<u8>,
    ) -> Result<Option<String>> {
        let month = month.map(|m| m as i16);

        let id: Option<String> = sqlx::query_scalar(
            r#"
            SELECT id
            FROM fee_collections
            WHERE school_id = ?
              AND student_id = ?
              AND structure_id = ?
              AND academic_year = ?
              AND ((month IS NULL AND ? IS NULL) OR month = ?)
              AND status <> 'cancelled'
            LIMIT 1
            "#,
        )
        .bind(school_id)
        .bind(student_id)
        .bind(structure_id)
        .bind(academic_year)
        .bind(month)
        .bind(month)
        .fetch_optional(&self.pool)
        .await?;

        Ok(id)
    }

    async fn count_by_structure(&self, school_id: &str, structure_id: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM fee_collections WHERE school_id = ? AND structure_id = ?",
        )
        .bind(school_id)
        .bind(structure_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn apply_payment(&self, school_id: &str, entry: LedgerEntry) -> Result<FeeCollection> {
        for _ in 0..VERSION_RETRY_ATTEMPTS {
            let mut collection = self.load(school_id, &entry.collection_id).await?;
            let expected_version = collection.version;

            // Validate against the freshly-read state; ExceedsDue and
            // InvalidState come from here, before anything is written
            collection.apply_entry(entry.clone(), Utc::now())?;

            let mut tx = self.pool.begin().await?;

            if !Self::save_guarded(&mut tx, &collection, expected_version).await? {
                tx.rollback().await?;
                continue;
            }

            Self::insert_entry(&mut tx, &entry).await?;
            tx.commit().await?;

            collection.version = expected_version + 1;
            return Ok(collection);
        }

        Err(AppError::conflict(
            "Collection was being updated concurrently; payment not applied, retry",
        ))
    }

    async fn reverse_receipt_entry(
        &self,
        school_id: &str,
        collection_id: &str,
        receipt_id: &str,
    ) -> Result<FeeCollection> {
        for _ in 0..VERSION_RETRY_ATTEMPTS {
            let mut collection = self.load(school_id, collection_id).await?;
            let expected_version = collection.version;

            let entry_id = collection
                .entries
                .iter()
                .find(|e| e.receipt_id() == Some(receipt_id))
                .map(|e| e.id.clone());

            collection.reverse_receipt_entry(receipt_id, Utc::now())?;

            let entry_id = entry_id.ok_or_else(|| {
                AppError::internal("Reversed entry disappeared between read and write")
            })?;

            let mut tx = self.pool.begin().await?;

            if !Self::save_guarded(&mut tx, &collection, expected_version).await? {
                tx.rollback().await?;
                continue;
            }

            sqlx::query("UPDATE ledger_entries SET active = FALSE WHERE id = ?")
                .bind(&entry_id)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;

            collection.version = expected_version + 1;
            return Ok(collection);
        }

        Err(AppError::conflict(
            "Collection was being updated concurrently; reversal not applied, retry",
        ))
    }

    async fn cancel(
        &self,
        school_id: &str,
        collection_id: &str,
        reason: &str,
    ) -> Result<FeeCollection> {
        for _ in 0..VERSION_RETRY_ATTEMPTS {
            let mut collection = self.load(school_id, collection_id).await?;
            let expected_version = collection.version;

            collection.cancel(reason, Utc::now())?;

            let mut tx = self.pool.begin().await?;

            if !Self::save_guarded(&mut tx, &collection, expected_version).await? {
                tx.rollback().await?;
                continue;
            }

            tx.commit().await?;

            collection.version = expected_version + 1;
            return Ok(collection);
        }

        Err(AppError::conflict(
            "Collection was being updated concurrently; cancellation not applied, retry",
        ))
    }

    async fn update_details(
        &self,
        school_id: &str,
        collection_id: &str,
        patch: CollectionPatch,
    ) -> Result<FeeCollection> {
        for _ in 0..VERSION_RETRY_ATTEMPTS {
            let mut collection = self.load(school_id, collection_id).await?;
            let expected_version = collection.version;

            if collection.is_cancelled() {
                return Err(AppError::invalid_state(
                    "Cannot update a cancelled collection",
                ));
            }

            if let Some(due_date) = patch.due_date {
                collection.due_date = due_date;
            }
            if let Some(remarks) = patch.remarks.clone() {
                collection.remarks = Some(remarks);
            }
            if let Some(late_fee) = patch.late_fee_amount {
                if late_fee < Decimal::ZERO {
                    return Err(AppError::validation("Late fee amount cannot be negative"));
                }
                collection.late_fee_amount = late_fee;
            }

            collection.recompute(Utc::now());

            let mut tx = self.pool.begin().await?;

            if !Self::save_guarded(&mut tx, &collection, expected_version).await? {
                tx.rollback().await?;
                continue;
            }

            tx.commit().await?;

            collection.version = expected_version + 1;
            return Ok(collection);
        }

        Err(AppError::conflict(
            "Collection was being updated concurrently; update not applied, retry",
        ))
    }

    async fn delete(&self, school_id: &str, id: &str) -> Result<()> {
        let collection = self.load(school_id, id).await?;

        if collection.paid_amount > Decimal::ZERO {
            return Err(AppError::conflict(
                "Collection has recorded payments and cannot be deleted; cancel it instead",
            ));
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM ledger_entries WHERE collection_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        // paid_amount guard repeated in SQL so a payment racing the delete
        // cannot slip through between the read and the write
        let result = sqlx::query(
            "DELETE FROM fee_collections WHERE id = ? AND school_id = ? AND paid_amount = 0",
        )
        .bind(id)
        .bind(school_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(AppError::conflict(
                "Collection has recorded payments and cannot be deleted; cancel it instead",
            ));
        }

        tx.commit().await?;

        Ok(())
    }

    async fn list_by_student(
        &self,
        school_id: &str,
        student_id: &str,
    ) -> Result<Vec<FeeCollection>> {
        let rows = sqlx::query_as::<_, CollectionRow>(
            r#"
            SELECT id, school_id, student_id, structure_id, academic_year, month,
                   total_amount, discount_amount, late_fee_amount, paid_amount, due_amount,
                   due_date, status, remarks, version, created_by, created_at, updated_at
            FROM fee_collections
            WHERE school_id = ? AND student_id = ?
            ORDER BY created_at DESC
            "#,
        )
        .bind(school_id)
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_collection(vec![])).collect()
    }

    async fn list_due(
        &self,
        school_id: &str,
        academic_year: Option<&str>,
    ) -> Result<Vec<FeeCollection>> {
        let rows = sqlx::query_as::<_, CollectionRow>(
            r#"
            SELECT id, school_id, student_id, structure_id, academic_year, month,
                   total_amount, discount_amount, late_fee_amount, paid_amount, due_amount,
                   due_date, status, remarks, version, created_by, created_at, updated_at
            FROM fee_collections
            WHERE school_id = ?
              AND (? IS NULL OR academic_year = ?)
              AND status IN ('pending', 'partial', 'overdue')
              AND due_amount > 0
            ORDER BY due_date ASC
            "#,
        )
        .bind(school_id)
        .bind(academic_year)
        .bind(academic_year)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_collection(vec![])).collect()
    }

    async fn list_overdue(&self, school_id: &str) -> Result<Vec<FeeCollection>> {
        let rows = sqlx::query_as::<_, CollectionRow>(
            r#"
            SELECT id, school_id, student_id, structure_id, academic_year, month,
                   total_amount, discount_amount, late_fee_amount, paid_amount, due_amount,
                   due_date, status, remarks, version, created_by, created_at, updated_at
            FROM fee_collections
            WHERE school_id = ?
              AND (status = 'overdue'
                   OR (status IN ('pending', 'partial') AND due_date < NOW() AND due_amount > 0))
            ORDER BY due_date ASC
            "#,
        )
        .bind(school_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_collection(vec![])).collect()
    }

    async fn stats(
        &self,
        school_id: &str,
        filter: &CollectionStatsFilter,
    ) -> Result<CollectionStats> {
        let totals = sqlx::query_as::<_, StatsRow>(
            r#"
            SELECT COUNT(*)                          AS collection_count,
                   COALESCE(SUM(total_amount), 0)    AS total_billed,
                   COALESCE(SUM(paid_amount), 0)     AS total_paid,
                   COALESCE(SUM(due_amount), 0)      AS total_due
            FROM fee_collections
            WHERE school_id = ?
              AND status <> 'cancelled'
              AND (? IS NULL OR academic_year = ?)
              AND (? IS NULL OR created_at >= ?)
              AND (? IS NULL OR created_at <= ?)
            "#,
        )
        .bind(school_id)
        .bind(&filter.academic_year)
        .bind(&filter.academic_year)
        .bind(filter.from)
        .bind(filter.from)
        .bind(filter.to)
        .bind(filter.to)
        .fetch_one(&self.pool)
        .await?;

        let average_payment: Option<Decimal> = sqlx::query_scalar(
            r#"
            SELECT AVG(e.amount)
            FROM ledger_entries e
            JOIN fee_collections c ON c.id = e.collection_id
            WHERE c.school_id = ?
              AND c.status <> 'cancelled'
              AND e.active = TRUE
              AND (? IS NULL OR c.academic_year = ?)
              AND (? IS NULL OR e.paid_on >= ?)
              AND (? IS NULL OR e.paid_on <= ?)
            "#,
        )
        .bind(school_id)
        .bind(&filter.academic_year)
        .bind(&filter.academic_year)
        .bind(filter.from)
        .bind(filter.from)
        .bind(filter.to)
        .bind(filter.to)
        .fetch_one(&self.pool)
        .await?;

        Ok(CollectionStats {
            collection_count: totals.collection_count,
            total_billed: totals.total_billed,
            total_paid: totals.total_paid,
            total_due: totals.total_due,
            average_payment: average_payment.unwrap_or(Decimal::ZERO).round_dp(2),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct StatsRow {
    collection_count: i64,
    total_billed: Decimal,
    total_paid: Decimal,
    total_due: Decimal,
}

#[derive(Debug, sqlx::FromRow)]
struct CollectionRow {
    id: String,
    school_id: String,
    student_id: String,
    structure_id: String,
    academic_year: String,
    month: Option<i16>,
    total_amount: Decimal,
    discount_amount: Decimal,
    late_fee_amount: Decimal,
    paid_amount: Decimal,
    due_amount: Decimal,
    due_date: DateTime<Utc>,
    status: String,
    remarks: Option<String>,
    version: i64,
    created_by: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CollectionRow {
    fn into_collection(self, entries: Vec<LedgerEntry>) -> Result<FeeCollection> {
        let status = CollectionStatus::from_str(&self.status)
            .map_err(|e| AppError::internal(format!("Invalid status in database: {}", e)))?;

        Ok(FeeCollection {
            id: self.id,
            school_id: self.school_id,
            student_id: self.student_id,
            structure_id: self.structure_id,
            academic_year: self.academic_year,
            month: self.month.map(|m| m as u8),
            total_amount: self.total_amount,
            discount_amount: self.discount_amount,
            late_fee_amount: self.late_fee_amount,
            paid_amount: self.paid_amount,
            due_amount: self.due_amount,
            due_date: self.due_date,
            status,
            remarks: self.remarks,
            entries,
            version: self.version,
            created_by: self.created_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct EntryRow {
    id: String,
    collection_id: String,
    source_kind: String,
    receipt_id: Option<String>,
    method: Option<String>,
    transaction_ref: Option<String>,
    collected_by: Option<String>,
    amount: Decimal,
    paid_on: DateTime<Utc>,
    active: bool,
    created_at: DateTime<Utc>,
}

impl EntryRow {
    fn into_entry(self) -> Result<LedgerEntry> {
        let source = match self.source_kind.as_str() {
            "adhoc" => {
                let method = self
                    .method
                    .as_deref()
                    .ok_or_else(|| AppError::internal("Ad-hoc entry without payment method"))?;
                EntrySource::Adhoc {
                    method: PaymentMethod::from_str(method).map_err(|e| {
                        AppError::internal(format!("Invalid payment method in database: {}", e))
                    })?,
                    transaction_ref: self.transaction_ref,
                    collected_by: self.collected_by.unwrap_or_default(),
                }
            }
            "receipt" => {
                let receipt_id = self
                    .receipt_id
                    .ok_or_else(|| AppError::internal("Receipt entry without receipt id"))?;
                EntrySource::Receipt { receipt_id }
            }
            other => {
                return Err(AppError::internal(format!(
                    "Invalid ledger entry kind in database: {}",
                    other
                )))
            }
        };

        Ok(LedgerEntry {
            id: self.id,
            collection_id: self.collection_id,
            amount: self.amount,
            paid_on: self.paid_on,
            source,
            active: self.active,
            created_at: self.created_at,
        })
    }
}
