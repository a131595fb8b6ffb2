// MySQL persistence for fee structures and their components.
// Components live in a child table and are written transactionally with the
// structure row, mirroring how the rest of the backend stores itemized data.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{MySql, MySqlPool, Transaction};
use std::str::FromStr;

use crate::core::{AppError, Result};
use crate::modules::structures::models::{
    AdjustmentMode, DiscountPolicy, FeeComponent, FeeFrequency, FeeStructure, LateFeePolicy,
    StructureStatus,
};

/// Filters for the structure list query
#[derive(Debug, Clone, Default)]
pub struct StructureListFilter {
    pub academic_year: Option<String>,
    pub status: Option<StructureStatus>,
    pub class_id: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

/// Persistence port for fee structures
#[async_trait]
pub trait StructureRepository: Send + Sync {
    async fn create(&self, structure: &FeeStructure) -> Result<()>;

    async fn find_by_id(&self, school_id: &str, id: &str) -> Result<Option<FeeStructure>>;

    /// Returns the id of a structure that already occupies the
    /// (school, name, class, academic year) slot, if any
    async fn find_conflicting(
        &self,
        school_id: &str,
        name: &str,
        class_id: Option<&str>,
        academic_year: &str,
        exclude_id: Option<&str>,
    ) -> Result<Option<String>>;

    async fn update(&self, structure: &FeeStructure) -> Result<()>;

    async fn delete(&self, school_id: &str, id: &str) -> Result<()>;

    /// List structures without components (list views read totals only)
    async fn list(
        &self,
        school_id: &str,
        filter: &StructureListFilter,
    ) -> Result<Vec<FeeStructure>>;
}

/// MySQL implementation
pub struct MySqlStructureRepository {
    pool: MySqlPool,
}

impl MySqlStructureRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn insert_components(
        tx: &mut Transaction<'_, MySql>,
        structure_id: &str,
        components: &[FeeComponent],
    ) -> Result<()> {
        for component in components {
            sqlx::query(
                r#"
                INSERT INTO fee_components (structure_id, category, amount)
                VALUES (?, ?, ?)
                "#,
            )
            .bind(structure_id)
            .bind(&component.category)
            .bind(component.amount)
            .execute(&mut **tx)
            .await?;
        }

        Ok(())
    }

    async fn fetch_components(&self, structure_id: &str) -> Result<Vec<FeeComponent>> {
        let components = sqlx::query_as::<_, FeeComponent>(
            r#"
            SELECT category, amount
            FROM fee_components
            WHERE structure_id = ?
            ORDER BY category
            "#,
        )
        .bind(structure_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(components)
    }
}

#[async_trait]
impl StructureRepository for MySqlStructureRepository {
    async fn create(&self, structure: &FeeStructure) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO fee_structures (
                id, school_id, name, class_id, academic_year,
                amount, category, total_amount, frequency, due_day,
                late_fee_enabled, late_fee_mode, late_fee_value, late_fee_grace_days,
                discount_enabled, discount_mode, discount_value,
                status, created_by, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&structure.id)
        .bind(&structure.school_id)
        .bind(&structure.name)
        .bind(&structure.class_id)
        .bind(&structure.academic_year)
        .bind(structure.amount)
        .bind(&structure.category)
        .bind(structure.total_amount)
        .bind(structure.frequency.to_string())
        .bind(structure.due_day as i16)
        .bind(structure.late_fee.enabled)
        .bind(mode_str(structure.late_fee.mode))
        .bind(structure.late_fee.value)
        .bind(structure.late_fee.grace_days as i32)
        .bind(structure.discount.enabled)
        .bind(mode_str(structure.discount.mode))
        .bind(structure.discount.value)
        .bind(structure.status.to_string())
        .bind(&structure.created_by)
        .bind(structure.created_at)
        .bind(structure.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if let Some(db_err) = e.as_database_error() {
                if db_err.is_unique_violation() {
                    return AppError::conflict(format!(
                        "Structure '{}' already exists for this class and academic year",
                        structure.name
                    ));
                }
            }
            AppError::Database(e)
        })?;

        Self::insert_components(&mut tx, &structure.id, &structure.components).await?;

        tx.commit().await?;

        Ok(())
    }

    async fn find_by_id(&self, school_id: &str, id: &str) -> Result<Option<FeeStructure>> {
        let row = sqlx::query_as::<_, StructureRow>(
            r#"
            SELECT
                id, school_id, name, class_id, academic_year,
                amount, category, total_amount, frequency, due_day,
                late_fee_enabled, late_fee_mode, late_fee_value, late_fee_grace_days,
                discount_enabled, discount_mode, discount_value,
                status, created_by, created_at, updated_at
            FROM fee_structures
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

        let components = self.fetch_components(id).await?;

        Ok(Some(row.into_structure(components)?))
    }

    async fn find_conflicting(
        &self,
        school_id: &str,
        name: &str,
        class_id: Option<&str>,
        academic_year: &str,
        exclude_id: Option<&str>,
    ) -> Result<Option<String>> {
        let id: Option<String> = sqlx::query_scalar(
            r#"
            SELECT id
            FROM fee_structures
            WHERE school_id = ?
              AND name = ?
              AND academic_year = ?
              AND ((class_id IS NULL AND ? IS NULL) OR class_id = ?)
              AND (? IS NULL OR id <> ?)
            LIMIT 1
            "#,
        )
        .bind(school_id)
        .bind(name)
        .bind(academic_year)
        .bind(class_id)
        .bind(class_id)
        .bind(exclude_id)
        .bind(exclude_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(id)
    }

    async fn update(&self, structure: &FeeStructure) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE fee_structures
            SET name = ?, class_id = ?, academic_year = ?,
                amount = ?, category = ?, total_amount = ?, frequency = ?, due_day = ?,
                late_fee_enabled = ?, late_fee_mode = ?, late_fee_value = ?,
                late_fee_grace_days = ?,
                discount_enabled = ?, discount_mode = ?, discount_value = ?,
                status = ?, updated_at = ?
            WHERE id = ? AND school_id = ?
            "#,
        )
        .bind(&structure.name)
        .bind(&structure.class_id)
        .bind(&structure.academic_year)
        .bind(structure.amount)
        .bind(&structure.category)
        .bind(structure.total_amount)
        .bind(structure.frequency.to_string())
        .bind(structure.due_day as i16)
        .bind(structure.late_fee.enabled)
        .bind(mode_str(structure.late_fee.mode))
        .bind(structure.late_fee.value)
        .bind(structure.late_fee.grace_days as i32)
        .bind(structure.discount.enabled)
        .bind(mode_str(structure.discount.mode))
        .bind(structure.discount.value)
        .bind(structure.status.to_string())
        .bind(structure.updated_at)
        .bind(&structure.id)
        .bind(&structure.school_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!(
                "Structure '{}' not found",
                structure.id
            )));
        }

        sqlx::query("DELETE FROM fee_components WHERE structure_id = ?")
            .bind(&structure.id)
            .execute(&mut *tx)
            .await?;

        Self::insert_components(&mut tx, &structure.id, &structure.components).await?;

        tx.commit().await?;

        Ok(())
    }

    async fn delete(&self, school_id: &str, id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM fee_components WHERE structure_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM fee_structures WHERE id = ? AND school_id = ?")
            .bind(id)
            .bind(school_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!("Structure '{}' not found", id)));
        }

        tx.commit().await?;

        Ok(())
    }

    async fn list(
        &self,
        school_id: &str,
        filter: &StructureListFilter,
    ) -> Result<Vec<FeeStructure>> {
        let limit = if filter.limit > 0 {
            filter.limit.min(100)
        } else {
            50
        };

        let status = filter.status.map(|s| s.to_string());

        let rows = sqlx::query_as::<_, StructureRow>(
            r#"
            SELECT
                id, school_id, name, class_id, academic_year,
                amount, category, total_amount, frequency, due_day,
                late_fee_enabled, late_fee_mode, late_fee_value, late_fee_grace_days,
                discount_enabled, discount_mode, discount_value,
                status, created_by, created_at, updated_at
            FROM fee_structures
            WHERE school_id = ?
              AND (? IS NULL OR academic_year = ?)
              AND (? IS NULL OR status = ?)
              AND (? IS NULL OR class_id = ?)
            ORDER BY created_at DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(school_id)
        .bind(&filter.academic_year)
        .bind(&filter.academic_year)
        .bind(&status)
        .bind(&status)
        .bind(&filter.class_id)
        .bind(&filter.class_id)
        .bind(limit)
        .bind(filter.offset.max(0))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_structure(vec![])).collect()
    }
}

fn mode_str(mode: AdjustmentMode) -> &'static str {
    match mode {
        AdjustmentMode::Fixed => "fixed",
        AdjustmentMode::Percentage => "percentage",
    }
}

#[derive(Debug, sqlx::FromRow)]
struct StructureRow {
    id: String,
    school_id: String,
    name: String,
    class_id: Option<String>,
    academic_year: String,
    amount: Option<Decimal>,
    category: Option<String>,
    total_amount: Decimal,
    frequency: String,
    due_day: i16,
    late_fee_enabled: bool,
    late_fee_mode: String,
    late_fee_value: Decimal,
    late_fee_grace_days: i32,
    discount_enabled: bool,
    discount_mode: String,
    discount_value: Decimal,
    status: String,
    created_by: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl StructureRow {
    fn into_structure(self, components: Vec<FeeComponent>) -> Result<FeeStructure> {
        let frequency = FeeFrequency::from_str(&self.frequency)
            .map_err(|e| AppError::internal(format!("Invalid frequency in database: {}", e)))?;
        let status = StructureStatus::from_str(&self.status)
            .map_err(|e| AppError::internal(format!("Invalid status in database: {}", e)))?;
        let late_fee_mode = AdjustmentMode::from_str(&self.late_fee_mode)
            .map_err(|e| AppError::internal(format!("Invalid late fee mode in database: {}", e)))?;
        let discount_mode = AdjustmentMode::from_str(&self.discount_mode)
            .map_err(|e| AppError::internal(format!("Invalid discount mode in database: {}", e)))?;

        Ok(FeeStructure {
            id: self.id,
            school_id: self.school_id,
            name: self.name,
            class_id: self.class_id,
            academic_year: self.academic_year,
            amount: self.amount,
            category: self.category,
            components,
            total_amount: self.total_amount,
            frequency,
            due_day: self.due_day as u8,
            late_fee: LateFeePolicy {
                enabled: self.late_fee_enabled,
                mode: late_fee_mode,
                value: self.late_fee_value,
                grace_days: self.late_fee_grace_days as u16,
            },
            discount: DiscountPolicy {
                enabled: self.discount_enabled,
                mode: discount_mode,
                value: self.discount_value,
            },
            status,
            created_by: self.created_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
