// Fee structure: a reusable billing template scoped to a school, optionally
// to one class and one academic year. Collections copy its amounts at
// creation time, so later edits never change what was already billed.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::{money, AppError, Result};

/// Billing frequency of a structure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR(20)", rename_all = "lowercase")]
#[serde(rename_all = "kebab-case")]
pub enum FeeFrequency {
    OneTime,
    Monthly,
    Term,
    Annual,
}

impl std::fmt::Display for FeeFrequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeeFrequency::OneTime => write!(f, "one-time"),
            FeeFrequency::Monthly => write!(f, "monthly"),
            FeeFrequency::Term => write!(f, "term"),
            FeeFrequency::Annual => write!(f, "annual"),
        }
    }
}

impl std::str::FromStr for FeeFrequency {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "one-time" => Ok(FeeFrequency::OneTime),
            "monthly" => Ok(FeeFrequency::Monthly),
            "term" => Ok(FeeFrequency::Term),
            "annual" => Ok(FeeFrequency::Annual),
            _ => Err(format!("Invalid fee frequency: {}", s)),
        }
    }
}

/// Structure lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR(20)", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum StructureStatus {
    Active,
    Inactive,
}

impl std::fmt::Display for StructureStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StructureStatus::Active => write!(f, "active"),
            StructureStatus::Inactive => write!(f, "inactive"),
        }
    }
}

impl std::str::FromStr for StructureStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(StructureStatus::Active),
            "inactive" => Ok(StructureStatus::Inactive),
            _ => Err(format!("Invalid structure status: {}", s)),
        }
    }
}

/// Whether a policy value is a fixed amount or a percentage of the total
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR(20)", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AdjustmentMode {
    Fixed,
    Percentage,
}

impl std::str::FromStr for AdjustmentMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "fixed" => Ok(AdjustmentMode::Fixed),
            "percentage" => Ok(AdjustmentMode::Percentage),
            _ => Err(format!("Invalid adjustment mode: {}", s)),
        }
    }
}

/// Discount policy applied when a collection is instantiated
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiscountPolicy {
    pub enabled: bool,
    pub mode: AdjustmentMode,
    pub value: Decimal,
}

impl DiscountPolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            mode: AdjustmentMode::Fixed,
            value: Decimal::ZERO,
        }
    }

    /// Discount amount for a given total, capped at the total
    pub fn amount_for(&self, total: Decimal) -> Decimal {
        if !self.enabled {
            return Decimal::ZERO;
        }

        let raw = match self.mode {
            AdjustmentMode::Fixed => self.value,
            AdjustmentMode::Percentage => total * self.value / Decimal::from(100),
        };

        money::round(raw.min(total).max(Decimal::ZERO))
    }
}

/// Late fee policy; `grace_days` past the due date before it applies
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LateFeePolicy {
    pub enabled: bool,
    pub mode: AdjustmentMode,
    pub value: Decimal,
    pub grace_days: u16,
}

impl LateFeePolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            mode: AdjustmentMode::Fixed,
            value: Decimal::ZERO,
            grace_days: 0,
        }
    }

    /// Late fee amount for a given total
    pub fn amount_for(&self, total: Decimal) -> Decimal {
        if !self.enabled {
            return Decimal::ZERO;
        }

        let raw = match self.mode {
            AdjustmentMode::Fixed => self.value,
            AdjustmentMode::Percentage => total * self.value / Decimal::from(100),
        };

        money::round(raw.max(Decimal::ZERO))
    }
}

/// One named component of an itemized structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct FeeComponent {
    pub category: String,
    pub amount: Decimal,
}

impl FeeComponent {
    pub fn new(category: impl Into<String>, amount: Decimal) -> Result<Self> {
        let category = category.into();
        if category.trim().is_empty() {
            return Err(AppError::validation("Component category cannot be empty"));
        }
        money::validate_positive("Component amount", amount).map_err(AppError::Validation)?;

        Ok(Self { category, amount })
    }
}

/// Reusable billing template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeStructure {
    pub id: String,
    pub school_id: String,
    pub name: String,
    pub class_id: Option<String>,
    pub academic_year: String,

    /// Flat amount, present only when the structure was created without
    /// itemized components
    pub amount: Option<Decimal>,
    pub category: Option<String>,
    pub components: Vec<FeeComponent>,

    /// Authoritative billed figure: the flat amount, or the component sum
    pub total_amount: Decimal,

    pub frequency: FeeFrequency,
    pub due_day: u8,
    pub late_fee: LateFeePolicy,
    pub discount: DiscountPolicy,

    pub status: StructureStatus,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Pricing input at creation: flat or itemized, never both
#[derive(Debug, Clone)]
pub enum StructurePricing {
    Flat { amount: Decimal, category: String },
    Itemized(Vec<FeeComponent>),
}

impl FeeStructure {
    /// Create a new structure with validation
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        school_id: String,
        name: String,
        class_id: Option<String>,
        academic_year: String,
        pricing: StructurePricing,
        frequency: FeeFrequency,
        due_day: u8,
        late_fee: LateFeePolicy,
        discount: DiscountPolicy,
        created_by: String,
    ) -> Result<Self> {
        Self::validate_name(&name)?;
        Self::validate_academic_year(&academic_year)?;
        Self::validate_due_day(due_day)?;
        Self::validate_policies(&late_fee, &discount)?;

        let (amount, category, components, total_amount) = match pricing {
            StructurePricing::Flat { amount, category } => {
                money::validate_positive("Amount", amount).map_err(AppError::Validation)?;
                if category.trim().is_empty() {
                    return Err(AppError::validation(
                        "Category is required for a flat amount",
                    ));
                }
                (Some(amount), Some(category), Vec::new(), amount)
            }
            StructurePricing::Itemized(components) => {
                if components.is_empty() {
                    return Err(AppError::validation(
                        "Itemized structure must have at least one component",
                    ));
                }
                let total = Self::component_total(&components);
                (None, None, components, total)
            }
        };

        let now = Utc::now();

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            school_id,
            name,
            class_id,
            academic_year,
            amount,
            category,
            components,
            total_amount,
            frequency,
            due_day,
            late_fee,
            discount,
            status: StructureStatus::Active,
            created_by,
            created_at: now,
            updated_at: now,
        })
    }

    /// Sum of component amounts, rounded to the money scale
    pub fn component_total(components: &[FeeComponent]) -> Decimal {
        money::round(components.iter().map(|c| c.amount).sum())
    }

    /// Replace components and recompute the authoritative total
    pub fn set_components(&mut self, components: Vec<FeeComponent>) -> Result<()> {
        if components.is_empty() {
            return Err(AppError::validation(
                "Itemized structure must have at least one component",
            ));
        }

        self.total_amount = Self::component_total(&components);
        self.components = components;
        self.amount = None;
        self.category = None;
        self.updated_at = Utc::now();

        Ok(())
    }

    /// Replace the flat amount and recompute the authoritative total
    pub fn set_flat_amount(&mut self, amount: Decimal, category: String) -> Result<()> {
        money::validate_positive("Amount", amount).map_err(AppError::Validation)?;
        if category.trim().is_empty() {
            return Err(AppError::validation("Category is required for a flat amount"));
        }

        self.amount = Some(amount);
        self.category = Some(category);
        self.components.clear();
        self.total_amount = amount;
        self.updated_at = Utc::now();

        Ok(())
    }

    pub fn deactivate(&mut self) {
        self.status = StructureStatus::Inactive;
        self.updated_at = Utc::now();
    }

    pub fn is_active(&self) -> bool {
        self.status == StructureStatus::Active
    }

    fn validate_name(name: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(AppError::validation("Structure name cannot be empty"));
        }
        if name.len() > 100 {
            return Err(AppError::validation(
                "Structure name cannot exceed 100 characters",
            ));
        }
        Ok(())
    }

    fn validate_academic_year(academic_year: &str) -> Result<()> {
        if academic_year.trim().is_empty() {
            return Err(AppError::validation("Academic year cannot be empty"));
        }
        Ok(())
    }

    fn validate_due_day(due_day: u8) -> Result<()> {
        if !(1..=31).contains(&due_day) {
            return Err(AppError::validation("Due day must be between 1 and 31"));
        }
        Ok(())
    }

    fn validate_policies(late_fee: &LateFeePolicy, discount: &DiscountPolicy) -> Result<()> {
        money::validate_amount("Late fee value", late_fee.value).map_err(AppError::Validation)?;
        money::validate_amount("Discount value", discount.value).map_err(AppError::Validation)?;

        if discount.mode == AdjustmentMode::Percentage && discount.value > Decimal::from(100) {
            return Err(AppError::validation("Discount percentage cannot exceed 100"));
        }
        if late_fee.mode == AdjustmentMode::Percentage && late_fee.value > Decimal::from(100) {
            return Err(AppError::validation("Late fee percentage cannot exceed 100"));
        }

        Ok(())
    }
}
