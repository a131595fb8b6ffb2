pub mod fee_structure;

pub use fee_structure::{
    AdjustmentMode, DiscountPolicy, FeeComponent, FeeFrequency, FeeStructure, LateFeePolicy,
    StructurePricing, StructureStatus,
};

use rust_decimal::Decimal;
use serde::Deserialize;

/// Component as submitted by the caller; validated into a `FeeComponent`
#[derive(Debug, Clone, Deserialize)]
pub struct ComponentInput {
    pub category: String,
    pub amount: Decimal,
}

/// Create-structure payload: either `amount` + `category` or `components`.
/// When components are given, a supplied flat amount is ignored and the
/// total is the component sum.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateFeeStructureRequest {
    pub name: String,
    pub class_id: Option<String>,
    pub academic_year: String,
    pub amount: Option<Decimal>,
    pub category: Option<String>,
    pub components: Option<Vec<ComponentInput>>,
    pub frequency: FeeFrequency,
    pub due_day: u8,
    pub late_fee: Option<LateFeePolicy>,
    pub discount: Option<DiscountPolicy>,
}

/// Update-structure payload; absent fields are left unchanged
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateFeeStructureRequest {
    pub name: Option<String>,
    pub class_id: Option<String>,
    pub academic_year: Option<String>,
    pub amount: Option<Decimal>,
    pub category: Option<String>,
    pub components: Option<Vec<ComponentInput>>,
    pub frequency: Option<FeeFrequency>,
    pub due_day: Option<u8>,
    pub late_fee: Option<LateFeePolicy>,
    pub discount: Option<DiscountPolicy>,
}
