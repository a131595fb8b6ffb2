// Fee receipt: immutable, numbered record of one payment event against a
// collection. The receipt number is assigned once and never changes;
// cancellation marks the record and reverses exactly its amount on the
// collection, it never deletes anything.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::{money, AppError, Result};
use crate::modules::collections::models::PaymentMethod;

/// Receipt lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR(20)", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReceiptStatus {
    Active,
    Cancelled,
}

impl std::fmt::Display for ReceiptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReceiptStatus::Active => write!(f, "active"),
            ReceiptStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for ReceiptStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(ReceiptStatus::Active),
            "cancelled" => Ok(ReceiptStatus::Cancelled),
            _ => Err(format!("Invalid receipt status: {}", s)),
        }
    }
}

/// Cheque particulars, required for cheque payments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChequeDetails {
    pub number: String,
    pub date: DateTime<Utc>,
    pub bank_name: String,
}

/// Immutable payment record with a human-facing sequential number
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeReceipt {
    pub id: String,
    /// `RCP-{YYYY}{MM}-{NNNN}`, stored uppercase, unique per school system
    pub receipt_number: String,

    pub school_id: String,
    pub student_id: String,
    pub collection_id: String,
    pub structure_id: String,
    pub academic_year: String,

    pub amount: Decimal,
    pub payment_date: DateTime<Utc>,
    pub payment_method: PaymentMethod,
    pub transaction_ref: Option<String>,
    pub cheque: Option<ChequeDetails>,
    pub collected_by: String,

    pub status: ReceiptStatus,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<String>,
    pub cancellation_reason: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FeeReceipt {
    /// Create an active receipt with validation
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        receipt_number: String,
        school_id: String,
        student_id: String,
        collection_id: String,
        structure_id: String,
        academic_year: String,
        amount: Decimal,
        payment_date: DateTime<Utc>,
        payment_method: PaymentMethod,
        transaction_ref: Option<String>,
        cheque: Option<ChequeDetails>,
        collected_by: String,
    ) -> Result<Self> {
        if receipt_number.trim().is_empty() {
            return Err(AppError::validation("Receipt number cannot be empty"));
        }

        money::validate_positive("Receipt amount", amount).map_err(AppError::Validation)?;

        if payment_method == PaymentMethod::Cheque {
            match &cheque {
                None => {
                    return Err(AppError::validation(
                        "Cheque details are required for cheque payments",
                    ))
                }
                Some(details) => {
                    if details.number.trim().is_empty() || details.bank_name.trim().is_empty() {
                        return Err(AppError::validation(
                            "Cheque number and bank name cannot be empty",
                        ));
                    }
                }
            }
        }

        let now = Utc::now();

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            receipt_number: receipt_number.to_uppercase(),
            school_id,
            student_id,
            collection_id,
            structure_id,
            academic_year,
            amount,
            payment_date,
            payment_method,
            transaction_ref,
            cheque,
            collected_by,
            status: ReceiptStatus::Active,
            cancelled_at: None,
            cancelled_by: None,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Mark the receipt cancelled, recording actor, reason and timestamp
    pub fn cancel(&mut self, cancelled_by: &str, reason: &str, now: DateTime<Utc>) -> Result<()> {
        if self.status == ReceiptStatus::Cancelled {
            return Err(AppError::conflict(format!(
                "Receipt '{}' is already cancelled",
                self.receipt_number
            )));
        }

        if reason.trim().is_empty() {
            return Err(AppError::validation("Cancellation reason is required"));
        }

        self.status = ReceiptStatus::Cancelled;
        self.cancelled_at = Some(now);
        self.cancelled_by = Some(cancelled_by.to_string());
        self.cancellation_reason = Some(reason.to_string());
        self.updated_at = now;

        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.status == ReceiptStatus::Active
    }
}
