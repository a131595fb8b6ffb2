// Single internal payment record feeding a collection's paid amount.
// Both channels (ad-hoc entries and receipt-backed payments) are variants of
// the same type, so the paid amount is always one sum over one list and the
// two channels cannot double-apply the same money.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::{money, AppError, Result};

/// How a payment was made
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR(20)", rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum PaymentMethod {
    Cash,
    Card,
    BankTransfer,
    Upi,
    Cheque,
    Online,
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentMethod::Cash => write!(f, "cash"),
            PaymentMethod::Card => write!(f, "card"),
            PaymentMethod::BankTransfer => write!(f, "bank-transfer"),
            PaymentMethod::Upi => write!(f, "upi"),
            PaymentMethod::Cheque => write!(f, "cheque"),
            PaymentMethod::Online => write!(f, "online"),
        }
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "cash" => Ok(PaymentMethod::Cash),
            "card" => Ok(PaymentMethod::Card),
            "bank-transfer" => Ok(PaymentMethod::BankTransfer),
            "upi" => Ok(PaymentMethod::Upi),
            "cheque" => Ok(PaymentMethod::Cheque),
            "online" => Ok(PaymentMethod::Online),
            _ => Err(format!("Invalid payment method: {}", s)),
        }
    }
}

/// Origin of a ledger entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EntrySource {
    /// Payment recorded directly on the collection
    Adhoc {
        method: PaymentMethod,
        transaction_ref: Option<String>,
        collected_by: String,
    },
    /// Payment backed by a numbered fee receipt
    Receipt { receipt_id: String },
}

/// One payment applied to a collection. Append-only; a reversal deactivates
/// the entry instead of deleting it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: String,
    pub collection_id: String,
    pub amount: Decimal,
    pub paid_on: DateTime<Utc>,
    pub source: EntrySource,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Ad-hoc payment entry
    pub fn adhoc(
        collection_id: String,
        amount: Decimal,
        paid_on: DateTime<Utc>,
        method: PaymentMethod,
        transaction_ref: Option<String>,
        collected_by: String,
    ) -> Result<Self> {
        money::validate_positive("Payment amount", amount).map_err(AppError::Validation)?;

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            collection_id,
            amount,
            paid_on,
            source: EntrySource::Adhoc {
                method,
                transaction_ref,
                collected_by,
            },
            active: true,
            created_at: Utc::now(),
        })
    }

    /// Receipt-backed payment entry
    pub fn receipt_backed(
        collection_id: String,
        receipt_id: String,
        amount: Decimal,
        paid_on: DateTime<Utc>,
    ) -> Result<Self> {
        money::validate_positive("Payment amount", amount).map_err(AppError::Validation)?;

        if receipt_id.trim().is_empty() {
            return Err(AppError::validation("Receipt ID cannot be empty"));
        }

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            collection_id,
            amount,
            paid_on,
            source: EntrySource::Receipt { receipt_id },
            active: true,
            created_at: Utc::now(),
        })
    }

    /// Backing receipt id, if this entry came through the receipt channel
    pub fn receipt_id(&self) -> Option<&str> {
        match &self.source {
            EntrySource::Receipt { receipt_id } => Some(receipt_id),
            EntrySource::Adhoc { .. } => None,
        }
    }
}
