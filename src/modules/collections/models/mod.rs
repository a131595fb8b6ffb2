pub mod fee_collection;
pub mod ledger_entry;

pub use fee_collection::{CollectionStatus, FeeCollection};
pub use ledger_entry::{EntrySource, LedgerEntry, PaymentMethod};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

/// Create-collection payload
#[derive(Debug, Clone, Deserialize)]
pub struct CreateFeeCollectionRequest {
    pub student_id: String,
    pub structure_id: String,
    pub academic_year: String,
    pub month: Option<u8>,
    pub due_date: DateTime<Utc>,
    pub remarks: Option<String>,
}

/// Ad-hoc payment payload (the non-receipt channel)
#[derive(Debug, Clone, Deserialize)]
pub struct RecordPaymentRequest {
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    pub transaction_ref: Option<String>,
    pub paid_on: Option<DateTime<Utc>>,
}

/// Update payload for the non-monetary fields; the late fee amount is the
/// one monetary knob and triggers re-derivation
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateFeeCollectionRequest {
    pub due_date: Option<DateTime<Utc>>,
    pub remarks: Option<String>,
    pub late_fee_amount: Option<Decimal>,
}

/// Cancel payload
#[derive(Debug, Clone, Deserialize)]
pub struct CancelFeeCollectionRequest {
    pub reason: String,
}
