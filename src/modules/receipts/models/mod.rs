pub mod fee_receipt;

pub use fee_receipt::{ChequeDetails, FeeReceipt, ReceiptStatus};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::modules::collections::models::{FeeCollection, PaymentMethod};

/// Create-receipt payload; student/structure/year come from the collection
#[derive(Debug, Clone, Deserialize)]
pub struct CreateFeeReceiptRequest {
    pub collection_id: String,
    pub amount: Decimal,
    pub payment_date: Option<DateTime<Utc>>,
    pub payment_method: PaymentMethod,
    pub transaction_ref: Option<String>,
    pub cheque: Option<ChequeDetails>,
}

/// Cancel-receipt payload
#[derive(Debug, Clone, Deserialize)]
pub struct CancelFeeReceiptRequest {
    pub reason: String,
}

/// Receipt operation result: the receipt plus the collection as it stands
/// after the payment was applied or reversed
#[derive(Debug, Clone, Serialize)]
pub struct ReceiptOutcome {
    pub receipt: FeeReceipt,
    pub collection: FeeCollection,
}
