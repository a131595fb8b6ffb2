// Fee collection: one student's billable obligation against one structure
// for one period. Owns the running balance; amounts are copied from the
// structure at creation so later structure edits never change what was
// already billed.
//
// Invariant held after every mutation:
//   due_amount == max(0, total_amount - discount_amount + late_fee_amount - paid_amount)
//   paid_amount == sum of active ledger entry amounts

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::{money, AppError, Result};
use crate::modules::structures::models::FeeStructure;

use super::ledger_entry::LedgerEntry;

/// Collection status lifecycle. `cancelled` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR(20)", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CollectionStatus {
    Pending,
    Partial,
    Paid,
    Overdue,
    Cancelled,
}

impl std::fmt::Display for CollectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectionStatus::Pending => write!(f, "pending"),
            CollectionStatus::Partial => write!(f, "partial"),
            CollectionStatus::Paid => write!(f, "paid"),
            CollectionStatus::Overdue => write!(f, "overdue"),
            CollectionStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for CollectionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CollectionStatus::Pending),
            "partial" => Ok(CollectionStatus::Partial),
            "paid" => Ok(CollectionStatus::Paid),
            "overdue" => Ok(CollectionStatus::Overdue),
            "cancelled" => Ok(CollectionStatus::Cancelled),
            _ => Err(format!("Invalid collection status: {}", s)),
        }
    }
}

/// One billable obligation for one student
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeCollection {
    pub id: String,
    pub school_id: String,
    pub student_id: String,
    pub structure_id: String,
    pub academic_year: String,
    /// 1-12 for monthly billing; absent for one-time/term/annual
    pub month: Option<u8>,

    pub total_amount: Decimal,
    pub discount_amount: Decimal,
    pub late_fee_amount: Decimal,
    pub paid_amount: Decimal,
    /// Derived outstanding balance; never stored inconsistently
    pub due_amount: Decimal,

    pub due_date: DateTime<Utc>,
    pub status: CollectionStatus,
    pub remarks: Option<String>,

    /// All payments ever applied, active and reversed
    pub entries: Vec<LedgerEntry>,

    /// Optimistic-concurrency counter; bumped by every persisted mutation
    pub version: i64,

    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FeeCollection {
    /// Bill a student against a structure, copying amounts at this moment
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        school_id: String,
        student_id: String,
        structure: &FeeStructure,
        academic_year: String,
        month: Option<u8>,
        due_date: DateTime<Utc>,
        remarks: Option<String>,
        created_by: String,
    ) -> Result<Self> {
        if student_id.trim().is_empty() {
            return Err(AppError::validation("Student ID cannot be empty"));
        }
        if academic_year.trim().is_empty() {
            return Err(AppError::validation("Academic year cannot be empty"));
        }
        if let Some(month) = month {
            if !(1..=12).contains(&month) {
                return Err(AppError::validation("Month must be between 1 and 12"));
            }
        }

        let total_amount = structure.total_amount;
        let discount_amount = structure.discount.amount_for(total_amount);
        let late_fee_amount = Decimal::ZERO;
        let paid_amount = Decimal::ZERO;

        let now = Utc::now();

        let mut collection = Self {
            id: Uuid::new_v4().to_string(),
            school_id,
            student_id,
            structure_id: structure.id.clone(),
            academic_year,
            month,
            total_amount,
            discount_amount,
            late_fee_amount,
            paid_amount,
            due_amount: Decimal::ZERO,
            due_date,
            status: CollectionStatus::Pending,
            remarks,
            entries: Vec::new(),
            version: 0,
            created_by,
            created_at: now,
            updated_at: now,
        };

        collection.recompute(now);

        Ok(collection)
    }

    /// Outstanding balance as a pure function of the four amount fields
    pub fn compute_due(
        total: Decimal,
        discount: Decimal,
        late_fee: Decimal,
        paid: Decimal,
    ) -> Decimal {
        (total - discount + late_fee - paid).max(Decimal::ZERO)
    }

    /// Status as a pure function of the amounts, due date and clock.
    /// Recomputing twice from the same inputs yields the same result.
    pub fn compute_status(
        total: Decimal,
        discount: Decimal,
        late_fee: Decimal,
        paid: Decimal,
        due_date: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> CollectionStatus {
        let final_amount = total - discount + late_fee;

        if paid >= final_amount {
            CollectionStatus::Paid
        } else if paid > Decimal::ZERO {
            CollectionStatus::Partial
        } else if now > due_date {
            CollectionStatus::Overdue
        } else {
            CollectionStatus::Pending
        }
    }

    /// Amount owed before payments
    pub fn final_amount(&self) -> Decimal {
        self.total_amount - self.discount_amount + self.late_fee_amount
    }

    /// Sum of active ledger entries; the only source of truth for paid_amount
    pub fn active_paid_total(&self) -> Decimal {
        self.entries
            .iter()
            .filter(|e| e.active)
            .map(|e| e.amount)
            .sum()
    }

    /// Re-derive paid/due/status from the ledger entries. Cancelled stays
    /// cancelled; everything else is a pure function of the amounts.
    pub fn recompute(&mut self, now: DateTime<Utc>) {
        self.paid_amount = self.active_paid_total();
        self.due_amount = Self::compute_due(
            self.total_amount,
            self.discount_amount,
            self.late_fee_amount,
            self.paid_amount,
        );

        if self.status != CollectionStatus::Cancelled {
            self.status = Self::compute_status(
                self.total_amount,
                self.discount_amount,
                self.late_fee_amount,
                self.paid_amount,
                self.due_date,
                now,
            );
        }

        self.updated_at = now;
    }

    /// Apply a payment entry. Amount must be positive and within the current
    /// due amount; rejected entirely otherwise.
    pub fn apply_entry(&mut self, entry: LedgerEntry, now: DateTime<Utc>) -> Result<()> {
        if self.status == CollectionStatus::Cancelled {
            return Err(AppError::invalid_state(
                "Cannot record a payment on a cancelled collection",
            ));
        }

        money::validate_positive("Payment amount", entry.amount)
            .map_err(AppError::Validation)?;

        if entry.amount > self.due_amount {
            return Err(AppError::ExceedsDue {
                due: self.due_amount,
                attempted: entry.amount,
            });
        }

        self.entries.push(entry);
        self.recompute(now);

        Ok(())
    }

    /// Reverse the active entry backed by the given receipt, returning the
    /// reversed amount. Exactly that entry is deactivated; every other
    /// payment on the collection is untouched.
    pub fn reverse_receipt_entry(
        &mut self,
        receipt_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Decimal> {
        if self.status == CollectionStatus::Cancelled {
            return Err(AppError::invalid_state(
                "Cannot reverse a payment on a cancelled collection",
            ));
        }

        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.receipt_id() == Some(receipt_id))
            .ok_or_else(|| {
                AppError::not_found(format!(
                    "No ledger entry for receipt '{}' on this collection",
                    receipt_id
                ))
            })?;

        if !entry.active {
            return Err(AppError::conflict(format!(
                "Ledger entry for receipt '{}' is already reversed",
                receipt_id
            )));
        }

        entry.active = false;
        let amount = entry.amount;
        self.recompute(now);

        Ok(amount)
    }

    /// Terminal cancellation; appends the reason to remarks. Does not touch
    /// ledger entries or receipts (see the cancel-cascade policy).
    pub fn cancel(&mut self, reason: &str, now: DateTime<Utc>) -> Result<()> {
        if self.status == CollectionStatus::Cancelled {
            return Err(AppError::invalid_state("Collection is already cancelled"));
        }

        self.status = CollectionStatus::Cancelled;
        self.remarks = match self.remarks.take() {
            Some(remarks) if !remarks.is_empty() => {
                Some(format!("{} | Cancelled: {}", remarks, reason))
            }
            _ => Some(format!("Cancelled: {}", reason)),
        };
        self.updated_at = now;

        Ok(())
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == CollectionStatus::Cancelled
    }
}
