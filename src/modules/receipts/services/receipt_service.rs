// Receipt issue and cancellation, bound to the collection's balance.
//
// Issuing a receipt and crediting the collection are one unit: when the
// credit fails the receipt is rolled back, and when even the rollback fails
// the caller gets PartiallyApplied naming the receipt, so an operator or a
// retry job can reconcile the "receipt active, collection not yet credited"
// state instead of discovering a silently wrong balance.

use std::sync::Arc;

use chrono::{Datelike, Utc};

use crate::core::{AppError, Result};
use crate::middleware::SchoolContext;
use crate::modules::collections::models::{CollectionStatus, LedgerEntry};
use crate::modules::collections::repositories::CollectionRepository;
use crate::modules::receipts::models::{
    CreateFeeReceiptRequest, FeeReceipt, ReceiptOutcome,
};
use crate::modules::receipts::repositories::{ReceiptListFilter, ReceiptRepository, ReceiptStats};

use super::receipt_number;

/// Business logic for fee receipts
pub struct ReceiptService {
    receipts: Arc<dyn ReceiptRepository>,
    collections: Arc<dyn CollectionRepository>,
    max_number_attempts: u32,
}

impl ReceiptService {
    pub fn new(
        receipts: Arc<dyn ReceiptRepository>,
        collections: Arc<dyn CollectionRepository>,
        max_number_attempts: u32,
    ) -> Self {
        Self {
            receipts,
            collections,
            max_number_attempts: max_number_attempts.max(1),
        }
    }

    /// Issue a receipt and apply its amount to the collection
    pub async fn create_receipt(
        &self,
        ctx: &SchoolContext,
        request: CreateFeeReceiptRequest,
    ) -> Result<ReceiptOutcome> {
        let collection = self
            .collections
            .find_by_id(&ctx.school_id, &request.collection_id)
            .await?
            .ok_or_else(|| {
                AppError::not_found(format!(
                    "Collection '{}' not found",
                    request.collection_id
                ))
            })?;

        if collection.status == CollectionStatus::Cancelled {
            return Err(AppError::invalid_state(
                "Cannot issue a receipt against a cancelled collection",
            ));
        }

        // Early rejection with the current due; the payment application
        // re-validates atomically against the fresh row
        if request.amount > collection.due_amount {
            return Err(AppError::ExceedsDue {
                due: collection.due_amount,
                attempted: request.amount,
            });
        }

        let payment_date = request.payment_date.unwrap_or_else(Utc::now);

        let receipt = self
            .persist_with_number(ctx, &collection, &request, payment_date)
            .await?;

        let entry = LedgerEntry::receipt_backed(
            collection.id.clone(),
            receipt.id.clone(),
            receipt.amount,
            payment_date,
        )?;

        match self.collections.apply_payment(&ctx.school_id, entry).await {
            Ok(updated) => {
                tracing::info!(
                    receipt_number = %receipt.receipt_number,
                    collection_id = %collection.id,
                    amount = %receipt.amount,
                    due_amount = %updated.due_amount,
                    "Fee receipt issued"
                );

                Ok(ReceiptOutcome {
                    receipt,
                    collection: updated,
                })
            }
            Err(apply_err) => {
                // Roll the receipt back so no active receipt exists without
                // its payment
                match self.receipts.delete(&ctx.school_id, &receipt.id).await {
                    Ok(()) => {
                        tracing::warn!(
                            receipt_number = %receipt.receipt_number,
                            error = %apply_err,
                            "Payment application failed; receipt rolled back"
                        );
                        Err(apply_err)
                    }
                    Err(rollback_err) => {
                        tracing::error!(
                            receipt_number = %receipt.receipt_number,
                            apply_error = %apply_err,
                            rollback_error = %rollback_err,
                            "Receipt persisted but collection not credited and rollback failed"
                        );
                        Err(AppError::PartiallyApplied {
                            receipt_number: receipt.receipt_number.clone(),
                            detail: format!(
                                "collection '{}' was not credited ({}); rollback failed ({})",
                                collection.id, apply_err, rollback_err
                            ),
                        })
                    }
                }
            }
        }
    }

    /// Cancel a receipt and reverse exactly its amount on the collection
    pub async fn cancel_receipt(
        &self,
        ctx: &SchoolContext,
        id: &str,
        reason: &str,
    ) -> Result<ReceiptOutcome> {
        let receipt = self
            .receipts
            .mark_cancelled(&ctx.school_id, id, &ctx.user_id, reason, Utc::now())
            .await?;

        match self
            .collections
            .reverse_receipt_entry(&ctx.school_id, &receipt.collection_id, &receipt.id)
            .await
        {
            Ok(collection) => {
                tracing::info!(
                    receipt_number = %receipt.receipt_number,
                    collection_id = %receipt.collection_id,
                    amount = %receipt.amount,
                    due_amount = %collection.due_amount,
                    "Fee receipt cancelled and payment reversed"
                );

                Ok(ReceiptOutcome {
                    receipt,
                    collection,
                })
            }
            Err(reverse_err) => {
                tracing::error!(
                    receipt_number = %receipt.receipt_number,
                    collection_id = %receipt.collection_id,
                    error = %reverse_err,
                    "Receipt cancelled but payment not yet reversed"
                );
                Err(AppError::PartiallyApplied {
                    receipt_number: receipt.receipt_number.clone(),
                    detail: format!(
                        "receipt is cancelled but collection '{}' still carries its payment ({})",
                        receipt.collection_id, reverse_err
                    ),
                })
            }
        }
    }

    pub async fn get_receipt(&self, ctx: &SchoolContext, id: &str) -> Result<FeeReceipt> {
        self.receipts
            .find_by_id(&ctx.school_id, id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Receipt '{}' not found", id)))
    }

    /// Case-insensitive lookup by the human-facing number
    pub async fn get_receipt_by_number(
        &self,
        ctx: &SchoolContext,
        raw_number: &str,
    ) -> Result<FeeReceipt> {
        let number = receipt_number::normalize(raw_number);

        self.receipts
            .find_by_number(&ctx.school_id, &number)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Receipt '{}' not found", number)))
    }

    pub async fn list_by_student(
        &self,
        ctx: &SchoolContext,
        student_id: &str,
    ) -> Result<Vec<FeeReceipt>> {
        self.receipts
            .list_by_student(&ctx.school_id, student_id)
            .await
    }

    pub async fn list_receipts(
        &self,
        ctx: &SchoolContext,
        filter: ReceiptListFilter,
    ) -> Result<Vec<FeeReceipt>> {
        self.receipts.list(&ctx.school_id, &filter).await
    }

    pub async fn stats(
        &self,
        ctx: &SchoolContext,
        filter: ReceiptListFilter,
    ) -> Result<ReceiptStats> {
        self.receipts.stats(&ctx.school_id, &filter).await
    }

    /// Allocate a number and persist the receipt.
    ///
    /// The month count is a best-effort sequence: concurrent creators can
    /// compute the same value, the unique index catches it and the loop
    /// retries with a fresh count, then once more with a random suffix.
    async fn persist_with_number(
        &self,
        ctx: &SchoolContext,
        collection: &crate::modules::collections::models::FeeCollection,
        request: &CreateFeeReceiptRequest,
        payment_date: chrono::DateTime<Utc>,
    ) -> Result<FeeReceipt> {
        let now = Utc::now();

        for attempt in 0..self.max_number_attempts {
            let sequence = self
                .receipts
                .count_for_month(&ctx.school_id, now.year(), now.month())
                .await?
                + 1;

            let number = receipt_number::format_receipt_number(now, sequence);
            let candidate = self.build_receipt(ctx, collection, request, payment_date, number)?;

            match self.receipts.create(&candidate).await {
                Ok(()) => return Ok(candidate),
                Err(AppError::NumberingCollision(_)) => {
                    tracing::warn!(
                        school_id = %ctx.school_id,
                        attempt = attempt + 1,
                        "Receipt number collided, retrying with a fresh count"
                    );
                }
                Err(other) => return Err(other),
            }
        }

        // Sequential allocation keeps losing the race; trade the readable
        // sequence for availability
        let number = receipt_number::fallback_receipt_number(now);
        let candidate = self.build_receipt(ctx, collection, request, payment_date, number)?;

        match self.receipts.create(&candidate).await {
            Ok(()) => Ok(candidate),
            Err(AppError::NumberingCollision(_)) => Err(AppError::NumberingCollision(format!(
                "Could not allocate a unique receipt number after {} attempts",
                self.max_number_attempts + 1
            ))),
            Err(other) => Err(other),
        }
    }

    fn build_receipt(
        &self,
        ctx: &SchoolContext,
        collection: &crate::modules::collections::models::FeeCollection,
        request: &CreateFeeReceiptRequest,
        payment_date: chrono::DateTime<Utc>,
        receipt_number: String,
    ) -> Result<FeeReceipt> {
        FeeReceipt::new(
            receipt_number,
            ctx.school_id.clone(),
            collection.student_id.clone(),
            collection.id.clone(),
            collection.structure_id.clone(),
            collection.academic_year.clone(),
            request.amount,
            payment_date,
            request.payment_method,
            request.transaction_ref.clone(),
            request.cheque.clone(),
            ctx.user_id.clone(),
        )
    }
}
