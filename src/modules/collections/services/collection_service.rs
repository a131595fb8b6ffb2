use std::sync::Arc;

use chrono::Utc;

use crate::config::CancelCascadePolicy;
use crate::core::{AppError, Result, StudentDirectory};
use crate::middleware::SchoolContext;
use crate::modules::collections::models::{
    CreateFeeCollectionRequest, FeeCollection, LedgerEntry, RecordPaymentRequest,
    UpdateFeeCollectionRequest,
};
use crate::modules::collections::repositories::{
    CollectionPatch, CollectionRepository, CollectionStats, CollectionStatsFilter,
};
use crate::modules::receipts::repositories::ReceiptRepository;
use crate::modules::structures::repositories::StructureRepository;

/// Business logic for fee collections
pub struct CollectionService {
    collections: Arc<dyn CollectionRepository>,
    structures: Arc<dyn StructureRepository>,
    receipts: Arc<dyn ReceiptRepository>,
    directory: Arc<dyn StudentDirectory>,
    cascade_policy: CancelCascadePolicy,
}

impl CollectionService {
    pub fn new(
        collections: Arc<dyn CollectionRepository>,
        structures: Arc<dyn StructureRepository>,
        receipts: Arc<dyn ReceiptRepository>,
        directory: Arc<dyn StudentDirectory>,
        cascade_policy: CancelCascadePolicy,
    ) -> Self {
        Self {
            collections,
            structures,
            receipts,
            directory,
            cascade_policy,
        }
    }

    /// Bill a student against a structure for a period.
    ///
    /// Amounts are copied from the structure at this moment; editing the
    /// structure afterwards does not change this collection.
    pub async fn create_collection(
        &self,
        ctx: &SchoolContext,
        request: CreateFeeCollectionRequest,
    ) -> Result<FeeCollection> {
        let structure = self
            .structures
            .find_by_id(&ctx.school_id, &request.structure_id)
            .await?
            .ok_or_else(|| {
                AppError::not_found(format!("Structure '{}' not found", request.structure_id))
            })?;

        if !structure.is_active() {
            return Err(AppError::invalid_state(format!(
                "Structure '{}' is inactive and cannot be billed",
                structure.name
            )));
        }

        let student = self
            .directory
            .find_student(&ctx.school_id, &request.student_id)
            .await?
            .ok_or_else(|| {
                AppError::not_found(format!("Student '{}' not found", request.student_id))
            })?;

        if let Some(required_class) = &structure.class_id {
            if student.class_id.as_deref() != Some(required_class.as_str()) {
                return Err(AppError::validation(format!(
                    "Student '{}' is not in the class this structure applies to",
                    student.name
                )));
            }
        }

        let duplicate = self
            .collections
            .find_active_for_tuple(
                &ctx.school_id,
                &request.student_id,
                &request.structure_id,
                &request.academic_year,
                request.month,
            )
            .await?;

        if let Some(existing_id) = duplicate {
            return Err(AppError::DuplicateBilling(format!(
                "Collection '{}' already bills this student for this structure and period",
                existing_id
            )));
        }

        let collection = FeeCollection::new(
            ctx.school_id.clone(),
            request.student_id,
            &structure,
            request.academic_year,
            request.month,
            request.due_date,
            request.remarks,
            ctx.user_id.clone(),
        )?;

        // The unique index on the billing tuple is the backstop for creates
        // racing the pre-check; it also surfaces as DuplicateBilling
        self.collections.create(&collection).await?;

        tracing::info!(
            collection_id = %collection.id,
            school_id = %ctx.school_id,
            student_id = %collection.student_id,
            total_amount = %collection.total_amount,
            "Fee collection created"
        );

        Ok(collection)
    }

    pub async fn get_collection(&self, ctx: &SchoolContext, id: &str) -> Result<FeeCollection> {
        self.collections
            .find_by_id(&ctx.school_id, id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Collection '{}' not found", id)))
    }

    /// Record an ad-hoc payment (the non-receipt channel). Both channels
    /// append the same ledger entry type and feed the same paid amount.
    pub async fn record_payment(
        &self,
        ctx: &SchoolContext,
        collection_id: &str,
        request: RecordPaymentRequest,
    ) -> Result<FeeCollection> {
        let entry = LedgerEntry::adhoc(
            collection_id.to_string(),
            request.amount,
            request.paid_on.unwrap_or_else(Utc::now),
            request.payment_method,
            request.transaction_ref,
            ctx.user_id.clone(),
        )?;

        let collection = self.collections.apply_payment(&ctx.school_id, entry).await?;

        tracing::info!(
            collection_id = %collection_id,
            school_id = %ctx.school_id,
            paid_amount = %collection.paid_amount,
            due_amount = %collection.due_amount,
            status = %collection.status,
            "Payment recorded on collection"
        );

        Ok(collection)
    }

    /// Cancel a collection (terminal). Under the default retain-receipts
    /// policy its receipts stay active and reversing them remains a
    /// separate, explicit action; the cascade policy marks them cancelled
    /// along with it.
    pub async fn cancel_collection(
        &self,
        ctx: &SchoolContext,
        id: &str,
        reason: &str,
    ) -> Result<FeeCollection> {
        if reason.trim().is_empty() {
            return Err(AppError::validation("Cancellation reason is required"));
        }

        let collection = self.collections.cancel(&ctx.school_id, id, reason).await?;

        if self.cascade_policy == CancelCascadePolicy::Cascade {
            let receipts = self
                .receipts
                .find_active_by_collection(&ctx.school_id, id)
                .await?;

            for receipt in receipts {
                self.receipts
                    .mark_cancelled(
                        &ctx.school_id,
                        &receipt.id,
                        &ctx.user_id,
                        &format!("Collection cancelled: {}", reason),
                        Utc::now(),
                    )
                    .await?;

                tracing::info!(
                    receipt_id = %receipt.id,
                    collection_id = %id,
                    "Receipt cancelled by collection cascade"
                );
            }
        }

        tracing::info!(
            collection_id = %id,
            school_id = %ctx.school_id,
            policy = ?self.cascade_policy,
            "Fee collection cancelled"
        );

        Ok(collection)
    }

    pub async fn update_collection(
        &self,
        ctx: &SchoolContext,
        id: &str,
        request: UpdateFeeCollectionRequest,
    ) -> Result<FeeCollection> {
        let patch = CollectionPatch {
            due_date: request.due_date,
            remarks: request.remarks,
            late_fee_amount: request.late_fee_amount,
        };

        self.collections
            .update_details(&ctx.school_id, id, patch)
            .await
    }

    /// Physical delete; refused once any payment has been recorded
    pub async fn delete_collection(&self, ctx: &SchoolContext, id: &str) -> Result<()> {
        self.collections.delete(&ctx.school_id, id).await?;

        tracing::info!(collection_id = %id, school_id = %ctx.school_id, "Fee collection deleted");

        Ok(())
    }

    pub async fn list_by_student(
        &self,
        ctx: &SchoolContext,
        student_id: &str,
    ) -> Result<Vec<FeeCollection>> {
        self.collections
            .list_by_student(&ctx.school_id, student_id)
            .await
    }

    pub async fn list_due(
        &self,
        ctx: &SchoolContext,
        academic_year: Option<&str>,
    ) -> Result<Vec<FeeCollection>> {
        self.collections
            .list_due(&ctx.school_id, academic_year)
            .await
    }

    pub async fn list_overdue(&self, ctx: &SchoolContext) -> Result<Vec<FeeCollection>> {
        self.collections.list_overdue(&ctx.school_id).await
    }

    pub async fn stats(
        &self,
        ctx: &SchoolContext,
        filter: CollectionStatsFilter,
    ) -> Result<CollectionStats> {
        self.collections.stats(&ctx.school_id, &filter).await
    }
}
