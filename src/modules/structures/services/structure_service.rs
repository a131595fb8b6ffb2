use std::sync::Arc;

use chrono::Utc;

use crate::core::{AppError, Result};
use crate::middleware::SchoolContext;
use crate::modules::collections::repositories::CollectionRepository;
use crate::modules::structures::models::{
    CreateFeeStructureRequest, DiscountPolicy, FeeComponent, FeeStructure, LateFeePolicy,
    StructurePricing, UpdateFeeStructureRequest,
};
use crate::modules::structures::repositories::{StructureListFilter, StructureRepository};

/// Business logic for fee structures
pub struct StructureService {
    structures: Arc<dyn StructureRepository>,
    collections: Arc<dyn CollectionRepository>,
}

impl StructureService {
    pub fn new(
        structures: Arc<dyn StructureRepository>,
        collections: Arc<dyn CollectionRepository>,
    ) -> Self {
        Self {
            structures,
            collections,
        }
    }

    /// Create a structure after checking the (name, class, year) slot is free
    pub async fn create_structure(
        &self,
        ctx: &SchoolContext,
        request: CreateFeeStructureRequest,
    ) -> Result<FeeStructure> {
        let pricing = Self::pricing_from(
            request.components,
            request.amount,
            request.category,
        )?;

        let existing = self
            .structures
            .find_conflicting(
                &ctx.school_id,
                &request.name,
                request.class_id.as_deref(),
                &request.academic_year,
                None,
            )
            .await?;

        if existing.is_some() {
            return Err(AppError::conflict(format!(
                "Structure '{}' already exists for this class and academic year",
                request.name
            )));
        }

        let structure = FeeStructure::new(
            ctx.school_id.clone(),
            request.name,
            request.class_id,
            request.academic_year,
            pricing,
            request.frequency,
            request.due_day,
            request.late_fee.unwrap_or_else(LateFeePolicy::disabled),
            request.discount.unwrap_or_else(DiscountPolicy::disabled),
            ctx.user_id.clone(),
        )?;

        self.structures.create(&structure).await?;

        tracing::info!(
            structure_id = %structure.id,
            school_id = %ctx.school_id,
            total_amount = %structure.total_amount,
            "Fee structure created"
        );

        Ok(structure)
    }

    pub async fn get_structure(&self, ctx: &SchoolContext, id: &str) -> Result<FeeStructure> {
        self.structures
            .find_by_id(&ctx.school_id, id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Structure '{}' not found", id)))
    }

    pub async fn list_structures(
        &self,
        ctx: &SchoolContext,
        filter: StructureListFilter,
    ) -> Result<Vec<FeeStructure>> {
        self.structures.list(&ctx.school_id, &filter).await
    }

    /// Apply a partial update; recomputes the total when pricing changes and
    /// re-checks uniqueness when identity fields change
    pub async fn update_structure(
        &self,
        ctx: &SchoolContext,
        id: &str,
        request: UpdateFeeStructureRequest,
    ) -> Result<FeeStructure> {
        let mut structure = self.get_structure(ctx, id).await?;

        let identity_changed = request.name.is_some()
            || request.class_id.is_some()
            || request.academic_year.is_some();

        if let Some(name) = request.name {
            if name.trim().is_empty() {
                return Err(AppError::validation("Structure name cannot be empty"));
            }
            structure.name = name;
        }
        if let Some(class_id) = request.class_id {
            structure.class_id = Some(class_id);
        }
        if let Some(academic_year) = request.academic_year {
            if academic_year.trim().is_empty() {
                return Err(AppError::validation("Academic year cannot be empty"));
            }
            structure.academic_year = academic_year;
        }

        if identity_changed {
            let conflicting = self
                .structures
                .find_conflicting(
                    &ctx.school_id,
                    &structure.name,
                    structure.class_id.as_deref(),
                    &structure.academic_year,
                    Some(id),
                )
                .await?;

            if conflicting.is_some() {
                return Err(AppError::conflict(format!(
                    "Structure '{}' already exists for this class and academic year",
                    structure.name
                )));
            }
        }

        if let Some(components) = request.components {
            let components = components
                .into_iter()
                .map(|c| FeeComponent::new(c.category, c.amount))
                .collect::<Result<Vec<_>>>()?;
            structure.set_components(components)?;
        } else if let Some(amount) = request.amount {
            let category = request
                .category
                .or_else(|| structure.category.clone())
                .ok_or_else(|| {
                    AppError::validation("Category is required for a flat amount")
                })?;
            structure.set_flat_amount(amount, category)?;
        }

        if let Some(frequency) = request.frequency {
            structure.frequency = frequency;
        }
        if let Some(due_day) = request.due_day {
            if !(1..=31).contains(&due_day) {
                return Err(AppError::validation("Due day must be between 1 and 31"));
            }
            structure.due_day = due_day;
        }
        if let Some(late_fee) = request.late_fee {
            structure.late_fee = late_fee;
        }
        if let Some(discount) = request.discount {
            structure.discount = discount;
        }

        structure.updated_at = Utc::now();
        self.structures.update(&structure).await?;

        Ok(structure)
    }

    pub async fn deactivate_structure(
        &self,
        ctx: &SchoolContext,
        id: &str,
    ) -> Result<FeeStructure> {
        let mut structure = self.get_structure(ctx, id).await?;
        structure.deactivate();
        self.structures.update(&structure).await?;

        tracing::info!(structure_id = %id, school_id = %ctx.school_id, "Fee structure deactivated");

        Ok(structure)
    }

    /// Delete a structure. Rejected while any collection references it;
    /// deactivation is the offered alternative.
    pub async fn delete_structure(&self, ctx: &SchoolContext, id: &str) -> Result<()> {
        // Existence check first so a missing id reads as NotFound, not Conflict
        self.get_structure(ctx, id).await?;

        let references = self
            .collections
            .count_by_structure(&ctx.school_id, id)
            .await?;

        if references > 0 {
            return Err(AppError::conflict(format!(
                "Structure is referenced by {} fee collection(s); deactivate it instead",
                references
            )));
        }

        self.structures.delete(&ctx.school_id, id).await?;

        tracing::info!(structure_id = %id, school_id = %ctx.school_id, "Fee structure deleted");

        Ok(())
    }

    fn pricing_from(
        components: Option<Vec<crate::modules::structures::models::ComponentInput>>,
        amount: Option<rust_decimal::Decimal>,
        category: Option<String>,
    ) -> Result<StructurePricing> {
        // Components take precedence; a flat amount alongside them is ignored
        if let Some(components) = components.filter(|c| !c.is_empty()) {
            let components = components
                .into_iter()
                .map(|c| FeeComponent::new(c.category, c.amount))
                .collect::<Result<Vec<_>>>()?;
            return Ok(StructurePricing::Itemized(components));
        }

        match (amount, category) {
            (Some(amount), Some(category)) => Ok(StructurePricing::Flat { amount, category }),
            (Some(_), None) => Err(AppError::validation(
                "Category is required for a flat amount",
            )),
            _ => Err(AppError::validation(
                "Either components or a flat amount with category is required",
            )),
        }
    }
}
