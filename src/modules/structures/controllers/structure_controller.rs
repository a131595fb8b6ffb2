use std::sync::Arc;

use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::core::error::AppError;
use crate::middleware::SchoolContext;
use crate::modules::structures::models::{
    CreateFeeStructureRequest, StructureStatus, UpdateFeeStructureRequest,
};
use crate::modules::structures::repositories::StructureListFilter;
use crate::modules::structures::services::StructureService;

/// Query parameters for listing structures
#[derive(Debug, Deserialize)]
pub struct ListStructuresQuery {
    pub academic_year: Option<String>,
    pub status: Option<StructureStatus>,
    pub class_id: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

/// Create a fee structure
/// POST /fee-structures
pub async fn create_structure(
    service: web::Data<Arc<StructureService>>,
    ctx: SchoolContext,
    request: web::Json<CreateFeeStructureRequest>,
) -> Result<HttpResponse, AppError> {
    let structure = service.create_structure(&ctx, request.into_inner()).await?;

    Ok(HttpResponse::Created().json(structure))
}

/// Get a fee structure by ID
/// GET /fee-structures/{id}
pub async fn get_structure(
    service: web::Data<Arc<StructureService>>,
    ctx: SchoolContext,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let structure = service.get_structure(&ctx, &path.into_inner()).await?;

    Ok(HttpResponse::Ok().json(structure))
}

/// List fee structures
/// GET /fee-structures
pub async fn list_structures(
    service: web::Data<Arc<StructureService>>,
    ctx: SchoolContext,
    query: web::Query<ListStructuresQuery>,
) -> Result<HttpResponse, AppError> {
    let query = query.into_inner();
    let filter = StructureListFilter {
        academic_year: query.academic_year,
        status: query.status,
        class_id: query.class_id,
        limit: query.limit,
        offset: query.offset,
    };

    let structures = service.list_structures(&ctx, filter).await?;

    Ok(HttpResponse::Ok().json(structures))
}

/// Update a fee structure
/// PUT /fee-structures/{id}
pub async fn update_structure(
    service: web::Data<Arc<StructureService>>,
    ctx: SchoolContext,
    path: web::Path<String>,
    request: web::Json<UpdateFeeStructureRequest>,
) -> Result<HttpResponse, AppError> {
    let structure = service
        .update_structure(&ctx, &path.into_inner(), request.into_inner())
        .await?;

    Ok(HttpResponse::Ok().json(structure))
}

/// Deactivate a fee structure
/// POST /fee-structures/{id}/deactivate
pub async fn deactivate_structure(
    service: web::Data<Arc<StructureService>>,
    ctx: SchoolContext,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let structure = service
        .deactivate_structure(&ctx, &path.into_inner())
        .await?;

    Ok(HttpResponse::Ok().json(structure))
}

/// Delete a fee structure (rejected while referenced by collections)
/// DELETE /fee-structures/{id}
pub async fn delete_structure(
    service: web::Data<Arc<StructureService>>,
    ctx: SchoolContext,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    service.delete_structure(&ctx, &path.into_inner()).await?;

    Ok(HttpResponse::NoContent().finish())
}

/// Configure structure routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/fee-structures")
            .route("", web::post().to(create_structure))
            .route("", web::get().to(list_structures))
            .route("/{id}", web::get().to(get_structure))
            .route("/{id}", web::put().to(update_structure))
            .route("/{id}/deactivate", web::post().to(deactivate_structure))
            .route("/{id}", web::delete().to(delete_structure)),
    );
}
