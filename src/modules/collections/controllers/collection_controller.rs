use std::sync::Arc;

use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::core::error::AppError;
use crate::middleware::SchoolContext;
use crate::modules::collections::models::{
    CancelFeeCollectionRequest, CreateFeeCollectionRequest, RecordPaymentRequest,
    UpdateFeeCollectionRequest,
};
use crate::modules::collections::repositories::CollectionStatsFilter;
use crate::modules::collections::services::CollectionService;

#[derive(Debug, Deserialize)]
pub struct DueListQuery {
    pub academic_year: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub academic_year: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// Create a fee collection (bill a student)
/// POST /fee-collections
pub async fn create_collection(
    service: web::Data<Arc<CollectionService>>,
    ctx: SchoolContext,
    request: web::Json<CreateFeeCollectionRequest>,
) -> Result<HttpResponse, AppError> {
    let collection = service.create_collection(&ctx, request.into_inner()).await?;

    Ok(HttpResponse::Created().json(collection))
}

/// Get a collection with its ledger entries
/// GET /fee-collections/{id}
pub async fn get_collection(
    service: web::Data<Arc<CollectionService>>,
    ctx: SchoolContext,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let collection = service.get_collection(&ctx, &path.into_inner()).await?;

    Ok(HttpResponse::Ok().json(collection))
}

/// Record an ad-hoc payment on a collection
/// POST /fee-collections/{id}/payments
pub async fn record_payment(
    service: web::Data<Arc<CollectionService>>,
    ctx: SchoolContext,
    path: web::Path<String>,
    request: web::Json<RecordPaymentRequest>,
) -> Result<HttpResponse, AppError> {
    let collection = service
        .record_payment(&ctx, &path.into_inner(), request.into_inner())
        .await?;

    Ok(HttpResponse::Ok().json(collection))
}

/// Update the non-payment fields of a collection
/// PUT /fee-collections/{id}
pub async fn update_collection(
    service: web::Data<Arc<CollectionService>>,
    ctx: SchoolContext,
    path: web::Path<String>,
    request: web::Json<UpdateFeeCollectionRequest>,
) -> Result<HttpResponse, AppError> {
    let collection = service
        .update_collection(&ctx, &path.into_inner(), request.into_inner())
        .await?;

    Ok(HttpResponse::Ok().json(collection))
}

/// Cancel a collection (terminal)
/// POST /fee-collections/{id}/cancel
pub async fn cancel_collection(
    service: web::Data<Arc<CollectionService>>,
    ctx: SchoolContext,
    path: web::Path<String>,
    request: web::Json<CancelFeeCollectionRequest>,
) -> Result<HttpResponse, AppError> {
    let collection = service
        .cancel_collection(&ctx, &path.into_inner(), &request.reason)
        .await?;

    Ok(HttpResponse::Ok().json(collection))
}

/// Delete a collection without payments
/// DELETE /fee-collections/{id}
pub async fn delete_collection(
    service: web::Data<Arc<CollectionService>>,
    ctx: SchoolContext,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    service.delete_collection(&ctx, &path.into_inner()).await?;

    Ok(HttpResponse::NoContent().finish())
}

/// List a student's collections
/// GET /fee-collections/student/{student_id}
pub async fn list_by_student(
    service: web::Data<Arc<CollectionService>>,
    ctx: SchoolContext,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let collections = service.list_by_student(&ctx, &path.into_inner()).await?;

    Ok(HttpResponse::Ok().json(collections))
}

/// Collections still owing money, soonest first
/// GET /fee-collections/due
pub async fn list_due(
    service: web::Data<Arc<CollectionService>>,
    ctx: SchoolContext,
    query: web::Query<DueListQuery>,
) -> Result<HttpResponse, AppError> {
    let collections = service
        .list_due(&ctx, query.academic_year.as_deref())
        .await?;

    Ok(HttpResponse::Ok().json(collections))
}

/// Overdue collections
/// GET /fee-collections/overdue
pub async fn list_overdue(
    service: web::Data<Arc<CollectionService>>,
    ctx: SchoolContext,
) -> Result<HttpResponse, AppError> {
    let collections = service.list_overdue(&ctx).await?;

    Ok(HttpResponse::Ok().json(collections))
}

/// Aggregate statistics over non-cancelled collections
/// GET /fee-collections/stats
pub async fn collection_stats(
    service: web::Data<Arc<CollectionService>>,
    ctx: SchoolContext,
    query: web::Query<StatsQuery>,
) -> Result<HttpResponse, AppError> {
    let query = query.into_inner();
    let filter = CollectionStatsFilter {
        academic_year: query.academic_year,
        from: query.from,
        to: query.to,
    };

    let stats = service.stats(&ctx, filter).await?;

    Ok(HttpResponse::Ok().json(stats))
}

/// Configure collection routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/fee-collections")
            .route("", web::post().to(create_collection))
            .route("/due", web::get().to(list_due))
            .route("/overdue", web::get().to(list_overdue))
            .route("/stats", web::get().to(collection_stats))
            .route("/student/{student_id}", web::get().to(list_by_student))
            .route("/{id}", web::get().to(get_collection))
            .route("/{id}", web::put().to(update_collection))
            .route("/{id}", web::delete().to(delete_collection))
            .route("/{id}/payments", web::post().to(record_payment))
            .route("/{id}/cancel", web::post().to(cancel_collection)),
    );
}
