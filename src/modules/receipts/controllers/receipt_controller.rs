use std::sync::Arc;

use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::core::error::AppError;
use crate::middleware::SchoolContext;
use crate::modules::collections::models::PaymentMethod;
use crate::modules::receipts::models::{CancelFeeReceiptRequest, CreateFeeReceiptRequest};
use crate::modules::receipts::repositories::ReceiptListFilter;
use crate::modules::receipts::services::ReceiptService;

#[derive(Debug, Deserialize)]
pub struct ListReceiptsQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub payment_method: Option<PaymentMethod>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

#[derive(Debug, Deserialize)]
pub struct ReceiptStatsQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// Issue a receipt; the payment is applied to the collection in the same call
/// POST /fee-receipts
pub async fn create_receipt(
    service: web::Data<Arc<ReceiptService>>,
    ctx: SchoolContext,
    request: web::Json<CreateFeeReceiptRequest>,
) -> Result<HttpResponse, AppError> {
    let outcome = service.create_receipt(&ctx, request.into_inner()).await?;

    Ok(HttpResponse::Created().json(outcome))
}

/// Get a receipt by ID
/// GET /fee-receipts/{id}
pub async fn get_receipt(
    service: web::Data<Arc<ReceiptService>>,
    ctx: SchoolContext,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let receipt = service.get_receipt(&ctx, &path.into_inner()).await?;

    Ok(HttpResponse::Ok().json(receipt))
}

/// Look up a receipt by its number (case-insensitive)
/// GET /fee-receipts/number/{receipt_number}
pub async fn get_receipt_by_number(
    service: web::Data<Arc<ReceiptService>>,
    ctx: SchoolContext,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let receipt = service
        .get_receipt_by_number(&ctx, &path.into_inner())
        .await?;

    Ok(HttpResponse::Ok().json(receipt))
}

/// List receipts with date-range and method filters
/// GET /fee-receipts
pub async fn list_receipts(
    service: web::Data<Arc<ReceiptService>>,
    ctx: SchoolContext,
    query: web::Query<ListReceiptsQuery>,
) -> Result<HttpResponse, AppError> {
    let query = query.into_inner();
    let filter = ReceiptListFilter {
        from: query.from,
        to: query.to,
        payment_method: query.payment_method,
        limit: query.limit,
        offset: query.offset,
    };

    let receipts = service.list_receipts(&ctx, filter).await?;

    Ok(HttpResponse::Ok().json(receipts))
}

/// List a student's receipts
/// GET /fee-receipts/student/{student_id}
pub async fn list_by_student(
    service: web::Data<Arc<ReceiptService>>,
    ctx: SchoolContext,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let receipts = service.list_by_student(&ctx, &path.into_inner()).await?;

    Ok(HttpResponse::Ok().json(receipts))
}

/// Cancel a receipt; reverses exactly its amount on the collection
/// POST /fee-receipts/{id}/cancel
pub async fn cancel_receipt(
    service: web::Data<Arc<ReceiptService>>,
    ctx: SchoolContext,
    path: web::Path<String>,
    request: web::Json<CancelFeeReceiptRequest>,
) -> Result<HttpResponse, AppError> {
    let outcome = service
        .cancel_receipt(&ctx, &path.into_inner(), &request.reason)
        .await?;

    Ok(HttpResponse::Ok().json(outcome))
}

/// Receipt statistics
/// GET /fee-receipts/stats
pub async fn receipt_stats(
    service: web::Data<Arc<ReceiptService>>,
    ctx: SchoolContext,
    query: web::Query<ReceiptStatsQuery>,
) -> Result<HttpResponse, AppError> {
    let filter = ReceiptListFilter {
        from: query.from,
        to: query.to,
        ..Default::default()
    };

    let stats = service.stats(&ctx, filter).await?;

    Ok(HttpResponse::Ok().json(stats))
}

/// Configure receipt routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/fee-receipts")
            .route("", web::post().to(create_receipt))
            .route("", web::get().to(list_receipts))
            .route("/stats", web::get().to(receipt_stats))
            .route("/number/{receipt_number}", web::get().to(get_receipt_by_number))
            .route("/student/{student_id}", web::get().to(list_by_student))
            .route("/{id}", web::get().to(get_receipt))
            .route("/{id}/cancel", web::post().to(cancel_receipt)),
    );
}
