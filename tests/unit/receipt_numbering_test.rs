// Receipt numbering: best-effort monthly sequence, uniqueness under
// concurrent creation, and the random-suffix fallback when the sequential
// path keeps colliding.

#[path = "../support/mod.rs"]
mod support;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal_macros::dec;

use campusledger::core::error::AppError;
use campusledger::core::Result;
use campusledger::modules::collections::repositories::CollectionRepository;
use campusledger::modules::receipts::models::FeeReceipt;
use campusledger::modules::receipts::repositories::{
    ReceiptListFilter, ReceiptRepository, ReceiptStats,
};
use campusledger::modules::receipts::services::ReceiptService;

use support::*;

#[tokio::test]
async fn test_sequential_numbers_within_a_month() {
    let ledger = ledger();
    let collection_id = billed_collection(&ledger, dec!(5000)).await;

    let first = ledger
        .receipt_service
        .create_receipt(&ctx(), receipt_request(&collection_id, dec!(100)))
        .await
        .unwrap();
    let second = ledger
        .receipt_service
        .create_receipt(&ctx(), receipt_request(&collection_id, dec!(100)))
        .await
        .unwrap();

    let prefix = format!("RCP-{}", Utc::now().format("%Y%m"));
    assert!(first.receipt.receipt_number.starts_with(&prefix));
    assert!(first.receipt.receipt_number.ends_with("-0001"));
    assert!(second.receipt.receipt_number.ends_with("-0002"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creation_yields_unique_numbers() {
    let ledger = ledger();
    let collection_id = billed_collection(&ledger, dec!(5000)).await;

    let service = Arc::new(ledger.receipt_service);

    // Concurrent creators can compute the same sequence; the storage unique
    // index plus retry must still hand every one of them a distinct number
    let mut handles = Vec::new();
    for _ in 0..5 {
        let service = service.clone();
        let collection_id = collection_id.clone();
        handles.push(tokio::spawn(async move {
            service
                .create_receipt(&ctx(), receipt_request(&collection_id, dec!(100)))
                .await
        }));
    }

    let mut numbers = HashSet::new();
    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        assert!(
            numbers.insert(outcome.receipt.receipt_number.clone()),
            "duplicate receipt number {}",
            outcome.receipt.receipt_number
        );
    }

    assert_eq!(numbers.len(), 5);

    // Every payment landed exactly once
    let collection = ledger
        .collections
        .find_by_id(SCHOOL, &collection_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(collection.paid_amount, dec!(500));
    assert_eq!(collection.due_amount, dec!(4500));
}

/// Receipt repository whose month count never advances, so the sequential
/// path collides forever and the service has to fall back
struct StuckCountReceiptRepository {
    inner: Arc<InMemoryReceiptRepository>,
}

#[async_trait]
impl ReceiptRepository for StuckCountReceiptRepository {
    async fn create(&self, receipt: &FeeReceipt) -> Result<()> {
        self.inner.create(receipt).await
    }

    async fn delete(&self, school_id: &str, id: &str) -> Result<()> {
        self.inner.delete(school_id, id).await
    }

    async fn find_by_id(&self, school_id: &str, id: &str) -> Result<Option<FeeReceipt>> {
        self.inner.find_by_id(school_id, id).await
    }

    async fn find_by_number(
        &self,
        school_id: &str,
        receipt_number: &str,
    ) -> Result<Option<FeeReceipt>> {
        self.inner.find_by_number(school_id, receipt_number).await
    }

    async fn find_active_by_collection(
        &self,
        school_id: &str,
        collection_id: &str,
    ) -> Result<Vec<FeeReceipt>> {
        self.inner
            .find_active_by_collection(school_id, collection_id)
            .await
    }

    async fn list_by_student(
        &self,
        school_id: &str,
        student_id: &str,
    ) -> Result<Vec<FeeReceipt>> {
        self.inner.list_by_student(school_id, student_id).await
    }

    async fn list(&self, school_id: &str, filter: &ReceiptListFilter) -> Result<Vec<FeeReceipt>> {
        self.inner.list(school_id, filter).await
    }

    async fn count_for_month(&self, _school_id: &str, _year: i32, _month: u32) -> Result<i64> {
        Ok(0)
    }

    async fn mark_cancelled(
        &self,
        school_id: &str,
        id: &str,
        cancelled_by: &str,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<FeeReceipt> {
        self.inner
            .mark_cancelled(school_id, id, cancelled_by, reason, at)
            .await
    }

    async fn stats(&self, school_id: &str, filter: &ReceiptListFilter) -> Result<ReceiptStats> {
        self.inner.stats(school_id, filter).await
    }
}

#[tokio::test]
async fn test_fallback_suffix_when_sequence_keeps_colliding() {
    let ledger = ledger();
    let collection_id = billed_collection(&ledger, dec!(5000)).await;

    let stuck = Arc::new(StuckCountReceiptRepository {
        inner: ledger.receipts.clone(),
    });
    let service = ReceiptService::new(stuck, ledger.collections.clone(), 2);

    // First create takes RCP-YYYYMM-0001
    let first = service
        .create_receipt(&ctx(), receipt_request(&collection_id, dec!(100)))
        .await
        .unwrap();
    assert!(first.receipt.receipt_number.ends_with("-0001"));

    // Second sees the same count, collides on every sequential attempt and
    // lands on the random suffix
    let second = service
        .create_receipt(&ctx(), receipt_request(&collection_id, dec!(100)))
        .await
        .unwrap();

    assert_ne!(first.receipt.receipt_number, second.receipt.receipt_number);
    assert!(!second.receipt.receipt_number.ends_with("-0001"));

    let prefix = format!("RCP-{}", Utc::now().format("%Y%m"));
    assert!(second.receipt.receipt_number.starts_with(&prefix));

    // Both payments applied
    let collection = ledger
        .collections
        .find_by_id(SCHOOL, &collection_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(collection.paid_amount, dec!(200));
}

#[tokio::test]
async fn test_lookup_by_number_is_case_insensitive() {
    let ledger = ledger();
    let collection_id = billed_collection(&ledger, dec!(5000)).await;

    let outcome = ledger
        .receipt_service
        .create_receipt(&ctx(), receipt_request(&collection_id, dec!(250)))
        .await
        .unwrap();

    let lowercase = outcome.receipt.receipt_number.to_lowercase();
    let found = ledger
        .receipt_service
        .get_receipt_by_number(&ctx(), &format!("  {} ", lowercase))
        .await
        .unwrap();

    assert_eq!(found.id, outcome.receipt.id);

    let err = ledger
        .receipt_service
        .get_receipt_by_number(&ctx(), "RCP-190001-0001")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_receipt_stats_split_active_and_cancelled() {
    let ledger = ledger();
    let collection_id = billed_collection(&ledger, dec!(5000)).await;

    ledger
        .receipt_service
        .create_receipt(&ctx(), receipt_request(&collection_id, dec!(1000)))
        .await
        .unwrap();
    let second = ledger
        .receipt_service
        .create_receipt(&ctx(), receipt_request(&collection_id, dec!(3000)))
        .await
        .unwrap();
    ledger
        .receipt_service
        .cancel_receipt(&ctx(), &second.receipt.id, "entered twice")
        .await
        .unwrap();

    let stats = ledger
        .receipt_service
        .stats(&ctx(), ReceiptListFilter::default())
        .await
        .unwrap();

    assert_eq!(stats.receipt_count, 2);
    assert_eq!(stats.cancelled_count, 1);
    // Totals cover active receipts only
    assert_eq!(stats.total_amount, dec!(1000));
    assert_eq!(stats.average_amount, dec!(1000));
}
