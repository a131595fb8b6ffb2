// Structure rules through the service: pricing exclusivity, the
// (name, class, year) slot, total recomputation on component changes and
// the deactivate-instead-of-delete path.

#[path = "../support/mod.rs"]
mod support;

use rust_decimal_macros::dec;

use campusledger::core::error::AppError;
use campusledger::modules::structures::models::{
    ComponentInput, CreateFeeStructureRequest, FeeFrequency, StructureStatus,
    UpdateFeeStructureRequest,
};

use support::*;

fn create_request(name: &str) -> CreateFeeStructureRequest {
    CreateFeeStructureRequest {
        name: name.to_string(),
        class_id: None,
        academic_year: "2025-2026".to_string(),
        amount: Some(dec!(5000)),
        category: Some("tuition".to_string()),
        components: None,
        frequency: FeeFrequency::Monthly,
        due_day: 10,
        late_fee: None,
        discount: None,
    }
}

#[tokio::test]
async fn test_components_take_precedence_over_flat_amount() {
    let ledger = ledger();

    let mut request = create_request("Annual Fees");
    request.amount = Some(dec!(99999));
    request.components = Some(vec![
        ComponentInput {
            category: "tuition".to_string(),
            amount: dec!(4000),
        },
        ComponentInput {
            category: "transport".to_string(),
            amount: dec!(1200),
        },
    ]);

    let structure = ledger
        .structure_service
        .create_structure(&ctx(), request)
        .await
        .unwrap();

    // The supplied flat amount is ignored; the component sum is authoritative
    assert_eq!(structure.total_amount, dec!(5200));
    assert!(structure.amount.is_none());
    assert_eq!(structure.components.len(), 2);
}

#[tokio::test]
async fn test_missing_pricing_rejected() {
    let ledger = ledger();

    let mut request = create_request("Annual Fees");
    request.amount = None;
    request.category = None;

    let err = ledger
        .structure_service
        .create_structure(&ctx(), request)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_name_slot_is_unique_per_class_and_year() {
    let ledger = ledger();

    ledger
        .structure_service
        .create_structure(&ctx(), create_request("Tuition"))
        .await
        .unwrap();

    // Same name, same (missing) class, same year
    let err = ledger
        .structure_service
        .create_structure(&ctx(), create_request("Tuition"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    // A different year frees the slot
    let mut next_year = create_request("Tuition");
    next_year.academic_year = "2026-2027".to_string();
    ledger
        .structure_service
        .create_structure(&ctx(), next_year)
        .await
        .unwrap();

    // So does a class restriction
    let mut with_class = create_request("Tuition");
    with_class.class_id = Some("class-5a".to_string());
    ledger
        .structure_service
        .create_structure(&ctx(), with_class)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_update_recomputes_total_from_components() {
    let ledger = ledger();

    let structure = ledger
        .structure_service
        .create_structure(&ctx(), create_request("Tuition"))
        .await
        .unwrap();
    assert_eq!(structure.total_amount, dec!(5000));

    let updated = ledger
        .structure_service
        .update_structure(
            &ctx(),
            &structure.id,
            UpdateFeeStructureRequest {
                name: None,
                class_id: None,
                academic_year: None,
                amount: None,
                category: None,
                components: Some(vec![
                    ComponentInput {
                        category: "tuition".to_string(),
                        amount: dec!(4500),
                    },
                    ComponentInput {
                        category: "lab".to_string(),
                        amount: dec!(250),
                    },
                ]),
                frequency: None,
                due_day: None,
                late_fee: None,
                discount: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.total_amount, dec!(4750));
    assert!(updated.amount.is_none());
}

#[tokio::test]
async fn test_update_into_occupied_slot_rejected() {
    let ledger = ledger();

    ledger
        .structure_service
        .create_structure(&ctx(), create_request("Tuition"))
        .await
        .unwrap();
    let other = ledger
        .structure_service
        .create_structure(&ctx(), create_request("Transport"))
        .await
        .unwrap();

    let err = ledger
        .structure_service
        .update_structure(
            &ctx(),
            &other.id,
            UpdateFeeStructureRequest {
                name: Some("Tuition".to_string()),
                class_id: None,
                academic_year: None,
                amount: None,
                category: None,
                components: None,
                frequency: None,
                due_day: None,
                late_fee: None,
                discount: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn test_deactivate_and_delete_unreferenced_structure() {
    let ledger = ledger();

    let structure = ledger
        .structure_service
        .create_structure(&ctx(), create_request("Tuition"))
        .await
        .unwrap();

    let deactivated = ledger
        .structure_service
        .deactivate_structure(&ctx(), &structure.id)
        .await
        .unwrap();
    assert_eq!(deactivated.status, StructureStatus::Inactive);

    // Nothing references it, so deletion is allowed
    ledger
        .structure_service
        .delete_structure(&ctx(), &structure.id)
        .await
        .unwrap();

    let err = ledger
        .structure_service
        .get_structure(&ctx(), &structure.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_structure_edits_do_not_touch_existing_collections() {
    let ledger = ledger();
    let collection_id = billed_collection(&ledger, dec!(5000)).await;

    let collection = ledger
        .collection_service
        .get_collection(&ctx(), &collection_id)
        .await
        .unwrap();

    // Repricing the structure afterwards leaves the billed amounts alone
    ledger
        .structure_service
        .update_structure(
            &ctx(),
            &collection.structure_id,
            UpdateFeeStructureRequest {
                name: None,
                class_id: None,
                academic_year: None,
                amount: Some(dec!(9000)),
                category: None,
                components: None,
                frequency: None,
                due_day: None,
                late_fee: None,
                discount: None,
            },
        )
        .await
        .unwrap();

    let after = ledger
        .collection_service
        .get_collection(&ctx(), &collection_id)
        .await
        .unwrap();
    assert_eq!(after.total_amount, dec!(5000));
    assert_eq!(after.due_amount, dec!(5000));
}
