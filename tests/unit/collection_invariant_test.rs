// Property tests for the balance invariant and the status derivation:
// due == max(0, total - discount + late_fee - paid) after every mutation,
// paid is always the sum of active entries, and re-deriving from the same
// stored amounts never changes the result.

use chrono::{Duration, Utc};
use proptest::prelude::*;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use campusledger::modules::collections::models::fee_collection::{
    CollectionStatus, FeeCollection,
};
use campusledger::modules::collections::models::{LedgerEntry, PaymentMethod};
use campusledger::modules::structures::models::{
    DiscountPolicy, FeeFrequency, FeeStructure, LateFeePolicy, StructurePricing,
};

fn money(cents: u64) -> Decimal {
    Decimal::new(cents as i64, 2)
}

fn collection_with_total(total_cents: u64) -> FeeCollection {
    let structure = FeeStructure::new(
        "school-1".to_string(),
        "Tuition".to_string(),
        None,
        "2025-2026".to_string(),
        StructurePricing::Flat {
            amount: money(total_cents),
            category: "tuition".to_string(),
        },
        FeeFrequency::Monthly,
        10,
        LateFeePolicy::disabled(),
        DiscountPolicy::disabled(),
        "admin-1".to_string(),
    )
    .unwrap();

    FeeCollection::new(
        "school-1".to_string(),
        "student-1".to_string(),
        &structure,
        "2025-2026".to_string(),
        None,
        Utc::now() + Duration::days(30),
        None,
        "admin-1".to_string(),
    )
    .unwrap()
}

fn assert_invariant(c: &FeeCollection) {
    assert_eq!(
        c.due_amount,
        FeeCollection::compute_due(
            c.total_amount,
            c.discount_amount,
            c.late_fee_amount,
            c.paid_amount
        ),
        "due amount out of step with the amount fields"
    );
    assert!(c.due_amount >= Decimal::ZERO);
    assert!(c.paid_amount >= Decimal::ZERO);
    assert_eq!(
        c.paid_amount,
        c.active_paid_total(),
        "paid amount out of step with the active entries"
    );
}

proptest! {
    /// Applying any sequence of in-bounds payments preserves the invariant
    /// and ends in a status consistent with the amounts
    #[test]
    fn prop_payment_sequences_preserve_invariant(
        total_cents in 100u64..100_000_00u64,
        fractions in prop::collection::vec(1u64..=100u64, 1..8),
    ) {
        let mut c = collection_with_total(total_cents);
        let now = Utc::now();

        for fraction in fractions {
            // A payment somewhere between one cent and the open due
            let due_cents = (c.due_amount * Decimal::from(100))
                .trunc()
                .to_u64()
                .unwrap_or(0);
            if due_cents == 0 {
                break;
            }
            let pay = money((due_cents * fraction / 100).max(1));

            let entry = LedgerEntry::adhoc(
                c.id.clone(),
                pay,
                now,
                PaymentMethod::Cash,
                None,
                "clerk-1".to_string(),
            )
            .unwrap();

            c.apply_entry(entry, now).unwrap();
            assert_invariant(&c);
        }

        match c.status {
            CollectionStatus::Paid => prop_assert_eq!(c.due_amount, Decimal::ZERO),
            CollectionStatus::Partial => {
                prop_assert!(c.paid_amount > Decimal::ZERO);
                prop_assert!(c.due_amount > Decimal::ZERO);
            }
            CollectionStatus::Pending | CollectionStatus::Overdue => {
                prop_assert_eq!(c.paid_amount, Decimal::ZERO);
            }
            CollectionStatus::Cancelled => prop_assert!(false, "never cancelled here"),
        }
    }

    /// Reversing a receipt-backed payment restores the exact prior balance
    #[test]
    fn prop_reversal_is_exact(
        total_cents in 100u64..100_000_00u64,
        first_pct in 1u64..=50u64,
        second_pct in 1u64..=50u64,
    ) {
        let mut c = collection_with_total(total_cents);
        let now = Utc::now();

        let first = money((total_cents * first_pct / 100).max(1));
        let second = money((total_cents * second_pct / 100).max(1));

        let adhoc = LedgerEntry::adhoc(
            c.id.clone(), first, now, PaymentMethod::Cash, None, "clerk-1".to_string(),
        ).unwrap();
        c.apply_entry(adhoc, now).unwrap();

        let due_before = c.due_amount;
        let paid_before = c.paid_amount;
        let status_before = c.status;

        let backed = LedgerEntry::receipt_backed(
            c.id.clone(), "rcp-1".to_string(), second, now,
        ).unwrap();
        c.apply_entry(backed, now).unwrap();
        assert_invariant(&c);

        let reversed = c.reverse_receipt_entry("rcp-1", now).unwrap();
        assert_invariant(&c);

        prop_assert_eq!(reversed, second);
        prop_assert_eq!(c.due_amount, due_before);
        prop_assert_eq!(c.paid_amount, paid_before);
        prop_assert_eq!(c.status, status_before);
    }

    /// Status and due are pure functions of the stored amounts: deriving
    /// twice from the same inputs yields the same result
    #[test]
    fn prop_derivation_is_idempotent(
        total in 0u64..100_000_00u64,
        discount in 0u64..10_000_00u64,
        late_fee in 0u64..1_000_00u64,
        paid in 0u64..100_000_00u64,
        days_offset in -60i64..60i64,
    ) {
        let now = Utc::now();
        let due_date = now + Duration::days(days_offset);

        let (total, discount, late_fee, paid) =
            (money(total), money(discount), money(late_fee), money(paid));

        let due_once = FeeCollection::compute_due(total, discount, late_fee, paid);
        let due_twice = FeeCollection::compute_due(total, discount, late_fee, paid);
        prop_assert_eq!(due_once, due_twice);
        prop_assert!(due_once >= Decimal::ZERO);

        let status_once =
            FeeCollection::compute_status(total, discount, late_fee, paid, due_date, now);
        let status_twice =
            FeeCollection::compute_status(total, discount, late_fee, paid, due_date, now);
        prop_assert_eq!(status_once, status_twice);

        // Status agrees with the amounts it was derived from
        let final_amount = total - discount + late_fee;
        match status_once {
            CollectionStatus::Paid => prop_assert!(paid >= final_amount),
            CollectionStatus::Partial => {
                prop_assert!(paid > Decimal::ZERO && paid < final_amount)
            }
            CollectionStatus::Overdue => {
                prop_assert!(paid == Decimal::ZERO && now > due_date)
            }
            CollectionStatus::Pending => {
                prop_assert!(paid == Decimal::ZERO && now <= due_date)
            }
            CollectionStatus::Cancelled => prop_assert!(false, "derivation never cancels"),
        }
    }
}

#[test]
fn test_cancelled_status_survives_any_recompute() {
    let mut c = collection_with_total(5_000_00);
    let now = Utc::now();

    c.cancel("withdrawn", now).unwrap();

    for _ in 0..3 {
        c.recompute(now);
        assert_eq!(c.status, CollectionStatus::Cancelled);
    }
}
