use rust_decimal::Decimal;

/// Monetary scale used across the ledger (2 decimal places)
pub const MONEY_SCALE: u32 = 2;

/// Rounds a monetary value to the ledger scale
pub fn round(amount: Decimal) -> Decimal {
    amount.round_dp(MONEY_SCALE)
}

/// Validates that an amount is a well-formed monetary value (non-negative,
/// at most 2 decimal places)
pub fn validate_amount(label: &str, amount: Decimal) -> Result<(), String> {
    if amount < Decimal::ZERO {
        return Err(format!("{} cannot be negative", label));
    }

    if amount.scale() > MONEY_SCALE {
        return Err(format!(
            "{} must have at most {} decimal places, got {}",
            label,
            MONEY_SCALE,
            amount.scale()
        ));
    }

    Ok(())
}

/// Validates that an amount is strictly positive and well-formed
pub fn validate_positive(label: &str, amount: Decimal) -> Result<(), String> {
    validate_amount(label, amount)?;

    if amount <= Decimal::ZERO {
        return Err(format!("{} must be greater than zero", label));
    }

    Ok(())
}
