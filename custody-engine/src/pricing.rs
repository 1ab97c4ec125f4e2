//! Amount conversion between tokens.
//!
//! All arithmetic is exact decimal. The destination amount is truncated
//! toward zero to the destination token's precision, so a conversion never
//! credits more than the quoted value.

use rust_decimal::{Decimal, RoundingStrategy};

use custody_domain::{Amount, DomainError};

/// Convert `from_amount` into destination units given both tokens' prices in
/// a common quote currency.
///
/// `to_amount = from_amount * from_price / to_price`, truncated toward zero to
/// `to_decimals` fractional digits.
///
/// # Errors
/// - `DomainError::InvalidPrice` if either price is not positive
/// - `DomainError::InvalidAmount` if the product overflows or the result
///   truncates to zero
pub fn convert(
    from_amount: Amount,
    from_price: Decimal,
    to_price: Decimal,
    to_decimals: u32,
) -> Result<Amount, DomainError> {
    if from_price <= Decimal::ZERO {
        return Err(DomainError::InvalidPrice(format!("source price {} is not positive", from_price)));
    }
    if to_price <= Decimal::ZERO {
        return Err(DomainError::InvalidPrice(format!(
            "destination price {} is not positive",
            to_price
        )));
    }

    let value = from_amount
        .as_decimal()
        .checked_mul(from_price)
        .and_then(|v| v.checked_div(to_price))
        .ok_or_else(|| {
            DomainError::InvalidAmount(format!(
                "{} at {}/{} overflows",
                from_amount, from_price, to_price
            ))
        })?;

    let truncated = value.round_dp_with_strategy(to_decimals, RoundingStrategy::ToZero);
    if truncated.is_zero() {
        return Err(DomainError::InvalidAmount(format!(
            "{} converts to less than one unit at {} decimals",
            from_amount, to_decimals
        )));
    }

    Amount::new(truncated)
}

/// Convert using a direct rate (destination units per source unit).
pub fn apply_rate(from_amount: Amount, rate: Decimal, to_decimals: u32) -> Result<Amount, DomainError> {
    convert(from_amount, rate, Decimal::ONE, to_decimals)
}

// =============================================================================
// Tests
// =============================================================================
