//! Instruction translation.
//!
//! Normalizes a loosely typed [`ContractCall`] into a ledger-executable
//! [`Instruction`]. Pure: no I/O, no registry lookups.

use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::debug;

use custody_domain::{Amount, ContractCall, DomainError, Instruction, InstructionKind};

use crate::pricing::apply_rate;

/// Translate a contract call into an instruction.
///
/// `from_amount` is converted to an exact decimal using the shortest decimal
/// representation of the number, so `0.1` becomes exactly `0.1`. `to_amount`
/// stays unresolved unless the call carries an authoritative `rate`.
///
/// # Errors
/// - `DomainError::UnsupportedInstructionType` for an unknown `type`
/// - `DomainError::InvalidAmount` for a non-positive, non-finite or
///   over-precise `from_amount`
/// - `DomainError::SameToken` / `DomainError::InvalidToken` for bad tokens
pub fn to_instruction(call: &ContractCall) -> Result<Instruction, DomainError> {
    let kind = InstructionKind::from_str(&call.kind)?;
    let params = &call.params;

    let from_amount = Amount::new(number_to_decimal(params.from_amount, "fromAmount")?)?;
    if !from_amount.fits_decimals(params.from_token.decimals) {
        return Err(DomainError::InvalidAmount(format!(
            "{} {} exceeds the token's {} decimals",
            from_amount, params.from_token.symbol, params.from_token.decimals
        )));
    }

    let to_amount = match params.rate {
        Some(rate) => Some(apply_rate(
            from_amount,
            number_to_decimal(rate, "rate")?,
            params.to_token.decimals,
        )?),
        None => None,
    };

    let instruction = Instruction::new(
        kind,
        params.from_token.clone(),
        params.to_token.clone(),
        from_amount,
        to_amount,
    )?
    .with_metadata(call.metadata.clone().unwrap_or(serde_json::Value::Null));

    debug!(
        kind = %instruction.kind,
        from = %instruction.from_token.symbol,
        to = %instruction.to_token.symbol,
        from_amount = %instruction.from_amount,
        to_amount = ?instruction.to_amount.map(|a| a.to_string()),
        "Translated contract call"
    );

    Ok(instruction)
}

fn number_to_decimal(value: f64, field: &str) -> Result<Decimal, DomainError> {
    if !value.is_finite() {
        return Err(DomainError::InvalidAmount(format!("{} is not finite: {}", field, value)));
    }
    // f64's Display is the shortest string that round-trips, never exponential.
    Decimal::from_str(&value.to_string())
        .map_err(|e| DomainError::InvalidAmount(format!("{} {} is not representable: {}", field, value, e)))
}

// =============================================================================
// Tests
// =============================================================================
