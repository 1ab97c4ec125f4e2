//! Value Objects for the custody domain
//!
//! Immutable, validated domain primitives.
//! All value objects enforce invariants at construction time.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Domain errors for value object validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// Amount must be positive and representable
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Token reference is malformed
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Source and destination token are the same
    #[error("Source and destination token are both {0}")]
    SameToken(String),

    /// Instruction type string does not name a known instruction kind
    #[error("Unsupported instruction type: {0}")]
    UnsupportedInstructionType(String),

    /// A required field was missing or empty
    #[error("Missing field: {0}")]
    MissingField(String),

    /// Price quote cannot be used for conversion
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    /// Invalid transaction status transition
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),
}

// =============================================================================
// Amount
// =============================================================================

/// Amount of a fungible token, an exact positive decimal.
///
/// Serialized as a decimal string so no precision is lost on the wire.
///
/// # Invariants
/// - Must be > 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    /// Create a new Amount with validation
    ///
    /// # Errors
    /// Returns `DomainError::InvalidAmount` if value <= 0
    pub fn new(value: Decimal) -> Result<Self, DomainError> {
        if value <= Decimal::ZERO {
            return Err(DomainError::InvalidAmount(format!("Amount must be positive, got {}", value)));
        }
        Ok(Self(value.normalize()))
    }

    /// Get the underlying Decimal value
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Number of fractional digits carried by this amount.
    pub fn scale(&self) -> u32 {
        self.0.scale()
    }

    /// Whether the amount is expressible with `decimals` fractional digits.
    pub fn fits_decimals(&self, decimals: u32) -> bool {
        self.scale() <= decimals
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl FromStr for Amount {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let value = Decimal::from_str(trimmed)
            .or_else(|_| Decimal::from_scientific(trimmed))
            .map_err(|e| DomainError::InvalidAmount(format!("Cannot parse '{}': {}", s, e)))?;
        Self::new(value)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// TokenRef
// =============================================================================

/// Decimal precision assumed for tokens that do not declare one.
pub const DEFAULT_TOKEN_DECIMALS: u32 = 9;

/// Largest precision representable by the ledger's decimal type.
pub const MAX_TOKEN_DECIMALS: u32 = 28;

fn default_decimals() -> u32 {
    DEFAULT_TOKEN_DECIMALS
}

/// Identifies a fungible asset.
///
/// `symbol` is the ledger's primary key for balances. `address` is opaque
/// metadata (mint address) used by quote sources and display.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRef {
    /// Ticker, unique within the registry
    pub symbol: String,
    /// Mint address
    pub address: String,
    /// Decimal places a balance may carry
    #[serde(default = "default_decimals")]
    pub decimals: u32,
}

impl TokenRef {
    /// Create a TokenRef with validation
    ///
    /// # Errors
    /// Returns `DomainError::InvalidToken` if the symbol is empty or contains
    /// whitespace, or if `decimals` exceeds [`MAX_TOKEN_DECIMALS`].
    pub fn new(
        symbol: impl Into<String>,
        address: impl Into<String>,
        decimals: u32,
    ) -> Result<Self, DomainError> {
        let token = Self {
            symbol: symbol.into(),
            address: address.into(),
            decimals,
        };
        token.validate()?;
        Ok(token)
    }

    /// Check the invariants of a token that may have been deserialized.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.symbol.is_empty() || self.symbol.chars().any(char::is_whitespace) {
            return Err(DomainError::InvalidToken(format!(
                "Symbol must be non-empty without whitespace: '{}'",
                self.symbol
            )));
        }
        if self.decimals > MAX_TOKEN_DECIMALS {
            return Err(DomainError::InvalidToken(format!(
                "{} declares {} decimals (max {})",
                self.symbol, self.decimals, MAX_TOKEN_DECIMALS
            )));
        }
        Ok(())
    }
}

impl fmt::Display for TokenRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_amount_must_be_positive() {
        assert!(Amount::new(dec!(1.5)).is_ok());
        assert!(matches!(Amount::new(Decimal::ZERO), Err(DomainError::InvalidAmount(_))));
        assert!(matches!(Amount::new(dec!(-3)), Err(DomainError::InvalidAmount(_))));
    }

    #[test]
    fn test_amount_normalizes_trailing_zeros() {
        let amount = Amount::new(dec!(10.500)).unwrap();
        assert_eq!(amount.to_string(), "10.5");
        assert_eq!(amount.scale(), 1);
        assert!(amount.fits_decimals(1));
        assert!(!amount.fits_decimals(0));
    }

    #[test]
    fn test_amount_parse() {
        assert_eq!("0.25".parse::<Amount>().unwrap().as_decimal(), dec!(0.25));
        assert_eq!("1e-3".parse::<Amount>().unwrap().as_decimal(), dec!(0.001));
        assert!("abc".parse::<Amount>().is_err());
        assert!("0".parse::<Amount>().is_err());
    }

    #[test]
    fn test_amount_serializes_as_string() {
        let amount = Amount::new(dec!(1500)).unwrap();
        let json = serde_json::to_string(&amount).unwrap();
        assert_eq!(json, "\"1500\"");

        let parsed: Amount = serde_json::from_str("\"0.1\"").unwrap();
        assert_eq!(parsed.as_decimal(), dec!(0.1));
    }

    #[test]
    fn test_amount_deserialize_rejects_non_positive() {
        let parsed: Result<Amount, _> = serde_json::from_str("\"-1\"");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_token_ref_validation() {
        assert!(TokenRef::new("SOL", "So11111111111111111111111111111111111111112", 9).is_ok());
        assert!(matches!(TokenRef::new("", "addr", 9), Err(DomainError::InvalidToken(_))));
        assert!(matches!(TokenRef::new("US DC", "addr", 6), Err(DomainError::InvalidToken(_))));
        assert!(matches!(TokenRef::new("USDC", "addr", 29), Err(DomainError::InvalidToken(_))));
    }

    #[test]
    fn test_token_ref_default_decimals() {
        let token: TokenRef =
            serde_json::from_str(r#"{"symbol":"SOL","address":"So111"}"#).unwrap();
        assert_eq!(token.decimals, DEFAULT_TOKEN_DECIMALS);
    }
}
