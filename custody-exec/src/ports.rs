//! Execution layer port definitions.
//!
//! Ports define the interfaces for external services. Adapters implement
//! these ports for specific services (an HTTP price API, the stub, etc.).

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::error::ExecError;

// =============================================================================
// Quote Port
// =============================================================================

/// Port for price quotes.
///
/// Quotes are only used to resolve a swap's destination amount. A failure here
/// fails the transaction before it reaches the ledger.
///
/// Implementations:
/// - `StubQuotes` - For testing (configurable prices)
#[async_trait]
pub trait QuotePort: Send + Sync {
    /// Get prices for token mint addresses in a common quote currency.
    ///
    /// Addresses without a known price are absent from the returned map.
    async fn get_prices(
        &self,
        token_addresses: &[String],
    ) -> Result<HashMap<String, Decimal>, ExecError>;
}
