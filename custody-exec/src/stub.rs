//! Stub implementations for testing.
//!
//! Simulates a price source without making real API calls.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use crate::error::ExecError;
use crate::ports::QuotePort;

// =============================================================================
// Stub Quotes
// =============================================================================

/// Stub quote source for testing.
///
/// Serves prices that were set explicitly, keyed by mint address.
pub struct StubQuotes {
    /// Current prices by token address
    prices: RwLock<HashMap<String, Decimal>>,
    /// Whether to simulate a failure on the next request
    fail_next: AtomicBool,
    /// Number of `get_prices` calls served
    calls: AtomicUsize,
}

impl StubQuotes {
    /// Create a stub with no prices.
    pub fn new() -> Self {
        Self {
            prices: RwLock::new(HashMap::new()),
            fail_next: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    /// Create a stub with initial prices.
    pub fn with_prices(prices: impl IntoIterator<Item = (String, Decimal)>) -> Self {
        let stub = Self::new();
        for (address, price) in prices {
            stub.set_price(&address, price);
        }
        stub
    }

    /// Set price for a token address.
    pub fn set_price(&self, address: &str, price: Decimal) {
        if let Ok(mut prices) = self.prices.write() {
            prices.insert(address.to_string(), price);
        }
    }

    /// Remove the price for a token address.
    pub fn remove_price(&self, address: &str) {
        if let Ok(mut prices) = self.prices.write() {
            prices.remove(address);
        }
    }

    /// Configure the next request to fail.
    pub fn set_fail_next(&self, fail: bool) {
        self.fail_next.store(fail, Ordering::SeqCst);
    }

    /// Number of requests served so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for StubQuotes {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QuotePort for StubQuotes {
    async fn get_prices(
        &self,
        token_addresses: &[String],
    ) -> Result<HashMap<String, Decimal>, ExecError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        // Reset after check
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(ExecError::QuoteUnavailable("Simulated quote failure".to_string()));
        }

        let prices = self
            .prices
            .read()
            .map_err(|e| ExecError::Internal(format!("Failed to acquire price lock: {}", e)))?;

        Ok(token_addresses
            .iter()
            .filter_map(|address| prices.get(address).map(|p| (address.clone(), *p)))
            .collect())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_stub_quotes_known_and_unknown() {
        let quotes = StubQuotes::with_prices([("sol-mint".to_string(), dec!(150))]);

        let prices = quotes
            .get_prices(&["sol-mint".to_string(), "bonk-mint".to_string()])
            .await
            .unwrap();

        assert_eq!(prices.get("sol-mint"), Some(&dec!(150)));
        assert!(!prices.contains_key("bonk-mint"));
        assert_eq!(quotes.call_count(), 1);
    }

    #[tokio::test]
    async fn test_stub_quotes_simulated_failure() {
        let quotes = StubQuotes::new();
        quotes.set_price("sol-mint", dec!(150));
        quotes.set_fail_next(true);

        let result = quotes.get_prices(&["sol-mint".to_string()]).await;
        assert!(matches!(result, Err(ExecError::QuoteUnavailable(_))));

        // Next call should succeed
        let result = quotes.get_prices(&["sol-mint".to_string()]).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_stub_quotes_remove_price() {
        let quotes = StubQuotes::new();
        quotes.set_price("sol-mint", dec!(150));
        quotes.remove_price("sol-mint");

        let prices = quotes.get_prices(&["sol-mint".to_string()]).await.unwrap();
        assert!(prices.is_empty());
    }
}
