//! Token registry
//!
//! The set of tokens the ledger may hold. Fixed at construction.

use std::collections::HashMap;

use custody_domain::{DomainError, TokenRef};

/// Registered tokens keyed by symbol
#[derive(Debug, Clone, Default)]
pub struct TokenRegistry {
    tokens: HashMap<String, TokenRef>,
}

impl TokenRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry from a list of tokens
    ///
    /// # Errors
    /// Returns `DomainError::InvalidToken` for a malformed token or a
    /// duplicate symbol.
    pub fn with_tokens(tokens: impl IntoIterator<Item = TokenRef>) -> Result<Self, DomainError> {
        let mut registry = Self::new();
        for token in tokens {
            registry.register(token)?;
        }
        Ok(registry)
    }

    /// Add a token
    pub fn register(&mut self, token: TokenRef) -> Result<(), DomainError> {
        token.validate()?;
        if self.tokens.contains_key(&token.symbol) {
            return Err(DomainError::InvalidToken(format!("{} registered twice", token.symbol)));
        }
        self.tokens.insert(token.symbol.clone(), token);
        Ok(())
    }

    /// Look up a token by symbol
    pub fn get(&self, symbol: &str) -> Option<&TokenRef> {
        self.tokens.get(symbol)
    }

    /// Whether `symbol` is registered
    pub fn contains(&self, symbol: &str) -> bool {
        self.tokens.contains_key(symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let registry = TokenRegistry::with_tokens([
            TokenRef::new("SOL", "sol-mint", 9).unwrap(),
            TokenRef::new("USDC", "usdc-mint", 6).unwrap(),
        ])
        .unwrap();

        assert!(registry.contains("SOL"));
        assert!(!registry.contains("BONK"));
        assert_eq!(registry.get("USDC").unwrap().address, "usdc-mint");
        assert_eq!(registry.get("SOL").unwrap().decimals, 9);
    }

    #[test]
    fn test_duplicate_symbol_rejected() {
        let result = TokenRegistry::with_tokens([
            TokenRef::new("SOL", "a", 9).unwrap(),
            TokenRef::new("SOL", "b", 9).unwrap(),
        ]);
        assert!(matches!(result, Err(DomainError::InvalidToken(_))));
    }
}
