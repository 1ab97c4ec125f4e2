//! Daemon configuration.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::error::{DaemonError, DaemonResult};
use custody_domain::{TokenRef, UserId};
use custody_exec::DEFAULT_QUOTE_TIMEOUT;
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Wrapped SOL mint
pub const SOL_MINT: &str = "So11111111111111111111111111111111111111112";
/// USDC mint
pub const USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
/// Marinade staked SOL mint
pub const MSOL_MINT: &str = "mSoLzYCxHdYgdzU16g5QSh3i5K3z3KZK7ytfqcJm7So";

// =============================================================================
// Configuration
// =============================================================================

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// API server configuration
    pub api: ApiConfig,

    /// Confirmation broker configuration
    pub broker: BrokerConfig,

    /// Ledger configuration
    pub ledger: LedgerConfig,

    /// Environment (test, development, production)
    pub environment: Environment,
}

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
}

/// Confirmation broker configuration.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// How long a surfaced request waits for a decision before auto-rejecting
    pub confirmation_timeout: Duration,
    /// Command mailbox capacity
    pub channel_capacity: usize,
    /// Upper bound on one price-quote request
    pub quote_timeout: Duration,
    /// Confirm every surfaced request automatically
    pub auto_confirm: bool,
}

/// Ledger configuration.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Token registry
    pub tokens: Vec<TokenRef>,
    /// Initial balances as (user, symbol, amount)
    pub seed_balances: Vec<(UserId, String, Decimal)>,
    /// Stub quote prices as (symbol, price)
    pub stub_prices: Vec<(String, Decimal)>,
}

/// Environment type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Test environment (uses stubs)
    Test,
    /// Development environment
    Development,
    /// Production environment
    Production,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> DaemonResult<Self> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        let environment = Self::load_environment()?;
        let api = Self::load_api_config()?;
        let broker = Self::load_broker_config()?;
        let ledger = Self::load_ledger_config()?;

        Ok(Self {
            api,
            broker,
            ledger,
            environment,
        })
    }

    /// Create test configuration.
    pub fn test() -> Self {
        Self {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
            },
            broker: BrokerConfig::default(),
            ledger: LedgerConfig::default(),
            environment: Environment::Test,
        }
    }

    fn load_environment() -> DaemonResult<Environment> {
        let env_str = env::var("CUSTODY_ENV").unwrap_or_else(|_| "development".to_string());

        match env_str.to_lowercase().as_str() {
            "test" => Ok(Environment::Test),
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(DaemonError::Config(format!(
                "Invalid CUSTODY_ENV: {}. Expected: test, development, production",
                other
            ))),
        }
    }

    fn load_api_config() -> DaemonResult<ApiConfig> {
        let host = env::var("CUSTODY_API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = Self::load_parsed_env("CUSTODY_API_PORT", 8080u16)?;

        Ok(ApiConfig { host, port })
    }

    fn load_broker_config() -> DaemonResult<BrokerConfig> {
        let timeout_secs = Self::load_parsed_env("CUSTODY_CONFIRMATION_TIMEOUT_SECS", 300u64)?;
        if timeout_secs == 0 {
            return Err(DaemonError::Config(
                "CUSTODY_CONFIRMATION_TIMEOUT_SECS must be positive".to_string(),
            ));
        }

        let channel_capacity = Self::load_parsed_env("CUSTODY_BROKER_CHANNEL_CAPACITY", 64usize)?;
        if channel_capacity == 0 {
            return Err(DaemonError::Config(
                "CUSTODY_BROKER_CHANNEL_CAPACITY must be positive".to_string(),
            ));
        }

        let quote_timeout_secs = Self::load_parsed_env("CUSTODY_QUOTE_TIMEOUT_SECS", 10u64)?;
        if quote_timeout_secs == 0 {
            return Err(DaemonError::Config(
                "CUSTODY_QUOTE_TIMEOUT_SECS must be positive".to_string(),
            ));
        }

        Ok(BrokerConfig {
            confirmation_timeout: Duration::from_secs(timeout_secs),
            channel_capacity,
            quote_timeout: Duration::from_secs(quote_timeout_secs),
            auto_confirm: Self::load_parsed_env("CUSTODY_AUTO_CONFIRM", false)?,
        })
    }

    fn load_ledger_config() -> DaemonResult<LedgerConfig> {
        let defaults = LedgerConfig::default();

        let seed_balances = match env::var("CUSTODY_SEED_BALANCES") {
            Ok(val) => parse_seed_balances(&val)?,
            Err(_) => defaults.seed_balances,
        };
        let stub_prices = match env::var("CUSTODY_STUB_PRICES") {
            Ok(val) => parse_prices(&val)?,
            Err(_) => defaults.stub_prices,
        };

        Ok(LedgerConfig {
            tokens: defaults.tokens,
            seed_balances,
            stub_prices,
        })
    }

    fn load_parsed_env<T: FromStr>(key: &str, default: T) -> DaemonResult<T> {
        match env::var(key) {
            Ok(val) => val
                .trim()
                .parse::<T>()
                .map_err(|_| DaemonError::Config(format!("Invalid {} value: {}", key, val))),
            Err(_) => Ok(default),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            broker: BrokerConfig::default(),
            ledger: LedgerConfig::default(),
            environment: Environment::Development,
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            confirmation_timeout: Duration::from_secs(300),
            channel_capacity: 64,
            quote_timeout: DEFAULT_QUOTE_TIMEOUT,
            auto_confirm: false,
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            tokens: default_tokens(),
            seed_balances: Vec::new(),
            stub_prices: vec![
                ("SOL".to_string(), Decimal::new(150, 0)),
                ("USDC".to_string(), Decimal::ONE),
                ("MSOL".to_string(), Decimal::new(165, 0)),
            ],
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Test => write!(f, "test"),
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// SOL, USDC and mSOL.
pub fn default_tokens() -> Vec<TokenRef> {
    vec![
        TokenRef {
            symbol: "SOL".to_string(),
            address: SOL_MINT.to_string(),
            decimals: 9,
        },
        TokenRef {
            symbol: "USDC".to_string(),
            address: USDC_MINT.to_string(),
            decimals: 6,
        },
        TokenRef {
            symbol: "MSOL".to_string(),
            address: MSOL_MINT.to_string(),
            decimals: 9,
        },
    ]
}

// =============================================================================
// Parsing
// =============================================================================

/// Parse `user:SYMBOL=amount;...`.
pub fn parse_seed_balances(value: &str) -> DaemonResult<Vec<(UserId, String, Decimal)>> {
    entries(value)
        .map(|entry| {
            let (user, rest) = entry
                .split_once(':')
                .ok_or_else(|| DaemonError::Config(format!("Invalid seed balance: {}", entry)))?;
            let (symbol, amount) = parse_symbol_value(rest, entry)?;
            if user.trim().is_empty() {
                return Err(DaemonError::Config(format!("Missing user in seed balance: {}", entry)));
            }
            Ok((user.trim().to_string(), symbol, amount))
        })
        .collect()
}

/// Parse `SYMBOL=price;...`.
pub fn parse_prices(value: &str) -> DaemonResult<Vec<(String, Decimal)>> {
    entries(value).map(|entry| parse_symbol_value(entry, entry)).collect()
}

fn entries(value: &str) -> impl Iterator<Item = &str> {
    value.split(';').map(str::trim).filter(|e| !e.is_empty())
}

fn parse_symbol_value(pair: &str, entry: &str) -> DaemonResult<(String, Decimal)> {
    let (symbol, amount) = pair
        .split_once('=')
        .ok_or_else(|| DaemonError::Config(format!("Expected SYMBOL=value in: {}", entry)))?;
    let symbol = symbol.trim().to_uppercase();
    if symbol.is_empty() {
        return Err(DaemonError::Config(format!("Missing symbol in: {}", entry)));
    }
    let amount = Decimal::from_str(amount.trim())
        .map_err(|_| DaemonError::Config(format!("Invalid decimal in: {}", entry)))?;
    Ok((symbol, amount))
}

// =============================================================================
// Tests
// =============================================================================
