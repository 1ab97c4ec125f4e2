//! Custody Daemon
//!
//! Runtime for the ledger, confirmation broker and API server.
//!
//! # Usage
//!
//! ```bash
//! # Start with default configuration
//! cargo run -p custodyd
//!
//! # Seed a user and approve everything automatically
//! CUSTODY_SEED_BALANCES="alice:SOL=10" CUSTODY_AUTO_CONFIRM=true cargo run -p custodyd
//! ```
//!
//! # Environment Variables
//!
//! - `CUSTODY_ENV`: Environment (test, development, production)
//! - `CUSTODY_API_HOST`: API host (default: 0.0.0.0)
//! - `CUSTODY_API_PORT`: API port (default: 8080)
//! - `CUSTODY_CONFIRMATION_TIMEOUT_SECS`: Auto-reject after (default: 300)
//! - `CUSTODY_BROKER_CHANNEL_CAPACITY`: Broker mailbox size (default: 64)
//! - `CUSTODY_AUTO_CONFIRM`: Approve every request (default: false)
//! - `CUSTODY_SEED_BALANCES`: `user:SYMBOL=amount;...`
//! - `CUSTODY_STUB_PRICES`: `SYMBOL=price;...`
//! - `CUSTODY_LOG_FORMAT`: `json` for JSON logs

use custodyd::{Config, Daemon};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before reading the log format (ignore errors)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    let filter = EnvFilter::from_default_env().add_directive("custodyd=info".parse()?);
    let json = std::env::var("CUSTODY_LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::registry().with(fmt::layer().json()).with(filter).init();
    } else {
        tracing_subscriber::registry().with(fmt::layer()).with(filter).init();
    }

    // Load configuration
    let config = Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        api_host = %config.api.host,
        api_port = config.api.port,
        auto_confirm = config.broker.auto_confirm,
        "Custody Daemon"
    );

    // Create and run daemon
    let daemon = Daemon::new_stub(config)?;
    daemon.run().await?;

    Ok(())
}
