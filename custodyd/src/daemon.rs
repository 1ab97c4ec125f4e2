//! Daemon: Main runtime orchestrator.
//!
//! The Daemon ties together all components:
//! - Ledger (balances)
//! - Execution adapter (quotes + ledger)
//! - Transaction broker (confirmation flow)
//! - Event Bus (confirmation notifications)
//! - API Server (HTTP endpoints)
//!
//! # Lifecycle
//!
//! 1. Load configuration
//! 2. Initialize components
//! 3. Re-seed the ledger from configuration and the store
//! 4. Spawn the broker (and the auto-confirm agent if enabled)
//! 5. Start API server
//! 6. Graceful shutdown on SIGINT or cancellation

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use custody_exec::{ExecutionAdapter, QuotePort, StubQuotes};
use custody_ledger::{Ledger, TokenRegistry};
use custody_store::{MemoryStore, Store};

use crate::agent::AutoConfirmAgent;
use crate::api::{create_router, ApiState};
use crate::broker::{BrokerHandle, TransactionBroker};
use crate::config::Config;
use crate::error::{DaemonError, DaemonResult};
use crate::event_bus::EventBus;

// =============================================================================
// Daemon
// =============================================================================

/// The main custody daemon.
pub struct Daemon<Q: QuotePort + 'static, S: Store + 'static> {
    /// Configuration
    config: Config,
    /// Ledger
    ledger: Arc<Ledger>,
    /// Execution adapter
    adapter: Arc<ExecutionAdapter<Q>>,
    /// Store
    store: Arc<S>,
    /// Event bus
    event_bus: Arc<EventBus>,
    /// Stops the broker, agent and API server
    cancel_token: CancellationToken,
}

impl Daemon<StubQuotes, MemoryStore> {
    /// Create a new daemon with stub components (for testing/development).
    ///
    /// Stub prices are configured by symbol and mapped to registry addresses.
    pub fn new_stub(config: Config) -> DaemonResult<Self> {
        let registry = TokenRegistry::with_tokens(config.ledger.tokens.clone())?;

        let quotes = StubQuotes::new();
        for (symbol, price) in &config.ledger.stub_prices {
            let token = registry.get(symbol).ok_or_else(|| {
                DaemonError::Config(format!("Stub price for unregistered token: {}", symbol))
            })?;
            quotes.set_price(&token.address, *price);
        }

        let ledger = Arc::new(Ledger::new(registry));
        let store = Arc::new(MemoryStore::new());

        Ok(Self::new(config, ledger, Arc::new(quotes), store))
    }
}

impl<Q: QuotePort + 'static, S: Store + 'static> Daemon<Q, S> {
    /// Create a new daemon with provided components.
    pub fn new(config: Config, ledger: Arc<Ledger>, quotes: Arc<Q>, store: Arc<S>) -> Self {
        let adapter = Arc::new(
            ExecutionAdapter::new(ledger.clone(), quotes)
                .with_quote_timeout(config.broker.quote_timeout),
        );

        Self {
            config,
            ledger,
            adapter,
            store,
            event_bus: Arc::new(EventBus::new(1000)),
            cancel_token: CancellationToken::new(),
        }
    }

    /// Token that stops the daemon when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// The ledger.
    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// The event bus.
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Run the daemon.
    ///
    /// This method blocks until shutdown is requested (SIGINT or the cancel
    /// token).
    pub async fn run(self) -> DaemonResult<()> {
        info!(
            version = env!("CARGO_PKG_VERSION"),
            environment = %self.config.environment,
            "Starting custody daemon"
        );

        // 1. Restore balances
        self.restore_balances().await?;

        // 2. Broker and optional agent
        let (broker, broker_task) = self.spawn_broker();
        let agent_task = self.spawn_agent(&broker);

        // 3. Start API server
        let api_addr = self.start_api_server(broker).await?;
        info!(%api_addr, "API server started");

        // 4. Wait for shutdown
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
            }
            _ = self.cancel_token.cancelled() => {
                info!("Shutdown requested");
            }
        }

        // 5. Graceful shutdown
        self.shutdown(broker_task, agent_task).await;

        Ok(())
    }

    /// Re-seed the ledger: configured balances first, then the store's
    /// snapshots, which win for any (user, token) present in both.
    pub async fn restore_balances(&self) -> DaemonResult<usize> {
        let configured = self.ledger.seed(self.config.ledger.seed_balances.clone())?;
        let persisted = self.store.balances().load_all().await?;
        let restored = self.ledger.seed(persisted)?;

        if configured + restored > 0 {
            info!(configured, restored, "Restored balances");
        } else {
            info!("No balances to restore");
        }

        Ok(configured + restored)
    }

    /// Spawn the broker actor with the configured timeout.
    pub fn spawn_broker(&self) -> (BrokerHandle, JoinHandle<()>) {
        TransactionBroker::spawn(
            self.adapter.clone(),
            self.store.clone(),
            self.event_bus.clone(),
            self.config.broker.confirmation_timeout,
            self.config.broker.channel_capacity,
            self.cancel_token.child_token(),
        )
    }

    fn spawn_agent(&self, broker: &BrokerHandle) -> Option<JoinHandle<usize>> {
        if !self.config.broker.auto_confirm {
            return None;
        }

        warn!("Auto-confirm enabled, every transaction will be approved");
        let agent = AutoConfirmAgent::new(
            broker.clone(),
            self.event_bus.clone(),
            self.cancel_token.child_token(),
        );
        Some(agent.spawn())
    }

    /// Start the API server.
    async fn start_api_server(&self, broker: BrokerHandle) -> DaemonResult<SocketAddr> {
        let state = Arc::new(ApiState {
            broker,
            ledger: self.ledger.clone(),
            store: self.store.clone(),
        });

        let router = create_router(state);
        let addr = format!("{}:{}", self.config.api.host, self.config.api.port);

        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            DaemonError::Config(format!("Failed to bind to {}: {}", addr, e))
        })?;

        let local_addr = listener.local_addr().map_err(|e| {
            DaemonError::Config(format!("Failed to get local address: {}", e))
        })?;

        // Spawn the server task
        let shutdown = self.cancel_token.child_token();
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await
            {
                error!(error = %e, "API server error");
            }
        });

        Ok(local_addr)
    }

    /// Graceful shutdown.
    async fn shutdown(&self, broker_task: JoinHandle<()>, agent_task: Option<JoinHandle<usize>>) {
        info!("Initiating graceful shutdown");
        self.cancel_token.cancel();

        if let Err(e) = broker_task.await {
            error!(error = %e, "Broker task failed");
        }
        if let Some(task) = agent_task {
            match task.await {
                Ok(confirmed) => info!(confirmed, "Agent stopped"),
                Err(e) => error!(error = %e, "Agent task failed"),
            }
        }

        let applied = self.ledger.applied_count().unwrap_or(0);
        info!(applied, "Shutdown complete");
    }
}

// =============================================================================
// Tests
// =============================================================================
