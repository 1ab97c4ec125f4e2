//! HTTP API for the custody daemon.
//!
//! Provides REST endpoints for:
//! - Health check
//! - Confirmation surface (view, confirm, reject)
//! - Transaction submission and history
//! - Balances

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use custody_domain::{
    BalanceSnapshot, ContractCall, Instruction, Transaction, TransactionResult, UserId,
};
use custody_engine::to_instruction;
use custody_ledger::{Ledger, LedgerError};
use custody_store::{Store, TransactionRecord};

use crate::broker::{BrokerHandle, ConfirmationView};
use crate::error::DaemonError;

// =============================================================================
// API State
// =============================================================================

/// Shared state for API handlers.
pub struct ApiState<S: Store + 'static> {
    pub broker: BrokerHandle,
    pub ledger: Arc<Ledger>,
    pub store: Arc<S>,
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Request to execute a transaction.
///
/// Carries either a `call` to translate or an already resolved `instruction`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    /// Caller-supplied unique id; generated when absent
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub requested_by: UserId,
    #[serde(default)]
    pub call: Option<ContractCall>,
    #[serde(default)]
    pub instruction: Option<Instruction>,
}

/// Optional body of a confirm/reject request.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRequest {
    /// Only decide if this transaction is the one awaiting confirmation
    #[serde(default)]
    pub tx_id: Option<String>,
}

/// Response to a confirm/reject request.
#[derive(Debug, Serialize)]
pub struct DecisionResponse {
    pub accepted: bool,
}

/// Balances of one user.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalancesResponse {
    pub user_id: UserId,
    pub balances: BalanceSnapshot,
}

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

// =============================================================================
// Router
// =============================================================================

/// Create the API router.
pub fn create_router<S>(state: Arc<ApiState<S>>) -> Router
where
    S: Store + 'static,
{
    Router::new()
        .route("/health", get(health_handler))
        .route("/confirmation", get(confirmation_handler::<S>))
        .route("/confirmation/confirm", post(confirm_handler::<S>))
        .route("/confirmation/reject", post(reject_handler::<S>))
        .route("/transactions", post(submit_handler::<S>))
        .route("/transactions/:id", get(get_transaction_handler::<S>))
        .route("/balances/:user_id", get(balances_handler::<S>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint.
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Current confirmation view.
async fn confirmation_handler<S>(State(state): State<Arc<ApiState<S>>>) -> Json<ConfirmationView>
where
    S: Store + 'static,
{
    Json(state.broker.view())
}

/// Approve the open confirmation.
async fn confirm_handler<S>(
    State(state): State<Arc<ApiState<S>>>,
    body: Bytes,
) -> Result<Json<DecisionResponse>, ApiError>
where
    S: Store + 'static,
{
    let request = parse_decision(&body)?;
    let accepted = match request.tx_id {
        Some(tx_id) => state.broker.confirm_tx(&tx_id).await,
        None => state.broker.confirm().await,
    };
    decision_response(accepted)
}

/// Decline the open confirmation.
async fn reject_handler<S>(
    State(state): State<Arc<ApiState<S>>>,
    body: Bytes,
) -> Result<Json<DecisionResponse>, ApiError>
where
    S: Store + 'static,
{
    let request = parse_decision(&body)?;
    let accepted = match request.tx_id {
        Some(tx_id) => state.broker.reject_tx(&tx_id).await,
        None => state.broker.reject().await,
    };
    decision_response(accepted)
}

/// Submit a transaction and wait for the confirming party.
///
/// Holds the request open until the transaction resolves. Every outcome,
/// including rejection, is a `200` carrying the `TransactionResult`.
async fn submit_handler<S>(
    State(state): State<Arc<ApiState<S>>>,
    Json(req): Json<SubmitRequest>,
) -> Result<Json<TransactionResult>, ApiError>
where
    S: Store + 'static,
{
    let transaction = build_transaction(req).map_err(to_error_response)?;
    Ok(Json(state.broker.request_transaction(transaction).await))
}

/// Get a persisted transaction.
async fn get_transaction_handler<S>(
    State(state): State<Arc<ApiState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<TransactionRecord>, ApiError>
where
    S: Store + 'static,
{
    let record = state
        .store
        .transactions()
        .find_by_id(&id)
        .await
        .map_err(|e| to_error_response(e.into()))?
        .ok_or_else(|| to_error_response(DaemonError::TransactionNotFound(id)))?;

    Ok(Json(record))
}

/// Get a user's balances.
async fn balances_handler<S>(
    State(state): State<Arc<ApiState<S>>>,
    Path(user_id): Path<String>,
) -> Result<Json<BalancesResponse>, ApiError>
where
    S: Store + 'static,
{
    let balances = state
        .ledger
        .balances_of(&user_id)
        .map_err(|e| to_error_response(e.into()))?;

    Ok(Json(BalancesResponse { user_id, balances }))
}

// =============================================================================
// Helpers
// =============================================================================

/// Turn a submission into a broker-ready transaction.
pub fn build_transaction(req: SubmitRequest) -> Result<Transaction, DaemonError> {
    let (instruction, default_description) = match (req.call, req.instruction) {
        (Some(call), None) => {
            let instruction = to_instruction(&call)?;
            (instruction, call.description)
        },
        (None, Some(instruction)) => {
            instruction.validate()?;
            let description = format!(
                "{} {} {} to {}",
                instruction.kind,
                instruction.from_amount,
                instruction.from_token.symbol,
                instruction.to_token.symbol
            );
            (instruction, description)
        },
        _ => {
            return Err(DaemonError::InvalidRequest(
                "exactly one of call or instruction is required".to_string(),
            ))
        },
    };

    let id = req.id.unwrap_or_else(|| Uuid::now_v7().to_string());
    let description = req.description.unwrap_or(default_description);

    Ok(Transaction::new(id, description, req.requested_by, instruction)?)
}

fn parse_decision(body: &Bytes) -> Result<DecisionRequest, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(DecisionRequest::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| to_error_response(DaemonError::InvalidRequest(e.to_string())))
}

fn decision_response(accepted: bool) -> Result<Json<DecisionResponse>, ApiError> {
    if accepted {
        Ok(Json(DecisionResponse { accepted }))
    } else {
        Err(to_error_response(DaemonError::NothingPending))
    }
}

fn to_error_response(error: DaemonError) -> ApiError {
    let status = match &error {
        DaemonError::TransactionNotFound(_) => StatusCode::NOT_FOUND,
        DaemonError::NothingPending => StatusCode::CONFLICT,
        DaemonError::InvalidRequest(_)
        | DaemonError::Domain(_)
        | DaemonError::Ledger(LedgerError::InvalidInstruction(_)) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::TransactionBroker;
    use crate::config::{default_tokens, SOL_MINT, USDC_MINT};
    use crate::event_bus::EventBus;
    use axum::body::Body;
    use axum::http::Request;
    use custody_exec::{ExecutionAdapter, StubQuotes};
    use custody_ledger::TokenRegistry;
    use custody_store::MemoryStore;
    use http_body_util::BodyExt;
    use rust_decimal_macros::dec;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    fn create_test_app() -> (Router, BrokerHandle, Arc<Ledger>) {
        let ledger = Arc::new(Ledger::new(TokenRegistry::with_tokens(default_tokens()).unwrap()));
        ledger.deposit("alice", "SOL", dec!(10)).unwrap();

        let quotes = Arc::new(StubQuotes::new());
        quotes.set_price(SOL_MINT, dec!(150));
        quotes.set_price(USDC_MINT, dec!(1));

        let store = Arc::new(MemoryStore::new());
        let adapter = Arc::new(ExecutionAdapter::new(ledger.clone(), quotes));
        let (broker, _task) = TransactionBroker::spawn(
            adapter,
            store.clone(),
            Arc::new(EventBus::new(64)),
            Duration::from_secs(300),
            16,
            CancellationToken::new(),
        );

        let state = Arc::new(ApiState {
            broker: broker.clone(),
            ledger: ledger.clone(),
            store,
        });
        (create_router(state), broker, ledger)
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn swap_body(id: &str, from_amount: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "requestedBy": "alice",
            "instruction": {
                "type": "swap",
                "fromToken": {"symbol": "SOL", "address": SOL_MINT, "decimals": 9},
                "toToken": {"symbol": "USDC", "address": USDC_MINT, "decimals": 6},
                "fromAmount": from_amount,
                "toAmount": "1500"
            }
        })
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _broker, _ledger) = create_test_app();

        let response = app.oneshot(get("/health")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "healthy");
    }

    #[tokio::test]
    async fn test_submit_and_confirm() {
        let (app, broker, ledger) = create_test_app();

        let submit = tokio::spawn(app.clone().oneshot(post_json("/transactions", swap_body("tx-1", "10"))));

        broker.watch_view().wait_for(|v| v.is_open).await.unwrap();
        let view = body_json(app.clone().oneshot(get("/confirmation")).await.unwrap()).await;
        assert_eq!(view["isOpen"], true);
        assert_eq!(view["pendingTransaction"]["id"], "tx-1");

        let confirm = app
            .clone()
            .oneshot(post_json("/confirmation/confirm", serde_json::json!({"txId": "tx-1"})))
            .await
            .unwrap();
        assert_eq!(confirm.status(), StatusCode::OK);

        let response = submit.await.unwrap().unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let result = body_json(response).await;
        assert_eq!(result["success"], true);
        assert_eq!(result["effects"]["tokenBalances"]["USDC"], "1500");
        assert_eq!(ledger.balance("alice", "SOL").unwrap(), dec!(0));

        let record = app.oneshot(get("/transactions/tx-1")).await.unwrap();
        assert_eq!(record.status(), StatusCode::OK);
        assert_eq!(body_json(record).await["transaction"]["status"], "Completed");
    }

    #[tokio::test]
    async fn test_reject_over_http() {
        let (app, broker, ledger) = create_test_app();

        let submit = tokio::spawn(app.clone().oneshot(post_json("/transactions", swap_body("tx-1", "1"))));
        broker.watch_view().wait_for(|v| v.is_open).await.unwrap();

        let reject = app.clone().oneshot(post_json("/confirmation/reject", serde_json::json!({}))).await.unwrap();
        assert_eq!(reject.status(), StatusCode::OK);

        let result = body_json(submit.await.unwrap().unwrap()).await;
        assert_eq!(result["success"], false);
        assert_eq!(result["error"]["kind"], "RejectedByUser");
        assert_eq!(ledger.balance("alice", "SOL").unwrap(), dec!(10));
    }

    #[tokio::test]
    async fn test_confirm_without_pending_is_conflict() {
        let (app, _broker, _ledger) = create_test_app();

        let response = app
            .oneshot(Request::builder().method("POST").uri("/confirmation/confirm").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_submit_insufficient_balance_resolves_without_prompt() {
        let (app, broker, _ledger) = create_test_app();

        let response = app.oneshot(post_json("/transactions", swap_body("tx-1", "50"))).await.unwrap();

        let result = body_json(response).await;
        assert_eq!(result["success"], false);
        assert_eq!(result["error"]["kind"], "InsufficientBalance");
        assert!(!broker.view().is_open);
    }

    #[tokio::test]
    async fn test_submit_requires_call_or_instruction() {
        let (app, _broker, _ledger) = create_test_app();

        let response = app
            .oneshot(post_json("/transactions", serde_json::json!({"requestedBy": "alice"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_balances_and_missing_transaction() {
        let (app, _broker, _ledger) = create_test_app();

        let balances = body_json(app.clone().oneshot(get("/balances/alice")).await.unwrap()).await;
        assert_eq!(balances["userId"], "alice");
        assert_eq!(balances["balances"]["SOL"], "10");

        let missing = app.oneshot(get("/transactions/nope")).await.unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_build_transaction_from_call() {
        let call: ContractCall = serde_json::from_value(serde_json::json!({
            "type": "stake",
            "description": "stake 2 SOL",
            "params": {
                "fromToken": {"symbol": "SOL", "address": SOL_MINT, "decimals": 9},
                "toToken": {"symbol": "MSOL", "address": "msol", "decimals": 9},
                "fromAmount": 2.0
            }
        }))
        .unwrap();

        let tx = build_transaction(SubmitRequest {
            id: None,
            description: None,
            requested_by: "alice".to_string(),
            call: Some(call),
            instruction: None,
        })
        .unwrap();

        assert_eq!(tx.description, "stake 2 SOL");
        assert!(!tx.id.is_empty());
        assert_eq!(tx.instruction.from_amount.as_decimal(), dec!(2));
    }
}
