pub mod metrics;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use corestake_execution::ledger::TokenLedger;
use corestake_execution::queries;
use corestake_execution::EngineError;
use corestake_oracles::{PriceFeed, PriceOracle};
use corestake_service::{Clock, ServiceError, ServiceHandle, SharedState};
use corestake_types::allocation::{AllocationTarget, RebalanceEvent};
use corestake_types::state::AccountState;
use corestake_types::withdrawal::WithdrawalRequest;
use corestake_types::{
    AccountId, AssetKind, Classification, OperationOutcome, PoolInfo, RebalanceCheck, SignedPayload, SignedRequest,
    ValidatorReport,
};
use metrics::Metrics;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub node: SharedState,
    pub service: ServiceHandle,
    pub metrics: Arc<Metrics>,
    pub clock: Clock,
}

impl AppState {
    fn now(&self) -> u64 {
        (self.clock)()
    }
}

#[derive(Debug)]
pub struct ApiError(StatusCode, String);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let status = match err {
            EngineError::Unauthorized { .. } => StatusCode::FORBIDDEN,
            EngineError::PriceStale { .. } | EngineError::PriceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            EngineError::WithdrawalNotFound(_) | EngineError::ValidatorNotFound(_) => StatusCode::NOT_FOUND,
            EngineError::InvariantViolation(_) | EngineError::Overflow => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        };
        ApiError(status, err.to_string())
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Rejected(e) => e.into(),
            ServiceError::Signature(_) => ApiError(StatusCode::UNAUTHORIZED, err.to_string()),
            ServiceError::BadNonce { .. } => ApiError(StatusCode::CONFLICT, err.to_string()),
            ServiceError::Unavailable => ApiError(StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(serde_json::json!({ "error": self.1 }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/pool", get(get_pool))
        .route("/validators", get(get_validators))
        .route("/distribution", get(get_distribution))
        .route("/rebalance/check", get(get_rebalance_check))
        .route("/rebalance/log", get(get_rebalance_log))
        .route("/classify", get(get_classification))
        .route("/accounts/:address", get(get_account))
        .route("/withdrawals/:id", get(get_withdrawal))
        .route("/prices", get(get_prices).post(post_price))
        .route("/op", post(submit_op))
        .route("/metrics", get(get_metrics))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("API listening on {}", addr);
    axum::serve(listener, router(state)).await
}

async fn root() -> &'static str {
    "CoreStake engine API"
}

async fn get_pool(State(state): State<AppState>) -> ApiResult<PoolInfo> {
    let now = state.now();
    let node = state.node.read().await;
    Ok(Json(queries::pool_info(&node.engine, &node.oracle, now)?))
}

async fn get_validators(State(state): State<AppState>) -> Json<Vec<ValidatorReport>> {
    let node = state.node.read().await;
    Json(queries::validator_reports(&node.engine))
}

async fn get_distribution(State(state): State<AppState>) -> Json<Vec<AllocationTarget>> {
    let node = state.node.read().await;
    Json(queries::optimal_distribution(&node.engine))
}

async fn get_rebalance_check(State(state): State<AppState>) -> Json<RebalanceCheck> {
    let node = state.node.read().await;
    Json(queries::should_rebalance(&node.engine))
}

async fn get_rebalance_log(State(state): State<AppState>) -> Json<Vec<RebalanceEvent>> {
    let node = state.node.read().await;
    Json(node.engine.rebalance_log.iter().cloned().collect())
}

#[derive(Deserialize)]
pub struct ClassifyQuery {
    pub core: String,
    pub btc: String,
}

fn parse_amount(raw: &str) -> Result<u128, ApiError> {
    raw.parse()
        .map_err(|_| ApiError(StatusCode::BAD_REQUEST, format!("invalid amount: {}", raw)))
}

async fn get_classification(
    State(state): State<AppState>,
    Query(q): Query<ClassifyQuery>,
) -> ApiResult<Classification> {
    let (core, btc) = (parse_amount(&q.core)?, parse_amount(&q.btc)?);
    let now = state.now();
    let node = state.node.read().await;
    Ok(Json(queries::classify_deposit(&node.engine, &node.oracle, now, core, btc)?))
}

#[derive(Serialize, Deserialize, Debug)]
pub struct AccountView {
    pub account: AccountId,
    pub state: AccountState,
    pub core_balance: u128,
    pub btc_balance: u128,
    /// Nonce the account's next signed request must carry.
    pub next_nonce: u64,
}

async fn get_account(State(state): State<AppState>, Path(address): Path<String>) -> ApiResult<AccountView> {
    let account: AccountId = address
        .parse()
        .map_err(|e| ApiError(StatusCode::BAD_REQUEST, format!("{}", e)))?;
    let node = state.node.read().await;
    Ok(Json(AccountView {
        account,
        state: node.engine.accounts.get(&account).cloned().unwrap_or_default(),
        core_balance: node.ledger.balance(&account, AssetKind::Core),
        btc_balance: node.ledger.balance(&account, AssetKind::Btc),
        next_nonce: node.next_nonce(&account),
    }))
}

#[derive(Serialize, Deserialize, Debug)]
pub struct WithdrawalView {
    pub request: WithdrawalRequest,
    /// Pending requests for the same asset ahead of this one.
    pub position: Option<usize>,
    pub claimable: bool,
}

async fn get_withdrawal(State(state): State<AppState>, Path(id): Path<u64>) -> ApiResult<WithdrawalView> {
    let now = state.now();
    let node = state.node.read().await;
    let request = node
        .engine
        .withdrawals
        .get(id)
        .cloned()
        .ok_or(EngineError::WithdrawalNotFound(id))?;
    Ok(Json(WithdrawalView {
        position: queries::queue_position(&node.engine, id),
        claimable: !request.processed && request.is_unlocked(now),
        request,
    }))
}

#[derive(Serialize, Deserialize, Debug)]
pub struct PriceView {
    pub symbol: String,
    pub price: u128,
    pub updated_at: u64,
    pub is_fresh: bool,
    pub sources: usize,
}

async fn get_prices(State(state): State<AppState>) -> Json<Vec<PriceView>> {
    let now = state.now();
    let node = state.node.read().await;
    let prices = node
        .oracle
        .symbols()
        .filter_map(|symbol| {
            let quote = node.oracle.get_price(symbol, now).ok()?;
            Some(PriceView {
                symbol: symbol.to_string(),
                price: quote.price,
                updated_at: quote.updated_at,
                is_fresh: quote.is_fresh,
                sources: node.oracle.feed(symbol).map(PriceFeed::report_count).unwrap_or(0),
            })
        })
        .collect();
    Json(prices)
}

async fn post_price(State(state): State<AppState>, Json(request): Json<SignedRequest>) -> ApiResult<OperationOutcome> {
    if !matches!(request.payload, SignedPayload::ReportPrice { .. }) {
        return Err(ApiError(StatusCode::BAD_REQUEST, "expected a price report".to_string()));
    }
    Ok(Json(state.service.submit(request).await?))
}

async fn submit_op(State(state): State<AppState>, Json(request): Json<SignedRequest>) -> ApiResult<OperationOutcome> {
    let SignedPayload::Operation(operation) = &request.payload else {
        return Err(ApiError(StatusCode::BAD_REQUEST, "expected an engine operation".to_string()));
    };
    let name = operation.name();
    let result = state.service.submit(request).await;
    state.metrics.record_operation(name, result.is_ok());
    Ok(Json(result?))
}

async fn get_metrics(State(state): State<AppState>) -> Result<String, ApiError> {
    let now = state.now();
    let node = state.node.read().await;
    state
        .metrics
        .render(&node, now)
        .map_err(|e| ApiError(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}
