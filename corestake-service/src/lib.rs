//! The engine actor: one task owns writes to the node state, applies
//! signed requests in arrival order and runs periodic keeper work.

pub mod app;

pub use app::NodeState;

use corestake_crypto::signatures::SignatureError;
use corestake_execution::queries::should_rebalance;
use corestake_execution::rebalance::auto_rebalance;
use corestake_execution::EngineError;
use corestake_storage::Storage;
use corestake_types::fixed::bps_of;
use corestake_types::{AccountId, AssetKind, EngineOperation, OperationOutcome, OperationRequest, SignedRequest};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, error, info, warn};

pub type SharedState = Arc<RwLock<NodeState>>;
pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(|| {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    })
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Rejected(#[from] EngineError),
    #[error("invalid signature: {0}")]
    Signature(#[from] SignatureError),
    #[error("bad nonce for {account}: expected {expected}, got {got}")]
    BadNonce { account: AccountId, expected: u64, got: u64 },
    #[error("engine service is not running")]
    Unavailable,
}

pub enum ServiceCommand {
    Submit {
        request: SignedRequest,
        reply: oneshot::Sender<Result<OperationOutcome, ServiceError>>,
    },
}

/// Cloneable sender side used by the API.
#[derive(Clone)]
pub struct ServiceHandle {
    tx: mpsc::Sender<ServiceCommand>,
}

impl ServiceHandle {
    pub async fn submit(&self, request: SignedRequest) -> Result<OperationOutcome, ServiceError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ServiceCommand::Submit { request, reply })
            .await
            .map_err(|_| ServiceError::Unavailable)?;
        rx.await.map_err(|_| ServiceError::Unavailable)?
    }
}

#[derive(Debug, Clone)]
pub struct KeeperConfig {
    /// Operator account the keeper acts as.
    pub account: AccountId,
    pub interval: Duration,
    pub batch_size: u32,
}

pub struct EngineService {
    state: SharedState,
    storage: Arc<Storage>,
    cmd_rx: mpsc::Receiver<ServiceCommand>,
    keeper: Option<KeeperConfig>,
    clock: Clock,
    /// Why the last due rebalance could not be planned.
    blocked_rebalance: Option<String>,
}

/// Creates the service and the handle that feeds it.
pub fn channel(state: SharedState, storage: Arc<Storage>, capacity: usize) -> (EngineService, ServiceHandle) {
    let (tx, cmd_rx) = mpsc::channel(capacity);
    let service = EngineService {
        state,
        storage,
        cmd_rx,
        keeper: None,
        clock: system_clock(),
        blocked_rebalance: None,
    };
    (service, ServiceHandle { tx })
}

impl EngineService {
    pub fn with_keeper(mut self, keeper: KeeperConfig) -> Self {
        self.keeper = Some(keeper);
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub async fn run(mut self) {
        info!(keeper = self.keeper.is_some(), "Starting engine service...");
        let period = self
            .keeper
            .as_ref()
            .map(|k| k.interval)
            .unwrap_or(Duration::from_secs(3600));
        let mut interval = tokio::time::interval(period);

        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => self.handle(cmd).await,
                        None => {
                            info!("All service handles dropped, stopping engine service");
                            break;
                        }
                    }
                }
                _ = interval.tick() => {
                    if self.keeper.is_some() {
                        self.keeper_tick().await;
                    }
                }
            }
        }
    }

    async fn handle(&self, cmd: ServiceCommand) {
        match cmd {
            ServiceCommand::Submit { request, reply } => {
                let now = (self.clock)();
                let mut node = self.state.write().await;
                let result = match node.authenticate(&request) {
                    Ok(caller) => {
                        let result = node.execute(caller, &request.payload, now);
                        // the nonce is spent either way
                        self.persist(&node);
                        result.map_err(ServiceError::from)
                    }
                    Err(e) => {
                        warn!(error = %e, "request not authenticated");
                        Err(e)
                    }
                };
                let _ = reply.send(result);
            }
        }
    }

    async fn apply(&self, request: &OperationRequest) -> Result<OperationOutcome, EngineError> {
        let mut node = self.state.write().await;
        let outcome = node.apply(request)?;
        self.persist(&node);
        Ok(outcome)
    }

    fn persist(&self, node: &NodeState) {
        match node.persist(&self.storage) {
            Ok(root) => debug!(sequence = node.engine.sequence, root = %hex::encode(root), "snapshot written"),
            Err(e) => error!("Failed to persist snapshot: {}", e),
        }
    }

    /// Pays matured withdrawals, delegates surplus liquidity and
    /// rebalances when the allocation has drifted.
    pub async fn keeper_tick(&mut self) {
        let Some(keeper) = self.keeper.clone() else {
            return;
        };
        let now = (self.clock)();
        let (due, blocked) = {
            let node = self.state.read().await;
            keeper_work(&node, now, keeper.batch_size)
        };
        match blocked {
            Some(reason) if self.blocked_rebalance.as_ref() == Some(&reason) => {
                debug!(%reason, "rebalance still blocked");
            }
            Some(reason) => {
                warn!(%reason, "rebalance due but cannot be planned");
                self.blocked_rebalance = Some(reason);
            }
            None => self.blocked_rebalance = None,
        }
        for operation in due {
            let name = operation.name();
            let request = OperationRequest::new(keeper.account, operation, now);
            match self.apply(&request).await {
                Ok(outcome) => info!(op = name, ?outcome, "keeper operation applied"),
                Err(e) => warn!(op = name, error = %e, "keeper operation failed"),
            }
        }
    }
}

/// Operations due at `now`, plus the reason a due rebalance would be
/// skipped. A rebalance that would only be skipped is not submitted.
fn keeper_work(node: &NodeState, now: u64, batch_size: u32) -> (Vec<EngineOperation>, Option<String>) {
    let engine = &node.engine;
    let mut ops = Vec::new();
    if !engine.withdrawals.matured(now).is_empty() {
        ops.push(EngineOperation::ProcessWithdrawals { batch_size });
    }
    let reserve = bps_of(
        engine.holdings(AssetKind::Core),
        engine.config.liquidity_reserve_bps as u128,
    )
    .unwrap_or(u128::MAX);
    if engine.pool.core_liquid > reserve && !engine.validators.is_empty() {
        ops.push(EngineOperation::Compound);
    }
    let mut blocked = None;
    if should_rebalance(engine).needed {
        let mut preview = engine.clone();
        match auto_rebalance(&mut preview, now) {
            Ok(OperationOutcome::RebalanceSkipped { reason }) => blocked = Some(reason),
            _ => ops.push(EngineOperation::AutoRebalance),
        }
    }
    (ops, blocked)
}
