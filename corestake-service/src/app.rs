use crate::ServiceError;
use anyhow::Result;
use corestake_crypto::signatures::verify_request;
use corestake_execution::ledger::InMemoryLedger;
use corestake_execution::{execute_operation, EngineError};
use corestake_genesis::Genesis;
use corestake_oracles::{OracleError, OracleManager, PriceReport};
use corestake_storage::Storage;
use corestake_types::{AccountId, EngineState, OperationOutcome, OperationRequest, SignedPayload, SignedRequest};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Engine state together with the host-side price feeds, custody ledger
/// and request nonces. Persisted as one snapshot.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct NodeState {
    pub engine: EngineState,
    pub oracle: OracleManager,
    pub ledger: InMemoryLedger,
    /// Next expected nonce per account that has signed a request.
    pub nonces: BTreeMap<AccountId, u64>,
}

impl NodeState {
    pub fn new(engine: EngineState, oracle: OracleManager, ledger: InMemoryLedger) -> Self {
        Self {
            engine,
            oracle,
            ledger,
            nonces: BTreeMap::new(),
        }
    }

    pub fn apply(&mut self, request: &OperationRequest) -> Result<OperationOutcome, EngineError> {
        execute_operation(request, &mut self.engine, &self.oracle, &mut self.ledger)
    }

    /// Records a quote from an authorized price reporter.
    pub fn report_price(&mut self, caller: &AccountId, symbol: &str, price: u128, now: u64) -> Result<(), EngineError> {
        let report = PriceReport {
            reporter: *caller,
            price,
            timestamp: now,
        };
        self.oracle.submit(symbol, report).map_err(|e| match e {
            OracleError::UnknownReporter(_) => EngineError::Unauthorized {
                caller: *caller,
                role: "reporter",
            },
            OracleError::InvalidPrice => EngineError::InvalidAmount,
            other => other.into(),
        })
    }

    pub fn next_nonce(&self, account: &AccountId) -> u64 {
        self.nonces.get(account).copied().unwrap_or(0)
    }

    /// Checks the signature and consumes the signer's nonce. A request that
    /// authenticates uses up its nonce even if the payload is rejected.
    pub fn authenticate(&mut self, request: &SignedRequest) -> Result<AccountId, ServiceError> {
        let caller = verify_request(request)?;
        let expected = self.next_nonce(&caller);
        if request.nonce != expected {
            return Err(ServiceError::BadNonce {
                account: caller,
                expected,
                got: request.nonce,
            });
        }
        self.nonces.insert(caller, expected.saturating_add(1));
        Ok(caller)
    }

    /// Runs an authenticated payload on behalf of `caller`.
    pub fn execute(&mut self, caller: AccountId, payload: &SignedPayload, now: u64) -> Result<OperationOutcome, EngineError> {
        match payload {
            SignedPayload::Operation(operation) => self.apply(&OperationRequest::new(caller, operation.clone(), now)),
            SignedPayload::ReportPrice { symbol, price } => {
                self.report_price(&caller, symbol, *price, now)?;
                Ok(OperationOutcome::Updated)
            }
        }
    }

    pub fn persist(&self, storage: &Storage) -> Result<[u8; 32]> {
        let root = self.engine.root_hash();
        storage.save_snapshot(self.engine.sequence, root, self)?;
        Ok(root)
    }

    /// Last persisted node, if any snapshot exists.
    pub fn restore(storage: &Storage) -> Result<Option<Self>> {
        storage.load_latest()
    }
}

impl From<Genesis> for NodeState {
    fn from(genesis: Genesis) -> Self {
        Self::new(genesis.state, genesis.oracle, genesis.ledger)
    }
}
