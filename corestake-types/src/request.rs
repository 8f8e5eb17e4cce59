use crate::address::AccountId;
use crate::operation::EngineOperation;
use serde::{Deserialize, Serialize};

/// An operation submitted by a caller at a host-supplied time.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OperationRequest {
    pub caller: AccountId,
    pub operation: EngineOperation,
    pub timestamp: u64,
}

impl OperationRequest {
    pub fn new(caller: AccountId, operation: EngineOperation, timestamp: u64) -> Self {
        Self {
            caller,
            operation,
            timestamp,
        }
    }
}

/// What a signed request asks the node to do.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum SignedPayload {
    Operation(EngineOperation),
    ReportPrice { symbol: String, price: u128 },
}

/// A payload authenticated by an ed25519 key. The caller is the account
/// derived from `public_key`, and `nonce` must be that account's next one.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    pub public_key: [u8; 32],
    pub nonce: u64,
    pub payload: SignedPayload,
    pub signature: Vec<u8>,
}

impl SignedRequest {
    pub fn caller(&self) -> AccountId {
        AccountId::from_public_key(&self.public_key)
    }

    pub fn signing_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        #[derive(Serialize)]
        struct Signing<'a> {
            public_key: &'a [u8; 32],
            nonce: u64,
            payload: &'a SignedPayload,
        }

        bincode::serialize(&Signing {
            public_key: &self.public_key,
            nonce: self.nonce,
            payload: &self.payload,
        })
    }

    pub fn id(&self) -> Result<[u8; 32], bincode::Error> {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.signing_bytes()?);
        hasher.update(&self.signature);
        Ok(*hasher.finalize().as_bytes())
    }
}
