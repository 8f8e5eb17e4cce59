pub mod address;
pub mod allocation;
pub mod asset;
pub mod config;
pub mod fixed;
pub mod operation;
pub mod report;
pub mod request;
pub mod state;
pub mod validator;
pub mod withdrawal;

pub use address::{AccountId, ValidatorId};
pub use asset::AssetKind;
pub use config::{EngineConfig, Tier, TierConfig};
pub use operation::{AssetAmount, EngineOperation, OperationOutcome, Redemption};
pub use report::{Classification, PoolInfo, RebalanceCheck, ValidatorReport};
pub use request::{OperationRequest, SignedPayload, SignedRequest};
pub use state::EngineState;
