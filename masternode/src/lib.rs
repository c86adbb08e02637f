//! Tessera Masternode Module
//!
//! Masternode records and their status state machine, collateral tiers and
//! funding proofs, liveness pings, signed broadcasts, deterministic scoring,
//! the in-memory registry and the controller that runs a local masternode.

pub mod active;
pub mod broadcast;
pub mod collateral;
pub mod config;
pub mod error;
pub mod funding;
pub mod node;
pub mod ping;
pub mod registry;
pub mod score;

pub use active::{ActiveMasternode, ActiveMasternodeConfig, ConnectivityProbe, OperatorWallet};
pub use broadcast::{is_valid_service_addr, MasternodeBroadcast};
pub use collateral::CollateralTier;
pub use config::{MasternodeConfig, MasternodeConfigEntry, MasternodeConfigError};
pub use error::{
    ActivationError, BroadcastError, FundingError, MasternodeError, PingError, Result,
};
pub use funding::{verify_funding, FundingProof, MASTERNODE_MIN_CONFIRMATIONS};
pub use node::{MasternodeRecord, MasternodeStatus};
pub use ping::Ping;
pub use registry::{MasternodeList, MasternodeRegistry};
pub use score::calculate_score;
