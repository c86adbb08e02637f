//! Masternode error types

use crate::node::MasternodeStatus;
use tessera_core::{Amount, OutPoint};
use tessera_crypto::CryptoError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MasternodeError {
    #[error("Insufficient collateral: required {required}, provided {provided}")]
    InsufficientCollateral { required: Amount, provided: Amount },

    #[error("Masternode not found: {0}")]
    NotFound(String),

    #[error("Invalid tier: {0}")]
    InvalidTier(String),

    #[error(transparent)]
    Funding(#[from] FundingError),

    #[error(transparent)]
    Ping(#[from] PingError),

    #[error(transparent)]
    Broadcast(#[from] BroadcastError),
}

pub type Result<T> = std::result::Result<T, MasternodeError>;

/// Reasons a set of funding proofs does not back a masternode
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FundingError {
    #[error("No funding proofs supplied")]
    Empty,

    #[error("Funding input {0} is spent or unknown")]
    Spent(OutPoint),

    #[error("Funding input {0} listed twice")]
    DuplicateInput(OutPoint),

    #[error("Funding input {outpoint} holds {actual}, proof claims {claimed}")]
    AmountMismatch {
        outpoint: OutPoint,
        claimed: Amount,
        actual: Amount,
    },

    #[error("Funding input {0} does not pay the proof's address")]
    WrongOwner(OutPoint),

    #[error("Invalid funding signature for {0}")]
    InvalidSignature(OutPoint),

    #[error("Funding input needs {need} confirmations, has {have}")]
    TooNew { have: i64, need: i64 },

    #[error("Insufficient funding for tier: required {required}, provided {provided}")]
    Insufficient { required: Amount, provided: Amount },
}

impl FundingError {
    /// Status a record takes when its funding fails this way
    pub fn status(&self) -> MasternodeStatus {
        match self {
            FundingError::Spent(_) => MasternodeStatus::VinSpent,
            FundingError::Insufficient { .. } | FundingError::Empty => {
                MasternodeStatus::InsufficientFunds
            }
            FundingError::TooNew { .. } => MasternodeStatus::InputTooNew,
            _ => MasternodeStatus::NotCapable,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PingError {
    #[error("Ping signature invalid")]
    InvalidSignature,

    #[error("Signing key does not belong to {0}")]
    WrongKey(String),

    #[error("Ping signed too far in the future: {sig_time} > {max}")]
    FutureTime { sig_time: i64, max: i64 },

    #[error("Ping signed too long ago: {sig_time} < {min}")]
    Expired { sig_time: i64, min: i64 },

    #[error("Ping anchored to unknown block {0}")]
    UnknownBlock(String),

    #[error("Ping anchored to block at height {height}, tip is {tip}")]
    StaleBlock { height: i64, tip: i64 },

    #[error("Masternode {0} is not in the list")]
    UnknownMasternode(String),

    #[error("Ping older than the last accepted one: {sig_time} < {last}")]
    OutOfOrder { sig_time: i64, last: i64 },

    #[error("Too early to ping again: last ping {last}, new ping {sig_time}")]
    TooEarly { sig_time: i64, last: i64 },

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BroadcastError {
    #[error("Broadcast signature invalid")]
    InvalidSignature,

    #[error("Signing key does not belong to {0}")]
    WrongKey(String),

    #[error("Broadcast signed too far in the future: {sig_time} > {max}")]
    FutureTime { sig_time: i64, max: i64 },

    #[error("Protocol version {version} below minimum {min}")]
    ObsoleteProtocol { version: u32, min: u32 },

    #[error("Invalid service address: {0}")]
    InvalidService(String),

    #[error("Embedded ping belongs to {0}")]
    ForeignPing(String),

    #[error("Broadcast too soon after the previous one")]
    TooSoon,

    #[error(transparent)]
    Funding(#[from] FundingError),

    #[error(transparent)]
    Ping(#[from] PingError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Why the local masternode could not be started, registered or pinged
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActivationError {
    #[error("This node is not configured as a masternode")]
    NotMasternode,

    #[error("Wallet is locked")]
    WalletLocked,

    #[error("No external address configured")]
    NoExternalAddress,

    #[error("Could not connect to {0}")]
    ConnectFailed(String),

    #[error("Blockchain sync in progress")]
    SyncInProgress,

    #[error("Masternode list doesn't include {0}")]
    NotInList(String),

    #[error("Too early to send masternode ping")]
    TooEarly,

    #[error(transparent)]
    Funding(#[from] FundingError),

    #[error(transparent)]
    Ping(#[from] PingError),

    #[error(transparent)]
    Broadcast(#[from] BroadcastError),
}
