//! Treasury error types

use std::path::PathBuf;
use tessera_core::{Amount, Hash256};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TreasuryError {
    #[error(transparent)]
    Proposal(#[from] ProposalError),

    #[error(transparent)]
    Vote(#[from] VoteError),

    #[error(transparent)]
    Collateral(#[from] CollateralError),

    #[error(transparent)]
    Database(#[from] BudgetDbError),

    #[error("Peer already asked for the full budget list")]
    DuplicateSyncRequest,

    #[error("Unknown budget message: {0}")]
    UnknownCommand(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type Result<T> = std::result::Result<T, TreasuryError>;

/// Why a proposal is not admitted
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProposalError {
    #[error("Proposal {0}: active removal by the community")]
    CommunityRejected(String),

    #[error("Proposal {name}: invalid start block {start}")]
    InvalidStart { name: String, start: i64 },

    #[error("Proposal {name}: invalid end block {end}")]
    InvalidEnd { name: String, end: i64 },

    #[error("Proposal {name}: end block {end} before start block {start}")]
    EndBeforeStart { name: String, start: i64, end: i64 },

    #[error("Proposal {name}: start block {start} is not the first block of a cycle")]
    StartNotOnCycle { name: String, start: i64 },

    #[error("Proposal {0}: needs at least one payment")]
    NoPayments(String),

    #[error("Proposal name too long: {0} bytes")]
    NameTooLong(usize),

    #[error("Proposal URL too long: {0} bytes")]
    UrlTooLong(usize),

    #[error("Proposal {name}: amount {amount} below minimum {min}")]
    AmountTooLow {
        name: String,
        amount: Amount,
        min: Amount,
    },

    #[error("Proposal {0}: invalid payment address")]
    EmptyPaymentAddress(String),

    #[error("Proposal {0}: multisig is not currently supported")]
    Multisig(String),

    #[error("Proposal {name}: payment {amount} more than max {max}")]
    AmountExceedsBudget {
        name: String,
        amount: Amount,
        max: Amount,
    },

    #[error("Proposal {name}: last payment block {end} < current height {height}")]
    Expired { name: String, end: i64, height: i64 },

    #[error("Proposal {name}: invalid collateral: {source}")]
    Collateral {
        name: String,
        #[source]
        source: CollateralError,
    },
}

/// Why a vote is not recorded
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VoteError {
    #[error("New vote older than existing vote: {new} < {existing}")]
    StaleVote { existing: i64, new: i64 },

    #[error("Time between votes is too soon: {elapsed} sec < {min} sec")]
    TooFrequent { elapsed: i64, min: i64 },

    #[error("Vote too far ahead of current time: {time} > {max}")]
    ClockSkew { time: i64, max: i64 },

    #[error("Proposal not found: {0}")]
    ProposalNotFound(Hash256),

    #[error("Vote signature invalid")]
    InvalidSignature,

    #[error("Voter {0} is not a known masternode")]
    UnknownMasternode(String),
}

/// Why a proposal's fee transaction does not back it
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollateralError {
    #[error("Can't find collateral tx {0}")]
    NotFound(Hash256),

    #[error("Malformed collateral tx {tx}: {reason}")]
    Malformed { tx: Hash256, reason: String },

    #[error("Couldn't find OP_RETURN {expected} in {tx}")]
    NotMarked { tx: Hash256, expected: Hash256 },

    #[error("Collateral requires at least {need} confirmations - {have} confirmations")]
    InsufficientConfirmations { have: i64, need: i64 },
}

/// Outcome of reading the budget database, other than success
#[derive(Error, Debug)]
pub enum BudgetDbError {
    #[error("Missing budget file {0}")]
    FileMissing(PathBuf),

    #[error("Budget file shorter than its checksum")]
    Truncated,

    #[error("Checksum mismatch, data corrupted")]
    HashMismatch,

    #[error("Invalid budget file magic message")]
    WrongMagicMessage,

    #[error("Invalid network magic number")]
    WrongNetworkMagic,

    #[error("Magic is ok but data has invalid format: {0}")]
    PayloadCorrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(String),
}
