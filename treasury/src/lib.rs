//! Tessera Treasury Module
//!
//! Community governed budget: proposals backed by a burned fee, masternode
//! votes on them, the per-cycle allocation that decides which proposals are
//! paid, peer sync of proposals and votes, and the on-disk budget database.

pub mod collateral;
pub mod config;
pub mod db;
pub mod error;
pub mod manager;
pub mod message;
pub mod peer;
pub mod proposal;
pub mod vote;

pub use collateral::{validate_collateral, CollateralProof, PROPOSAL_FEE_TX};
pub use config::GovernanceConfig;
pub use db::{dump_budgets, load_budgets, BudgetDb, BUDGET_DB_FILE, BUDGET_DB_MAGIC};
pub use error::{
    BudgetDbError, CollateralError, ProposalError, Result, TreasuryError, VoteError,
};
pub use manager::{
    BudgetManager, BudgetPolicy, BudgetState, FinalizedBudgetTally, BUDGET_NEW_BLOCK_INTERVAL,
    BUDGET_RESET_SYNC_PERIOD, FULL_SYNC_MISBEHAVIOR,
};
pub use message::{BudgetMessage, CMD_PROPOSAL, CMD_VOTE, CMD_VOTE_SYNC};
pub use peer::{BudgetPeer, PeerId};
pub use proposal::{
    BudgetProposal, ValidationContext, Validity, MAX_PROPOSAL_HEIGHT, MAX_PROPOSAL_NAME_LEN,
    MAX_PROPOSAL_URL_LEN, MIN_PROPOSAL_AMOUNT,
};
pub use vote::{BudgetVote, VoteOutcome, BUDGET_VOTE_MAX_DRIFT, BUDGET_VOTE_UPDATE_MIN};
