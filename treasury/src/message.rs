//! Budget messages exchanged between peers
//!
//! On the wire a message is a command name plus a bincode payload.

use crate::error::{Result, TreasuryError};
use crate::proposal::BudgetProposal;
use crate::vote::BudgetVote;
use serde::{Deserialize, Serialize};
use tessera_core::Hash256;

pub const CMD_VOTE_SYNC: &str = "mnvs";
pub const CMD_PROPOSAL: &str = "mprop";
pub const CMD_VOTE: &str = "mvote";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BudgetMessage {
    /// Ask for a proposal and its votes; the zero hash asks for everything
    VoteSync(Hash256),
    Proposal(BudgetProposal),
    Vote(BudgetVote),
}

impl BudgetMessage {
    pub fn command(&self) -> &'static str {
        match self {
            BudgetMessage::VoteSync(_) => CMD_VOTE_SYNC,
            BudgetMessage::Proposal(_) => CMD_PROPOSAL,
            BudgetMessage::Vote(_) => CMD_VOTE,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let bytes = match self {
            BudgetMessage::VoteSync(hash) => bincode::serialize(hash),
            BudgetMessage::Proposal(proposal) => bincode::serialize(proposal),
            BudgetMessage::Vote(vote) => bincode::serialize(vote),
        };
        bytes.map_err(|e| TreasuryError::SerializationError(e.to_string()))
    }

    pub fn decode(command: &str, payload: &[u8]) -> Result<Self> {
        let decoded = match command {
            CMD_VOTE_SYNC => bincode::deserialize(payload).map(BudgetMessage::VoteSync),
            CMD_PROPOSAL => bincode::deserialize(payload).map(BudgetMessage::Proposal),
            CMD_VOTE => bincode::deserialize(payload).map(BudgetMessage::Vote),
            other => return Err(TreasuryError::UnknownCommand(other.to_string())),
        };
        decoded.map_err(|e| TreasuryError::SerializationError(e.to_string()))
    }
}
