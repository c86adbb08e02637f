//! Masternode votes on budget proposals

use crate::error::VoteError;
use serde::{Deserialize, Serialize};
use std::fmt;
use tessera_core::Hash256;
use tessera_crypto::{hash_serialized, verify_message, KeyPair};

/// Minimum seconds between two accepted votes from the same voter on a proposal
pub const BUDGET_VOTE_UPDATE_MIN: i64 = 60 * 60;

/// How far ahead of local time a vote may be signed
pub const BUDGET_VOTE_MAX_DRIFT: i64 = 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoteOutcome {
    Yes,
    No,
    Abstain,
}

impl fmt::Display for VoteOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoteOutcome::Yes => write!(f, "yes"),
            VoteOutcome::No => write!(f, "no"),
            VoteOutcome::Abstain => write!(f, "abstain"),
        }
    }
}

impl std::str::FromStr for VoteOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "yes" => Ok(VoteOutcome::Yes),
            "no" => Ok(VoteOutcome::No),
            "abstain" => Ok(VoteOutcome::Abstain),
            other => Err(format!("invalid vote outcome: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetVote {
    /// Masternode address that cast the vote
    pub voter: String,
    pub proposal_hash: Hash256,
    pub outcome: VoteOutcome,
    pub time: i64,
    pub signature: Vec<u8>,
    /// Already announced to peers; local bookkeeping, never persisted
    #[serde(skip)]
    pub synced: bool,
}

impl BudgetVote {
    pub fn new(voter: String, proposal_hash: Hash256, outcome: VoteOutcome, time: i64) -> Self {
        Self {
            voter,
            proposal_hash,
            outcome,
            time,
            signature: Vec::new(),
            synced: false,
        }
    }

    /// Cast and sign a vote with the masternode key
    pub fn new_signed(
        key: &KeyPair,
        proposal_hash: Hash256,
        outcome: VoteOutcome,
        time: i64,
    ) -> Self {
        let mut vote = Self::new(key.address(), proposal_hash, outcome, time);
        vote.signature = key.sign(&vote.signing_message());
        vote
    }

    pub fn hash(&self) -> Hash256 {
        hash_serialized(&(&self.voter, &self.proposal_hash, self.outcome, self.time))
    }

    pub fn signing_message(&self) -> Vec<u8> {
        format!(
            "{}{}{}{}",
            self.voter,
            self.proposal_hash.to_hex(),
            self.outcome,
            self.time
        )
        .into_bytes()
    }

    pub fn verify_signature(&self) -> Result<(), VoteError> {
        verify_message(&self.voter, &self.signing_message(), &self.signature)
            .map_err(|_| VoteError::InvalidSignature)
    }
}
