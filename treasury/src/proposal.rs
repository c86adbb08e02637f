//! Budget proposals and their admission rules

use crate::collateral::validate_collateral;
use crate::error::{ProposalError, VoteError};
use crate::vote::{BudgetVote, VoteOutcome, BUDGET_VOTE_MAX_DRIFT, BUDGET_VOTE_UPDATE_MIN};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tessera_core::{format_amount, Amount, ChainView, Hash256, NetworkParams, Script, COIN};
use tessera_crypto::hash_serialized;
use tracing::debug;

pub const MIN_PROPOSAL_AMOUNT: Amount = 10 * COIN;
pub const MAX_PROPOSAL_NAME_LEN: usize = 20;
pub const MAX_PROPOSAL_URL_LEN: usize = 64;
/// Highest block a proposal may start or end at
pub const MAX_PROPOSAL_HEIGHT: i64 = i32::MAX as i64;

/// Everything proposal admission needs from outside the proposal
pub struct ValidationContext<'a> {
    pub params: &'a NetworkParams,
    pub chain: &'a dyn ChainView,
    /// Enabled masternodes on the current protocol
    pub enabled_masternodes: usize,
}

/// Result of a successful admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    Valid,
    /// No chain tip yet; collateral and schedule checks are still pending
    Provisional,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetProposal {
    pub name: String,
    pub url: String,
    pub block_start: i64,
    pub block_end: i64,
    pub amount: Amount,
    pub destination: Script,
    /// Time of the block holding the fee transaction
    pub time: i64,
    pub fee_tx_hash: Hash256,
    /// One vote per voter address
    pub votes: BTreeMap<String, BudgetVote>,
    /// Amount granted by the last allocation pass
    pub allotted: Amount,
}

impl BudgetProposal {
    pub fn new(
        name: String,
        url: String,
        block_start: i64,
        block_end: i64,
        amount: Amount,
        destination: Script,
        fee_tx_hash: Hash256,
    ) -> Self {
        Self {
            name,
            url,
            block_start,
            block_end,
            amount,
            destination,
            time: 0,
            fee_tx_hash,
            votes: BTreeMap::new(),
            allotted: 0,
        }
    }

    /// Build a locally prepared proposal paying `amount` for `payments` cycles
    /// starting at the cycle boundary `block_start`.
    #[allow(clippy::too_many_arguments)]
    pub fn with_payments(
        name: String,
        url: String,
        block_start: i64,
        payments: u32,
        amount: Amount,
        destination: Script,
        fee_tx_hash: Hash256,
        params: &NetworkParams,
    ) -> Result<Self, ProposalError> {
        check_text_limits(&name, &url)?;
        if !(0..=MAX_PROPOSAL_HEIGHT).contains(&block_start) {
            return Err(ProposalError::InvalidStart {
                name,
                start: block_start,
            });
        }
        if !params.is_cycle_start(block_start) {
            return Err(ProposalError::StartNotOnCycle {
                name,
                start: block_start,
            });
        }
        if payments == 0 {
            return Err(ProposalError::NoPayments(name));
        }

        let block_end = params
            .budget_cycle_blocks
            .checked_mul(payments as i64)
            .and_then(|blocks| blocks.checked_add(block_start - 1))
            .filter(|end| *end <= MAX_PROPOSAL_HEIGHT);
        let Some(block_end) = block_end else {
            return Err(ProposalError::InvalidEnd {
                name,
                end: i64::MAX,
            });
        };
        Ok(Self::new(
            name,
            url,
            block_start,
            block_end,
            amount,
            destination,
            fee_tx_hash,
        ))
    }

    pub fn hash(&self) -> Hash256 {
        hash_serialized(&(
            &self.name,
            &self.url,
            self.block_start,
            self.block_end,
            self.amount,
            &self.destination,
        ))
    }

    pub fn block_start_cycle(&self, cycle_blocks: i64) -> i64 {
        self.block_start - self.block_start.rem_euclid(cycle_blocks)
    }

    pub fn block_end_cycle(&self, cycle_blocks: i64) -> i64 {
        self.block_end - self.block_end.rem_euclid(cycle_blocks)
    }

    pub fn total_payment_count(&self, cycle_blocks: i64) -> i64 {
        if self.block_end < self.block_start {
            return 0;
        }
        (self.block_end_cycle(cycle_blocks) - self.block_start_cycle(cycle_blocks)) / cycle_blocks
            + 1
    }

    /// First block after the last payment cycle, if it is representable
    fn schedule_end(&self, cycle_blocks: i64) -> Option<i64> {
        cycle_blocks
            .checked_mul(self.total_payment_count(cycle_blocks))?
            .checked_add(self.block_start)
    }

    /// Payments still due from the cycle containing `height` onwards
    pub fn remaining_payment_count(&self, height: i64, cycle_blocks: i64) -> i64 {
        let total = self.total_payment_count(cycle_blocks);
        let current_cycle = height - height.rem_euclid(cycle_blocks);
        if current_cycle <= self.block_start_cycle(cycle_blocks) {
            return total;
        }
        let remaining = (self.block_end_cycle(cycle_blocks) - current_cycle) / cycle_blocks + 1;
        remaining.clamp(0, total)
    }

    pub fn yeas(&self) -> i64 {
        self.count(VoteOutcome::Yes)
    }

    pub fn nays(&self) -> i64 {
        self.count(VoteOutcome::No)
    }

    pub fn abstains(&self) -> i64 {
        self.count(VoteOutcome::Abstain)
    }

    fn count(&self, outcome: VoteOutcome) -> i64 {
        self.votes.values().filter(|v| v.outcome == outcome).count() as i64
    }

    pub fn net_votes(&self) -> i64 {
        self.yeas() - self.nays()
    }

    /// Share of yes votes among yes and no votes
    pub fn vote_ratio(&self) -> f64 {
        let yeas = self.yeas();
        let nays = self.nays();
        if yeas + nays == 0 {
            return 0.0;
        }
        yeas as f64 / (yeas + nays) as f64
    }

    /// The fee transaction was mined long enough ago for funding
    pub fn is_established(&self, now: i64, establishment_secs: i64) -> bool {
        self.time < now - establishment_secs
    }

    /// Admission check.
    pub fn is_valid(
        &self,
        ctx: &ValidationContext<'_>,
        check_collateral: bool,
    ) -> Result<Validity, ProposalError> {
        if self.nays() - self.yeas() > (ctx.enabled_masternodes / 10) as i64 {
            return Err(ProposalError::CommunityRejected(self.name.clone()));
        }

        check_text_limits(&self.name, &self.url)?;

        if !(0..=MAX_PROPOSAL_HEIGHT).contains(&self.block_start) {
            return Err(ProposalError::InvalidStart {
                name: self.name.clone(),
                start: self.block_start,
            });
        }

        if self.block_end > MAX_PROPOSAL_HEIGHT {
            return Err(ProposalError::InvalidEnd {
                name: self.name.clone(),
                end: self.block_end,
            });
        }

        if self.block_end < self.block_start {
            return Err(ProposalError::EndBeforeStart {
                name: self.name.clone(),
                start: self.block_start,
                end: self.block_end,
            });
        }

        if self.amount < MIN_PROPOSAL_AMOUNT {
            return Err(ProposalError::AmountTooLow {
                name: self.name.clone(),
                amount: self.amount,
                min: MIN_PROPOSAL_AMOUNT,
            });
        }

        if self.destination.is_empty() {
            return Err(ProposalError::EmptyPaymentAddress(self.name.clone()));
        }

        if self.destination.is_pay_to_script_hash() {
            return Err(ProposalError::Multisig(self.name.clone()));
        }

        let max = ctx.params.total_budget(self.block_start);
        if self.amount > max {
            return Err(ProposalError::AmountExceedsBudget {
                name: self.name.clone(),
                amount: self.amount,
                max,
            });
        }

        let height = match ctx.chain.height() {
            Some(height) => height,
            None => {
                debug!(proposal = %self.name, "no chain tip, admitting provisionally");
                return Ok(Validity::Provisional);
            }
        };

        if check_collateral {
            validate_collateral(
                ctx.chain,
                &self.fee_tx_hash,
                &self.hash(),
                ctx.params.budget_fee_confirmations,
            )
            .map_err(|source| ProposalError::Collateral {
                name: self.name.clone(),
                source,
            })?;
        }

        let cycle = ctx.params.budget_cycle_blocks;
        let end = self
            .schedule_end(cycle)
            .ok_or_else(|| ProposalError::InvalidEnd {
                name: self.name.clone(),
                end: self.block_end,
            })?;
        if end < height {
            return Err(ProposalError::Expired {
                name: self.name.clone(),
                end,
                height,
            });
        }

        Ok(Validity::Valid)
    }

    /// Record `vote`, replacing the voter's previous vote when the timing rules allow.
    pub fn add_or_update_vote(&mut self, vote: BudgetVote, now: i64) -> Result<(), VoteError> {
        let mut action = "New vote inserted";
        if let Some(existing) = self.votes.get(&vote.voter) {
            if existing.time > vote.time {
                return Err(VoteError::StaleVote {
                    existing: existing.time,
                    new: vote.time,
                });
            }
            let elapsed = vote.time - existing.time;
            if elapsed < BUDGET_VOTE_UPDATE_MIN {
                return Err(VoteError::TooFrequent {
                    elapsed,
                    min: BUDGET_VOTE_UPDATE_MIN,
                });
            }
            action = "Existing vote updated";
        }

        let max = now + BUDGET_VOTE_MAX_DRIFT;
        if vote.time > max {
            return Err(VoteError::ClockSkew {
                time: vote.time,
                max,
            });
        }

        debug!(proposal = %self.name, vote = %vote.hash(), "{}", action);
        self.votes.insert(vote.voter.clone(), vote);
        Ok(())
    }
}

fn check_text_limits(name: &str, url: &str) -> Result<(), ProposalError> {
    if name.len() > MAX_PROPOSAL_NAME_LEN {
        return Err(ProposalError::NameTooLong(name.len()));
    }
    if url.len() > MAX_PROPOSAL_URL_LEN {
        return Err(ProposalError::UrlTooLong(url.len()));
    }
    Ok(())
}

impl fmt::Display for BudgetProposal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) blocks {}-{} amount {} to {} yes {} no {} abstain {}",
            self.name,
            self.url,
            self.block_start,
            self.block_end,
            format_amount(self.amount),
            self.destination,
            self.yeas(),
            self.nays(),
            self.abstains()
        )
    }
}
