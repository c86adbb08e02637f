//! Budget manager
//!
//! Owns every admitted proposal and its votes, the gossip dedup caches and
//! the orphan votes waiting for their proposal. All of it sits behind one
//! lock; the per-block hook skips a block rather than wait for that lock.

use crate::collateral::validate_collateral;
use crate::error::{ProposalError, Result, TreasuryError, VoteError};
use crate::message::{BudgetMessage, CMD_VOTE_SYNC};
use crate::peer::BudgetPeer;
use crate::proposal::{BudgetProposal, ValidationContext, Validity};
use crate::vote::BudgetVote;
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use tessera_core::{
    ChainView, Clock, Hash256, InvKind, Inventory, MasternodeSync, NetworkParams, Relay,
};
use tessera_masternode::MasternodeRegistry;
use tracing::{debug, info, warn};

/// Blocks between two runs of the per-block hook
pub const BUDGET_NEW_BLOCK_INTERVAL: i64 = 14;

/// Period, in blocks, of the randomised full resend of votes
pub const BUDGET_RESET_SYNC_PERIOD: i64 = 1440;

/// Trust penalty for asking twice for the full budget list
pub const FULL_SYNC_MISBEHAVIOR: i32 = 20;

/// Persisted part of the manager
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BudgetState {
    /// Every proposal broadcast seen, admitted or not
    pub seen_proposals: BTreeMap<Hash256, BudgetProposal>,
    pub seen_votes: BTreeMap<Hash256, BudgetVote>,
    /// Admitted proposals
    pub proposals: BTreeMap<Hash256, BudgetProposal>,
    /// Admitted before a chain tip was known; fee transaction not checked yet
    pub pending: BTreeSet<Hash256>,
}

/// Vote count of a finalized budget over its payment window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizedBudgetTally {
    pub hash: Hash256,
    pub block_start: i64,
    pub block_end: i64,
    pub vote_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BudgetPolicy {
    /// Drop an admitted proposal after this many cycles without an allotment
    pub prune_unfunded_after_cycles: Option<u32>,
    /// Orphan votes and proposal requests older than this are forgotten
    pub orphan_request_retry_secs: i64,
}

impl Default for BudgetPolicy {
    fn default() -> Self {
        Self {
            prune_unfunded_after_cycles: None,
            orphan_request_retry_secs: 60 * 60,
        }
    }
}

#[derive(Debug, Clone)]
struct OrphanVote {
    vote: BudgetVote,
    received: i64,
}

#[derive(Default)]
struct Inner {
    state: BudgetState,
    /// Orphan votes by proposal hash, then by vote hash
    orphans: HashMap<Hash256, BTreeMap<Hash256, OrphanVote>>,
    /// When each missing proposal was last requested
    asked_for: HashMap<Hash256, i64>,
    finalized: BTreeMap<Hash256, FinalizedBudgetTally>,
    /// First block after the last cycle each proposal was funded for
    last_allotted: HashMap<Hash256, i64>,
}

pub struct BudgetManager {
    inner: Mutex<Inner>,
    params: NetworkParams,
    policy: BudgetPolicy,
    chain: Arc<dyn ChainView>,
    masternodes: Arc<dyn MasternodeRegistry>,
    sync: Arc<dyn MasternodeSync>,
    relay: Arc<dyn Relay>,
    clock: Arc<dyn Clock>,
}

impl BudgetManager {
    pub fn new(
        params: NetworkParams,
        policy: BudgetPolicy,
        chain: Arc<dyn ChainView>,
        masternodes: Arc<dyn MasternodeRegistry>,
        sync: Arc<dyn MasternodeSync>,
        relay: Arc<dyn Relay>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            params,
            policy,
            chain,
            masternodes,
            sync,
            relay,
            clock,
        }
    }

    pub fn params(&self) -> &NetworkParams {
        &self.params
    }

    fn enabled_masternodes(&self) -> usize {
        self.masternodes
            .count_enabled(self.params.min_protocol_version)
    }

    fn validation_context(&self) -> ValidationContext<'_> {
        ValidationContext {
            params: &self.params,
            chain: self.chain.as_ref(),
            enabled_masternodes: self.enabled_masternodes(),
        }
    }

    /// Admit a proposal. Returns false if it is already admitted.
    pub fn add_proposal(&self, proposal: BudgetProposal) -> std::result::Result<bool, ProposalError> {
        let mut inner = self.inner.lock();
        self.add_proposal_locked(&mut inner, proposal, true)
    }

    fn add_proposal_locked(
        &self,
        inner: &mut Inner,
        proposal: BudgetProposal,
        check_collateral: bool,
    ) -> std::result::Result<bool, ProposalError> {
        let validity = proposal.is_valid(&self.validation_context(), check_collateral)?;

        let hash = proposal.hash();
        if inner.state.proposals.contains_key(&hash) {
            return Ok(false);
        }

        if validity == Validity::Provisional {
            info!(proposal = %proposal.name, "proposal admitted before chain tip is known");
            inner.state.pending.insert(hash);
        }
        debug!(proposal = %proposal.name, hash = %hash, "proposal admitted");
        inner
            .state
            .seen_proposals
            .entry(hash)
            .or_insert_with(|| proposal.clone());
        inner.state.proposals.insert(hash, proposal);
        self.replay_orphans(inner, &hash);
        Ok(true)
    }

    fn replay_orphans(&self, inner: &mut Inner, proposal_hash: &Hash256) {
        let Some(orphans) = inner.orphans.remove(proposal_hash) else {
            return;
        };
        inner.asked_for.remove(proposal_hash);

        let mut votes: Vec<BudgetVote> = orphans.into_values().map(|o| o.vote).collect();
        votes.sort_by_key(|vote| vote.time);

        let now = self.clock.now();
        for vote in votes {
            let vote_hash = vote.hash();
            let Some(proposal) = inner.state.proposals.get_mut(proposal_hash) else {
                return;
            };
            match proposal.add_or_update_vote(vote, now) {
                Ok(()) => {
                    self.relay
                        .relay_inventory(Inventory::new(InvKind::BudgetVote, vote_hash));
                    self.sync.added_budget_item(&vote_hash);
                }
                Err(e) => debug!(vote = %vote_hash, error = %e, "orphan vote rejected"),
            }
        }
    }

    pub fn find_proposal(&self, hash: &Hash256) -> Option<BudgetProposal> {
        self.inner.lock().state.proposals.get(hash).cloned()
    }

    /// Admitted proposal with this name; the one with most yes votes wins
    pub fn find_proposal_by_name(&self, name: &str) -> Option<BudgetProposal> {
        let inner = self.inner.lock();
        inner
            .state
            .proposals
            .values()
            .filter(|p| p.name == name)
            .max_by_key(|p| p.yeas())
            .cloned()
    }

    pub fn all_proposals(&self) -> Vec<BudgetProposal> {
        self.inner.lock().state.proposals.values().cloned().collect()
    }

    pub fn proposal_count(&self) -> usize {
        self.inner.lock().state.proposals.len()
    }

    pub fn seen_vote_count(&self) -> usize {
        self.inner.lock().state.seen_votes.len()
    }

    pub fn orphan_vote_count(&self) -> usize {
        self.inner.lock().orphans.values().map(|o| o.len()).sum()
    }

    /// Apply a vote to its proposal. A vote relayed by `peer` for an unknown
    /// proposal is parked, and the proposal is requested once.
    pub fn update_proposal(
        &self,
        vote: BudgetVote,
        peer: Option<&dyn BudgetPeer>,
    ) -> std::result::Result<(), VoteError> {
        let mut inner = self.inner.lock();
        self.update_proposal_locked(&mut inner, vote, peer)
    }

    fn update_proposal_locked(
        &self,
        inner: &mut Inner,
        vote: BudgetVote,
        peer: Option<&dyn BudgetPeer>,
    ) -> std::result::Result<(), VoteError> {
        let now = self.clock.now();
        let proposal_hash = vote.proposal_hash;

        let Some(proposal) = inner.state.proposals.get_mut(&proposal_hash) else {
            if let Some(peer) = peer {
                // During initial sync a missing proposal is expected
                if !self.sync.is_synced() {
                    return Err(VoteError::ProposalNotFound(proposal_hash));
                }

                debug!(proposal = %proposal_hash, peer = peer.id(), "unknown proposal, parking vote");
                inner
                    .orphans
                    .entry(proposal_hash)
                    .or_default()
                    .insert(vote.hash(), OrphanVote { vote, received: now });

                if !inner.asked_for.contains_key(&proposal_hash) {
                    peer.push_message(BudgetMessage::VoteSync(proposal_hash));
                    inner.asked_for.insert(proposal_hash, now);
                }
            }
            return Err(VoteError::ProposalNotFound(proposal_hash));
        };

        proposal.add_or_update_vote(vote, now)
    }

    /// Proposals funded in the next payment cycle, in payment order.
    ///
    /// Sets every admitted proposal's allotment as a side effect.
    pub fn get_budget(&self) -> Vec<BudgetProposal> {
        let mut inner = self.inner.lock();
        self.allocate(&mut inner)
    }

    /// Re-run the skipped admission checks on provisionally admitted
    /// proposals now that a chain tip is known. Failures are dropped.
    fn revalidate_pending(&self, inner: &mut Inner) {
        if inner.state.pending.is_empty() || self.chain.height().is_none() {
            return;
        }

        let ctx = self.validation_context();
        let Inner {
            state,
            last_allotted,
            ..
        } = inner;
        let BudgetState {
            proposals, pending, ..
        } = state;

        pending.retain(|hash| {
            let Some(proposal) = proposals.get_mut(hash) else {
                return false;
            };
            let checked = validate_collateral(
                ctx.chain,
                &proposal.fee_tx_hash,
                hash,
                self.params.budget_fee_confirmations,
            )
            .map_err(|source| ProposalError::Collateral {
                name: proposal.name.clone(),
                source,
            })
            .and_then(|proof| Ok((proof, proposal.is_valid(&ctx, false)?)));

            match checked {
                Ok((_, Validity::Provisional)) => true,
                Ok((proof, Validity::Valid)) => {
                    proposal.time = proof.anchor_time;
                    debug!(proposal = %proposal.name, "pending proposal confirmed");
                    false
                }
                Err(e) => {
                    info!(proposal = %hash, error = %e, "dropping pending proposal");
                    proposals.remove(hash);
                    last_allotted.remove(hash);
                    false
                }
            }
        });
    }

    fn allocate(&self, inner: &mut Inner) -> Vec<BudgetProposal> {
        let Some(height) = self.chain.height() else {
            return Vec::new();
        };
        self.revalidate_pending(inner);

        let cycle = self.params.budget_cycle_blocks;
        let block_start = self.params.next_cycle_start(height);
        let block_end = block_start + cycle - 1;
        let total_budget = self.params.total_budget(block_start);
        let threshold = (self.enabled_masternodes() / 10) as i64;
        let now = self.clock.now();

        let mut ranked: Vec<(Hash256, i64, Hash256)> = inner
            .state
            .proposals
            .iter()
            .map(|(hash, p)| (*hash, p.net_votes(), p.fee_tx_hash))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.2.cmp(&a.2)));

        let mut allocated = 0;
        let mut funded = Vec::new();
        for (hash, net_votes, _) in ranked {
            let Some(proposal) = inner.state.proposals.get_mut(&hash) else {
                continue;
            };

            let eligible = !inner.state.pending.contains(&hash)
                && proposal.block_start <= block_start
                && proposal.block_end >= block_end
                && net_votes > threshold
                && proposal.is_established(now, self.params.proposal_establishment_secs);

            if eligible && allocated + proposal.amount <= total_budget {
                proposal.allotted = proposal.amount;
                allocated += proposal.amount;
                inner.last_allotted.insert(hash, block_end + 1);
                debug!(proposal = %proposal.name, amount = proposal.amount, "budget allotted");
                funded.push(proposal.clone());
            } else {
                proposal.allotted = 0;
                debug!(proposal = %proposal.name, eligible, "no amount allotted");
            }
        }

        funded
    }

    pub fn record_finalized_budget(&self, tally: FinalizedBudgetTally) {
        self.inner.lock().finalized.insert(tally.hash, tally);
    }

    /// Whether `height` pays the budget instead of a masternode. The best
    /// finalized budget covering it needs more than 5% of enabled masternodes.
    pub fn is_budget_payment_block(&self, height: i64) -> bool {
        let five_percent = (self.enabled_masternodes() / 20) as i64;
        let inner = self.inner.lock();
        let highest = inner
            .finalized
            .values()
            .filter(|t| height >= t.block_start && height <= t.block_end)
            .map(|t| t.vote_count)
            .max()
            .unwrap_or(-1);

        debug!(
            height,
            highest,
            five_percent,
            budgets = inner.finalized.len(),
            "budget payment block check"
        );
        highest > five_percent
    }

    /// Announce admitted proposals and their votes to `peer`.
    ///
    /// The zero hash selects every proposal. In partial mode only votes not
    /// yet marked synced are announced. Returns the number of items sent.
    pub fn sync(&self, peer: &dyn BudgetPeer, proposal: Hash256, partial: bool) -> usize {
        let inner = self.inner.lock();
        self.sync_locked(&inner, peer, proposal, partial)
    }

    fn sync_locked(
        &self,
        inner: &Inner,
        peer: &dyn BudgetPeer,
        filter: Hash256,
        partial: bool,
    ) -> usize {
        let mut count = 0;
        for hash in inner.state.seen_proposals.keys() {
            if !filter.is_zero() && *hash != filter {
                continue;
            }
            let Some(proposal) = inner.state.proposals.get(hash) else {
                continue;
            };

            peer.push_inventory(Inventory::new(InvKind::BudgetProposal, *hash));
            count += 1;

            for vote in proposal.votes.values() {
                if !partial || !vote.synced {
                    peer.push_inventory(Inventory::new(InvKind::BudgetVote, vote.hash()));
                    count += 1;
                }
            }
        }

        peer.send_sync_count(count);
        debug!(peer = peer.id(), count, "budget sync sent");
        count
    }

    /// Clear every vote's synced flag so the next partial sync resends it
    pub fn reset_sync(&self) {
        let mut inner = self.inner.lock();
        set_synced(&mut inner, false);
    }

    pub fn mark_synced(&self) {
        let mut inner = self.inner.lock();
        set_synced(&mut inner, true);
    }

    /// Per-block hook.
    pub fn new_block(&self, peers: &[Arc<dyn BudgetPeer>]) {
        let Some(height) = self.chain.height() else {
            return;
        };
        if height % BUDGET_NEW_BLOCK_INTERVAL != 0 {
            return;
        }

        let Some(mut inner) = self.inner.try_lock() else {
            debug!(height, "budget busy, skipping block");
            return;
        };

        if !self.sync.budget_stage_reached() {
            return;
        }

        let now = self.clock.now();
        self.prune_orphans(&mut inner, now);
        self.prune_unfunded(&mut inner, height);
        self.allocate(&mut inner);

        if self.sync.is_synced() {
            debug!(height, "incremental budget sync started");
            if height % BUDGET_RESET_SYNC_PERIOD
                == rand::thread_rng().gen_range(0..BUDGET_RESET_SYNC_PERIOD)
            {
                set_synced(&mut inner, false);
            }

            for peer in peers {
                if peer.protocol_version() >= self.params.min_protocol_version {
                    self.sync_locked(&inner, peer.as_ref(), Hash256::ZERO, true);
                }
            }

            set_synced(&mut inner, true);
        }
    }

    fn prune_orphans(&self, inner: &mut Inner, now: i64) {
        let cutoff = now - self.policy.orphan_request_retry_secs;
        inner.orphans.retain(|_, votes| {
            votes.retain(|_, orphan| orphan.received > cutoff);
            !votes.is_empty()
        });
        inner.asked_for.retain(|_, asked| *asked > cutoff);
    }

    fn prune_unfunded(&self, inner: &mut Inner, height: i64) {
        let Some(cycles) = self.policy.prune_unfunded_after_cycles else {
            return;
        };
        let window = self.params.budget_cycle_blocks * cycles as i64;

        let Inner {
            state,
            last_allotted,
            ..
        } = inner;
        let BudgetState {
            proposals, pending, ..
        } = state;
        proposals.retain(|hash, proposal| {
            let since = last_allotted
                .get(hash)
                .copied()
                .unwrap_or(proposal.block_start);
            let keep = height - since < window;
            if !keep {
                info!(proposal = %proposal.name, cycles, "pruning unfunded proposal");
                last_allotted.remove(hash);
                pending.remove(hash);
            }
            keep
        });
    }

    /// Local proposal submission: the fee transaction must already be deep enough.
    pub fn submit_proposal(&self, mut proposal: BudgetProposal) -> Result<Hash256> {
        let hash = proposal.hash();
        let proof = validate_collateral(
            self.chain.as_ref(),
            &proposal.fee_tx_hash,
            &hash,
            self.params.budget_fee_confirmations,
        )?;
        proposal.time = proof.anchor_time;

        let mut inner = self.inner.lock();
        inner.state.seen_proposals.insert(hash, proposal.clone());
        self.add_proposal_locked(&mut inner, proposal, false)?;
        self.relay
            .relay_inventory(Inventory::new(InvKind::BudgetProposal, hash));
        info!(proposal = %hash, "proposal submitted");
        Ok(hash)
    }

    /// Local vote: signed by our own masternode key, never parked as orphan.
    pub fn submit_vote(&self, vote: BudgetVote) -> Result<Hash256> {
        vote.verify_signature()?;
        let hash = vote.hash();

        let mut inner = self.inner.lock();
        self.update_proposal_locked(&mut inner, vote.clone(), None)?;
        inner.state.seen_votes.insert(hash, vote);
        self.relay
            .relay_inventory(Inventory::new(InvKind::BudgetVote, hash));
        Ok(hash)
    }

    /// Handle a budget message from `peer`
    pub fn process_message(&self, peer: &dyn BudgetPeer, message: BudgetMessage) -> Result<()> {
        if !self.sync.is_blockchain_synced() {
            return Ok(());
        }

        let mut inner = self.inner.lock();
        match message {
            BudgetMessage::VoteSync(proposal) => self.process_vote_sync(&inner, peer, proposal),
            BudgetMessage::Proposal(proposal) => self.process_proposal(&mut inner, proposal),
            BudgetMessage::Vote(vote) => self.process_vote(&mut inner, peer, vote),
        }
    }

    fn process_vote_sync(&self, inner: &Inner, peer: &dyn BudgetPeer, proposal: Hash256) -> Result<()> {
        if self.params.is_main() && proposal.is_zero() {
            if peer.has_fulfilled_request(CMD_VOTE_SYNC) {
                warn!(peer = peer.id(), "peer already asked for the budget list");
                peer.misbehaving(FULL_SYNC_MISBEHAVIOR);
                return Err(TreasuryError::DuplicateSyncRequest);
            }
            peer.fulfilled_request(CMD_VOTE_SYNC);
        }

        let count = self.sync_locked(inner, peer, proposal, false);
        debug!(peer = peer.id(), count, "sent budget votes");
        Ok(())
    }

    fn process_proposal(&self, inner: &mut Inner, mut proposal: BudgetProposal) -> Result<()> {
        proposal.votes.clear();
        proposal.allotted = 0;
        let hash = proposal.hash();

        if inner.state.seen_proposals.contains_key(&hash) {
            self.sync.added_budget_item(&hash);
            return Ok(());
        }

        let proof = validate_collateral(
            self.chain.as_ref(),
            &proposal.fee_tx_hash,
            &hash,
            self.params.budget_fee_confirmations,
        )
        .map_err(|e| {
            debug!(proposal = %hash, fee_tx = %proposal.fee_tx_hash, error = %e, "proposal fee tx is not valid");
            e
        })?;
        proposal.time = proof.anchor_time;

        inner.state.seen_proposals.insert(hash, proposal.clone());

        match self.add_proposal_locked(inner, proposal, false) {
            Ok(true) => self
                .relay
                .relay_inventory(Inventory::new(InvKind::BudgetProposal, hash)),
            Ok(false) => {}
            Err(e) => {
                info!(proposal = %hash, error = %e, "invalid budget proposal");
                return Err(e.into());
            }
        }
        self.sync.added_budget_item(&hash);
        debug!(proposal = %hash, "new budget proposal");
        Ok(())
    }

    fn process_vote(&self, inner: &mut Inner, peer: &dyn BudgetPeer, vote: BudgetVote) -> Result<()> {
        let hash = vote.hash();
        if inner.state.seen_votes.contains_key(&hash) {
            self.sync.added_budget_item(&hash);
            return Ok(());
        }

        if self.masternodes.find(&vote.voter).is_none() {
            debug!(voter = %vote.voter, "vote from unknown masternode");
            return Err(VoteError::UnknownMasternode(vote.voter).into());
        }

        inner.state.seen_votes.insert(hash, vote.clone());
        vote.verify_signature()?;

        let proposal = vote.proposal_hash;
        match self.update_proposal_locked(inner, vote, Some(peer)) {
            Ok(()) => {
                self.relay
                    .relay_inventory(Inventory::new(InvKind::BudgetVote, hash));
                self.sync.added_budget_item(&hash);
                debug!(proposal = %proposal, vote = %hash, "new budget vote");
                Ok(())
            }
            Err(e) => {
                debug!(proposal = %proposal, peer = peer.id(), error = %e, "error updating vote");
                Err(e.into())
            }
        }
    }

    /// Copy of the persisted state
    pub fn snapshot(&self) -> BudgetState {
        self.inner.lock().state.clone()
    }

    /// Replace all state with `state`
    pub fn restore(&self, state: BudgetState) {
        let mut inner = self.inner.lock();
        *inner = Inner {
            state,
            ..Inner::default()
        };
    }

    pub fn clear(&self) {
        *self.inner.lock() = Inner::default();
    }
}

fn set_synced(inner: &mut Inner, synced: bool) {
    let Inner { state, .. } = inner;
    for hash in state.seen_proposals.keys() {
        if let Some(proposal) = state.proposals.get_mut(hash) {
            for vote in proposal.votes.values_mut() {
                vote.synced = synced;
            }
        }
    }
}

impl fmt::Display for BudgetManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        write!(
            f,
            "Proposals: {}, Seen Budgets: {}, Seen Budget Votes: {}",
            inner.state.proposals.len(),
            inner.state.seen_proposals.len(),
            inner.state.seen_votes.len()
        )
    }
}
