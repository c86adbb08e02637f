mod common;

use common::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tessera_core::{Hash256, InvKind, Inventory, NetworkParams, Script, COIN};
use tessera_crypto::KeyPair;
use tessera_treasury::*;

#[test]
fn test_proposal_admitted_from_peer() {
    let env = Env::new();
    let peer = env.peer();
    let proposal = env.proposal("roadmap", 120, 2, 100 * COIN);
    let hash = proposal.hash();

    env.manager
        .process_message(&peer, BudgetMessage::Proposal(proposal.clone()))
        .unwrap();

    let admitted = env.manager.find_proposal(&hash).unwrap();
    assert_eq!(admitted.time, NOW - 600);
    assert_eq!(env.relay.count(InvKind::BudgetProposal), 1);
    assert!(env.sync.added.lock().contains(&hash));

    // already seen: no second relay
    env.manager
        .process_message(&peer, BudgetMessage::Proposal(proposal))
        .unwrap();
    assert_eq!(env.relay.count(InvKind::BudgetProposal), 1);
    assert_eq!(env.manager.proposal_count(), 1);
}

#[test]
fn test_proposal_without_collateral_is_not_seen() {
    let env = Env::new();
    let mut proposal = env.proposal("nofee", 120, 1, 100 * COIN);
    proposal.fee_tx_hash = Hash256::new([0xee; 32]);

    let result = env
        .manager
        .process_message(&env.peer(), BudgetMessage::Proposal(proposal));
    assert!(matches!(
        result,
        Err(TreasuryError::Collateral(CollateralError::NotFound(_)))
    ));
    assert_eq!(
        env.manager.to_string(),
        "Proposals: 0, Seen Budgets: 0, Seen Budget Votes: 0"
    );
}

#[test]
fn test_invalid_proposal_stays_in_seen_cache() {
    let env = Env::new();
    let proposal = env.proposal("tiny", 120, 1, MIN_PROPOSAL_AMOUNT - 1);

    let result = env
        .manager
        .process_message(&env.peer(), BudgetMessage::Proposal(proposal));
    assert!(matches!(
        result,
        Err(TreasuryError::Proposal(ProposalError::AmountTooLow { .. }))
    ));
    assert_eq!(
        env.manager.to_string(),
        "Proposals: 0, Seen Budgets: 1, Seen Budget Votes: 0"
    );
    assert_eq!(env.relay.count(InvKind::BudgetProposal), 0);
}

#[test]
fn test_submit_proposal_needs_confirmed_fee() {
    let env = Env::new();
    let mut proposal = env.proposal("local", 120, 1, 100 * COIN);
    proposal.fee_tx_hash = env.chain.add_fee_tx(&proposal.hash(), None);

    assert!(matches!(
        env.manager.submit_proposal(proposal.clone()),
        Err(TreasuryError::Collateral(
            CollateralError::InsufficientConfirmations { have: 0, need: 1 }
        ))
    ));

    proposal.fee_tx_hash = env.chain.add_fee_tx(&proposal.hash(), Some(100));
    let hash = env.manager.submit_proposal(proposal).unwrap();
    assert!(env.manager.find_proposal(&hash).is_some());
    assert_eq!(env.relay.count(InvKind::BudgetProposal), 1);
}

#[test]
fn test_find_proposal_by_name_prefers_most_yes_votes() {
    let env = Env::new();
    let first = env.proposal("dup", 120, 1, 100 * COIN);
    let second = env.proposal("dup", 120, 2, 100 * COIN);
    env.admit(&first);
    env.admit(&second);
    env.cast(&second, 2, 0);

    let found = env.manager.find_proposal_by_name("dup").unwrap();
    assert_eq!(found.hash(), second.hash());
    assert!(env.manager.find_proposal_by_name("missing").is_none());
    assert_eq!(env.manager.all_proposals().len(), 2);
}

#[test]
fn test_vote_requires_known_masternode() {
    let env = Env::new();
    let proposal = env.proposal("roadmap", 120, 2, 100 * COIN);
    env.admit(&proposal);

    let stranger = KeyPair::generate();
    let vote = env.vote(&stranger, &proposal, VoteOutcome::Yes);
    assert!(matches!(
        env.manager.process_message(&env.peer(), BudgetMessage::Vote(vote)),
        Err(TreasuryError::Vote(VoteError::UnknownMasternode(_)))
    ));
    assert_eq!(env.manager.seen_vote_count(), 0);
}

#[test]
fn test_forged_vote_is_rejected_but_remembered() {
    let env = Env::new();
    let proposal = env.proposal("roadmap", 120, 2, 100 * COIN);
    env.admit(&proposal);

    let key = env.voter();
    let mut vote = env.vote(&key, &proposal, VoteOutcome::Yes);
    vote.outcome = VoteOutcome::No;

    assert!(matches!(
        env.manager.process_message(&env.peer(), BudgetMessage::Vote(vote.clone())),
        Err(TreasuryError::Vote(VoteError::InvalidSignature))
    ));
    assert_eq!(env.manager.seen_vote_count(), 1);
    // a repeat is dropped by the seen cache
    assert!(env
        .manager
        .process_message(&env.peer(), BudgetMessage::Vote(vote))
        .is_ok());
    assert_eq!(env.manager.find_proposal(&proposal.hash()).unwrap().nays(), 0);
}

#[test]
fn test_vote_admission_and_update_interval() {
    let env = Env::new();
    let peer = env.peer();
    let proposal = env.proposal("roadmap", 120, 2, 100 * COIN);
    env.admit(&proposal);

    let key = env.voter();
    let first = BudgetVote::new_signed(&key, proposal.hash(), VoteOutcome::Yes, NOW);
    env.manager
        .process_message(&peer, BudgetMessage::Vote(first))
        .unwrap();
    assert_eq!(env.relay.count(InvKind::BudgetVote), 1);

    let early = BudgetVote::new_signed(
        &key,
        proposal.hash(),
        VoteOutcome::No,
        NOW + BUDGET_VOTE_UPDATE_MIN - 1,
    );
    assert!(matches!(
        env.manager.process_message(&peer, BudgetMessage::Vote(early)),
        Err(TreasuryError::Vote(VoteError::TooFrequent { .. }))
    ));

    let on_time = BudgetVote::new_signed(
        &key,
        proposal.hash(),
        VoteOutcome::No,
        NOW + BUDGET_VOTE_UPDATE_MIN,
    );
    env.manager
        .process_message(&peer, BudgetMessage::Vote(on_time))
        .unwrap();

    let stored = env.manager.find_proposal(&proposal.hash()).unwrap();
    assert_eq!(stored.yeas(), 0);
    assert_eq!(stored.nays(), 1);
    assert_eq!(env.relay.count(InvKind::BudgetVote), 2);
}

#[test]
fn test_submit_vote_for_unknown_proposal_is_not_parked() {
    let env = Env::new();
    let key = env.voter();
    let vote = BudgetVote::new_signed(&key, Hash256::new([7; 32]), VoteOutcome::Yes, NOW);

    assert!(matches!(
        env.manager.submit_vote(vote),
        Err(TreasuryError::Vote(VoteError::ProposalNotFound(_)))
    ));
    assert_eq!(env.manager.orphan_vote_count(), 0);
    assert_eq!(env.manager.seen_vote_count(), 0);
}

#[test]
fn test_orphan_votes_request_proposal_once() {
    let env = Env::new();
    let peer = env.peer();
    let proposal = env.proposal("later", 120, 2, 100 * COIN);
    let hash = proposal.hash();

    for _ in 0..10 {
        let key = env.voter();
        let result = env
            .manager
            .process_message(&peer, BudgetMessage::Vote(env.vote(&key, &proposal, VoteOutcome::Yes)));
        assert!(matches!(
            result,
            Err(TreasuryError::Vote(VoteError::ProposalNotFound(h))) if h == hash
        ));
    }

    assert_eq!(*peer.messages.lock(), vec![BudgetMessage::VoteSync(hash)]);
    assert_eq!(env.manager.orphan_vote_count(), 10);

    // the proposal arrives and the parked votes are applied
    env.manager
        .process_message(&peer, BudgetMessage::Proposal(proposal))
        .unwrap();
    assert_eq!(env.manager.orphan_vote_count(), 0);
    assert_eq!(env.manager.find_proposal(&hash).unwrap().yeas(), 10);
    assert_eq!(env.relay.count(InvKind::BudgetVote), 10);
}

#[test]
fn test_orphan_votes_ignored_during_initial_sync() {
    let env = Env::new();
    env.sync.synced.store(false, Ordering::SeqCst);
    let peer = env.peer();
    let proposal = env.proposal("later", 120, 2, 100 * COIN);

    let key = env.voter();
    assert!(env
        .manager
        .process_message(&peer, BudgetMessage::Vote(env.vote(&key, &proposal, VoteOutcome::Yes)))
        .is_err());
    assert!(peer.messages.lock().is_empty());
    assert_eq!(env.manager.orphan_vote_count(), 0);
}

#[test]
fn test_messages_ignored_until_blockchain_synced() {
    let env = Env::new();
    env.sync.blockchain_synced.store(false, Ordering::SeqCst);
    let proposal = env.proposal("roadmap", 120, 2, 100 * COIN);

    env.manager
        .process_message(&env.peer(), BudgetMessage::Proposal(proposal))
        .unwrap();
    assert_eq!(env.manager.proposal_count(), 0);
}

#[test]
fn test_allocation_respects_budget_cap() {
    let env = Env::new();
    // next cycle starts at 120 and holds 1000 coins
    let total = env.params.total_budget(120);
    assert_eq!(total, 1_000 * COIN);

    let big = env.proposal("big", 120, 2, total * 6 / 10);
    let second = env.proposal("second", 120, 2, total / 2);
    env.admit(&big);
    env.admit(&second);
    env.cast(&big, 4, 0);
    env.cast(&second, 3, 0);

    let funded = env.manager.get_budget();
    assert_eq!(funded.len(), 1);
    assert_eq!(funded[0].hash(), big.hash());
    assert_eq!(funded[0].allotted, big.amount);

    let skipped = env.manager.find_proposal(&second.hash()).unwrap();
    assert_eq!(skipped.allotted, 0);

    let allotted: u64 = env.manager.all_proposals().iter().map(|p| p.allotted).sum();
    assert!(allotted <= total);
}

#[test]
fn test_allocation_is_deterministic() {
    let env = Env::new();
    let proposals: Vec<_> = (0..4)
        .map(|i| env.proposal(&format!("p{}", i), 120, 1, 200 * COIN))
        .collect();
    for p in &proposals {
        env.admit(p);
        env.cast(p, 2, 0);
    }

    let first: Vec<_> = env.manager.get_budget().iter().map(|p| p.hash()).collect();
    let second: Vec<_> = env.manager.get_budget().iter().map(|p| p.hash()).collect();
    assert_eq!(first, second);
    assert_eq!(first.len(), 4);

    // equal votes: descending fee transaction hash
    let mut expected = proposals.clone();
    expected.sort_by(|a, b| b.fee_tx_hash.cmp(&a.fee_tx_hash));
    let expected: Vec<_> = expected.iter().map(|p| p.hash()).collect();
    assert_eq!(first, expected);
}

#[test]
fn test_allocation_eligibility() {
    let env = Env::new();

    // net votes must exceed enabled/10 = 1
    let weak = env.proposal("weak", 120, 2, 100 * COIN);
    env.admit(&weak);
    env.cast(&weak, 2, 1);

    // does not cover the whole next cycle
    let late = env.proposal("late", 140, 1, 100 * COIN);
    env.admit(&late);
    env.cast(&late, 3, 0);

    // fee mined at the tip, not established yet
    let mut fresh = env.proposal("fresh", 120, 2, 100 * COIN);
    fresh.fee_tx_hash = env.chain.add_fee_tx(&fresh.hash(), Some(100));
    env.admit(&fresh);
    env.cast(&fresh, 3, 0);

    let good = env.proposal("good", 120, 2, 100 * COIN);
    env.admit(&good);
    env.cast(&good, 2, 0);

    let funded = env.manager.get_budget();
    assert_eq!(funded.len(), 1);
    assert_eq!(funded[0].name, "good");

    env.clock.advance(env.params.proposal_establishment_secs + 1);
    let funded = env.manager.get_budget();
    assert_eq!(funded.len(), 2);
    assert_eq!(funded[0].name, "fresh");
}

#[test]
fn test_budget_payment_block_needs_five_percent() {
    let env = Env::new();
    env.registry.enabled.store(40, Ordering::SeqCst);

    env.manager.record_finalized_budget(FinalizedBudgetTally {
        hash: Hash256::new([1; 32]),
        block_start: 120,
        block_end: 139,
        vote_count: 2,
    });
    assert!(!env.manager.is_budget_payment_block(125));

    env.manager.record_finalized_budget(FinalizedBudgetTally {
        hash: Hash256::new([2; 32]),
        block_start: 120,
        block_end: 139,
        vote_count: 3,
    });
    assert!(env.manager.is_budget_payment_block(125));
    assert!(!env.manager.is_budget_payment_block(140));
}

#[test]
fn test_full_and_partial_sync() {
    let env = Env::new();
    let peer = env.peer();
    let proposal = env.proposal("roadmap", 120, 2, 100 * COIN);
    env.admit(&proposal);
    env.cast(&proposal, 2, 0);

    assert_eq!(env.manager.sync(&peer, Hash256::ZERO, false), 3);
    assert_eq!(peer.inventory_of(InvKind::BudgetProposal), 1);
    assert_eq!(peer.inventory_of(InvKind::BudgetVote), 2);

    env.manager.mark_synced();
    assert_eq!(env.manager.sync(&peer, Hash256::ZERO, true), 1);
    assert_eq!(env.manager.sync(&peer, proposal.hash(), false), 3);
    assert_eq!(env.manager.sync(&peer, Hash256::new([9; 32]), false), 0);

    env.manager.reset_sync();
    assert_eq!(env.manager.sync(&peer, Hash256::ZERO, true), 3);

    assert_eq!(*peer.sync_counts.lock(), vec![3, 1, 3, 0, 3]);
}

#[test]
fn test_repeated_full_sync_request_on_main() {
    let env = Env::with(NetworkParams::main(), BudgetPolicy::default());
    let peer = env.peer();

    env.manager
        .process_message(&peer, BudgetMessage::VoteSync(Hash256::ZERO))
        .unwrap();
    assert!(matches!(
        env.manager
            .process_message(&peer, BudgetMessage::VoteSync(Hash256::ZERO)),
        Err(TreasuryError::DuplicateSyncRequest)
    ));
    assert_eq!(peer.misbehavior.load(Ordering::SeqCst), FULL_SYNC_MISBEHAVIOR);
    assert_eq!(*peer.sync_counts.lock(), vec![0]);

    // targeted requests are not limited
    env.manager
        .process_message(&peer, BudgetMessage::VoteSync(Hash256::new([3; 32])))
        .unwrap();
}

#[test]
fn test_repeated_full_sync_allowed_off_main() {
    let env = Env::new();
    let peer = env.peer();
    for _ in 0..2 {
        env.manager
            .process_message(&peer, BudgetMessage::VoteSync(Hash256::ZERO))
            .unwrap();
    }
    assert_eq!(peer.misbehavior.load(Ordering::SeqCst), 0);
}

#[test]
fn test_new_block_syncs_current_peers() {
    let env = Env::new();
    let proposal = env.proposal("roadmap", 120, 2, 100 * COIN);
    env.admit(&proposal);
    env.cast(&proposal, 2, 0);

    let current = Arc::new(env.peer());
    let outdated = Arc::new(RecordingPeer::new(2, env.params.min_protocol_version - 1));
    let peers: Vec<Arc<dyn BudgetPeer>> = vec![current.clone(), outdated.clone()];

    // 100 is not on the hook cadence
    env.manager.new_block(&peers);
    assert!(current.sync_counts.lock().is_empty());

    env.chain.set_tip(112);
    env.manager.new_block(&peers);
    assert_eq!(*current.sync_counts.lock(), vec![3]);
    assert!(outdated.sync_counts.lock().is_empty());

    // votes are now marked as synced
    assert_eq!(env.manager.sync(current.as_ref(), Hash256::ZERO, true), 1);
}

#[test]
fn test_new_block_waits_for_budget_stage() {
    let env = Env::new();
    env.sync.budget_stage.store(false, Ordering::SeqCst);
    let peer = Arc::new(env.peer());
    let peers: Vec<Arc<dyn BudgetPeer>> = vec![peer.clone()];

    env.chain.set_tip(112);
    env.manager.new_block(&peers);
    assert!(peer.sync_counts.lock().is_empty());
}

#[test]
fn test_prune_unfunded_proposals() {
    let env = Env::with(
        NetworkParams::regtest(),
        BudgetPolicy {
            prune_unfunded_after_cycles: Some(1),
            ..BudgetPolicy::default()
        },
    );
    let funded = env.proposal("funded", 120, 3, 100 * COIN);
    let ignored = env.proposal("ignored", 120, 3, 100 * COIN);
    env.admit(&funded);
    env.admit(&ignored);
    env.cast(&funded, 3, 0);

    env.sync.synced.store(false, Ordering::SeqCst);
    env.chain.set_tip(112);
    env.manager.new_block(&[]);
    assert_eq!(env.manager.proposal_count(), 2);
    assert_eq!(
        env.manager.find_proposal(&funded.hash()).unwrap().allotted,
        funded.amount
    );

    env.chain.set_tip(140);
    env.manager.new_block(&[]);
    assert!(env.manager.find_proposal(&funded.hash()).is_some());
    assert!(env.manager.find_proposal(&ignored.hash()).is_none());
}

#[test]
fn test_unfunded_proposals_kept_by_default() {
    let env = Env::new();
    let ignored = env.proposal("ignored", 120, 3, 100 * COIN);
    env.admit(&ignored);

    env.sync.synced.store(false, Ordering::SeqCst);
    env.chain.set_tip(168);
    env.manager.new_block(&[]);
    assert_eq!(env.manager.proposal_count(), 1);
}

#[test]
fn test_overflowing_schedule_from_peer_is_rejected() {
    let env = Env::new();
    let mut proposal = BudgetProposal::new(
        "overflow".to_string(),
        "https://tessera.example/overflow".to_string(),
        i64::MAX - 5,
        i64::MAX - 1,
        100 * COIN,
        Script::pay_to_address("TSRoverflow"),
        Hash256::ZERO,
    );
    proposal.fee_tx_hash = env.chain.add_fee_tx(&proposal.hash(), Some(90));

    let result = env
        .manager
        .process_message(&env.peer(), BudgetMessage::Proposal(proposal));
    assert!(matches!(
        result,
        Err(TreasuryError::Proposal(ProposalError::InvalidStart { .. }))
    ));
    assert_eq!(env.manager.proposal_count(), 0);
}

#[test]
fn test_provisional_proposal_without_fee_is_dropped() {
    let env = Env::new();
    *env.chain.tip.lock() = None;
    let mut ghost = env.proposal("ghost", 120, 2, 100 * COIN);
    ghost.fee_tx_hash = Hash256::new([0x77; 32]);

    assert_eq!(env.manager.add_proposal(ghost.clone()), Ok(true));
    assert!(env.manager.snapshot().pending.contains(&ghost.hash()));

    env.chain.set_tip(100);
    env.cast(&ghost, 3, 0);
    assert!(env.manager.get_budget().is_empty());
    assert!(env.manager.find_proposal(&ghost.hash()).is_none());
    assert!(env.manager.snapshot().pending.is_empty());
}

#[test]
fn test_provisional_proposal_funded_once_fee_confirmed() {
    let env = Env::new();
    *env.chain.tip.lock() = None;
    let proposal = env.proposal("early", 120, 2, 100 * COIN);

    assert_eq!(env.manager.add_proposal(proposal.clone()), Ok(true));
    // no tip, nothing to allocate against
    assert!(env.manager.get_budget().is_empty());
    assert!(env.manager.snapshot().pending.contains(&proposal.hash()));

    env.chain.set_tip(100);
    env.cast(&proposal, 3, 0);
    let funded = env.manager.get_budget();
    assert_eq!(funded.len(), 1);
    assert_eq!(funded[0].hash(), proposal.hash());
    assert_eq!(funded[0].time, NOW - 600);
    assert!(env.manager.snapshot().pending.is_empty());
}

/// Peer that re-enters the per-block hook while a sync holds the manager
struct ReentrantPeer {
    recording: RecordingPeer,
    manager: Arc<BudgetManager>,
    witness: Arc<RecordingPeer>,
    reentered: AtomicBool,
}

impl BudgetPeer for ReentrantPeer {
    fn id(&self) -> PeerId {
        self.recording.id()
    }

    fn protocol_version(&self) -> u32 {
        self.recording.protocol_version()
    }

    fn push_inventory(&self, inv: Inventory) {
        self.recording.push_inventory(inv);
        if !self.reentered.swap(true, Ordering::SeqCst) {
            let peers: Vec<Arc<dyn BudgetPeer>> = vec![self.witness.clone()];
            self.manager.new_block(&peers);
        }
    }

    fn push_message(&self, message: BudgetMessage) {
        self.recording.push_message(message);
    }

    fn send_sync_count(&self, count: usize) {
        self.recording.send_sync_count(count);
    }

    fn has_fulfilled_request(&self, request: &str) -> bool {
        self.recording.has_fulfilled_request(request)
    }

    fn fulfilled_request(&self, request: &str) {
        self.recording.fulfilled_request(request);
    }

    fn misbehaving(&self, score: i32) {
        self.recording.misbehaving(score);
    }
}

#[test]
fn test_new_block_skips_while_manager_busy() {
    let env = Env::new();
    let proposal = env.proposal("roadmap", 120, 2, 100 * COIN);
    env.admit(&proposal);
    env.cast(&proposal, 2, 0);

    let witness = Arc::new(env.peer());
    let busy = Arc::new(ReentrantPeer {
        recording: env.peer(),
        manager: env.manager.clone(),
        witness: witness.clone(),
        reentered: AtomicBool::new(false),
    });
    let peers: Vec<Arc<dyn BudgetPeer>> = vec![busy.clone()];

    env.chain.set_tip(112);
    env.manager.new_block(&peers);

    assert!(busy.reentered.load(Ordering::SeqCst));
    assert_eq!(*busy.recording.sync_counts.lock(), vec![3]);
    assert!(witness.sync_counts.lock().is_empty());
    assert!(witness.inventory.lock().is_empty());
}
