#![allow(dead_code)]

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tessera_core::{
    Amount, BlockRef, ChainView, FixedClock, Hash256, Inventory, InvKind, MasternodeSync,
    NetworkParams, OutPoint, Relay, Script, Transaction, TxLocation, TxOut, Utxo,
};
use tessera_crypto::KeyPair;
use tessera_masternode::{
    CollateralTier, MasternodeBroadcast, MasternodeRecord, MasternodeRegistry, Ping,
};
use tessera_treasury::*;

pub const NOW: i64 = 1_700_000_000;

fn block_hash(height: i64) -> Hash256 {
    let mut bytes = [0xb1; 32];
    bytes[..8].copy_from_slice(&height.to_le_bytes());
    Hash256::new(bytes)
}

/// Chain whose tip is always stamped with [`NOW`], one block per minute
pub struct MockChain {
    pub tip: Mutex<Option<i64>>,
    pub txs: Mutex<HashMap<Hash256, TxLocation>>,
    nonce: AtomicU64,
}

impl MockChain {
    pub fn new(tip: Option<i64>) -> Self {
        Self {
            tip: Mutex::new(tip),
            txs: Mutex::new(HashMap::new()),
            nonce: AtomicU64::new(0),
        }
    }

    pub fn set_tip(&self, height: i64) {
        *self.tip.lock() = Some(height);
    }

    /// Add a fee transaction marking `proposal_hash`, mined at `height`
    pub fn add_fee_tx(&self, proposal_hash: &Hash256, height: Option<i64>) -> Hash256 {
        let n = self.nonce.fetch_add(1, Ordering::SeqCst);
        let mut seed = [0x5e; 32];
        seed[..8].copy_from_slice(&n.to_le_bytes());
        let tx = Transaction {
            inputs: vec![OutPoint::new(Hash256::new(seed), 0)],
            outputs: vec![TxOut::new(
                PROPOSAL_FEE_TX,
                Script::op_return_hash(proposal_hash),
            )],
            lock_time: 0,
        };
        let hash = tx.hash();
        self.txs.lock().insert(
            hash,
            TxLocation {
                tx,
                block_hash: height.map(block_hash),
            },
        );
        hash
    }
}

impl ChainView for MockChain {
    fn tip(&self) -> Option<BlockRef> {
        let tip = (*self.tip.lock())?;
        self.block_at(tip)
    }

    fn block_at(&self, height: i64) -> Option<BlockRef> {
        let tip = (*self.tip.lock())?;
        (height >= 0 && height <= tip).then(|| BlockRef {
            height,
            hash: block_hash(height),
            time: NOW - (tip - height) * 60,
        })
    }

    fn active_block(&self, hash: &Hash256) -> Option<BlockRef> {
        let mut height = [0u8; 8];
        height.copy_from_slice(&hash.as_bytes()[..8]);
        self.block_at(i64::from_le_bytes(height))
            .filter(|block| &block.hash == hash)
    }

    fn find_transaction(&self, txid: &Hash256) -> Option<TxLocation> {
        self.txs.lock().get(txid).cloned()
    }

    fn utxo(&self, _outpoint: &OutPoint) -> Option<Utxo> {
        None
    }
}

pub struct MockSync {
    pub blockchain_synced: AtomicBool,
    pub synced: AtomicBool,
    pub budget_stage: AtomicBool,
    pub added: Mutex<Vec<Hash256>>,
}

impl Default for MockSync {
    fn default() -> Self {
        Self {
            blockchain_synced: AtomicBool::new(true),
            synced: AtomicBool::new(true),
            budget_stage: AtomicBool::new(true),
            added: Mutex::new(Vec::new()),
        }
    }
}

impl MasternodeSync for MockSync {
    fn is_blockchain_synced(&self) -> bool {
        self.blockchain_synced.load(Ordering::SeqCst)
    }

    fn is_synced(&self) -> bool {
        self.synced.load(Ordering::SeqCst)
    }

    fn budget_stage_reached(&self) -> bool {
        self.budget_stage.load(Ordering::SeqCst)
    }

    fn added_budget_item(&self, hash: &Hash256) {
        self.added.lock().push(*hash);
    }
}

/// Registry that knows a fixed set of voters and reports a fixed enabled count
#[derive(Default)]
pub struct MockRegistry {
    records: Mutex<HashMap<String, MasternodeRecord>>,
    pub enabled: AtomicUsize,
}

impl MockRegistry {
    pub fn register(&self, address: &str) {
        let mnb = MasternodeBroadcast::new(
            address.to_string(),
            CollateralTier::Copper,
            Vec::new(),
            "127.0.0.1:24100".to_string(),
            NetworkParams::regtest().protocol_version,
            NOW,
        );
        self.records
            .lock()
            .insert(address.to_string(), MasternodeRecord::from_broadcast(&mnb));
    }
}

impl MasternodeRegistry for MockRegistry {
    fn find(&self, address: &str) -> Option<MasternodeRecord> {
        self.records.lock().get(address).cloned()
    }

    fn add(&self, record: MasternodeRecord) -> bool {
        let mut records = self.records.lock();
        if records.contains_key(&record.address) {
            return false;
        }
        records.insert(record.address.clone(), record);
        true
    }

    fn update_from_broadcast(&self, _mnb: &MasternodeBroadcast) -> bool {
        false
    }

    fn set_last_ping(&self, _ping: &Ping) -> bool {
        false
    }

    fn insert_seen_ping(&self, _ping: Ping) {}

    fn insert_seen_broadcast(&self, _mnb: MasternodeBroadcast) {}

    fn count_enabled(&self, _min_protocol_version: u32) -> usize {
        self.enabled.load(Ordering::SeqCst)
    }

    fn rank_of(&self, _address: &str, _height: i64, _min_protocol_version: u32) -> Option<usize> {
        None
    }
}

#[derive(Default)]
pub struct RecordingRelay {
    pub sent: Mutex<Vec<Inventory>>,
}

impl RecordingRelay {
    pub fn count(&self, kind: InvKind) -> usize {
        self.sent.lock().iter().filter(|inv| inv.kind == kind).count()
    }
}

impl Relay for RecordingRelay {
    fn relay_inventory(&self, inv: Inventory) {
        self.sent.lock().push(inv);
    }
}

pub struct RecordingPeer {
    pub id: u64,
    pub version: u32,
    pub inventory: Mutex<Vec<Inventory>>,
    pub messages: Mutex<Vec<BudgetMessage>>,
    pub sync_counts: Mutex<Vec<usize>>,
    pub fulfilled: Mutex<HashSet<String>>,
    pub misbehavior: AtomicI32,
}

impl RecordingPeer {
    pub fn new(id: u64, version: u32) -> Self {
        Self {
            id,
            version,
            inventory: Mutex::new(Vec::new()),
            messages: Mutex::new(Vec::new()),
            sync_counts: Mutex::new(Vec::new()),
            fulfilled: Mutex::new(HashSet::new()),
            misbehavior: AtomicI32::new(0),
        }
    }

    pub fn inventory_of(&self, kind: InvKind) -> usize {
        self.inventory
            .lock()
            .iter()
            .filter(|inv| inv.kind == kind)
            .count()
    }
}

impl BudgetPeer for RecordingPeer {
    fn id(&self) -> PeerId {
        self.id
    }

    fn protocol_version(&self) -> u32 {
        self.version
    }

    fn push_inventory(&self, inv: Inventory) {
        self.inventory.lock().push(inv);
    }

    fn push_message(&self, message: BudgetMessage) {
        self.messages.lock().push(message);
    }

    fn send_sync_count(&self, count: usize) {
        self.sync_counts.lock().push(count);
    }

    fn has_fulfilled_request(&self, request: &str) -> bool {
        self.fulfilled.lock().contains(request)
    }

    fn fulfilled_request(&self, request: &str) {
        self.fulfilled.lock().insert(request.to_string());
    }

    fn misbehaving(&self, score: i32) {
        self.misbehavior.fetch_add(score, Ordering::SeqCst);
    }
}

pub struct Env {
    pub params: NetworkParams,
    pub chain: Arc<MockChain>,
    pub sync: Arc<MockSync>,
    pub registry: Arc<MockRegistry>,
    pub relay: Arc<RecordingRelay>,
    pub clock: Arc<FixedClock>,
    pub manager: Arc<BudgetManager>,
}

impl Env {
    /// Regtest network, tip at height 100, ten enabled masternodes
    pub fn new() -> Self {
        Self::with(NetworkParams::regtest(), BudgetPolicy::default())
    }

    pub fn with(params: NetworkParams, policy: BudgetPolicy) -> Self {
        let chain = Arc::new(MockChain::new(Some(100)));
        let sync = Arc::new(MockSync::default());
        let registry = Arc::new(MockRegistry::default());
        registry.enabled.store(10, Ordering::SeqCst);
        let relay = Arc::new(RecordingRelay::default());
        let clock = Arc::new(FixedClock::new(NOW));
        let manager = Arc::new(BudgetManager::new(
            params.clone(),
            policy,
            chain.clone(),
            registry.clone(),
            sync.clone(),
            relay.clone(),
            clock.clone(),
        ));
        Self {
            params,
            chain,
            sync,
            registry,
            relay,
            clock,
            manager,
        }
    }

    pub fn peer(&self) -> RecordingPeer {
        RecordingPeer::new(1, self.params.protocol_version)
    }

    /// Proposal starting at `start` whose fee transaction was mined at height 90
    pub fn proposal(&self, name: &str, start: i64, payments: u32, amount: Amount) -> BudgetProposal {
        let mut proposal = BudgetProposal::with_payments(
            name.to_string(),
            format!("https://tessera.example/{}", name),
            start,
            payments,
            amount,
            Script::pay_to_address(format!("TSR{}", name)),
            Hash256::ZERO,
            &self.params,
        )
        .unwrap();
        proposal.fee_tx_hash = self.chain.add_fee_tx(&proposal.hash(), Some(90));
        proposal
    }

    pub fn voter(&self) -> KeyPair {
        let key = KeyPair::generate();
        self.registry.register(&key.address());
        key
    }

    pub fn vote(&self, key: &KeyPair, proposal: &BudgetProposal, outcome: VoteOutcome) -> BudgetVote {
        BudgetVote::new_signed(key, proposal.hash(), outcome, self.clock_now())
    }

    pub fn clock_now(&self) -> i64 {
        use tessera_core::Clock;
        self.clock.now()
    }

    /// Admit `proposal` through the peer message path
    pub fn admit(&self, proposal: &BudgetProposal) {
        let peer = self.peer();
        self.manager
            .process_message(&peer, BudgetMessage::Proposal(proposal.clone()))
            .unwrap();
    }

    /// Cast `yes` yes votes and `no` no votes from fresh masternodes
    pub fn cast(&self, proposal: &BudgetProposal, yes: usize, no: usize) {
        let peer = self.peer();
        let outcomes = std::iter::repeat(VoteOutcome::Yes)
            .take(yes)
            .chain(std::iter::repeat(VoteOutcome::No).take(no));
        for outcome in outcomes {
            let key = self.voter();
            self.manager
                .process_message(&peer, BudgetMessage::Vote(self.vote(&key, proposal, outcome)))
                .unwrap();
        }
    }
}
