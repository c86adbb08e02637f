//! Read-only view of the active chain
//!
//! The block index and chain selection live outside this workspace; the
//! governance code only needs the queries below.

use crate::transaction::{OutPoint, Transaction, Utxo};
use serde::{Deserialize, Serialize};
use tessera_crypto::Hash256;

/// A block on the active chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRef {
    pub height: i64,
    pub hash: Hash256,
    pub time: i64,
}

/// A transaction and the block containing it, if it has been mined
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxLocation {
    pub tx: Transaction,
    pub block_hash: Option<Hash256>,
}

pub trait ChainView: Send + Sync {
    /// Current tip, `None` before the chain is loaded
    fn tip(&self) -> Option<BlockRef>;

    /// Block at `height` on the active chain
    fn block_at(&self, height: i64) -> Option<BlockRef>;

    /// Look up a block by hash; only blocks on the active chain are returned
    fn active_block(&self, hash: &Hash256) -> Option<BlockRef>;

    /// Find a transaction by hash, mined or in the mempool
    fn find_transaction(&self, txid: &Hash256) -> Option<TxLocation>;

    /// Confirmations granted by instant-send locks, before mining
    fn instant_confirmations(&self, _txid: &Hash256) -> i64 {
        0
    }

    /// Unspent output lookup
    fn utxo(&self, outpoint: &OutPoint) -> Option<Utxo>;

    fn height(&self) -> Option<i64> {
        self.tip().map(|tip| tip.height)
    }

    /// Depth of a block on the active chain (1 for the tip itself)
    fn depth_of(&self, height: i64) -> i64 {
        match self.height() {
            Some(tip) if height <= tip => tip - height + 1,
            _ => 0,
        }
    }
}

/// Progress of the node's initial synchronisation with the masternode network
pub trait MasternodeSync: Send + Sync {
    /// Block download has caught up with the network
    fn is_blockchain_synced(&self) -> bool;

    /// Every masternode and governance asset has been synced
    fn is_synced(&self) -> bool;

    /// Asset sync has progressed past the budget stage
    fn budget_stage_reached(&self) -> bool;

    /// Record that a governance item was seen during sync
    fn added_budget_item(&self, _hash: &Hash256) {}

    /// Record that a masternode broadcast was seen during sync
    fn added_masternode_list(&self, _hash: &Hash256) {}
}
