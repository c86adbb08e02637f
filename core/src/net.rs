//! Inventory announcements handed to the peer transport

use serde::{Deserialize, Serialize};
use std::fmt;
use tessera_crypto::Hash256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvKind {
    MasternodeBroadcast,
    MasternodePing,
    BudgetProposal,
    BudgetVote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Inventory {
    pub kind: InvKind,
    pub hash: Hash256,
}

impl Inventory {
    pub fn new(kind: InvKind, hash: Hash256) -> Self {
        Self { kind, hash }
    }
}

impl fmt::Display for Inventory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {}", self.kind, self.hash)
    }
}

/// Gossip relay to every connected peer
pub trait Relay: Send + Sync {
    fn relay_inventory(&self, inv: Inventory);
}

/// Relay that drops everything, for nodes without networking
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRelay;

impl Relay for NoRelay {
    fn relay_inventory(&self, _inv: Inventory) {}
}
