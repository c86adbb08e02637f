//! What the budget manager needs from a connected peer

use crate::message::BudgetMessage;
use tessera_core::Inventory;

pub type PeerId = u64;

pub trait BudgetPeer: Send + Sync {
    fn id(&self) -> PeerId;

    fn protocol_version(&self) -> u32;

    /// Announce an object the peer may request
    fn push_inventory(&self, inv: Inventory);

    fn push_message(&self, message: BudgetMessage);

    /// Tell the peer how many budget items the last sync announced
    fn send_sync_count(&self, count: usize);

    fn has_fulfilled_request(&self, request: &str) -> bool;

    fn fulfilled_request(&self, request: &str);

    /// Penalise the peer's trust score
    fn misbehaving(&self, score: i32);
}
