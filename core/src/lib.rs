//! Tessera Core Library
//!
//! Chain-facing primitives shared by the masternode and treasury crates,
//! and the interfaces through which they reach the block index, the sync
//! tracker and the peer transport.

pub mod chain;
pub mod clock;
pub mod constants;
pub mod net;
pub mod params;
pub mod script;
pub mod transaction;

pub use chain::{BlockRef, ChainView, MasternodeSync, TxLocation};
pub use clock::{Clock, FixedClock, SystemClock};
pub use constants::{format_amount, Amount, COIN};
pub use net::{InvKind, Inventory, NoRelay, Relay};
pub use params::{Network, NetworkParams};
pub use script::Script;
pub use transaction::{OutPoint, Transaction, TxOut, Utxo};

pub use tessera_crypto::Hash256;
