//! Masternode liveness pings

use crate::error::PingError;
use serde::{Deserialize, Serialize};
use tessera_core::{ChainView, Hash256};
use tessera_crypto::{hash_serialized, verify_message, KeyPair};

/// Maximum distance between a ping's signing time and local time
pub const PING_MAX_DRIFT_SECS: i64 = 60 * 60;

/// A ping's anchor block must be at most this many blocks below the tip
pub const PING_MAX_ANCHOR_AGE: i64 = 24;

/// Depth below the tip at which locally built pings are anchored
pub const PING_ANCHOR_DEPTH: i64 = 12;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping {
    /// Address of the masternode being kept alive
    pub address: String,
    /// Recent block proving the ping was made after it
    pub block_hash: Hash256,
    pub sig_time: i64,
    pub signature: Vec<u8>,
}

impl Ping {
    pub fn new(address: String, block_hash: Hash256, sig_time: i64) -> Self {
        Self {
            address,
            block_hash,
            sig_time,
            signature: Vec::new(),
        }
    }

    /// Build an unsigned ping anchored [`PING_ANCHOR_DEPTH`] blocks below the tip
    pub fn anchored(address: String, chain: &dyn ChainView, now: i64) -> Result<Self, PingError> {
        let tip = chain
            .height()
            .ok_or_else(|| PingError::UnknownBlock("no chain tip".to_string()))?;
        let anchor_height = (tip - PING_ANCHOR_DEPTH).max(0);
        let anchor = chain
            .block_at(anchor_height)
            .ok_or_else(|| PingError::UnknownBlock(format!("height {}", anchor_height)))?;
        Ok(Self::new(address, anchor.hash, now))
    }

    /// Identity of the ping; the anchor block is not part of it
    pub fn hash(&self) -> Hash256 {
        hash_serialized(&(&self.address, self.sig_time))
    }

    pub fn signing_message(&self) -> Vec<u8> {
        format!("{}{}{}", self.address, self.block_hash, self.sig_time).into_bytes()
    }

    pub fn sign(&mut self, key: &KeyPair) -> Result<(), PingError> {
        if key.address() != self.address {
            return Err(PingError::WrongKey(self.address.clone()));
        }
        self.signature = key.sign(&self.signing_message());
        Ok(())
    }

    pub fn verify_signature(&self) -> Result<(), PingError> {
        verify_message(&self.address, &self.signing_message(), &self.signature)
            .map_err(|_| PingError::InvalidSignature)
    }

    /// Check signing time and anchor freshness.
    ///
    /// Signature and per-masternode ordering are checked by the registry,
    /// which knows the previous ping.
    pub fn check(&self, chain: &dyn ChainView, now: i64) -> Result<(), PingError> {
        let max = now + PING_MAX_DRIFT_SECS;
        if self.sig_time > max {
            return Err(PingError::FutureTime {
                sig_time: self.sig_time,
                max,
            });
        }

        let min = now - PING_MAX_DRIFT_SECS;
        if self.sig_time <= min {
            return Err(PingError::Expired {
                sig_time: self.sig_time,
                min,
            });
        }

        let anchor = chain
            .active_block(&self.block_hash)
            .ok_or_else(|| PingError::UnknownBlock(self.block_hash.to_hex()))?;
        let tip = chain.height().unwrap_or(anchor.height);
        if tip - anchor.height > PING_MAX_ANCHOR_AGE {
            return Err(PingError::StaleBlock {
                height: anchor.height,
                tip,
            });
        }

        Ok(())
    }
}
