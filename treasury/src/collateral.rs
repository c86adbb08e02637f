//! Proposal fee transaction checks
//!
//! A proposal is backed by a fee transaction burning at least
//! [`PROPOSAL_FEE_TX`] into an `OP_RETURN <proposal hash>` output.

use crate::error::CollateralError;
use tessera_core::{Amount, ChainView, Hash256, Script, COIN};
use tracing::debug;

pub const PROPOSAL_FEE_TX: Amount = 50 * COIN;

/// What a valid fee transaction tells us about its proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollateralProof {
    pub confirmations: i64,
    /// Time of the block that mined the fee transaction, 0 while unmined
    pub anchor_time: i64,
}

pub fn validate_collateral(
    chain: &dyn ChainView,
    tx_hash: &Hash256,
    expected_hash: &Hash256,
    min_confirmations: i64,
) -> Result<CollateralProof, CollateralError> {
    let location = chain
        .find_transaction(tx_hash)
        .ok_or(CollateralError::NotFound(*tx_hash))?;
    let tx = &location.tx;

    if tx.outputs.is_empty() {
        return Err(CollateralError::Malformed {
            tx: *tx_hash,
            reason: "no outputs".to_string(),
        });
    }
    if tx.lock_time != 0 {
        return Err(CollateralError::Malformed {
            tx: *tx_hash,
            reason: format!("lock time {}", tx.lock_time),
        });
    }

    let marker = Script::op_return_hash(expected_hash);
    let mut found_marker = false;
    for output in &tx.outputs {
        let script = &output.script_pubkey;
        if !script.is_normal_payment_script() && !script.is_unspendable() {
            return Err(CollateralError::Malformed {
                tx: *tx_hash,
                reason: format!("invalid script {}", script),
            });
        }
        if *script == marker && output.value >= PROPOSAL_FEE_TX {
            found_marker = true;
        }
    }
    if !found_marker {
        return Err(CollateralError::NotMarked {
            tx: *tx_hash,
            expected: *expected_hash,
        });
    }

    let mut confirmations = chain.instant_confirmations(tx_hash);
    let mut anchor_time = 0;
    if let Some(block) = location
        .block_hash
        .and_then(|hash| chain.active_block(&hash))
    {
        confirmations += chain.depth_of(block.height);
        anchor_time = block.time;
    }

    if confirmations < min_confirmations {
        debug!(tx = %tx_hash, confirmations, "collateral not deep enough");
        return Err(CollateralError::InsufficientConfirmations {
            have: confirmations,
            need: min_confirmations,
        });
    }

    Ok(CollateralProof {
        confirmations,
        anchor_time,
    })
}
