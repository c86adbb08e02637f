//! Funding proofs tying on-chain collateral to a masternode identity

use crate::collateral::CollateralTier;
use crate::error::FundingError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tessera_core::{Amount, ChainView, OutPoint};
use tessera_crypto::{verify_message, KeyPair};

/// Confirmations a funding input needs before it counts
pub const MASTERNODE_MIN_CONFIRMATIONS: i64 = 15;

/// One collateral input pledged to a masternode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingProof {
    pub amount: Amount,
    pub outpoint: OutPoint,
    /// Address owning the collateral output; receives the rewards
    pub pay_address: String,
    /// Address allowed to vote on behalf of this collateral
    pub vote_address: String,
    /// Signature by `pay_address` over [`FundingProof::signing_message`]
    pub signature: Vec<u8>,
}

impl FundingProof {
    /// Build a proof signed by the collateral owner
    pub fn new_signed(
        owner: &KeyPair,
        masternode_address: &str,
        outpoint: OutPoint,
        amount: Amount,
        vote_address: String,
    ) -> Self {
        let mut proof = Self {
            amount,
            outpoint,
            pay_address: owner.address(),
            vote_address,
            signature: Vec::new(),
        };
        proof.signature = owner.sign(&proof.signing_message(masternode_address));
        proof
    }

    pub fn signing_message(&self, masternode_address: &str) -> Vec<u8> {
        format!(
            "{}{}{}{}{}",
            masternode_address, self.outpoint, self.amount, self.pay_address, self.vote_address
        )
        .into_bytes()
    }

    /// Check this proof against the UTXO set
    pub fn check(
        &self,
        masternode_address: &str,
        chain: &dyn ChainView,
        min_confirmations: i64,
    ) -> Result<(), FundingError> {
        let utxo = chain
            .utxo(&self.outpoint)
            .ok_or(FundingError::Spent(self.outpoint))?;

        if utxo.output.value != self.amount {
            return Err(FundingError::AmountMismatch {
                outpoint: self.outpoint,
                claimed: self.amount,
                actual: utxo.output.value,
            });
        }

        if utxo.output.script_pubkey.address() != Some(self.pay_address.as_str()) {
            return Err(FundingError::WrongOwner(self.outpoint));
        }

        let confirmations = chain.depth_of(utxo.height);
        if confirmations < min_confirmations {
            return Err(FundingError::TooNew {
                have: confirmations,
                need: min_confirmations,
            });
        }

        verify_message(
            &self.pay_address,
            &self.signing_message(masternode_address),
            &self.signature,
        )
        .map_err(|_| FundingError::InvalidSignature(self.outpoint))
    }
}

/// Validate every proof and check their sum covers the tier's collateral.
///
/// Returns the total pledged amount.
pub fn verify_funding(
    masternode_address: &str,
    tier: CollateralTier,
    proofs: &[FundingProof],
    chain: &dyn ChainView,
    min_confirmations: i64,
) -> Result<Amount, FundingError> {
    if proofs.is_empty() {
        return Err(FundingError::Empty);
    }

    let mut inputs = HashSet::new();
    let mut total: Amount = 0;
    for proof in proofs {
        if !inputs.insert(proof.outpoint) {
            return Err(FundingError::DuplicateInput(proof.outpoint));
        }
        proof.check(masternode_address, chain, min_confirmations)?;
        total = total.saturating_add(proof.amount);
    }

    let required = tier.required_collateral();
    if total < required {
        return Err(FundingError::Insufficient {
            required,
            provided: total,
        });
    }

    Ok(total)
}
