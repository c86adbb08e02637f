//! Masternode collateral tiers

use crate::error::MasternodeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use tessera_core::{Amount, COIN};

/// Ranking weight shared by every tier
pub const DEFAULT_SEESAW_BASIS: u32 = 2000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CollateralTier {
    Copper,   // 1,000
    Silver,   // 3,000
    Gold,     // 10,000
    Platinum, // 30,000
    Diamond,  // 100,000
}

impl CollateralTier {
    pub const ALL: [CollateralTier; 5] = [
        CollateralTier::Copper,
        CollateralTier::Silver,
        CollateralTier::Gold,
        CollateralTier::Platinum,
        CollateralTier::Diamond,
    ];

    /// Highest tier the given collateral qualifies for
    pub fn from_amount(amount: Amount) -> Result<Self, MasternodeError> {
        Self::ALL
            .iter()
            .rev()
            .copied()
            .find(|tier| amount >= tier.required_collateral())
            .ok_or(MasternodeError::InsufficientCollateral {
                required: CollateralTier::Copper.required_collateral(),
                provided: amount,
            })
    }

    pub fn from_name(name: &str) -> Result<Self, MasternodeError> {
        Self::ALL
            .iter()
            .copied()
            .find(|tier| tier.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| MasternodeError::InvalidTier(name.to_string()))
    }

    pub fn name(&self) -> &'static str {
        match self {
            CollateralTier::Copper => "copper",
            CollateralTier::Silver => "silver",
            CollateralTier::Gold => "gold",
            CollateralTier::Platinum => "platinum",
            CollateralTier::Diamond => "diamond",
        }
    }

    pub fn required_collateral(&self) -> Amount {
        match self {
            CollateralTier::Copper => 1_000 * COIN,
            CollateralTier::Silver => 3_000 * COIN,
            CollateralTier::Gold => 10_000 * COIN,
            CollateralTier::Platinum => 30_000 * COIN,
            CollateralTier::Diamond => 100_000 * COIN,
        }
    }

    pub fn seesaw_basis(&self) -> u32 {
        DEFAULT_SEESAW_BASIS
    }
}

impl fmt::Display for CollateralTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
