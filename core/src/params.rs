//! Per-network consensus-adjacent parameters

use crate::constants::{Amount, COIN};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Main,
    Test,
    Regtest,
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Main => write!(f, "main"),
            Self::Test => write!(f, "test"),
            Self::Regtest => write!(f, "regtest"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkParams {
    pub network: Network,
    /// Message-start bytes identifying the network on the wire and on disk
    pub message_start: [u8; 4],
    /// Protocol version this node speaks
    pub protocol_version: u32,
    /// Oldest peer/masternode protocol version still accepted
    pub min_protocol_version: u32,
    /// Blocks per budget payment cycle
    pub budget_cycle_blocks: i64,
    /// Confirmations a proposal fee transaction needs
    pub budget_fee_confirmations: i64,
    /// Seconds a proposal must exist before it can be funded
    pub proposal_establishment_secs: i64,
    /// Treasury budget minted per block
    pub budget_per_block: Amount,
    /// First height with a treasury budget
    pub budget_activation_height: i64,
    /// Masternode service addresses must be publicly routable
    pub require_routable_service: bool,
}

impl NetworkParams {
    pub fn main() -> Self {
        Self {
            network: Network::Main,
            message_start: [0xdf, 0xa0, 0x8d, 0x8f],
            protocol_version: 70915,
            min_protocol_version: 70915,
            budget_cycle_blocks: 43_200,
            budget_fee_confirmations: 6,
            proposal_establishment_secs: 24 * 60 * 60,
            budget_per_block: 50 * COIN,
            budget_activation_height: 0,
            require_routable_service: true,
        }
    }

    pub fn test() -> Self {
        Self {
            network: Network::Test,
            message_start: [0xdf, 0xa0, 0x8d, 0x78],
            budget_cycle_blocks: 144,
            budget_fee_confirmations: 3,
            proposal_establishment_secs: 5 * 60,
            ..Self::main()
        }
    }

    pub fn regtest() -> Self {
        Self {
            network: Network::Regtest,
            message_start: [0xa1, 0xcf, 0x7e, 0xac],
            budget_cycle_blocks: 20,
            budget_fee_confirmations: 1,
            proposal_establishment_secs: 60,
            require_routable_service: false,
            ..Self::main()
        }
    }

    pub fn for_network(network: Network) -> Self {
        match network {
            Network::Main => Self::main(),
            Network::Test => Self::test(),
            Network::Regtest => Self::regtest(),
        }
    }

    pub fn is_main(&self) -> bool {
        self.network == Network::Main
    }

    /// Total amount that may be paid out over the cycle starting at `height`
    pub fn total_budget(&self, height: i64) -> Amount {
        if height < self.budget_activation_height {
            return 0;
        }
        self.budget_per_block * self.budget_cycle_blocks as Amount
    }

    /// First block of the cycle following the one containing `height`
    pub fn next_cycle_start(&self, height: i64) -> i64 {
        height - height.rem_euclid(self.budget_cycle_blocks) + self.budget_cycle_blocks
    }

    /// Whether `height` is the first block of a cycle
    pub fn is_cycle_start(&self, height: i64) -> bool {
        height.rem_euclid(self.budget_cycle_blocks) == 0
    }
}

impl Default for NetworkParams {
    fn default() -> Self {
        Self::main()
    }
}
