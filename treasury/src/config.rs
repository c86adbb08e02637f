//! Governance settings loaded from TOML
//!
//! ```toml
//! network = "test"
//! data_dir = "/var/lib/tessera"
//! prune_unfunded_after_cycles = 3
//! ```

use crate::db::BudgetDb;
use crate::error::{Result, TreasuryError};
use crate::manager::BudgetPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tessera_core::{Network, NetworkParams};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    pub network: Network,
    /// Directory holding `budget.dat`
    pub data_dir: PathBuf,
    pub prune_unfunded_after_cycles: Option<u32>,
    pub orphan_request_retry_secs: i64,

    // Per-network overrides, mostly for private test networks
    pub budget_cycle_blocks: Option<i64>,
    pub budget_fee_confirmations: Option<i64>,
    pub proposal_establishment_secs: Option<i64>,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        let policy = BudgetPolicy::default();
        Self {
            network: Network::Main,
            data_dir: PathBuf::from("."),
            prune_unfunded_after_cycles: policy.prune_unfunded_after_cycles,
            orphan_request_retry_secs: policy.orphan_request_retry_secs,
            budget_cycle_blocks: None,
            budget_fee_confirmations: None,
            proposal_establishment_secs: None,
        }
    }
}

impl GovernanceConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(s).map_err(|e| TreasuryError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            TreasuryError::ConfigError(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    fn validate(&self) -> Result<()> {
        if matches!(self.budget_cycle_blocks, Some(blocks) if blocks <= 0) {
            return Err(TreasuryError::ConfigError(
                "budget_cycle_blocks must be positive".to_string(),
            ));
        }
        if self.orphan_request_retry_secs < 0 {
            return Err(TreasuryError::ConfigError(
                "orphan_request_retry_secs must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    pub fn network_params(&self) -> NetworkParams {
        let mut params = NetworkParams::for_network(self.network);
        if let Some(blocks) = self.budget_cycle_blocks {
            params.budget_cycle_blocks = blocks;
        }
        if let Some(confirmations) = self.budget_fee_confirmations {
            params.budget_fee_confirmations = confirmations;
        }
        if let Some(secs) = self.proposal_establishment_secs {
            params.proposal_establishment_secs = secs;
        }
        params
    }

    pub fn policy(&self) -> BudgetPolicy {
        BudgetPolicy {
            prune_unfunded_after_cycles: self.prune_unfunded_after_cycles,
            orphan_request_retry_secs: self.orphan_request_retry_secs,
        }
    }

    pub fn budget_db(&self) -> BudgetDb {
        BudgetDb::in_dir(&self.data_dir, &self.network_params())
    }
}
