//! Budget database file
//!
//! Layout: `magic message | network magic | state | sha256d(everything before)`.
//! Every section except the checksum is bincode encoded.

use crate::error::BudgetDbError;
use crate::manager::{BudgetManager, BudgetState};
use std::fs::{self, File};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tessera_core::NetworkParams;
use tessera_crypto::sha256d;
use tracing::{info, warn};

pub const BUDGET_DB_FILE: &str = "budget.dat";
pub const BUDGET_DB_MAGIC: &str = "MasternodeBudget";

const CHECKSUM_LEN: usize = 32;

#[derive(Debug, Clone)]
pub struct BudgetDb {
    path: PathBuf,
    network_magic: [u8; 4],
}

impl BudgetDb {
    pub fn new(path: impl Into<PathBuf>, network_magic: [u8; 4]) -> Self {
        Self {
            path: path.into(),
            network_magic,
        }
    }

    /// `budget.dat` inside `dir` for the given network
    pub fn in_dir(dir: impl AsRef<Path>, params: &NetworkParams) -> Self {
        Self::new(dir.as_ref().join(BUDGET_DB_FILE), params.message_start)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where a write is staged before it replaces [`Self::path`]
    pub fn temp_path(&self) -> PathBuf {
        self.path.with_extension("dat.new")
    }

    pub fn write(&self, state: &BudgetState) -> Result<(), BudgetDbError> {
        let start = Instant::now();

        let mut data = Vec::new();
        bincode::serialize_into(&mut data, BUDGET_DB_MAGIC)
            .and_then(|_| bincode::serialize_into(&mut data, &self.network_magic))
            .and_then(|_| bincode::serialize_into(&mut data, state))
            .map_err(|e| BudgetDbError::Serialize(e.to_string()))?;
        let checksum = sha256d(&data);
        data.extend_from_slice(checksum.as_bytes());

        let tmp = self.temp_path();
        let mut file = File::create(&tmp)?;
        file.write_all(&data)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, &self.path)?;
        #[cfg(unix)]
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            File::open(dir)?.sync_all()?;
        }

        info!(
            path = %self.path.display(),
            bytes = data.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "written budget database"
        );
        Ok(())
    }

    pub fn read(&self) -> Result<BudgetState, BudgetDbError> {
        let start = Instant::now();

        if !self.path.exists() {
            return Err(BudgetDbError::FileMissing(self.path.clone()));
        }
        let bytes = fs::read(&self.path)?;
        if bytes.len() < CHECKSUM_LEN {
            return Err(BudgetDbError::Truncated);
        }

        let (data, stored) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
        if sha256d(data).as_bytes() != stored {
            return Err(BudgetDbError::HashMismatch);
        }

        let mut cursor = Cursor::new(data);
        let magic: String = bincode::deserialize_from(&mut cursor)
            .map_err(|_| BudgetDbError::WrongMagicMessage)?;
        if magic != BUDGET_DB_MAGIC {
            return Err(BudgetDbError::WrongMagicMessage);
        }

        let network_magic: [u8; 4] = bincode::deserialize_from(&mut cursor)
            .map_err(|_| BudgetDbError::WrongNetworkMagic)?;
        if network_magic != self.network_magic {
            return Err(BudgetDbError::WrongNetworkMagic);
        }

        let state: BudgetState = bincode::deserialize_from(&mut cursor)
            .map_err(|e| BudgetDbError::PayloadCorrupt(e.to_string()))?;

        info!(
            path = %self.path.display(),
            proposals = state.proposals.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "loaded budget database"
        );
        Ok(state)
    }
}

/// Load `db` into `manager`. On any failure the manager is left empty.
pub fn load_budgets(manager: &BudgetManager, db: &BudgetDb) -> Result<(), BudgetDbError> {
    match db.read() {
        Ok(state) => {
            manager.restore(state);
            Ok(())
        }
        Err(e) => {
            manager.clear();
            Err(e)
        }
    }
}

/// Persist `manager` to `db`, refusing to overwrite a file that exists but
/// is not a readable budget database for this network.
pub fn dump_budgets(manager: &BudgetManager, db: &BudgetDb) -> Result<(), BudgetDbError> {
    match db.read() {
        Ok(_) => {}
        Err(BudgetDbError::FileMissing(path)) => {
            info!(path = %path.display(), "missing budget file, will try to recreate");
        }
        Err(BudgetDbError::PayloadCorrupt(reason)) => {
            warn!(%reason, "budget file has valid magic but invalid data, will try to recreate");
        }
        Err(e) => {
            warn!(error = %e, "budget file format is unknown or invalid, please fix it manually");
            return Err(e);
        }
    }

    db.write(&manager.snapshot())?;
    info!(summary = %manager, "budget dump finished");
    Ok(())
}

