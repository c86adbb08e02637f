//! `masternode.conf`: the operator's masternode entries
//!
//! One entry per line:
//! `alias ip:port masternode_privkey collateral_txid collateral_output_index`
//!
//! The private key is the hex ed25519 secret of the masternode identity and
//! the collateral output must pay that identity's address. `#` starts a
//! comment line.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use tessera_core::{Hash256, OutPoint};
use tessera_crypto::{CryptoError, KeyPair};
use thiserror::Error;

const HEADER: &str = "# Tessera masternode.conf\n\
# alias ip:port masternode_privkey collateral_txid collateral_output_index\n";

#[derive(Error, Debug)]
pub enum MasternodeConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: {reason}")]
    Syntax { line: usize, reason: String },

    #[error("expected 5 fields, found {0}")]
    FieldCount(usize),

    #[error("invalid alias {0:?}")]
    InvalidAlias(String),

    #[error("invalid service address {0}")]
    InvalidService(String),

    #[error("invalid collateral txid {0}")]
    InvalidTxid(String),

    #[error("invalid collateral output index {0}")]
    InvalidOutputIndex(String),

    #[error("alias {0} is used twice")]
    DuplicateAlias(String),

    #[error("no entry named {0}")]
    UnknownAlias(String),

    #[error("collateral output {0} not found")]
    CollateralNotFound(String),

    #[error(transparent)]
    Collateral(#[from] crate::error::MasternodeError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MasternodeConfigEntry {
    pub alias: String,
    /// Public service address, `ip:port`
    pub ip_port: String,
    /// Hex ed25519 secret of the masternode identity
    pub masternode_privkey: String,
    pub collateral_txid: String,
    pub collateral_output_index: u32,
}

impl MasternodeConfigEntry {
    pub fn validate(&self) -> Result<(), MasternodeConfigError> {
        if self.alias.is_empty() || self.alias.starts_with('#') {
            return Err(MasternodeConfigError::InvalidAlias(self.alias.clone()));
        }
        if self.ip_port.parse::<SocketAddr>().is_err() {
            return Err(MasternodeConfigError::InvalidService(self.ip_port.clone()));
        }
        self.keypair()?;
        self.outpoint()?;
        Ok(())
    }

    /// The collateral output backing this masternode
    pub fn outpoint(&self) -> Result<OutPoint, MasternodeConfigError> {
        let txid = Hash256::from_hex(&self.collateral_txid)
            .ok_or_else(|| MasternodeConfigError::InvalidTxid(self.collateral_txid.clone()))?;
        Ok(OutPoint::new(txid, self.collateral_output_index))
    }

    pub fn keypair(&self) -> Result<KeyPair, MasternodeConfigError> {
        Ok(KeyPair::from_private_key_hex(&self.masternode_privkey)?)
    }
}

impl FromStr for MasternodeConfigEntry {
    type Err = MasternodeConfigError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [alias, ip_port, privkey, txid, index] = fields[..] else {
            return Err(MasternodeConfigError::FieldCount(fields.len()));
        };

        let entry = Self {
            alias: alias.to_string(),
            ip_port: ip_port.to_string(),
            masternode_privkey: privkey.to_string(),
            collateral_txid: txid.to_string(),
            collateral_output_index: index
                .parse()
                .map_err(|_| MasternodeConfigError::InvalidOutputIndex(index.to_string()))?,
        };
        entry.validate()?;
        Ok(entry)
    }
}

impl fmt::Display for MasternodeConfigEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {}",
            self.alias,
            self.ip_port,
            self.masternode_privkey,
            self.collateral_txid,
            self.collateral_output_index
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MasternodeConfig {
    entries: Vec<MasternodeConfigEntry>,
}

impl MasternodeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, MasternodeConfigError> {
        Self::parse(&fs::read_to_string(path)?)
    }

    pub fn parse(content: &str) -> Result<Self, MasternodeConfigError> {
        let mut config = Self::new();
        for (index, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let entry = line
                .parse::<MasternodeConfigEntry>()
                .map_err(|e| MasternodeConfigError::Syntax {
                    line: index + 1,
                    reason: e.to_string(),
                })?;
            config.insert(entry)?;
        }
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), MasternodeConfigError> {
        let mut content = String::from(HEADER);
        for entry in &self.entries {
            content.push_str(&format!("{}\n", entry));
        }
        fs::write(path, content)?;
        Ok(())
    }

    pub fn insert(&mut self, entry: MasternodeConfigEntry) -> Result<(), MasternodeConfigError> {
        entry.validate()?;
        if self.get(&entry.alias).is_some() {
            return Err(MasternodeConfigError::DuplicateAlias(entry.alias));
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn remove(&mut self, alias: &str) -> Result<MasternodeConfigEntry, MasternodeConfigError> {
        match self.entries.iter().position(|e| e.alias == alias) {
            Some(index) => Ok(self.entries.remove(index)),
            None => Err(MasternodeConfigError::UnknownAlias(alias.to_string())),
        }
    }

    pub fn get(&self, alias: &str) -> Option<&MasternodeConfigEntry> {
        self.entries.iter().find(|e| e.alias == alias)
    }

    pub fn entries(&self) -> &[MasternodeConfigEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
