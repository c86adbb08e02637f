//! Output scripts
//!
//! Only the script shapes governance cares about are modelled: plain
//! address payments, script-hash (multisig) payments and provably
//! unspendable data carriers.

use serde::{Deserialize, Serialize};
use std::fmt;
use tessera_crypto::Hash256;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Script {
    /// No script at all
    #[default]
    Empty,
    /// Pay to a single address
    PayToAddress(String),
    /// Pay to a script hash, used for multisig destinations
    PayToScriptHash([u8; 20]),
    /// `OP_RETURN <data>`
    NullData(Vec<u8>),
    /// Anything else
    NonStandard(Vec<u8>),
}

impl Script {
    /// `OP_RETURN <hash>`, the marker a proposal fee output must carry
    pub fn op_return_hash(hash: &Hash256) -> Self {
        Script::NullData(hash.as_bytes().to_vec())
    }

    pub fn pay_to_address(address: impl Into<String>) -> Self {
        Script::PayToAddress(address.into())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Script::Empty => true,
            Script::PayToAddress(address) => address.is_empty(),
            _ => false,
        }
    }

    pub fn is_normal_payment_script(&self) -> bool {
        matches!(self, Script::PayToAddress(_) | Script::PayToScriptHash(_))
    }

    pub fn is_unspendable(&self) -> bool {
        matches!(self, Script::NullData(_))
    }

    pub fn is_pay_to_script_hash(&self) -> bool {
        matches!(self, Script::PayToScriptHash(_))
    }

    /// Destination address of a plain payment script
    pub fn address(&self) -> Option<&str> {
        match self {
            Script::PayToAddress(address) => Some(address),
            _ => None,
        }
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Script::Empty => write!(f, "<empty>"),
            Script::PayToAddress(address) => write!(f, "{}", address),
            Script::PayToScriptHash(hash) => write!(f, "p2sh:{}", hex::encode(hash)),
            Script::NullData(data) => write!(f, "OP_RETURN {}", hex::encode(data)),
            Script::NonStandard(data) => write!(f, "nonstandard:{}", hex::encode(data)),
        }
    }
}
