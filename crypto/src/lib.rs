//! Tessera Cryptography
//!
//! Signature generation and verification for masternode broadcasts, pings
//! and budget votes, plus the SHA-256d hashing used for object identity.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use thiserror::Error;

pub mod hash;

pub use hash::{hash_serialized, hash_sha256, sha256d, Hash256};

/// Prefix of every Tessera address
pub const ADDRESS_PREFIX: &str = "TSR";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Invalid public key")]
    InvalidPublicKey,

    #[error("Invalid private key")]
    InvalidPrivateKey,

    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

/// Key pair used by operators to sign broadcasts, pings and votes
#[derive(Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

impl KeyPair {
    /// Generate new random keypair
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        let verifying_key = signing_key.verifying_key();

        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Get public key as hex string
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.verifying_key.as_bytes())
    }

    /// Get private key as hex string
    pub fn private_key_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    /// Address derived from this key pair's public key
    pub fn address(&self) -> String {
        format!("{}{}", ADDRESS_PREFIX, self.public_key_hex())
    }

    /// Create keypair from private key hex
    pub fn from_private_key_hex(hex_str: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(hex_str).map_err(|_| CryptoError::InvalidPrivateKey)?;

        let key_bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidPrivateKey)?;

        let signing_key = SigningKey::from_bytes(&key_bytes);
        let verifying_key = signing_key.verifying_key();

        Ok(Self {
            signing_key,
            verifying_key,
        })
    }

    /// Sign message
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing_key.sign(message).to_bytes().to_vec()
    }
}

/// Recover the verifying key embedded in an address
pub fn address_to_public_key(address: &str) -> Result<VerifyingKey, CryptoError> {
    let key_hex = address
        .strip_prefix(ADDRESS_PREFIX)
        .ok_or_else(|| CryptoError::InvalidAddress(address.to_string()))?;

    let key_bytes: [u8; 32] = hex::decode(key_hex)
        .map_err(|_| CryptoError::InvalidAddress(address.to_string()))?
        .try_into()
        .map_err(|_| CryptoError::InvalidAddress(address.to_string()))?;

    VerifyingKey::from_bytes(&key_bytes).map_err(|_| CryptoError::InvalidPublicKey)
}

/// Check that an address is well formed
pub fn is_valid_address(address: &str) -> bool {
    address_to_public_key(address).is_ok()
}

/// Verify that `signature_bytes` was produced over `message` by the key
/// behind `address`
pub fn verify_message(
    address: &str,
    message: &[u8],
    signature_bytes: &[u8],
) -> Result<(), CryptoError> {
    let verifying_key = address_to_public_key(address)?;

    let sig_array: [u8; 64] = signature_bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidSignature)?;

    let signature = Signature::from_bytes(&sig_array);

    verifying_key
        .verify(message, &signature)
        .map_err(|_| CryptoError::InvalidSignature)
}
