//! Deterministic masternode scoring
//!
//! `score = |H(block || H(address)) - H(block)|` read as a big-endian 256-bit
//! integer, where `H` is SHA-256d. Nobody can steer which masternode wins at a
//! height without controlling that height's block hash.

use std::cmp::Ordering;
use tessera_core::{ChainView, Hash256};
use tessera_crypto::sha256d;

pub fn calculate_score(address: &str, block_hash: &Hash256) -> Hash256 {
    let aux = sha256d(address.as_bytes());

    let plain = sha256d(block_hash.as_bytes());

    let mut mixed = Vec::with_capacity(64);
    mixed.extend_from_slice(block_hash.as_bytes());
    mixed.extend_from_slice(aux.as_bytes());
    let mixed = sha256d(&mixed);

    if mixed > plain {
        Hash256::new(sub_be(mixed.as_bytes(), plain.as_bytes()))
    } else {
        Hash256::new(sub_be(plain.as_bytes(), mixed.as_bytes()))
    }
}

/// Score of `address` against the block at `height`, if that block is known
pub fn score_at(address: &str, height: i64, chain: &dyn ChainView) -> Option<Hash256> {
    chain
        .block_at(height)
        .map(|block| calculate_score(address, &block.hash))
}

/// Highest score first; equal scores fall back to address bytes.
pub fn compare_scored(a: &(Hash256, String), b: &(Hash256, String)) -> Ordering {
    b.0.cmp(&a.0)
        .then_with(|| a.1.as_bytes().cmp(b.1.as_bytes()))
}

/// `a - b` for big-endian 256-bit values with `a >= b`
fn sub_be(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let mut borrow = 0i16;
    for i in (0..32).rev() {
        let mut diff = a[i] as i16 - b[i] as i16 - borrow;
        if diff < 0 {
            diff += 256;
            borrow = 1;
        } else {
            borrow = 0;
        }
        out[i] = diff as u8;
    }
    out
}
