//! Signed masternode announcements
//!
//! A broadcast creates a record network-wide or replaces an older one for the
//! same identity. Funding is checked by the registry against its chain view.

use crate::collateral::CollateralTier;
use crate::error::BroadcastError;
use crate::funding::FundingProof;
use crate::ping::Ping;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use tessera_core::{Hash256, NetworkParams};
use tessera_crypto::{hash_serialized, verify_message, KeyPair};

/// How far ahead of local time a broadcast may be signed
pub const BROADCAST_MAX_DRIFT_SECS: i64 = 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasternodeBroadcast {
    pub address: String,
    pub tier: CollateralTier,
    pub funding: Vec<FundingProof>,
    pub service: String,
    pub signature: Vec<u8>,
    pub sig_time: i64,
    pub protocol_version: u32,
    pub last_ping: Option<Ping>,
}

impl MasternodeBroadcast {
    pub fn new(
        address: String,
        tier: CollateralTier,
        funding: Vec<FundingProof>,
        service: String,
        protocol_version: u32,
        sig_time: i64,
    ) -> Self {
        Self {
            address,
            tier,
            funding,
            service,
            signature: Vec::new(),
            sig_time,
            protocol_version,
            last_ping: None,
        }
    }

    pub fn hash(&self) -> Hash256 {
        broadcast_hash(self.sig_time, &self.address)
    }

    pub fn signing_message(&self) -> Vec<u8> {
        let mut message = format!(
            "{}{}{}{}{}",
            self.address, self.service, self.tier, self.sig_time, self.protocol_version
        );
        for proof in &self.funding {
            message.push_str(&proof.outpoint.to_string());
        }
        message.into_bytes()
    }

    pub fn sign(&mut self, key: &KeyPair) -> Result<(), BroadcastError> {
        if key.address() != self.address {
            return Err(BroadcastError::WrongKey(self.address.clone()));
        }
        self.signature = key.sign(&self.signing_message());
        Ok(())
    }

    pub fn verify_signature(&self) -> Result<(), BroadcastError> {
        verify_message(&self.address, &self.signing_message(), &self.signature)
            .map_err(|_| BroadcastError::InvalidSignature)
    }

    /// Stateless checks: time, protocol, service address, embedded ping, signature
    pub fn check(&self, params: &NetworkParams, now: i64) -> Result<(), BroadcastError> {
        let max = now + BROADCAST_MAX_DRIFT_SECS;
        if self.sig_time > max {
            return Err(BroadcastError::FutureTime {
                sig_time: self.sig_time,
                max,
            });
        }

        if self.protocol_version < params.min_protocol_version {
            return Err(BroadcastError::ObsoleteProtocol {
                version: self.protocol_version,
                min: params.min_protocol_version,
            });
        }

        if !is_valid_service_addr(&self.service, params.require_routable_service) {
            return Err(BroadcastError::InvalidService(self.service.clone()));
        }

        if let Some(ping) = &self.last_ping {
            if ping.address != self.address {
                return Err(BroadcastError::ForeignPing(ping.address.clone()));
            }
            ping.verify_signature()?;
        }

        self.verify_signature()
    }
}

/// Broadcast identity from its signing time and address
pub fn broadcast_hash(sig_time: i64, address: &str) -> Hash256 {
    hash_serialized(&(sig_time, address))
}

/// Whether `service` is a usable `ip:port`; with `require_routable` the
/// address must also be publicly reachable.
pub fn is_valid_service_addr(service: &str, require_routable: bool) -> bool {
    let addr: SocketAddr = match service.parse() {
        Ok(addr) => addr,
        Err(_) => return false,
    };
    if addr.port() == 0 {
        return false;
    }
    if !require_routable {
        return true;
    }

    match addr.ip() {
        IpAddr::V4(ip) => {
            !(ip.is_private()
                || ip.is_loopback()
                || ip.is_link_local()
                || ip.is_unspecified()
                || ip.is_broadcast()
                || ip.is_documentation()
                || ip.is_multicast())
        }
        IpAddr::V6(ip) => {
            let first = ip.segments()[0];
            let unique_local = first & 0xfe00 == 0xfc00;
            let link_local = first & 0xffc0 == 0xfe80;
            !(ip.is_loopback() || ip.is_unspecified() || ip.is_multicast() || unique_local || link_local)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signed(key: &KeyPair, service: &str) -> MasternodeBroadcast {
        let mut mnb = MasternodeBroadcast::new(
            key.address(),
            CollateralTier::Silver,
            Vec::new(),
            service.to_string(),
            70915,
            1_000,
        );
        mnb.sign(key).unwrap();
        mnb
    }

    #[test]
    fn test_service_addr_validation() {
        assert!(is_valid_service_addr("8.8.8.8:24100", true));
        assert!(is_valid_service_addr("[2001:4860::1]:24100", true));
        assert!(!is_valid_service_addr("192.168.1.10:24100", true));
        assert!(!is_valid_service_addr("127.0.0.1:24100", true));
        assert!(!is_valid_service_addr("[fd00::1]:24100", true));
        assert!(is_valid_service_addr("127.0.0.1:24100", false));
        assert!(!is_valid_service_addr("8.8.8.8:0", false));
        assert!(!is_valid_service_addr("not-an-address", false));
    }

    #[test]
    fn test_check_valid_broadcast() {
        let key = KeyPair::generate();
        let mnb = signed(&key, "8.8.8.8:24100");
        assert!(mnb.check(&NetworkParams::main(), 1_000).is_ok());
    }

    #[test]
    fn test_check_rejects_tampering() {
        let key = KeyPair::generate();
        let mut mnb = signed(&key, "8.8.8.8:24100");
        mnb.service = "8.8.4.4:24100".to_string();
        assert_eq!(
            mnb.check(&NetworkParams::main(), 1_000),
            Err(BroadcastError::InvalidSignature)
        );
    }

    #[test]
    fn test_check_rejects_future_and_obsolete() {
        let key = KeyPair::generate();
        let mnb = signed(&key, "8.8.8.8:24100");
        assert!(matches!(
            mnb.check(&NetworkParams::main(), 1_000 - BROADCAST_MAX_DRIFT_SECS - 1),
            Err(BroadcastError::FutureTime { .. })
        ));

        let mut params = NetworkParams::main();
        params.min_protocol_version = 70916;
        assert!(matches!(
            mnb.check(&params, 1_000),
            Err(BroadcastError::ObsoleteProtocol { .. })
        ));
    }

    #[test]
    fn test_check_rejects_foreign_ping() {
        let key = KeyPair::generate();
        let other = KeyPair::generate();
        let mut mnb = signed(&key, "8.8.8.8:24100");
        let mut ping = Ping::new(other.address(), Hash256::ZERO, 1_000);
        ping.sign(&other).unwrap();
        mnb.last_ping = Some(ping);
        assert!(matches!(
            mnb.check(&NetworkParams::main(), 1_000),
            Err(BroadcastError::ForeignPing(_))
        ));
    }

    #[test]
    fn test_hash_matches_free_function() {
        let key = KeyPair::generate();
        let mnb = signed(&key, "8.8.8.8:24100");
        assert_eq!(mnb.hash(), broadcast_hash(1_000, &key.address()));
    }
}
