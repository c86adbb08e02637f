//! Local masternode controller
//!
//! Brings the operator's configured identity onto the network and keeps it
//! alive with pings. Every entry point fails fast; the caller decides when to
//! try again.

use crate::broadcast::MasternodeBroadcast;
use crate::collateral::CollateralTier;
use crate::config::{MasternodeConfigEntry, MasternodeConfigError};
use crate::error::ActivationError;
use crate::funding::{verify_funding, FundingProof, MASTERNODE_MIN_CONFIRMATIONS};
use crate::node::{MasternodeRecord, MasternodeStatus, MASTERNODE_PING_SECONDS};
use crate::ping::Ping;
use crate::registry::MasternodeRegistry;
use std::sync::Arc;
use tessera_core::{ChainView, Clock, InvKind, Inventory, MasternodeSync, NetworkParams, Relay};
use tessera_crypto::KeyPair;
use tracing::{info, warn};

/// Checks that the configured service address accepts inbound connections
pub trait ConnectivityProbe: Send + Sync {
    fn can_connect(&self, service: &str) -> bool;
}

/// The operator wallet, as far as activation cares
pub trait OperatorWallet: Send + Sync {
    fn is_locked(&self) -> bool;
}

/// What the operator configured for this node
#[derive(Debug, Clone)]
pub struct ActiveMasternodeConfig {
    /// Masternode mode switched on
    pub enabled: bool,
    /// External `ip:port`
    pub service: Option<String>,
    pub key: KeyPair,
    pub tier: CollateralTier,
    pub funding: Vec<FundingProof>,
}

impl ActiveMasternodeConfig {
    /// Build from a masternode.conf entry whose collateral pays the
    /// masternode identity; the tier is the highest the collateral covers.
    pub fn from_entry(
        entry: &MasternodeConfigEntry,
        chain: &dyn ChainView,
    ) -> Result<Self, MasternodeConfigError> {
        let key = entry.keypair()?;
        let outpoint = entry.outpoint()?;
        let utxo = chain
            .utxo(&outpoint)
            .ok_or_else(|| MasternodeConfigError::CollateralNotFound(outpoint.to_string()))?;
        let tier = CollateralTier::from_amount(utxo.output.value)?;
        let proof = FundingProof::new_signed(
            &key,
            &key.address(),
            outpoint,
            utxo.output.value,
            key.address(),
        );

        Ok(Self {
            enabled: true,
            service: Some(entry.ip_port.clone()),
            key,
            tier,
            funding: vec![proof],
        })
    }

    pub fn address(&self) -> String {
        self.key.address()
    }
}

pub struct ActiveMasternode {
    config: ActiveMasternodeConfig,
    status: MasternodeStatus,
    not_capable_reason: String,
    params: NetworkParams,
    registry: Arc<dyn MasternodeRegistry>,
    chain: Arc<dyn ChainView>,
    sync: Arc<dyn MasternodeSync>,
    relay: Arc<dyn Relay>,
    clock: Arc<dyn Clock>,
    probe: Arc<dyn ConnectivityProbe>,
    wallet: Arc<dyn OperatorWallet>,
}

impl ActiveMasternode {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: ActiveMasternodeConfig,
        params: NetworkParams,
        registry: Arc<dyn MasternodeRegistry>,
        chain: Arc<dyn ChainView>,
        sync: Arc<dyn MasternodeSync>,
        relay: Arc<dyn Relay>,
        clock: Arc<dyn Clock>,
        probe: Arc<dyn ConnectivityProbe>,
        wallet: Arc<dyn OperatorWallet>,
    ) -> Self {
        Self {
            config,
            status: MasternodeStatus::SyncInProgress,
            not_capable_reason: String::new(),
            params,
            registry,
            chain,
            sync,
            relay,
            clock,
            probe,
            wallet,
        }
    }

    pub fn status(&self) -> MasternodeStatus {
        self.status
    }

    pub fn not_capable_reason(&self) -> &str {
        &self.not_capable_reason
    }

    pub fn address(&self) -> String {
        self.config.address()
    }

    fn not_capable(&mut self, error: ActivationError) -> ActivationError {
        self.status = MasternodeStatus::NotCapable;
        self.not_capable_reason = error.to_string();
        warn!(address = %self.config.address(), reason = %error, "masternode not capable");
        error
    }

    /// Check preconditions and funding, register, then send a first ping.
    pub fn startup(&mut self) -> Result<(), ActivationError> {
        if !self.config.enabled {
            return Err(ActivationError::NotMasternode);
        }

        self.status = MasternodeStatus::NotCapable;
        if self.wallet.is_locked() {
            return Err(self.not_capable(ActivationError::WalletLocked));
        }

        let service = match self.config.service.clone() {
            Some(service) if !service.is_empty() => service,
            _ => return Err(self.not_capable(ActivationError::NoExternalAddress)),
        };

        info!(service = %service, "checking inbound connection");
        if !self.probe.can_connect(&service) {
            return Err(self.not_capable(ActivationError::ConnectFailed(service)));
        }

        if let Err(e) = verify_funding(
            &self.config.address(),
            self.config.tier,
            &self.config.funding,
            self.chain.as_ref(),
            MASTERNODE_MIN_CONFIRMATIONS,
        ) {
            let status = e.status();
            let error = self.not_capable(ActivationError::Funding(e));
            self.status = status;
            return Err(error);
        }

        self.register()?;
        self.status = MasternodeStatus::Enabled;

        if let Err(e) = self.send_ping() {
            warn!(address = %self.config.address(), error = %e, "initial ping failed");
        }
        Ok(())
    }

    /// Sign and announce a broadcast for the local identity.
    pub fn register(&mut self) -> Result<(), ActivationError> {
        if !self.sync.is_blockchain_synced() {
            self.status = MasternodeStatus::SyncInProgress;
            return Err(ActivationError::SyncInProgress);
        }

        let address = self.config.address();
        let service = self
            .config
            .service
            .clone()
            .ok_or(ActivationError::NoExternalAddress)?;
        let now = self.clock.now();

        let mut ping = Ping::anchored(address.clone(), self.chain.as_ref(), now)?;
        ping.sign(&self.config.key)?;
        self.registry.insert_seen_ping(ping.clone());

        let mut mnb = MasternodeBroadcast::new(
            address.clone(),
            self.config.tier,
            self.config.funding.clone(),
            service.clone(),
            self.params.protocol_version,
            now,
        );
        mnb.last_ping = Some(ping);
        mnb.sign(&self.config.key)?;

        let hash = mnb.hash();
        self.registry.insert_seen_broadcast(mnb.clone());
        self.sync.added_masternode_list(&hash);

        info!(address = %address, service = %service, "adding to masternode list");
        if self.registry.find(&address).is_none() {
            self.registry.add(MasternodeRecord::from_broadcast(&mnb));
        } else {
            self.registry.update_from_broadcast(&mnb);
        }

        self.relay
            .relay_inventory(Inventory::new(InvKind::MasternodeBroadcast, hash));
        Ok(())
    }

    /// Sign and relay a liveness ping.
    pub fn send_ping(&mut self) -> Result<(), ActivationError> {
        let address = self.config.address();
        let record = match self.registry.find(&address) {
            Some(record) => record,
            None => return Err(self.not_capable(ActivationError::NotInList(address))),
        };

        let mut ping = Ping::anchored(address.clone(), self.chain.as_ref(), self.clock.now())?;
        if record.is_pinged_within(MASTERNODE_PING_SECONDS, ping.sig_time) {
            return Err(ActivationError::TooEarly);
        }
        ping.sign(&self.config.key)?;

        self.registry.set_last_ping(&ping);
        info!(address = %address, sig_time = ping.sig_time, "relaying masternode ping");
        self.relay
            .relay_inventory(Inventory::new(InvKind::MasternodePing, ping.hash()));
        Ok(())
    }
}
