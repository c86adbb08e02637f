//! Masternode registry for tracking all masternodes
//!
//! Records are keyed by address. Pings live in a hash-keyed arena
//! (`seen_pings`); a record refers to its current ping by hash only.

use crate::broadcast::{broadcast_hash, MasternodeBroadcast};
use crate::error::{BroadcastError, PingError};
use crate::funding::{verify_funding, MASTERNODE_MIN_CONFIRMATIONS};
use crate::node::{
    MasternodeRecord, MasternodeStatus, MASTERNODE_MIN_MNB_SECONDS, MASTERNODE_MIN_MNP_SECONDS,
};
use crate::ping::Ping;
use crate::score::{compare_scored, score_at};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tessera_core::{
    ChainView, Clock, Hash256, InvKind, Inventory, MasternodeSync, NetworkParams, Relay,
};
use tracing::{debug, info, warn};

/// Grace applied to the minimum ping spacing for relayed pings
pub const PING_SPACING_TOLERANCE_SECS: i64 = 60;

/// Queries and updates the rest of the node needs from the masternode set
pub trait MasternodeRegistry: Send + Sync {
    /// Snapshot of the record for `address`
    fn find(&self, address: &str) -> Option<MasternodeRecord>;

    /// Insert a new record; false if the address is already present
    fn add(&self, record: MasternodeRecord) -> bool;

    /// Merge a newer broadcast into an existing record
    fn update_from_broadcast(&self, mnb: &MasternodeBroadcast) -> bool;

    /// Make `ping` the record's liveness witness and refresh the cached
    /// broadcast's embedded ping
    fn set_last_ping(&self, ping: &Ping) -> bool;

    fn insert_seen_ping(&self, ping: Ping);

    fn insert_seen_broadcast(&self, mnb: MasternodeBroadcast);

    /// Enabled masternodes speaking at least `min_protocol_version`
    fn count_enabled(&self, min_protocol_version: u32) -> usize;

    /// 1-based rank of `address` among enabled masternodes at `height`
    fn rank_of(&self, address: &str, height: i64, min_protocol_version: u32) -> Option<usize>;
}

pub struct MasternodeList {
    masternodes: RwLock<HashMap<String, Arc<Mutex<MasternodeRecord>>>>,
    seen_pings: RwLock<HashMap<Hash256, Ping>>,
    seen_broadcasts: RwLock<HashMap<Hash256, MasternodeBroadcast>>,
    chain: Arc<dyn ChainView>,
    sync: Arc<dyn MasternodeSync>,
    relay: Arc<dyn Relay>,
    clock: Arc<dyn Clock>,
    params: NetworkParams,
}

impl MasternodeList {
    pub fn new(
        params: NetworkParams,
        chain: Arc<dyn ChainView>,
        sync: Arc<dyn MasternodeSync>,
        relay: Arc<dyn Relay>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            masternodes: RwLock::new(HashMap::new()),
            seen_pings: RwLock::new(HashMap::new()),
            seen_broadcasts: RwLock::new(HashMap::new()),
            chain,
            sync,
            relay,
            clock,
            params,
        }
    }

    pub fn count(&self) -> usize {
        self.masternodes.read().len()
    }

    /// Cached ping by hash
    pub fn ping(&self, hash: &Hash256) -> Option<Ping> {
        self.seen_pings.read().get(hash).cloned()
    }

    /// Cached broadcast by hash
    pub fn broadcast(&self, hash: &Hash256) -> Option<MasternodeBroadcast> {
        self.seen_broadcasts.read().get(hash).cloned()
    }

    fn record(&self, address: &str) -> Option<Arc<Mutex<MasternodeRecord>>> {
        self.masternodes.read().get(address).cloned()
    }

    /// Handle a broadcast relayed by a peer.
    ///
    /// Returns `Ok(true)` when it created or updated a record and was relayed.
    pub fn process_broadcast(&self, mnb: MasternodeBroadcast) -> Result<bool, BroadcastError> {
        let hash = mnb.hash();
        if self.seen_broadcasts.read().contains_key(&hash) {
            return Ok(false);
        }
        let now = self.clock.now();
        mnb.check(&self.params, now)?;

        // Only signed broadcasts may claim a dedup slot
        self.seen_broadcasts.write().insert(hash, mnb.clone());
        self.sync.added_masternode_list(&hash);

        if let Some(existing) = self.record(&mnb.address) {
            let mut record = existing.lock();
            if mnb.sig_time <= record.sig_time {
                return Ok(false);
            }
            if record.is_broadcasted_within(MASTERNODE_MIN_MNB_SECONDS, now) {
                return Err(BroadcastError::TooSoon);
            }
            if let Err(e) = self.verify_broadcast_funding(&mnb) {
                if let BroadcastError::Funding(funding) = &e {
                    record.status = funding.status();
                }
                return Err(e);
            }
            record.update_from_broadcast(&mnb);
            record.check(now, self.chain.as_ref(), &self.params, true);
            debug!(address = %mnb.address, "updated masternode from broadcast");
        } else {
            self.verify_broadcast_funding(&mnb)?;
            let mut record = MasternodeRecord::from_broadcast(&mnb);
            record.check(now, self.chain.as_ref(), &self.params, true);
            self.masternodes
                .write()
                .insert(mnb.address.clone(), Arc::new(Mutex::new(record)));
            info!(address = %mnb.address, tier = %mnb.tier, service = %mnb.service, "new masternode");
        }

        if let Some(ping) = &mnb.last_ping {
            self.seen_pings.write().insert(ping.hash(), ping.clone());
        }

        self.relay
            .relay_inventory(Inventory::new(InvKind::MasternodeBroadcast, hash));
        Ok(true)
    }

    fn verify_broadcast_funding(&self, mnb: &MasternodeBroadcast) -> Result<(), BroadcastError> {
        verify_funding(
            &mnb.address,
            mnb.tier,
            &mnb.funding,
            self.chain.as_ref(),
            MASTERNODE_MIN_CONFIRMATIONS,
        )
        .map(|_| ())
        .map_err(|e| {
            warn!(address = %mnb.address, error = %e, "broadcast funding rejected");
            BroadcastError::from(e)
        })
    }

    /// Handle a ping relayed by a peer.
    pub fn process_ping(&self, ping: Ping) -> Result<bool, PingError> {
        let hash = ping.hash();
        if self.seen_pings.read().contains_key(&hash) {
            return Ok(false);
        }
        let now = self.clock.now();
        ping.check(self.chain.as_ref(), now)?;

        let existing = self
            .record(&ping.address)
            .ok_or_else(|| PingError::UnknownMasternode(ping.address.clone()))?;
        {
            let mut record = existing.lock();
            if ping.sig_time < record.last_ping_time {
                return Err(PingError::OutOfOrder {
                    sig_time: ping.sig_time,
                    last: record.last_ping_time,
                });
            }
            if record.is_pinged_within(
                MASTERNODE_MIN_MNP_SECONDS - PING_SPACING_TOLERANCE_SECS,
                ping.sig_time,
            ) {
                return Err(PingError::TooEarly {
                    sig_time: ping.sig_time,
                    last: record.last_ping_time,
                });
            }
            ping.verify_signature()?;
            record.set_last_ping(&ping);
            record.check(now, self.chain.as_ref(), &self.params, true);
        }

        // The hash ignores the signature, so rejected pings must not be cached
        self.seen_pings.write().insert(hash, ping.clone());

        self.refresh_broadcast_ping(&ping);
        self.relay
            .relay_inventory(Inventory::new(InvKind::MasternodePing, hash));
        debug!(address = %ping.address, sig_time = ping.sig_time, "accepted masternode ping");
        Ok(true)
    }

    fn refresh_broadcast_ping(&self, ping: &Ping) {
        let sig_time = match self.record(&ping.address) {
            Some(record) => record.lock().sig_time,
            None => return,
        };
        if let Some(mnb) = self
            .seen_broadcasts
            .write()
            .get_mut(&broadcast_hash(sig_time, &ping.address))
        {
            mnb.last_ping = Some(ping.clone());
        }
    }

    /// Run the status machine over every record
    pub fn check_all(&self) {
        let now = self.clock.now();
        let records: Vec<_> = self.masternodes.read().values().cloned().collect();
        for record in records {
            record.lock().check(now, self.chain.as_ref(), &self.params, false);
        }
    }

    /// Drop records in the `Remove` state along with their cached messages.
    pub fn remove_expired(&self) -> usize {
        self.check_all();

        let removed: Vec<String> = {
            let mut masternodes = self.masternodes.write();
            let doomed: Vec<String> = masternodes
                .iter()
                .filter(|(_, record)| record.lock().status == MasternodeStatus::Remove)
                .map(|(address, _)| address.clone())
                .collect();
            for address in &doomed {
                masternodes.remove(address);
            }
            doomed
        };

        if !removed.is_empty() {
            self.seen_broadcasts
                .write()
                .retain(|_, mnb| !removed.contains(&mnb.address));
            self.seen_pings
                .write()
                .retain(|_, ping| !removed.contains(&ping.address));
            info!(count = removed.len(), "removed expired masternodes");
        }
        removed.len()
    }

    /// Enabled masternodes ordered by score at `height`, paired with their 1-based rank
    pub fn ranked(&self, height: i64, min_protocol_version: u32) -> Vec<(usize, String)> {
        let now = self.clock.now();
        let records: Vec<_> = self.masternodes.read().values().cloned().collect();

        let mut scored = Vec::new();
        for record in records {
            let mut record = record.lock();
            record.check(now, self.chain.as_ref(), &self.params, false);
            if !record.is_enabled() || record.protocol_version < min_protocol_version {
                continue;
            }
            match score_at(&record.address, height, self.chain.as_ref()) {
                Some(score) => scored.push((score, record.address.clone())),
                None => return Vec::new(),
            }
        }

        scored.sort_by(compare_scored);
        scored
            .into_iter()
            .enumerate()
            .map(|(i, (_, address))| (i + 1, address))
            .collect()
    }

    /// Flag a proof-of-service failure observed by an external checker
    pub fn report_pos_error(&self, address: &str) -> bool {
        match self.record(address) {
            Some(record) => {
                record.lock().mark_pos_error();
                warn!(address = %address, "masternode proof-of-service error");
                true
            }
            None => false,
        }
    }

    /// Report a failed scan of `address` at `height`
    pub fn report_scanning_error(&self, address: &str, height: i64) -> bool {
        match self.record(address) {
            Some(record) => {
                let mut record = record.lock();
                record.record_scanning_error(height);
                if record.status == MasternodeStatus::PoseBan {
                    warn!(address = %address, "masternode banned after repeated scanning errors");
                }
                true
            }
            None => false,
        }
    }
}

impl MasternodeRegistry for MasternodeList {
    fn find(&self, address: &str) -> Option<MasternodeRecord> {
        self.record(address).map(|record| record.lock().clone())
    }

    fn add(&self, record: MasternodeRecord) -> bool {
        let mut masternodes = self.masternodes.write();
        if masternodes.contains_key(&record.address) {
            return false;
        }
        debug!(address = %record.address, "adding masternode");
        masternodes.insert(record.address.clone(), Arc::new(Mutex::new(record)));
        true
    }

    fn update_from_broadcast(&self, mnb: &MasternodeBroadcast) -> bool {
        match self.record(&mnb.address) {
            Some(record) => record.lock().update_from_broadcast(mnb),
            None => false,
        }
    }

    fn set_last_ping(&self, ping: &Ping) -> bool {
        match self.record(&ping.address) {
            Some(record) => record.lock().set_last_ping(ping),
            None => return false,
        }
        self.seen_pings.write().insert(ping.hash(), ping.clone());
        self.refresh_broadcast_ping(ping);
        true
    }

    fn insert_seen_ping(&self, ping: Ping) {
        self.seen_pings.write().insert(ping.hash(), ping);
    }

    fn insert_seen_broadcast(&self, mnb: MasternodeBroadcast) {
        self.seen_broadcasts.write().insert(mnb.hash(), mnb);
    }

    fn count_enabled(&self, min_protocol_version: u32) -> usize {
        let now = self.clock.now();
        let records: Vec<_> = self.masternodes.read().values().cloned().collect();
        records
            .into_iter()
            .filter(|record| {
                let mut record = record.lock();
                record.check(now, self.chain.as_ref(), &self.params, false);
                record.is_enabled() && record.protocol_version >= min_protocol_version
            })
            .count()
    }

    fn rank_of(&self, address: &str, height: i64, min_protocol_version: u32) -> Option<usize> {
        self.ranked(height, min_protocol_version)
            .into_iter()
            .find(|(_, a)| a == address)
            .map(|(rank, _)| rank)
    }
}
