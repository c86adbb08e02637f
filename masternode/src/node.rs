//! Masternode record and its status state machine

use crate::broadcast::{is_valid_service_addr, MasternodeBroadcast};
use crate::collateral::CollateralTier;
use crate::funding::{verify_funding, FundingProof, MASTERNODE_MIN_CONFIRMATIONS};
use crate::ping::Ping;
use serde::{Deserialize, Serialize};
use std::fmt;
use tessera_core::{ChainView, Hash256, NetworkParams};

/// Minimum spacing between two accepted pings from the same masternode
pub const MASTERNODE_MIN_MNP_SECONDS: i64 = 10 * 60;
/// Minimum spacing between two accepted broadcasts from the same masternode
pub const MASTERNODE_MIN_MNB_SECONDS: i64 = 5 * 60;
/// How often an active masternode emits a ping
pub const MASTERNODE_PING_SECONDS: i64 = 5 * 60;
pub const MASTERNODE_EXPIRATION_SECONDS: i64 = 120 * 60;
pub const MASTERNODE_REMOVAL_SECONDS: i64 = 130 * 60;
/// Non-forced status checks run at most this often per record
pub const MASTERNODE_CHECK_SECONDS: i64 = 5;
/// Scanning errors at distinct heights before a record is banned
pub const MASTERNODE_SCANNING_ERROR_THRESHOLD: u32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MasternodeStatus {
    SyncInProgress,
    InputTooNew,
    NotCapable,
    InsufficientFunds,
    VinSpent,
    Enabled,
    Expired,
    Remove,
    WatchdogExpired,
    PoseBan,
    PosError,
}

impl MasternodeStatus {
    /// States a record only leaves through a fresh broadcast
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MasternodeStatus::VinSpent | MasternodeStatus::PoseBan | MasternodeStatus::PosError
        )
    }
}

impl fmt::Display for MasternodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SyncInProgress => "SYNC_IN_PROGRESS",
            Self::InputTooNew => "INPUT_TOO_NEW",
            Self::NotCapable => "NOT_CAPABLE",
            Self::InsufficientFunds => "INSUFFICIENT_FUNDS",
            Self::VinSpent => "VIN_SPENT",
            Self::Enabled => "ENABLED",
            Self::Expired => "EXPIRED",
            Self::Remove => "REMOVE",
            Self::WatchdogExpired => "WATCHDOG_EXPIRED",
            Self::PoseBan => "POSE_BAN",
            Self::PosError => "POS_ERROR",
        };
        f.write_str(name)
    }
}

/// One registered operator as seen by this node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasternodeRecord {
    /// Identity; never changes after creation
    pub address: String,
    pub tier: CollateralTier,
    pub funding: Vec<FundingProof>,
    pub service: String,
    pub status: MasternodeStatus,
    /// Signature and signing time of the broadcast this record came from
    pub signature: Vec<u8>,
    pub sig_time: i64,
    /// Key of the current liveness witness in the registry's ping cache
    pub last_ping: Option<Hash256>,
    pub last_ping_time: i64,
    pub protocol_version: u32,
    pub allow_free_tx: bool,
    pub scanning_error_count: u32,
    pub last_scanning_error_height: i64,
    #[serde(skip)]
    last_checked: i64,
}

impl MasternodeRecord {
    pub fn from_broadcast(mnb: &MasternodeBroadcast) -> Self {
        let mut record = Self {
            address: mnb.address.clone(),
            tier: mnb.tier,
            funding: mnb.funding.clone(),
            service: mnb.service.clone(),
            status: MasternodeStatus::SyncInProgress,
            signature: mnb.signature.clone(),
            sig_time: mnb.sig_time,
            last_ping: None,
            last_ping_time: 0,
            protocol_version: mnb.protocol_version,
            allow_free_tx: true,
            scanning_error_count: 0,
            last_scanning_error_height: 0,
            last_checked: 0,
        };
        if let Some(ping) = &mnb.last_ping {
            record.set_last_ping(ping);
        }
        record
    }

    /// Merge a newer broadcast for the same identity.
    ///
    /// Returns false when the broadcast is not newer than the one already held.
    pub fn update_from_broadcast(&mut self, mnb: &MasternodeBroadcast) -> bool {
        if mnb.address != self.address || mnb.sig_time <= self.sig_time {
            return false;
        }

        self.tier = mnb.tier;
        self.funding = mnb.funding.clone();
        self.service = mnb.service.clone();
        self.signature = mnb.signature.clone();
        self.sig_time = mnb.sig_time;
        self.protocol_version = mnb.protocol_version;
        self.status = MasternodeStatus::SyncInProgress;
        self.last_checked = 0;
        if let Some(ping) = &mnb.last_ping {
            if ping.sig_time > self.last_ping_time {
                self.set_last_ping(ping);
            }
        }
        true
    }

    pub fn set_last_ping(&mut self, ping: &Ping) {
        self.last_ping = Some(ping.hash());
        self.last_ping_time = ping.sig_time;
    }

    pub fn is_pinged_within(&self, seconds: i64, now: i64) -> bool {
        self.last_ping_time != 0 && now - self.last_ping_time < seconds
    }

    pub fn is_broadcasted_within(&self, seconds: i64, now: i64) -> bool {
        now - self.sig_time < seconds
    }

    pub fn disable(&mut self) {
        self.sig_time = 0;
        self.last_ping = None;
        self.last_ping_time = 0;
    }

    pub fn is_enabled(&self) -> bool {
        self.status == MasternodeStatus::Enabled
    }

    pub fn ban(&mut self) {
        self.status = MasternodeStatus::PoseBan;
    }

    pub fn mark_pos_error(&mut self) {
        self.status = MasternodeStatus::PosError;
    }

    /// Count a scanning error; repeated errors at distinct heights ban the record
    pub fn record_scanning_error(&mut self, height: i64) {
        if self.scanning_error_count > 0 && height == self.last_scanning_error_height {
            return;
        }
        self.scanning_error_count += 1;
        self.last_scanning_error_height = height;
        if self.scanning_error_count >= MASTERNODE_SCANNING_ERROR_THRESHOLD {
            self.ban();
        }
    }

    /// Re-evaluate the status from liveness, funding and service address.
    pub fn check(
        &mut self,
        now: i64,
        chain: &dyn ChainView,
        params: &NetworkParams,
        force: bool,
    ) -> MasternodeStatus {
        if !force && now - self.last_checked < MASTERNODE_CHECK_SECONDS {
            return self.status;
        }
        self.last_checked = now;

        if self.status.is_terminal() {
            return self.status;
        }

        self.status = if !self.is_pinged_within(MASTERNODE_REMOVAL_SECONDS, now) {
            MasternodeStatus::Remove
        } else if !self.is_pinged_within(MASTERNODE_EXPIRATION_SECONDS, now) {
            MasternodeStatus::Expired
        } else if let Err(e) = verify_funding(
            &self.address,
            self.tier,
            &self.funding,
            chain,
            MASTERNODE_MIN_CONFIRMATIONS,
        ) {
            e.status()
        } else if !is_valid_service_addr(&self.service, params.require_routable_service) {
            MasternodeStatus::NotCapable
        } else {
            MasternodeStatus::Enabled
        };
        self.status
    }

    pub fn status_message(&self) -> String {
        match self.status {
            MasternodeStatus::SyncInProgress => {
                "Sync in progress. Must wait until sync is complete to start Masternode".to_string()
            }
            MasternodeStatus::InputTooNew => format!(
                "Masternode input must have at least {} confirmations",
                MASTERNODE_MIN_CONFIRMATIONS
            ),
            MasternodeStatus::NotCapable => "Masternode has configuration errors.".to_string(),
            MasternodeStatus::InsufficientFunds => {
                "Masternode does not have sufficient funding for the chosen tier.".to_string()
            }
            MasternodeStatus::VinSpent => {
                "Some or all of masternode funding has been spent.".to_string()
            }
            other => other.to_string(),
        }
    }
}
