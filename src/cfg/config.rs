// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::{
    cfg::enums::{DataCoding, YesNo},
    fpdu::{HEADER_LEN, MAX_FPDU_LEN},
    params::SyncConfig,
    session::SessionTimeouts,
};

/// Versions of the protocol this engine speaks.
pub const SUPPORTED_VERSION: u16 = 2;

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    /// Who we are and who we call.
    pub identity: Identity,
    /// Values proposed during `CONNECT` negotiation.
    pub negotiation: Negotiation,
    /// Engine-level timers; these never travel on the wire.
    #[serde(default)]
    pub timers: Timers,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Identity {
    #[serde(rename = "LocalId")]
    /// Our identifier, `PI_03` on the demander side.
    pub local_id: String,

    #[serde(default, rename = "PartnerId")]
    /// The remote identifier, `PI_04` on the demander side.
    pub partner_id: String,

    #[serde(default, rename = "Password")]
    /// Connection password presented in `PI_05` (and the pre-connect).
    pub password: String,

    #[serde(default = "default_no", rename = "Preconnect")]
    /// Whether to open with the 24-byte EBCDIC pre-connect record.
    pub preconnect: YesNo,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Negotiation {
    #[serde(default = "default_version", rename = "Version")]
    /// `PI_06`.
    pub version: u16,

    #[serde(default = "default_max_entity", rename = "MaxEntitySize")]
    /// `PI_25`: largest FPDU we accept.
    pub max_entity_size: u16,

    #[serde(default, rename = "SyncIntervalKb")]
    /// `PI_07` interval; zero proposes no sync points.
    pub sync_interval_kb: u16,

    #[serde(default = "default_no", rename = "Resync")]
    /// `PI_07` flag byte and `PI_23`: whether `RESYN` is allowed.
    pub resync: YesNo,

    #[serde(default = "default_data_code", rename = "DataCode")]
    /// `PI_16` default for transfers.
    pub data_code: DataCoding,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Timers {
    #[serde(default = "default_idle", rename = "IdleSecs", with = "serde_secs")]
    /// Transport silence tolerated before the session is dead.
    pub idle: Duration,

    #[serde(default, rename = "AckWaitSecs", with = "serde_secs")]
    /// Wait bound for a required acknowledgement; follows `IdleSecs`
    /// when left unset.
    pub ack_wait: Duration,
}

fn default_no() -> YesNo {
    YesNo::No
}

fn default_version() -> u16 {
    SUPPORTED_VERSION
}

fn default_max_entity() -> u16 {
    4096
}

fn default_data_code() -> DataCoding {
    DataCoding::Binary
}

fn default_idle() -> Duration {
    Duration::from_secs(60)
}

impl Default for Timers {
    fn default() -> Self {
        Self { idle: default_idle(), ack_wait: default_idle() }
    }
}

impl Config {
    /// Loads the configuration from YAML, validates it, and returns the
    /// ready-to-use value.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let mut cfg: Config =
            serde_yaml::from_str(&s).context("failed to parse config YAML")?;
        cfg.validate_and_normalize()?;
        Ok(cfg)
    }

    /// Validates invariants and normalizes derived fields.
    pub fn validate_and_normalize(&mut self) -> Result<()> {
        ensure!(
            !self.identity.local_id.is_empty(),
            "LocalId must not be empty"
        );
        ensure!(
            self.identity.local_id.len() <= 24 && self.identity.partner_id.len() <= 24,
            "partner identifiers are bounded at 24 characters"
        );
        if self.identity.preconnect.as_bool() {
            ensure!(
                self.identity.local_id.len() <= 8 && self.identity.password.len() <= 8,
                "the pre-connect record holds at most 8 characters each for id and password"
            );
        }

        ensure!(
            (HEADER_LEN as u16..=MAX_FPDU_LEN as u16)
                .contains(&self.negotiation.max_entity_size),
            "MaxEntitySize must lie within {HEADER_LEN}..={MAX_FPDU_LEN}"
        );
        ensure!(
            self.negotiation.version == SUPPORTED_VERSION,
            "only protocol version {SUPPORTED_VERSION} is implemented"
        );

        ensure!(!self.timers.idle.is_zero(), "IdleSecs must be positive");
        if self.timers.ack_wait.is_zero() {
            self.timers.ack_wait = self.timers.idle;
        }
        Ok(())
    }

    pub fn session_timeouts(&self) -> SessionTimeouts {
        SessionTimeouts { idle: self.timers.idle, ack_wait: self.timers.ack_wait }
    }

    /// The `PI_07` proposal derived from this configuration.
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            resync: self.negotiation.resync.as_bool(),
            interval_kb: self.negotiation.sync_interval_kb,
        }
    }
}

/// Serde helpers for representing `Duration` as a number of seconds.
mod serde_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}
