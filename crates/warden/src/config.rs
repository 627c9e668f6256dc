//! Host configuration.
//!
//! One [`WardenConfig`] document configures every layer. It is loaded from
//! JSON, and a handful of operational knobs can be overridden from
//! `WARDEN_*` environment variables.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use warden_ledger::BanPolicy;
use warden_lobby::{ControllerConfig, LobbyConfig};
use warden_transport::FeedLimits;

use crate::WardenError;

/// Configuration for a [`Warden`](crate::Warden) host.
///
/// Every field has a default, so `{}` is a valid document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    /// Where the agent event feed listens.
    pub feed_addr: String,

    /// Largest event frame an agent may send, in bytes.
    pub feed_max_frame_bytes: usize,

    /// How long a connecting agent gets to finish the WebSocket upgrade.
    pub feed_handshake_timeout_ms: u64,

    /// Capacity of the bounded queue between the feed and the ingestor.
    /// A full queue makes feed connections wait.
    pub event_queue_capacity: usize,

    /// Broadcast to every user before shutdown.
    pub maintenance_message: String,

    pub lobby: LobbyConfig,
    pub controller: ControllerConfig,
    pub bans: BanPolicy,
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            feed_addr: "127.0.0.1:8081".to_string(),
            feed_max_frame_bytes: 64 * 1024,
            feed_handshake_timeout_ms: 5_000,
            event_queue_capacity: 256,
            maintenance_message: "Backend will be going down for a while for an update, \
                                  reconnect in a few minutes"
                .to_string(),
            lobby: LobbyConfig::default(),
            controller: ControllerConfig::default(),
            bans: BanPolicy::default(),
        }
    }
}

impl WardenConfig {
    /// Parses a JSON document. Missing fields keep their defaults.
    ///
    /// # Errors
    /// [`WardenError::Config`] for malformed JSON or mistyped fields.
    pub fn from_json(json: &str) -> Result<Self, WardenError> {
        serde_json::from_str(json).map_err(WardenError::Config)
    }

    /// Applies overrides from the process environment.
    ///
    /// | variable | field |
    /// |---|---|
    /// | `WARDEN_FEED_ADDR` | `feed_addr` |
    /// | `WARDEN_FEED_MAX_FRAME_BYTES` | `feed_max_frame_bytes` |
    /// | `WARDEN_EVENT_QUEUE_CAPACITY` | `event_queue_capacity` |
    /// | `WARDEN_GRACE_PERIOD_SECS` | `lobby.grace_period_secs` |
    /// | `WARDEN_VERIFY_INTERVAL_SECS` | `controller.verify_interval_secs` |
    /// | `WARDEN_REMOTE_TIMEOUT_SECS` | `controller.remote_timeout_secs` |
    ///
    /// # Errors
    /// [`WardenError::Env`] if a numeric variable doesn't parse.
    pub fn apply_env(&mut self) -> Result<(), WardenError> {
        self.apply_vars(|var| std::env::var(var).ok())
    }

    /// Applies overrides looked up through `lookup`.
    pub fn apply_vars(
        &mut self,
        lookup: impl Fn(&'static str) -> Option<String>,
    ) -> Result<(), WardenError> {
        if let Some(addr) = lookup("WARDEN_FEED_ADDR") {
            self.feed_addr = addr;
        }
        override_parsed(&lookup, "WARDEN_FEED_MAX_FRAME_BYTES", &mut self.feed_max_frame_bytes)?;
        override_parsed(&lookup, "WARDEN_EVENT_QUEUE_CAPACITY", &mut self.event_queue_capacity)?;
        override_parsed(&lookup, "WARDEN_GRACE_PERIOD_SECS", &mut self.lobby.grace_period_secs)?;
        override_parsed(
            &lookup,
            "WARDEN_VERIFY_INTERVAL_SECS",
            &mut self.controller.verify_interval_secs,
        )?;
        override_parsed(
            &lookup,
            "WARDEN_REMOTE_TIMEOUT_SECS",
            &mut self.controller.remote_timeout_secs,
        )?;
        Ok(())
    }

    /// Socket limits for the WebSocket feed. The frame cap is never zero.
    pub fn feed_limits(&self) -> FeedLimits {
        FeedLimits {
            max_frame_bytes: self.feed_max_frame_bytes.max(1),
            handshake_timeout: Duration::from_millis(self.feed_handshake_timeout_ms),
        }
    }

    /// The ingestion queue capacity, never zero.
    pub(crate) fn queue_capacity(&self) -> usize {
        self.event_queue_capacity.max(1)
    }
}

fn override_parsed<T: FromStr>(
    lookup: &impl Fn(&'static str) -> Option<String>,
    var: &'static str,
    field: &mut T,
) -> Result<(), WardenError> {
    let Some(value) = lookup(var) else {
        return Ok(());
    };
    *field = value
        .trim()
        .parse()
        .map_err(|_| WardenError::Env { var, value })?;
    Ok(())
}
