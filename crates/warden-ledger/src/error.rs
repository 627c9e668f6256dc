//! Error types for the ledger layer.

use chrono::{DateTime, Utc};
use warden_protocol::SteamId;

/// Failures reported by a [`Store`](crate::Store) implementation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// The backing store could not be reached or refused the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A write conflicted with existing data.
    #[error("store conflict: {0}")]
    Conflict(String),
}

/// Errors from [`BanLedger`](crate::BanLedger) operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The player has an unexpired ban.
    #[error("player {player} is banned until {until}: {reason}")]
    Banned {
        player: SteamId,
        reason: String,
        until: DateTime<Utc>,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}
