//! Error types for the lobby layer.

use chrono::{DateTime, Utc};
use warden_ledger::{LedgerError, StoreError};
use warden_protocol::{ErrorKind, LobbyId, SteamId};
use warden_transport::ConsoleError;

/// Errors that can occur during lobby operations.
#[derive(Debug, thiserror::Error)]
pub enum LobbyError {
    /// The lobby does not exist (or was pruned).
    #[error("lobby {0} not found")]
    NotFound(LobbyId),

    /// The player is not seated in this lobby.
    #[error("player {0} not in lobby {1}")]
    NotInLobby(SteamId, LobbyId),

    /// The player already holds a seat in a lobby that hasn't ended.
    #[error("player {0} already in lobby {1}")]
    AlreadyInLobby(SteamId, LobbyId),

    /// Someone else sits in the requested slot.
    #[error("slot {slot} of lobby {lobby} is taken")]
    SlotTaken { lobby: LobbyId, slot: usize },

    /// The slot index is past the end of the roster.
    #[error("lobby {lobby} has no slot {slot}")]
    SlotOutOfRange { lobby: LobbyId, slot: usize },

    /// The lobby is in a state that doesn't allow this operation.
    #[error("invalid lobby state for this operation: {0}")]
    InvalidState(String),

    /// The player has an active ban.
    #[error("player {player} may not join until {until}: {reason}")]
    NotEligible {
        player: SteamId,
        reason: String,
        until: DateTime<Utc>,
    },

    /// A remote console call failed during start or create.
    #[error("remote control failed: {0}")]
    RemoteControl(#[from] ConsoleError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The manager is draining for shutdown and takes no new operations.
    #[error("lobby manager is shutting down")]
    ShuttingDown,
}

impl From<LedgerError> for LobbyError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Banned {
                player,
                reason,
                until,
            } => Self::NotEligible {
                player,
                reason,
                until,
            },
            LedgerError::Store(e) => Self::Store(e),
        }
    }
}

impl LobbyError {
    /// The failure category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) | Self::NotInLobby(..) => ErrorKind::NotFound,
            Self::NotEligible { .. } => ErrorKind::NotEligible,
            Self::RemoteControl(_) => ErrorKind::RemoteControlFailure,
            Self::AlreadyInLobby(..)
            | Self::SlotTaken { .. }
            | Self::SlotOutOfRange { .. }
            | Self::InvalidState(_)
            | Self::ShuttingDown => ErrorKind::InvalidState,
            // The store is an external dependency too.
            Self::Store(_) => ErrorKind::RemoteControlFailure,
        }
    }
}
