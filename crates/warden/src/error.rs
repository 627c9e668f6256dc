//! Unified error type for Lobby Warden.

use warden_ledger::{LedgerError, StoreError};
use warden_lobby::LobbyError;
use warden_protocol::{ErrorKind, ProtocolError};
use warden_transport::{ConsoleError, TransportError};

/// Top-level error that wraps all crate-specific errors.
///
/// Hosts deal with this single type instead of importing errors from each
/// sub-crate. [`kind`](Self::kind) collapses every variant onto the shared
/// [`ErrorKind`] taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum WardenError {
    /// The agent event feed failed (bind, accept, receive).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A remote console call failed.
    #[error(transparent)]
    Console(#[from] ConsoleError),

    /// An inbound event could not be decoded or validated.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// A lobby operation failed.
    #[error(transparent)]
    Lobby(#[from] LobbyError),

    /// The configuration document could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[source] serde_json::Error),

    /// An environment override held a value of the wrong type.
    #[error("invalid value {value:?} for {var}")]
    Env { var: &'static str, value: String },

    /// The logging subscriber could not be installed.
    #[error("telemetry init failed: {0}")]
    Telemetry(String),

    /// A lifecycle method was called out of order.
    #[error("lifecycle violation: {0}")]
    Lifecycle(&'static str),
}

impl WardenError {
    /// The failure category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Lobby(e) => e.kind(),
            Self::Protocol(e) => e.kind(),
            Self::Ledger(LedgerError::Banned { .. }) => ErrorKind::NotEligible,
            Self::Ledger(LedgerError::Store(_))
            | Self::Store(_)
            | Self::Console(_)
            | Self::Transport(_) => ErrorKind::RemoteControlFailure,
            Self::Config(_) | Self::Env { .. } | Self::Telemetry(_) | Self::Lifecycle(_) => {
                ErrorKind::InvalidState
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use warden_protocol::{LobbyId, SteamId};

    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err: WardenError = TransportError::ConnectionClosed("gone".into()).into();
        assert!(matches!(err, WardenError::Transport(_)));
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error_is_malformed_event() {
        let err: WardenError = ProtocolError::UnknownEvent("test".into()).into();
        assert!(matches!(err, WardenError::Protocol(_)));
        assert_eq!(err.kind(), ErrorKind::MalformedEvent);
    }

    #[test]
    fn test_from_lobby_error_keeps_kind() {
        let err: WardenError = LobbyError::NotFound(LobbyId(3)).into();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err: WardenError = LobbyError::InvalidState("ended".into()).into();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn test_from_console_error_is_remote_control_failure() {
        let err: WardenError = ConsoleError::Closed.into();
        assert_eq!(err.kind(), ErrorKind::RemoteControlFailure);
    }

    #[test]
    fn test_from_ledger_ban_is_not_eligible() {
        let err: WardenError = LedgerError::Banned {
            player: SteamId::parse("[U:1:1]").unwrap(),
            reason: "reported".into(),
            until: chrono::Utc::now(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::NotEligible);
    }
}
