//! Error types for the protocol layer.
//!
//! Everything that can go wrong between receiving raw bytes from a
//! game-server agent and holding a typed [`IncomingEvent`](crate::IncomingEvent)
//! lands here. Upstream, every one of these variants counts as a malformed event.

/// Errors that can occur while decoding or validating an event.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, wrong field types,
    /// or a truncated message.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The record decoded fine, but its `name` is not an event kind we know.
    #[error("unknown event kind: {0}")]
    UnknownEvent(String),

    /// The event kind requires a field the record did not carry.
    #[error("event {event} is missing field {field}")]
    MissingField { event: String, field: &'static str },

    /// A player identity could not be normalized to a SteamID64.
    #[error("invalid steam id: {0:?}")]
    InvalidSteamId(String),
}

/// The coarse failure categories every Lobby Warden error maps onto.
///
/// Callers decide what to surface and what to log by kind rather than by
/// matching each crate's concrete error enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The operation is not allowed in the lobby's current state.
    InvalidState,
    /// The player is banned, or otherwise may not take part.
    NotEligible,
    /// Talking to the game server failed or timed out.
    RemoteControlFailure,
    /// The lobby or player does not exist.
    NotFound,
    /// An inbound event could not be decoded or validated.
    MalformedEvent,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::InvalidState => "invalid state",
            Self::NotEligible => "not eligible",
            Self::RemoteControlFailure => "remote control failure",
            Self::NotFound => "not found",
            Self::MalformedEvent => "malformed event",
        };
        f.write_str(name)
    }
}

impl ProtocolError {
    /// Every protocol error is a malformed event.
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::MalformedEvent
    }
}
