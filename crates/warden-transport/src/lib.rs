//! Transport and remote-control seams for Lobby Warden.
//!
//! Two kinds of network plumbing live here, both as traits so the core
//! never depends on a concrete wire format:
//!
//! - [`RemoteConsole`] / [`ConsoleConnector`]: the outbound control
//!   channel to a game server (password, config, map, kicks).
//! - [`Transport`] / [`Connection`]: inbound connections from game-server
//!   agents that push event frames. [`WebSocketTransport`] is the default.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket event feed via `tokio-tungstenite`

mod console;
mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use console::{ConsoleConnector, PlayerRecord, RemoteConsole, bounded};
pub use error::{ConsoleError, TransportError};
#[cfg(feature = "websocket")]
pub use websocket::{FeedLimits, WebSocketConnection, WebSocketTransport};

use std::fmt;
use std::future::Future;

/// Opaque identifier for an agent connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "agent-{}", self.0)
    }
}

/// Accepts incoming agent connections.
pub trait Transport: Send + Sync + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;

    /// Waits for and accepts the next incoming connection.
    fn accept(
        &mut self,
    ) -> impl Future<Output = Result<Self::Connection, TransportError>> + Send;
}

/// A single agent connection delivering event frames.
pub trait Connection: Send + Sync + 'static {
    /// Receives the next frame from the agent.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    fn recv(&self) -> impl Future<Output = Result<Option<Vec<u8>>, TransportError>> + Send;

    /// Closes the connection.
    fn close(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_display() {
        assert_eq!(ConnectionId::new(7).to_string(), "agent-7");
    }

    #[test]
    fn test_connection_id_round_trips_inner_value() {
        assert_eq!(ConnectionId::new(42).into_inner(), 42);
        assert_ne!(ConnectionId::new(1), ConnectionId::new(2));
    }
}
