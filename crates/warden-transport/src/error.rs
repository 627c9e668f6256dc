use std::time::Duration;

/// Errors that can occur on the agent event-feed transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Binding or accepting connections failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// The transport was shut down.
    #[error("transport shut down")]
    Shutdown,
}

/// Failures talking to a game server's remote console.
///
/// All of these are transient from the lobby's point of view: a start
/// attempt that hits one can be retried, and a verification pass that
/// hits one simply tries again on the next tick.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConsoleError {
    /// Could not open the control channel (bad host, wrong secret, refused).
    #[error("could not connect to {host}: {reason}")]
    Connect { host: String, reason: String },

    /// The server rejected or failed a command.
    #[error("{op} failed: {reason}")]
    Command { op: &'static str, reason: String },

    /// The server did not answer within the per-call bound.
    #[error("{op} timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },

    /// The control channel has already been closed.
    #[error("console is closed")]
    Closed,
}
