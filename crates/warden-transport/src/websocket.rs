//! The agent event feed over WebSocket, via `tokio-tungstenite`.
//!
//! Each game-server agent opens one socket and pushes event records as
//! text or binary frames. Nothing is sent back except the closing
//! handshake. Event records are small, so the feed caps frame size, and a
//! peer that opens TCP but never finishes the upgrade is dropped after a
//! short deadline instead of stalling every agent queued behind it.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, warn};

use crate::{Connection, ConnectionId, Transport, TransportError};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Bounds applied to every agent socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedLimits {
    /// Largest accepted frame (and reassembled message), in bytes. A
    /// bigger one fails that agent's `recv`.
    pub max_frame_bytes: usize,
    /// How long a new peer gets to complete the WebSocket upgrade.
    pub handshake_timeout: Duration,
}

impl Default for FeedLimits {
    fn default() -> Self {
        Self {
            max_frame_bytes: 64 * 1024,
            handshake_timeout: Duration::from_secs(5),
        }
    }
}

impl FeedLimits {
    fn ws_config(&self) -> WebSocketConfig {
        let mut config = WebSocketConfig::default();
        config.max_frame_size = Some(self.max_frame_bytes);
        config.max_message_size = Some(self.max_frame_bytes);
        config
    }
}

/// A WebSocket [`Transport`] listening for agent connections.
pub struct WebSocketTransport {
    listener: TcpListener,
    limits: FeedLimits,
}

impl WebSocketTransport {
    /// Binds to `addr` with [`FeedLimits::default`].
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        Self::bind_with(addr, FeedLimits::default()).await
    }

    /// Binds to `addr`. Use port 0 to let the OS pick one, then ask
    /// [`local_addr`](Self::local_addr).
    pub async fn bind_with(addr: &str, limits: FeedLimits) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        info!(
            addr,
            max_frame_bytes = limits.max_frame_bytes,
            "agent event feed listening"
        );
        Ok(Self { listener, limits })
    }

    /// The address the listener is actually bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn limits(&self) -> FeedLimits {
        self.limits
    }

    async fn upgrade(&self, stream: TcpStream, peer: SocketAddr) -> Option<WebSocketConnection> {
        let handshake =
            tokio_tungstenite::accept_async_with_config(stream, Some(self.limits.ws_config()));
        let ws = match tokio::time::timeout(self.limits.handshake_timeout, handshake).await {
            Ok(Ok(ws)) => ws,
            Ok(Err(e)) => {
                warn!(%peer, error = %e, "agent handshake failed");
                return None;
            }
            Err(_) => {
                warn!(%peer, after = ?self.limits.handshake_timeout, "agent handshake timed out");
                return None;
            }
        };

        let id = ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed));
        debug!(%id, %peer, "agent connected");
        Some(WebSocketConnection {
            id,
            peer,
            ws: Mutex::new(ws),
        })
    }
}

impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;

    /// Waits for the next agent that completes the upgrade. Peers that
    /// fail or stall the handshake are dropped and never surface here.
    async fn accept(&mut self) -> Result<Self::Connection, TransportError> {
        loop {
            let (stream, peer) = self
                .listener
                .accept()
                .await
                .map_err(TransportError::AcceptFailed)?;
            if let Some(conn) = self.upgrade(stream, peer).await {
                return Ok(conn);
            }
        }
    }
}

/// One agent's WebSocket.
pub struct WebSocketConnection {
    id: ConnectionId,
    peer: SocketAddr,
    ws: Mutex<WebSocketStream<TcpStream>>,
}

impl WebSocketConnection {
    /// The agent's remote address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

impl Connection for WebSocketConnection {
    async fn recv(&self) -> Result<Option<Vec<u8>>, TransportError> {
        let mut ws = self.ws.lock().await;
        loop {
            let message = match ws.next().await {
                None => return Ok(None),
                Some(Ok(message)) => message,
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => return Ok(None),
                Some(Err(e)) => {
                    let kind = match e {
                        WsError::Capacity(_) => io::ErrorKind::InvalidData,
                        _ => io::ErrorKind::ConnectionReset,
                    };
                    debug!(id = %self.id, peer = %self.peer, error = %e, "agent frame rejected");
                    return Err(TransportError::ReceiveFailed(io::Error::new(kind, e)));
                }
            };
            match message {
                Message::Binary(data) => return Ok(Some(data.into())),
                Message::Text(text) => return Ok(Some(text.as_bytes().to_vec())),
                Message::Close(frame) => {
                    debug!(id = %self.id, ?frame, "agent sent close");
                    return Ok(None);
                }
                // tungstenite answers pings on the next read
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }

    /// Sends the closing handshake. Closing an already-closed socket is
    /// not an error.
    async fn close(&self) -> Result<(), TransportError> {
        match self.ws.lock().await.close(None).await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(TransportError::SendFailed(io::Error::new(
                io::ErrorKind::BrokenPipe,
                e,
            ))),
        }
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
