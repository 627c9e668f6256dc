//! # Lobby Warden
//!
//! Supervises competitive game lobbies from the moment a match server is
//! handed over until the match ends.
//!
//! A lobby binds a roster of players to one remote game server. Warden
//! sets that server up when everyone is ready, keeps uninvited players
//! off it for the whole match, gives disconnected players a grace period
//! to come back, and records bans and playtime when things go wrong or
//! the match ends.
//!
//! ## Layers
//!
//! ```text
//! agents ──WebSocket──→ EventFeed ──bounded queue──→ EventIngestor
//!                                                        │
//!                                                        ▼
//!                        LobbyManager ──→ ServerController ──→ remote console
//!                             │
//!                             ▼
//!                        BanLedger ──→ Store
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use warden::prelude::*;
//!
//! warden::telemetry::init("info")?;
//! let config = WardenConfig::from_json(&std::fs::read_to_string("warden.json")?)?;
//! let mut warden = Warden::new(config, Arc::new(MyConnector), Arc::new(MemoryStore::new()), notifier);
//! warden.start()?;
//! warden.bind_feed().await?;
//! // ... serve requests through warden.manager() ...
//! warden.shutdown().await?;
//! ```

mod config;
mod error;
mod feed;
mod ingest;
mod service;
pub mod telemetry;

pub use config::WardenConfig;
pub use error::WardenError;
pub use feed::EventFeed;
pub use ingest::EventIngestor;
pub use service::Warden;
pub use warden_protocol::ErrorKind;

/// Convenient re-exports for hosts embedding Lobby Warden.
///
/// ```rust
/// use warden::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{EventFeed, EventIngestor, Warden, WardenConfig, WardenError};
    pub use warden_ledger::{
        Ban, BanLedger, BanPolicy, BanReason, LobbyRecord, MemoryStore, Player, Store, StoreError,
    };
    pub use warden_lobby::{
        ChannelNotifier, ControllerConfig, League, LobbyConfig, LobbyError, LobbyFormat,
        LobbyInfo, LobbyManager, LobbyState, MatchSettings, Notification, Notifier, ServerInfo,
        Slot,
    };
    pub use warden_protocol::{
        ClassTimes, CloseReason, Codec, ErrorKind, IncomingEvent, JsonCodec, LobbyId, PlayerClass,
        SteamId, Team,
    };
    pub use warden_transport::{
        Connection, ConsoleConnector, ConsoleError, FeedLimits, PlayerRecord, RemoteConsole,
        Transport, WebSocketTransport,
    };
}
