//! Lobby lifecycle management for Lobby Warden.
//!
//! A lobby binds a roster of players to one remote game server and
//! supervises that binding until the match ends.
//!
//! # Key types
//!
//! - [`LobbyManager`]: the registry and the state machine. Every mutating
//!   operation runs under a lock scoped to one lobby.
//! - [`ServerController`]: exclusive remote control of one game server.
//!   Sets it up at start, enforces the whitelist on a ticker, tears it
//!   down at close.
//! - [`LobbyState`]: `Filling → ReadyingUp → Live → Ended`.
//! - [`MatchSettings`]: map, format, league, and server credentials.
//! - [`Notifier`]: where lobby-scoped notices go.

mod config;
mod controller;
mod error;
mod lobby;
mod manager;
mod notify;

pub use config::{
    ControllerConfig, League, LobbyConfig, LobbyFormat, LobbyState, MatchSettings, ServerInfo,
};
pub use controller::ServerController;
pub use error::LobbyError;
pub use lobby::{LobbyInfo, Slot};
pub use manager::LobbyManager;
pub use notify::{ChannelNotifier, Notification, Notifier};
