//! Outbound notifications.
//!
//! The lobby layer decides *when* something should be announced; getting
//! it to users (chat, websocket push, voice server) belongs to whoever
//! implements [`Notifier`].

use std::sync::Arc;

use tokio::sync::mpsc;
use warden_protocol::{CloseReason, LobbyId, PlayerClass, SteamId, Team};

/// Something users should hear about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// A line of text for everyone in a lobby.
    Notice { lobby: LobbyId, text: String },

    /// In-game chat relayed to the lobby chat.
    Chat {
        lobby: LobbyId,
        player: SteamId,
        message: String,
    },

    /// The set of lobbies, or something shown in the list, changed.
    LobbyListChanged,

    /// The server is set up; players can connect.
    LobbyStarted {
        lobby: LobbyId,
        host: String,
        password: String,
    },

    LobbyClosed { lobby: LobbyId, reason: CloseReason },

    /// A seat was freed and needs a substitute.
    SlotVacated {
        lobby: LobbyId,
        slot: usize,
        team: Team,
        class: PlayerClass,
    },

    /// A message for every connected user, not tied to a lobby.
    Maintenance { text: String },
}

/// Delivers notifications. Must not block: called with lobby locks held.
pub trait Notifier: Send + Sync + 'static {
    fn notify(&self, notification: Notification);
}

impl<T: Notifier> Notifier for Arc<T> {
    fn notify(&self, notification: Notification) {
        (**self).notify(notification)
    }
}

/// A [`Notifier`] that pushes into an unbounded channel.
///
/// Sends to a dropped receiver are silently discarded.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            tracing::trace!("notification dropped, no receiver");
        }
    }
}
