//! Events emitted by the in-process agent running on each game server.
//!
//! Events arrive in two shapes:
//!
//! - [`EventMessage`]: the raw record as it travels over the feed. Every
//!   field except `name` is optional, because different event kinds carry
//!   different data.
//! - [`IncomingEvent`]: the validated, typed form. Converting with
//!   `IncomingEvent::try_from(msg)` checks that each kind carries the
//!   fields it needs, so handlers never deal with half-filled records.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::{ClassTimes, LobbyId, PlayerClass, ProtocolError, SteamId};

/// Wire names of the event kinds.
pub mod names {
    pub const PLAYER_DISCONNECTED: &str = "playerDisc";
    pub const PLAYER_SUBSTITUTED: &str = "playerSub";
    pub const PLAYER_CONNECTED: &str = "playerConn";
    pub const PLAYER_CHAT: &str = "playerChat";
    pub const SERVER_DISCONNECTED: &str = "discFromServer";
    pub const MATCH_ENDED: &str = "matchEnded";
}

/// The raw event record as sent by a game-server agent.
///
/// ```json
/// { "name": "playerSub", "steamId": "[U:1:22202]", "lobbyId": 4, "self": true }
/// ```
///
/// `classTimes` maps a player identity to per-class playtime in
/// nanoseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMessage {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steam_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lobby_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_times: Option<HashMap<String, BTreeMap<PlayerClass, u64>>>,
    #[serde(default, rename = "self", skip_serializing_if = "Option::is_none")]
    pub self_requested: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A validated game-server event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncomingEvent {
    /// The player joined the game server.
    PlayerConnected { player: SteamId, lobby: LobbyId },

    /// The player left the game server (crash, timeout, or ragequit).
    PlayerDisconnected { player: SteamId, lobby: LobbyId },

    /// A substitute was requested for the player. `self_requested` is
    /// `true` when the player asked to be replaced and `false` when
    /// teammates reported them.
    PlayerSubstituted {
        player: SteamId,
        lobby: LobbyId,
        self_requested: bool,
    },

    /// A chat line typed in-game, relayed to the lobby chat.
    PlayerChat {
        player: SteamId,
        lobby: LobbyId,
        message: String,
    },

    /// The agent lost its connection to the game server.
    ServerDisconnected { lobby: LobbyId },

    /// The match finished.
    MatchEnded {
        lobby: LobbyId,
        logs_id: Option<u64>,
        class_times: HashMap<SteamId, ClassTimes>,
    },
}

impl IncomingEvent {
    /// The lobby this event belongs to.
    pub fn lobby(&self) -> LobbyId {
        match self {
            Self::PlayerConnected { lobby, .. }
            | Self::PlayerDisconnected { lobby, .. }
            | Self::PlayerSubstituted { lobby, .. }
            | Self::PlayerChat { lobby, .. }
            | Self::ServerDisconnected { lobby }
            | Self::MatchEnded { lobby, .. } => *lobby,
        }
    }

    /// The wire name of this event's kind.
    pub fn name(&self) -> &'static str {
        match self {
            Self::PlayerConnected { .. } => names::PLAYER_CONNECTED,
            Self::PlayerDisconnected { .. } => names::PLAYER_DISCONNECTED,
            Self::PlayerSubstituted { .. } => names::PLAYER_SUBSTITUTED,
            Self::PlayerChat { .. } => names::PLAYER_CHAT,
            Self::ServerDisconnected { .. } => names::SERVER_DISCONNECTED,
            Self::MatchEnded { .. } => names::MATCH_ENDED,
        }
    }
}

impl TryFrom<EventMessage> for IncomingEvent {
    type Error = ProtocolError;

    fn try_from(msg: EventMessage) -> Result<Self, Self::Error> {
        let name = msg.name.as_str();
        let missing = |field: &'static str| ProtocolError::MissingField {
            event: msg.name.clone(),
            field,
        };

        let lobby = LobbyId(msg.lobby_id.ok_or_else(|| missing("lobbyId"))?);
        let player = || -> Result<SteamId, ProtocolError> {
            let raw = msg.steam_id.as_deref().ok_or_else(|| missing("steamId"))?;
            SteamId::parse(raw)
        };

        let event = match name {
            names::PLAYER_CONNECTED => Self::PlayerConnected {
                player: player()?,
                lobby,
            },
            names::PLAYER_DISCONNECTED => Self::PlayerDisconnected {
                player: player()?,
                lobby,
            },
            names::PLAYER_SUBSTITUTED => Self::PlayerSubstituted {
                player: player()?,
                lobby,
                self_requested: msg.self_requested.unwrap_or(false),
            },
            names::PLAYER_CHAT => Self::PlayerChat {
                player: player()?,
                lobby,
                message: msg.message.clone().ok_or_else(|| missing("message"))?,
            },
            names::SERVER_DISCONNECTED => Self::ServerDisconnected { lobby },
            names::MATCH_ENDED => {
                let mut class_times = HashMap::new();
                for (raw_id, times) in msg.class_times.iter().flatten() {
                    class_times.insert(SteamId::parse(raw_id)?, ClassTimes::from_nanos(times));
                }
                Self::MatchEnded {
                    lobby,
                    logs_id: msg.logs_id,
                    class_times,
                }
            }
            other => return Err(ProtocolError::UnknownEvent(other.to_string())),
        };

        Ok(event)
    }
}
