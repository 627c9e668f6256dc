//! Lobby configuration, match settings, and the lifecycle state machine.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use warden_protocol::{PlayerClass, Team};
use warden_tick::TickConfig;

// ---------------------------------------------------------------------------
// LobbyConfig
// ---------------------------------------------------------------------------

/// Settings shared by every lobby a manager creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LobbyConfig {
    /// How long a player who left a live match has to reconnect before
    /// being substituted and banned.
    pub grace_period_secs: u64,

    /// Length of the random server password generated per lobby.
    pub password_len: usize,

    /// Connect to the game server when the lobby is created, so bad
    /// credentials are caught before anyone joins.
    pub verify_server_on_create: bool,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: 300,
            password_len: 8,
            verify_server_on_create: true,
        }
    }
}

impl LobbyConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }
}

// ---------------------------------------------------------------------------
// ControllerConfig
// ---------------------------------------------------------------------------

/// Settings for the remote server controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Seconds between whitelist verification passes. 0 disables the ticker.
    pub verify_interval_secs: u64,

    /// Upper bound for every single remote console call.
    pub remote_timeout_secs: u64,

    /// Random delay (up to this many ms) before a binding's first pass.
    pub verify_jitter_ms: u64,

    /// Shown to players evicted because they are not in the lobby.
    pub not_allowed_message: String,

    /// Shown to players cleared off the server while it is set up.
    pub setup_message: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            verify_interval_secs: 10,
            remote_timeout_secs: 5,
            verify_jitter_ms: 500,
            not_allowed_message: "You're not in this lobby...".to_string(),
            setup_message: "Setting up lobby...".to_string(),
        }
    }
}

impl ControllerConfig {
    pub fn verify_interval(&self) -> Duration {
        Duration::from_secs(self.verify_interval_secs)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }

    /// The scheduler settings for one verification ticker.
    pub fn tick_config(&self) -> TickConfig {
        TickConfig {
            initial_jitter: Duration::from_millis(self.verify_jitter_ms),
            ..TickConfig::with_period(self.verify_interval())
        }
    }
}

// ---------------------------------------------------------------------------
// LobbyState
// ---------------------------------------------------------------------------

/// The lifecycle state of a lobby.
///
/// ```text
///            fill last slot          everyone ready
///   Filling ───────────────→ ReadyingUp ───────────→ Live ───→ Ended
///      ↑                        │   ↑                  │
///      └── unready / leave / sub┘   └── start failed ──┘
/// ```
///
/// `ReadyingUp` may also go straight to `Ended` on close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LobbyState {
    Filling,
    ReadyingUp,
    Live,
    Ended,
}

impl LobbyState {
    /// `true` until the lobby has ended.
    pub fn is_open(&self) -> bool {
        !matches!(self, Self::Ended)
    }

    /// `true` if `target` is a legal next state.
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Filling, Self::ReadyingUp)
                | (Self::ReadyingUp, Self::Filling)
                | (Self::ReadyingUp, Self::Live)
                | (Self::ReadyingUp, Self::Ended)
                | (Self::Live, Self::ReadyingUp)
                | (Self::Live, Self::Ended)
        )
    }
}

impl fmt::Display for LobbyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Filling => write!(f, "Filling"),
            Self::ReadyingUp => write!(f, "ReadyingUp"),
            Self::Live => write!(f, "Live"),
            Self::Ended => write!(f, "Ended"),
        }
    }
}

// ---------------------------------------------------------------------------
// Match settings
// ---------------------------------------------------------------------------

/// Team size and class layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LobbyFormat {
    /// 6v6: two scouts, two soldiers, demoman, medic.
    Sixes,
    /// 9v9: one of each class.
    Highlander,
    /// 4v4: scout, soldier, demoman, medic.
    Fours,
    /// 2v2: soldier and medic.
    Ultiduo,
    /// 2v2: two soldiers.
    Bball,
    /// 1v1 scouts, for testing.
    Debug,
}

impl LobbyFormat {
    /// Classes of one team, in slot order.
    pub fn team_classes(&self) -> &'static [PlayerClass] {
        use PlayerClass::*;
        match self {
            Self::Sixes => &[Scout, Scout, Soldier, Soldier, Demoman, Medic],
            Self::Highlander => &PlayerClass::ALL,
            Self::Fours => &[Scout, Soldier, Demoman, Medic],
            Self::Ultiduo => &[Soldier, Medic],
            Self::Bball => &[Soldier, Soldier],
            Self::Debug => &[Scout],
        }
    }

    /// Every slot of the lobby: red team first, then blu.
    pub fn slots(&self) -> Vec<(Team, PlayerClass)> {
        let classes = self.team_classes();
        [Team::Red, Team::Blu]
            .into_iter()
            .flat_map(|team| classes.iter().map(move |class| (team, *class)))
            .collect()
    }

    pub fn slot_count(&self) -> usize {
        self.team_classes().len() * 2
    }

    /// The token used in server config names.
    pub fn config_token(&self) -> &'static str {
        match self {
            Self::Sixes => "6v6",
            Self::Highlander => "9v9",
            Self::Fours => "4v4",
            Self::Ultiduo => "ultiduo",
            Self::Bball => "bball",
            Self::Debug => "debug",
        }
    }
}

/// The competitive ruleset whose server configs are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum League {
    Etf2l,
    Ugc,
    Esea,
    Ozfortress,
    Asiafortress,
    Bballtf,
}

impl fmt::Display for League {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Etf2l => "etf2l",
            Self::Ugc => "ugc",
            Self::Esea => "esea",
            Self::Ozfortress => "ozfortress",
            Self::Asiafortress => "asiafortress",
            Self::Bballtf => "bballtf",
        };
        f.write_str(name)
    }
}

/// Where the game server lives and how to control it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub host: String,
    pub rcon_password: String,
}

impl fmt::Debug for ServerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerInfo")
            .field("host", &self.host)
            .field("rcon_password", &"<redacted>")
            .finish()
    }
}

/// Everything needed to set up one match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSettings {
    pub map: String,
    pub format: LobbyFormat,
    pub league: League,
    pub server: ServerInfo,
}

impl MatchSettings {
    /// The game mode implied by the map name.
    pub fn game_mode(&self) -> &'static str {
        let map = self.map.to_ascii_lowercase();
        const STOPWATCH_CP: [&str; 3] = ["cp_gravelpit", "cp_dustbowl", "cp_steel"];

        if STOPWATCH_CP.iter().any(|m| map.starts_with(m)) || map.starts_with("pl_") {
            "stopwatch"
        } else if map.starts_with("cp_") {
            "5cp"
        } else if map.starts_with("koth_") {
            "koth"
        } else if map.starts_with("ctf_") {
            "ctf"
        } else if map.starts_with("ultiduo_") {
            "ultiduo"
        } else if map.starts_with("ba_") || map.starts_with("bball") {
            "bball"
        } else {
            "default"
        }
    }

    /// Name of the server config for this league, format, and mode,
    /// e.g. `etf2l_6v6_5cp`.
    pub fn config_name(&self) -> String {
        format!("{}_{}_{}", self.league, self.format.config_token(), self.game_mode())
    }

    /// The config block sent to the server before the map change.
    pub fn exec_command(&self) -> String {
        format!("exec {}", self.config_name())
    }
}
