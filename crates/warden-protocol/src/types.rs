//! Core identity and domain types shared by every Lobby Warden crate.
//!
//! These are the values that cross crate boundaries and travel inside
//! game-server events: who a player is, which lobby an event belongs to,
//! which class a slot plays, and how long a player spent on each class.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Offset between a SteamID64 and the account number of an individual
/// public-universe account.
const STEAM_ID64_BASE: u64 = 76_561_197_960_265_728;

/// A player's stable external identity, normalized to a SteamID64
/// ("community id").
///
/// Game servers report players in several notations (`[U:1:22202]`,
/// `STEAM_0:0:11101`, `76561197960287930`). Everything inside Lobby Warden
/// compares players by the 17-digit SteamID64 form, so all conversions
/// go through [`SteamId::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SteamId(String);

impl SteamId {
    /// Parses any of the supported notations into a SteamID64.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidSteamId`] for bots, empty strings,
    /// and anything that isn't a recognizable individual account.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let raw = raw.trim();
        let invalid = || ProtocolError::InvalidSteamId(raw.to_string());

        // SteamID3: [U:1:22202]
        if let Some(inner) = raw.strip_prefix("[U:").and_then(|s| s.strip_suffix(']')) {
            let (_universe, account) = inner.split_once(':').ok_or_else(invalid)?;
            let account: u64 = account.parse().map_err(|_| invalid())?;
            let id = STEAM_ID64_BASE.checked_add(account).ok_or_else(invalid)?;
            return Ok(Self(id.to_string()));
        }

        // Legacy: STEAM_0:Y:Z, account = Z * 2 + Y
        if let Some(rest) = raw.strip_prefix("STEAM_") {
            let mut parts = rest.split(':');
            let (_universe, y, z) = match (parts.next(), parts.next(), parts.next()) {
                (Some(u), Some(y), Some(z)) => (u, y, z),
                _ => return Err(invalid()),
            };
            let y: u64 = y.parse().map_err(|_| invalid())?;
            let z: u64 = z.parse().map_err(|_| invalid())?;
            if y > 1 {
                return Err(invalid());
            }
            let id = z
                .checked_mul(2)
                .and_then(|account| account.checked_add(y))
                .and_then(|account| STEAM_ID64_BASE.checked_add(account))
                .ok_or_else(invalid)?;
            return Ok(Self(id.to_string()));
        }

        // Already a SteamID64.
        if raw.len() == 17 && raw.bytes().all(|b| b.is_ascii_digit()) {
            let value: u64 = raw.parse().map_err(|_| invalid())?;
            if value < STEAM_ID64_BASE {
                return Err(invalid());
            }
            return Ok(Self(raw.to_string()));
        }

        Err(invalid())
    }

    /// Returns the SteamID64 digits.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for SteamId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for SteamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Returns `true` for the placeholder identity game servers report for bots.
pub fn is_bot_identity(raw: &str) -> bool {
    raw.trim().eq_ignore_ascii_case("BOT")
}

/// A unique identifier for a lobby.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LobbyId(pub u64);

impl fmt::Display for LobbyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Teams and classes
// ---------------------------------------------------------------------------

/// The two sides of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Team {
    Red,
    Blu,
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Red => f.write_str("red"),
            Self::Blu => f.write_str("blu"),
        }
    }
}

/// The nine playable classes. Slots are tagged with one, and match-end
/// events report playtime per class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerClass {
    #[serde(alias = "Scout")]
    Scout,
    #[serde(alias = "Soldier")]
    Soldier,
    #[serde(alias = "Pyro")]
    Pyro,
    #[serde(alias = "Demoman", alias = "demo")]
    Demoman,
    #[serde(alias = "Heavy")]
    Heavy,
    #[serde(alias = "Engineer")]
    Engineer,
    #[serde(alias = "Medic")]
    Medic,
    #[serde(alias = "Sniper")]
    Sniper,
    #[serde(alias = "Spy")]
    Spy,
}

impl PlayerClass {
    /// Every class, in the in-game selection order.
    pub const ALL: [PlayerClass; 9] = [
        Self::Scout,
        Self::Soldier,
        Self::Pyro,
        Self::Demoman,
        Self::Heavy,
        Self::Engineer,
        Self::Medic,
        Self::Sniper,
        Self::Spy,
    ];
}

impl fmt::Display for PlayerClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Scout => "scout",
            Self::Soldier => "soldier",
            Self::Pyro => "pyro",
            Self::Demoman => "demoman",
            Self::Heavy => "heavy",
            Self::Engineer => "engineer",
            Self::Medic => "medic",
            Self::Sniper => "sniper",
            Self::Spy => "spy",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// ClassTimes
// ---------------------------------------------------------------------------

/// Time one player spent on each class during a match.
///
/// Classes that were never played are simply absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassTimes(BTreeMap<PlayerClass, Duration>);

impl ClassTimes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `duration` to the time recorded for `class`.
    pub fn add(&mut self, class: PlayerClass, duration: Duration) {
        *self.0.entry(class).or_default() += duration;
    }

    /// Time spent on `class` (zero if never played).
    pub fn get(&self, class: PlayerClass) -> Duration {
        self.0.get(&class).copied().unwrap_or_default()
    }

    /// Sum over all classes.
    pub fn total(&self) -> Duration {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PlayerClass, Duration)> + '_ {
        self.0.iter().map(|(class, d)| (*class, *d))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Builds from the wire form: class → nanoseconds.
    pub(crate) fn from_nanos(raw: &BTreeMap<PlayerClass, u64>) -> Self {
        let mut times = Self::new();
        for (class, nanos) in raw {
            if *nanos > 0 {
                times.add(*class, Duration::from_nanos(*nanos));
            }
        }
        times
    }
}

impl FromIterator<(PlayerClass, Duration)> for ClassTimes {
    fn from_iter<I: IntoIterator<Item = (PlayerClass, Duration)>>(iter: I) -> Self {
        let mut times = Self::new();
        for (class, d) in iter {
            times.add(class, d);
        }
        times
    }
}

// ---------------------------------------------------------------------------
// CloseReason
// ---------------------------------------------------------------------------

/// Why a lobby was closed. Decides the text of the lobby-closed notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    /// The game server (or its agent) went away mid-match.
    ConnectionLost,
    /// The match ran to completion.
    MatchCompleted,
    /// Closed on purpose by an operator.
    OperatorClosed,
}

impl CloseReason {
    /// Maps the `(graceful, match_completed)` flags of a close request.
    pub fn from_flags(graceful: bool, match_completed: bool) -> Self {
        match (graceful, match_completed) {
            (_, true) => Self::MatchCompleted,
            (true, false) => Self::OperatorClosed,
            (false, false) => Self::ConnectionLost,
        }
    }

    /// The notice shown to the lobby when it closes for this reason.
    pub fn message(&self) -> &'static str {
        match self {
            Self::ConnectionLost => "Lobby Closed (Connection to server lost)",
            Self::MatchCompleted => "Lobby Ended.",
            Self::OperatorClosed => "Lobby Closed (by an admin)",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}
