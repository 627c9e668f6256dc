//! Persistent records: players, bans, incidents, and closed lobbies.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warden_protocol::{ClassTimes, CloseReason, LobbyId, SteamId};

// ---------------------------------------------------------------------------
// Ban
// ---------------------------------------------------------------------------

/// Why a ban was issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BanReason {
    /// Left a live match and didn't come back within the grace period.
    Ragequit,
    /// Teammates requested a substitute for the player.
    Reported,
    /// Asked to be substituted twice, from different lobbies, inside the
    /// repeat window.
    RepeatSubstitution,
    /// Issued by hand, with free-form text.
    Operator(String),
}

impl BanReason {
    /// The text shown to the player when the ban blocks them.
    pub fn message(&self) -> &str {
        match self {
            Self::Ragequit => "For ragequiting a lobby in the last 30 minutes",
            Self::Reported => "For getting reported in the last 30 minutes",
            Self::RepeatSubstitution => "For subbing twice in the last 30 minutes",
            Self::Operator(text) => text,
        }
    }
}

impl fmt::Display for BanReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// A time-boxed eligibility ban.
///
/// Immutable once created: a ban is lifted only by its expiry passing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ban {
    player: SteamId,
    reason: BanReason,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl Ban {
    pub fn new(
        player: SteamId,
        reason: BanReason,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            player,
            reason,
            created_at,
            expires_at,
        }
    }

    pub fn player(&self) -> &SteamId {
        &self.player
    }

    pub fn reason(&self) -> &BanReason {
        &self.reason
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// `true` while the expiry lies strictly in the future.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

// ---------------------------------------------------------------------------
// Incidents
// ---------------------------------------------------------------------------

/// The append-only histories kept on a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentKind {
    Substitution,
    Report,
    Ragequit,
}

/// One entry in an incident history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentRecord {
    pub lobby: LobbyId,
    pub at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Player
// ---------------------------------------------------------------------------

/// Everything remembered about one player across lobbies.
///
/// Which lobby the player is currently in is not stored here; the lobby
/// layer derives it from its rosters.
#[derive(Debug, Clone)]
pub struct Player {
    pub steam_id: SteamId,
    pub alias: Option<String>,
    pub bans: Vec<Ban>,
    /// Lifetime playtime per class, summed over every completed match.
    pub stats: ClassTimes,
    pub substitutions: Vec<IncidentRecord>,
    pub reports: Vec<IncidentRecord>,
    pub ragequits: Vec<IncidentRecord>,
}

impl Player {
    pub fn new(steam_id: SteamId) -> Self {
        Self {
            steam_id,
            alias: None,
            bans: Vec::new(),
            stats: ClassTimes::new(),
            substitutions: Vec::new(),
            reports: Vec::new(),
            ragequits: Vec::new(),
        }
    }

    /// The active ban that lasts longest, if any.
    pub fn active_ban(&self, now: DateTime<Utc>) -> Option<&Ban> {
        self.bans
            .iter()
            .filter(|ban| ban.is_active(now))
            .max_by_key(|ban| ban.expires_at)
    }

    /// A player is eligible when no ban expires after `now`.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.active_ban(now).is_none()
    }

    pub fn incidents(&self, kind: IncidentKind) -> &[IncidentRecord] {
        match kind {
            IncidentKind::Substitution => &self.substitutions,
            IncidentKind::Report => &self.reports,
            IncidentKind::Ragequit => &self.ragequits,
        }
    }

    pub(crate) fn incidents_mut(&mut self, kind: IncidentKind) -> &mut Vec<IncidentRecord> {
        match kind {
            IncidentKind::Substitution => &mut self.substitutions,
            IncidentKind::Report => &mut self.reports,
            IncidentKind::Ragequit => &mut self.ragequits,
        }
    }
}

// ---------------------------------------------------------------------------
// LobbyRecord
// ---------------------------------------------------------------------------

/// The persisted summary of a lobby.
///
/// Saved once at creation and again at closure. Kept after the in-memory
/// lobby is pruned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbyRecord {
    pub id: LobbyId,
    pub server_host: String,
    pub map: String,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub close_reason: Option<CloseReason>,
    /// Players seated when the record was written, in slot order.
    pub roster: Vec<SteamId>,
    pub logs_id: Option<u64>,
}
