//! The per-lobby record: roster, readiness, grace timers, server binding.
//!
//! Everything here is plain synchronous state. [`LobbyManager`] owns the
//! lock around each `Lobby` and sequences the async parts (controller
//! calls, bans, notifications).
//!
//! [`LobbyManager`]: crate::LobbyManager

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::trace;
use warden_ledger::LobbyRecord;
use warden_protocol::{LobbyId, PlayerClass, SteamId, Team};
use warden_tick::DeferredTask;
use warden_transport::ConsoleConnector;

use crate::{LobbyError, LobbyState, MatchSettings, ServerController};

/// One seat in a lobby.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Slot {
    pub team: Team,
    pub class: PlayerClass,
    pub player: Option<SteamId>,
    pub ready: bool,
    /// Whether the agent last reported this player as connected to the
    /// game server.
    pub in_game: bool,
}

impl Slot {
    fn empty(team: Team, class: PlayerClass) -> Self {
        Self {
            team,
            class,
            player: None,
            ready: false,
            in_game: false,
        }
    }
}

/// A snapshot of a lobby for callers outside the lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LobbyInfo {
    pub id: LobbyId,
    pub state: LobbyState,
    pub map: String,
    pub slots: Vec<Slot>,
    /// Seats freed by substitution that still wait for a replacement.
    pub vacancies: Vec<usize>,
    pub created_at: DateTime<Utc>,
    /// `true` while a server binding is held (console open or ticker running).
    pub server_bound: bool,
}

impl LobbyInfo {
    pub fn players(&self) -> impl Iterator<Item = &SteamId> {
        self.slots.iter().filter_map(|s| s.player.as_ref())
    }

    pub fn player_count(&self) -> usize {
        self.players().count()
    }
}

pub(crate) struct Lobby<K: ConsoleConnector> {
    pub(crate) id: LobbyId,
    pub(crate) state: LobbyState,
    pub(crate) settings: MatchSettings,
    pub(crate) slots: Vec<Slot>,
    pub(crate) vacancies: Vec<usize>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) password: String,
    pub(crate) controller: ServerController<K>,
    /// At most one outstanding grace timer per player.
    pub(crate) grace_timers: HashMap<SteamId, DeferredTask>,
}

impl<K: ConsoleConnector> Lobby<K> {
    pub(crate) fn new(
        id: LobbyId,
        settings: MatchSettings,
        controller: ServerController<K>,
        password: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        let slots = settings
            .format
            .slots()
            .into_iter()
            .map(|(team, class)| Slot::empty(team, class))
            .collect();
        Self {
            id,
            state: LobbyState::Filling,
            settings,
            slots,
            vacancies: Vec::new(),
            created_at,
            password,
            controller,
            grace_timers: HashMap::new(),
        }
    }

    /// Moves to `next`. Callers check the current state first.
    pub(crate) fn transition(&mut self, next: LobbyState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal lobby transition {} -> {next}",
            self.state
        );
        trace!(lobby_id = %self.id, from = %self.state, to = %next, "lobby state change");
        self.state = next;
    }

    pub(crate) fn slot_of(&self, player: &SteamId) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.player.as_ref() == Some(player))
    }

    /// Seats `player` in `slot`.
    pub(crate) fn seat(&mut self, player: SteamId, slot: usize) -> Result<(), LobbyError> {
        let lobby = self.id;
        let seat = self
            .slots
            .get_mut(slot)
            .ok_or(LobbyError::SlotOutOfRange { lobby, slot })?;
        if seat.player.is_some() {
            return Err(LobbyError::SlotTaken { lobby, slot });
        }
        seat.player = Some(player);
        seat.ready = false;
        seat.in_game = false;
        self.vacancies.retain(|v| *v != slot);
        Ok(())
    }

    /// Frees the player's seat. Returns the slot index, or `None` if the
    /// player wasn't seated.
    pub(crate) fn vacate(&mut self, player: &SteamId) -> Option<usize> {
        let slot = self.slot_of(player)?;
        let seat = &mut self.slots[slot];
        seat.player = None;
        seat.ready = false;
        seat.in_game = false;
        Some(slot)
    }

    pub(crate) fn slot_mut(&mut self, player: &SteamId) -> Option<&mut Slot> {
        let index = self.slot_of(player)?;
        self.slots.get_mut(index)
    }

    pub(crate) fn is_full(&self) -> bool {
        self.slots.iter().all(|s| s.player.is_some())
    }

    /// All seats taken and every seated player ready.
    pub(crate) fn everyone_ready(&self) -> bool {
        self.slots.iter().all(|s| s.player.is_some() && s.ready)
    }

    pub(crate) fn unready_all(&mut self) {
        for seat in &mut self.slots {
            seat.ready = false;
        }
    }

    /// Seated players in slot order.
    pub(crate) fn roster(&self) -> Vec<SteamId> {
        self.slots.iter().filter_map(|s| s.player.clone()).collect()
    }

    /// Cancels and drops every pending grace timer.
    pub(crate) fn cancel_grace_timers(&mut self) -> usize {
        let mut cancelled = 0;
        for (_, timer) in self.grace_timers.drain() {
            if timer.cancel() {
                cancelled += 1;
            }
        }
        cancelled
    }

    pub(crate) fn info(&self) -> LobbyInfo {
        LobbyInfo {
            id: self.id,
            state: self.state,
            map: self.settings.map.clone(),
            slots: self.slots.clone(),
            vacancies: self.vacancies.clone(),
            created_at: self.created_at,
            server_bound: self.controller.is_bound(),
        }
    }

    pub(crate) fn record(&self) -> LobbyRecord {
        LobbyRecord {
            id: self.id,
            server_host: self.settings.server.host.clone(),
            map: self.settings.map.clone(),
            created_at: self.created_at,
            closed_at: None,
            close_reason: None,
            roster: self.roster(),
            logs_id: None,
        }
    }
}
