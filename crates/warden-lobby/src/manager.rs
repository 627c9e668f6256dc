//! Lobby manager: the registry of lobbies and the lifecycle state machine.
//!
//! [`LobbyManager`] is a cheap, cloneable handle. Clones share the same
//! registry, so the event ingestor, grace timers, and request handlers all
//! see the same lobbies. There is no global state; whoever builds the
//! manager owns it.
//!
//! # Locking
//!
//! - Each lobby sits behind its own `tokio::sync::Mutex`. Every operation
//!   that changes a lobby holds that lock from start to finish, including
//!   across controller calls, so operations on one lobby are serialized
//!   and operations on different lobbies never contend.
//! - The registry (`RwLock`) is only held long enough to clone a lobby's
//!   `Arc`.
//! - The player index (`Mutex`) maps each seated player to their lobby.
//!   It is always taken *after* a lobby lock, never before.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chrono::Utc;
use rand::Rng;
use rand::distr::Alphanumeric;
use tokio::sync::{Mutex, RwLock};
use tokio_util::task::TaskTracker;
use tokio_util::task::task_tracker::TaskTrackerToken;
use tracing::{debug, info, warn};
use warden_ledger::{BanLedger, Store};
use warden_protocol::{CloseReason, LobbyId, SteamId};
use warden_tick::{DeferredTask, FireGuard};
use warden_transport::ConsoleConnector;

use crate::lobby::Lobby;
use crate::{
    ControllerConfig, LobbyConfig, LobbyError, LobbyInfo, LobbyState, MatchSettings, Notification,
    Notifier, ServerController,
};

type SharedLobby<K> = Arc<Mutex<Lobby<K>>>;

struct Inner<K: ConsoleConnector, S: Store, N: Notifier> {
    lobbies: RwLock<HashMap<LobbyId, SharedLobby<K>>>,
    /// Seated player → lobby, for every lobby that hasn't ended.
    players: Mutex<HashMap<SteamId, LobbyId>>,
    connector: Arc<K>,
    ledger: Arc<BanLedger<S>>,
    notifier: N,
    lobby_config: LobbyConfig,
    controller_config: ControllerConfig,
    next_id: AtomicU64,
    /// Counts in-flight operations so shutdown can wait for them.
    tracker: TaskTracker,
    closing: AtomicBool,
}

/// Creates lobbies and runs every lifecycle operation on them.
pub struct LobbyManager<K: ConsoleConnector, S: Store, N: Notifier> {
    inner: Arc<Inner<K, S, N>>,
}

impl<K: ConsoleConnector, S: Store, N: Notifier> Clone for LobbyManager<K, S, N> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K: ConsoleConnector, S: Store, N: Notifier> LobbyManager<K, S, N> {
    pub fn new(
        connector: Arc<K>,
        ledger: Arc<BanLedger<S>>,
        notifier: N,
        lobby_config: LobbyConfig,
        controller_config: ControllerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                lobbies: RwLock::new(HashMap::new()),
                players: Mutex::new(HashMap::new()),
                connector,
                ledger,
                notifier,
                lobby_config,
                controller_config,
                next_id: AtomicU64::new(1),
                tracker: TaskTracker::new(),
                closing: AtomicBool::new(false),
            }),
        }
    }

    pub fn ledger(&self) -> &Arc<BanLedger<S>> {
        &self.inner.ledger
    }

    pub fn notifier(&self) -> &N {
        &self.inner.notifier
    }

    fn notify(&self, notification: Notification) {
        self.inner.notifier.notify(notification);
    }

    /// Registers an in-flight operation, or refuses once shutdown began.
    fn begin(&self) -> Result<TaskTrackerToken, LobbyError> {
        // Take the token before checking the flag, so a drain that starts
        // after the check still waits for this operation.
        let token = self.inner.tracker.token();
        if self.inner.closing.load(Ordering::SeqCst) {
            return Err(LobbyError::ShuttingDown);
        }
        Ok(token)
    }

    async fn lobby(&self, id: LobbyId) -> Result<SharedLobby<K>, LobbyError> {
        self.inner
            .lobbies
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(LobbyError::NotFound(id))
    }

    async fn snapshot(&self) -> Vec<SharedLobby<K>> {
        self.inner.lobbies.read().await.values().cloned().collect()
    }

    /// The player's alias if known, else their SteamID64.
    pub async fn display_name(&self, player: &SteamId) -> String {
        match self.inner.ledger.player(player).await {
            Ok(record) => record.alias.unwrap_or_else(|| player.to_string()),
            Err(_) => player.to_string(),
        }
    }

    // -- Creation -----------------------------------------------------------

    /// Creates a lobby in `Filling` and returns its id.
    ///
    /// With `verify_server_on_create`, connects to the server first and
    /// keeps the connection for the start sequence.
    ///
    /// # Errors
    /// [`LobbyError::RemoteControl`] if the server can't be reached;
    /// [`LobbyError::Store`] if the record can't be saved.
    pub async fn create_lobby(&self, settings: MatchSettings) -> Result<LobbyId, LobbyError> {
        let _op = self.begin()?;
        let id = LobbyId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));

        let mut controller = ServerController::new(
            id,
            settings.clone(),
            Arc::clone(&self.inner.connector),
            self.inner.controller_config.clone(),
        );
        if self.inner.lobby_config.verify_server_on_create {
            if let Err(e) = controller.connect().await {
                warn!(lobby_id = %id, host = %settings.server.host, error = %e, "server check failed");
                return Err(e.into());
            }
        }

        let password = generate_password(self.inner.lobby_config.password_len);
        let lobby = Lobby::new(id, settings, controller, password, Utc::now());

        if let Err(e) = self.inner.ledger.store().save_lobby(lobby.record()).await {
            let mut lobby = lobby;
            lobby.controller.end().await;
            return Err(e.into());
        }

        self.inner
            .lobbies
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(lobby)));

        info!(lobby_id = %id, "lobby created");
        self.notify(Notification::LobbyListChanged);
        Ok(id)
    }

    // -- Roster -------------------------------------------------------------

    /// Seats `player` in `slot`.
    ///
    /// In `Filling`, taking the last free seat moves the lobby to
    /// `ReadyingUp`. In `Live`, only a vacated seat can be taken: the
    /// player is a substitute, goes straight onto the whitelist, and
    /// counts as ready.
    ///
    /// # Errors
    /// - [`LobbyError::NotEligible`]: the player has an active ban
    /// - [`LobbyError::AlreadyInLobby`]: seated in another open lobby
    /// - [`LobbyError::SlotTaken`] / [`LobbyError::SlotOutOfRange`]
    /// - [`LobbyError::InvalidState`]: readying up or ended
    pub async fn add_player(&self, id: LobbyId, player: SteamId, slot: usize) -> Result<(), LobbyError> {
        let _op = self.begin()?;
        self.inner.ledger.check_eligible(&player, Utc::now()).await?;

        let shared = self.lobby(id).await?;
        let mut lobby = shared.lock().await;
        match lobby.state {
            LobbyState::Filling | LobbyState::Live => {}
            state => {
                return Err(LobbyError::InvalidState(format!(
                    "lobby {id} is {state}, not accepting players"
                )));
            }
        }

        {
            let mut index = self.inner.players.lock().await;
            if let Some(current) = index.get(&player) {
                return Err(LobbyError::AlreadyInLobby(player, *current));
            }
            lobby.seat(player.clone(), slot)?;
            index.insert(player.clone(), id);
        }

        if lobby.state == LobbyState::Live {
            if let Some(seat) = lobby.slot_mut(&player) {
                seat.ready = true;
            }
            lobby.controller.allow_player(player.clone());
            info!(lobby_id = %id, player = %player, slot, "substitute joined");
        } else {
            debug!(lobby_id = %id, player = %player, slot, "player joined");
            if lobby.is_full() {
                lobby.transition(LobbyState::ReadyingUp);
                info!(lobby_id = %id, "lobby full, readying up");
            }
        }

        self.notify(Notification::LobbyListChanged);
        Ok(())
    }

    /// Takes `player` out of the lobby.
    ///
    /// Leaving while readying up counts as an unready vote. A live lobby
    /// can only be left through a substitution.
    pub async fn remove_player(&self, id: LobbyId, player: &SteamId) -> Result<(), LobbyError> {
        let _op = self.begin()?;
        let shared = self.lobby(id).await?;
        let mut lobby = shared.lock().await;

        match lobby.state {
            LobbyState::Filling => {
                lobby
                    .vacate(player)
                    .ok_or_else(|| LobbyError::NotInLobby(player.clone(), id))?;
                self.unindex(player, id).await;
                debug!(lobby_id = %id, player = %player, "player left");
                self.notify(Notification::LobbyListChanged);
                Ok(())
            }
            LobbyState::ReadyingUp => self.unready_locked(&mut lobby, player).await,
            state => Err(LobbyError::InvalidState(format!(
                "cannot leave lobby {id} while it is {state}"
            ))),
        }
    }

    async fn unindex(&self, player: &SteamId, id: LobbyId) {
        let mut index = self.inner.players.lock().await;
        if index.get(player) == Some(&id) {
            index.remove(player);
        }
    }

    // -- Readiness ----------------------------------------------------------

    /// Marks `player` ready. The last ready vote starts the match.
    ///
    /// Starting moves the lobby to `Live`, runs the controller's start
    /// sequence while still holding the lobby lock, then announces the
    /// server. If the start sequence fails, the lobby goes back to
    /// `ReadyingUp` (ready flags kept) and the error is returned; another
    /// ready vote retries.
    pub async fn ready_player(&self, id: LobbyId, player: &SteamId) -> Result<(), LobbyError> {
        let _op = self.begin()?;
        let shared = self.lobby(id).await?;
        let mut lobby = shared.lock().await;

        if lobby.state != LobbyState::ReadyingUp {
            return Err(LobbyError::InvalidState(format!(
                "lobby {id} is {}, not ReadyingUp",
                lobby.state
            )));
        }
        let seat = lobby
            .slot_mut(player)
            .ok_or_else(|| LobbyError::NotInLobby(player.clone(), id))?;
        seat.ready = true;
        debug!(lobby_id = %id, player = %player, "player ready");

        if !lobby.everyone_ready() {
            return Ok(());
        }

        lobby.transition(LobbyState::Live);
        let roster = lobby.roster();
        lobby.controller.set_allowed_players(roster);
        let password = lobby.password.clone();

        if let Err(e) = lobby.controller.start(&password).await {
            lobby.transition(LobbyState::ReadyingUp);
            warn!(lobby_id = %id, error = %e, "start failed, back to readying up");
            return Err(e.into());
        }

        info!(lobby_id = %id, "lobby live");
        self.notify(Notification::LobbyStarted {
            lobby: id,
            host: lobby.settings.server.host.clone(),
            password,
        });
        self.notify(Notification::LobbyListChanged);
        Ok(())
    }

    /// Withdraws `player`'s ready vote.
    ///
    /// The player leaves the roster, every other ready flag is cleared, and
    /// the lobby returns to `Filling`.
    pub async fn unready_player(&self, id: LobbyId, player: &SteamId) -> Result<(), LobbyError> {
        let _op = self.begin()?;
        let shared = self.lobby(id).await?;
        let mut lobby = shared.lock().await;
        if lobby.state != LobbyState::ReadyingUp {
            return Err(LobbyError::InvalidState(format!(
                "lobby {id} is {}, not ReadyingUp",
                lobby.state
            )));
        }
        self.unready_locked(&mut lobby, player).await
    }

    async fn unready_locked(&self, lobby: &mut Lobby<K>, player: &SteamId) -> Result<(), LobbyError> {
        let id = lobby.id;
        lobby
            .vacate(player)
            .ok_or_else(|| LobbyError::NotInLobby(player.clone(), id))?;
        self.unindex(player, id).await;
        lobby.unready_all();
        lobby.transition(LobbyState::Filling);
        info!(lobby_id = %id, player = %player, "player unreadied, back to filling");
        self.notify(Notification::LobbyListChanged);
        Ok(())
    }

    // -- Substitution -------------------------------------------------------

    /// Frees `player`'s seat and announces it for a substitute.
    ///
    /// Returns `false` if the player had already left (a no-op). Cancels
    /// the player's grace timer, takes them off the whitelist, and, when
    /// readying up, sends the lobby back to `Filling`.
    pub async fn substitute(&self, id: LobbyId, player: &SteamId) -> Result<bool, LobbyError> {
        let _op = self.begin()?;
        let shared = self.lobby(id).await?;
        let mut lobby = shared.lock().await;
        self.substitute_locked(&mut lobby, player).await
    }

    async fn substitute_locked(&self, lobby: &mut Lobby<K>, player: &SteamId) -> Result<bool, LobbyError> {
        let id = lobby.id;
        if !lobby.state.is_open() {
            return Err(LobbyError::InvalidState(format!("lobby {id} has ended")));
        }
        if let Some(timer) = lobby.grace_timers.remove(player) {
            timer.cancel();
        }
        let Some(slot) = lobby.vacate(player) else {
            debug!(lobby_id = %id, player = %player, "substitute for absent player ignored");
            return Ok(false);
        };

        self.unindex(player, id).await;
        lobby.controller.disallow_player(player);
        if lobby.state == LobbyState::ReadyingUp {
            lobby.unready_all();
            lobby.transition(LobbyState::Filling);
        }
        lobby.vacancies.push(slot);

        let seat = &lobby.slots[slot];
        info!(lobby_id = %id, player = %player, slot, "player substituted");
        self.notify(Notification::SlotVacated {
            lobby: id,
            slot,
            team: seat.team,
            class: seat.class,
        });
        self.notify(Notification::LobbyListChanged);
        Ok(true)
    }

    // -- Closing ------------------------------------------------------------

    /// Ends the lobby and releases its server.
    ///
    /// The notice depends on the flags: a completed match, an operator
    /// close (`graceful`), or a lost connection. Closing an ended lobby is
    /// a no-op, so concurrent closes tear the binding down once.
    ///
    /// # Errors
    /// [`LobbyError::InvalidState`] while the lobby is still filling.
    pub async fn close(&self, id: LobbyId, graceful: bool, match_completed: bool) -> Result<(), LobbyError> {
        self.close_with(id, CloseReason::from_flags(graceful, match_completed), None)
            .await
    }

    /// Closes the lobby as a completed match, recording the logs id.
    pub async fn finish_match(&self, id: LobbyId, logs_id: Option<u64>) -> Result<(), LobbyError> {
        self.close_with(id, CloseReason::MatchCompleted, logs_id).await
    }

    async fn close_with(
        &self,
        id: LobbyId,
        reason: CloseReason,
        logs_id: Option<u64>,
    ) -> Result<(), LobbyError> {
        let _op = self.begin()?;
        let shared = self.lobby(id).await?;
        let mut lobby = shared.lock().await;

        match lobby.state {
            LobbyState::Ended => {
                debug!(lobby_id = %id, "lobby already closed");
                return Ok(());
            }
            LobbyState::Filling => {
                return Err(LobbyError::InvalidState(format!(
                    "lobby {id} is still filling"
                )));
            }
            LobbyState::ReadyingUp | LobbyState::Live => {}
        }

        lobby.controller.end().await;
        lobby.cancel_grace_timers();
        lobby.transition(LobbyState::Ended);

        let mut record = lobby.record();
        {
            let mut index = self.inner.players.lock().await;
            for player in &record.roster {
                if index.get(player) == Some(&id) {
                    index.remove(player);
                }
            }
        }

        record.closed_at = Some(Utc::now());
        record.close_reason = Some(reason);
        record.logs_id = logs_id;
        if let Err(e) = self.inner.ledger.store().save_lobby(record).await {
            warn!(lobby_id = %id, error = %e, "could not save closed lobby");
        }

        info!(lobby_id = %id, reason = ?reason, "lobby closed");
        self.notify(Notification::LobbyClosed { lobby: id, reason });
        self.notify(Notification::LobbyListChanged);
        Ok(())
    }

    // -- In-game presence ---------------------------------------------------

    /// The player is on the game server. Cancels their grace timer.
    pub async fn set_in_game(&self, id: LobbyId, player: &SteamId) -> Result<(), LobbyError> {
        let _op = self.begin()?;
        let shared = self.lobby(id).await?;
        let mut lobby = shared.lock().await;
        if !lobby.state.is_open() {
            return Err(LobbyError::InvalidState(format!("lobby {id} has ended")));
        }
        let seat = lobby
            .slot_mut(player)
            .ok_or_else(|| LobbyError::NotInLobby(player.clone(), id))?;
        seat.in_game = true;

        if let Some(timer) = lobby.grace_timers.remove(player) {
            if timer.cancel() {
                info!(lobby_id = %id, player = %player, "player back within grace period");
            }
        }
        Ok(())
    }

    /// The player left the game server. Arms the grace timer.
    ///
    /// If the player isn't back before the grace period ends, they are
    /// substituted and get a ragequit ban. Only one timer runs per player;
    /// a second disconnect while one is pending changes nothing.
    pub async fn set_not_in_game(&self, id: LobbyId, player: &SteamId) -> Result<(), LobbyError> {
        let _op = self.begin()?;
        let shared = self.lobby(id).await?;
        let mut lobby = shared.lock().await;
        if !lobby.state.is_open() {
            return Err(LobbyError::InvalidState(format!("lobby {id} has ended")));
        }
        let seat = lobby
            .slot_mut(player)
            .ok_or_else(|| LobbyError::NotInLobby(player.clone(), id))?;
        seat.in_game = false;

        if lobby.grace_timers.get(player).is_some_and(DeferredTask::is_pending) {
            debug!(lobby_id = %id, player = %player, "grace timer already running");
            return Ok(());
        }

        let manager = Arc::downgrade(&self.inner);
        let target = player.clone();
        let timer = DeferredTask::spawn(self.inner.lobby_config.grace_period(), move |guard| {
            async move {
                if let Some(manager) = Self::upgrade(&manager) {
                    manager.grace_expired(id, target, guard).await;
                }
            }
        });
        lobby.grace_timers.insert(player.clone(), timer);
        debug!(lobby_id = %id, player = %player, "grace timer armed");
        Ok(())
    }

    fn upgrade(weak: &Weak<Inner<K, S, N>>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    async fn grace_expired(&self, id: LobbyId, player: SteamId, guard: Arc<FireGuard>) {
        let Ok(_op) = self.begin() else {
            return;
        };
        let Ok(shared) = self.lobby(id).await else {
            return;
        };
        let mut lobby = shared.lock().await;
        // A reconnect may have cancelled us while we waited for the lock.
        if !guard.try_fire() {
            return;
        }

        match self.substitute_locked(&mut lobby, &player).await {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                warn!(lobby_id = %id, player = %player, error = %e, "ragequit substitution failed");
                return;
            }
        }
        drop(lobby);

        if let Err(e) = self.inner.ledger.ragequit(&player, id, Utc::now()).await {
            warn!(lobby_id = %id, player = %player, error = %e, "could not record ragequit");
        }
        let name = self.display_name(&player).await;
        let minutes = self.inner.lobby_config.grace_period_secs / 60;
        info!(lobby_id = %id, player = %player, "player did not return, substituted");
        self.notify(Notification::Notice {
            lobby: id,
            text: format!("{name} has been reported for not joining the game in {minutes} minutes"),
        });
    }

    /// Number of grace timers still pending in the lobby.
    pub async fn pending_grace_timers(&self, id: LobbyId) -> Result<usize, LobbyError> {
        let shared = self.lobby(id).await?;
        let lobby = shared.lock().await;
        Ok(lobby.grace_timers.values().filter(|t| t.is_pending()).count())
    }

    // -- Server queries -----------------------------------------------------

    /// Whether the player was on the server at the last verification.
    pub async fn is_player_in_server(&self, id: LobbyId, player: &SteamId) -> Result<bool, LobbyError> {
        let shared = self.lobby(id).await?;
        let lobby = shared.lock().await;
        Ok(lobby.controller.is_player_in_server(player))
    }

    /// Runs a verification pass immediately instead of waiting for the
    /// ticker. Returns how many players were evicted.
    pub async fn verify_now(&self, id: LobbyId) -> Result<usize, LobbyError> {
        let _op = self.begin()?;
        let shared = self.lobby(id).await?;
        let lobby = shared.lock().await;
        Ok(lobby.controller.verify().await?)
    }

    // -- Queries ------------------------------------------------------------

    pub async fn lobby_info(&self, id: LobbyId) -> Result<LobbyInfo, LobbyError> {
        let shared = self.lobby(id).await?;
        let info = shared.lock().await.info();
        Ok(info)
    }

    /// Every lobby still in memory, in id order.
    pub async fn list_lobbies(&self) -> Vec<LobbyInfo> {
        let mut infos = Vec::new();
        for shared in self.snapshot().await {
            infos.push(shared.lock().await.info());
        }
        infos.sort_by_key(|info| info.id);
        infos
    }

    /// The open lobby the player is seated in, if any.
    pub async fn player_lobby(&self, player: &SteamId) -> Option<LobbyId> {
        self.inner.players.lock().await.get(player).copied()
    }

    /// Drops ended lobbies from memory. Their records stay in the store.
    pub async fn prune_ended(&self) -> usize {
        let mut ended = Vec::new();
        for shared in self.snapshot().await {
            let lobby = shared.lock().await;
            if !lobby.state.is_open() {
                ended.push(lobby.id);
            }
        }
        let mut lobbies = self.inner.lobbies.write().await;
        for id in &ended {
            lobbies.remove(id);
        }
        if !ended.is_empty() {
            debug!(count = ended.len(), "pruned ended lobbies");
        }
        ended.len()
    }

    // -- Shutdown -----------------------------------------------------------

    /// Refuses new operations and waits for in-flight ones to finish.
    pub async fn shutdown_drain(&self) {
        self.inner.closing.store(true, Ordering::SeqCst);
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        debug!("lobby operations drained");
    }

    /// Ends every server binding and cancels every grace timer. Returns
    /// how many bindings were released.
    pub async fn release_servers(&self) -> usize {
        let mut released = 0;
        for shared in self.snapshot().await {
            let mut lobby = shared.lock().await;
            lobby.cancel_grace_timers();
            if lobby.controller.end().await {
                released += 1;
            }
        }
        info!(released, "server bindings released");
        released
    }
}

fn generate_password(len: usize) -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
