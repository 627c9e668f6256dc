//! Remote control of one game server for the lifetime of a lobby.
//!
//! A [`ServerController`] is created with the lobby and stays idle until
//! the lobby goes live. [`start`](ServerController::start) then takes the
//! server over:
//!
//! ```text
//! connect (or reuse) → password → kick everyone → exec config → change map → ticker
//! ```
//!
//! From then on a verification ticker lists the connected players every
//! `verify_interval_secs` and evicts anyone not on the whitelist.
//! [`end`](ServerController::end) stops the ticker and closes the console.
//!
//! # Locking
//!
//! The controller lives inside the lobby record, so every `&mut self`
//! method runs under the lobby lock. The ticker runs on its own task and
//! never takes the lobby lock; it reads the whitelist through a small
//! internal mutex that is only ever written by `&mut self` methods. Each
//! pass therefore sees a whitelist exactly as some lobby operation left it.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use warden_protocol::{LobbyId, SteamId, is_bot_identity};
use warden_tick::TickScheduler;
use warden_transport::{ConsoleConnector, ConsoleError, PlayerRecord, RemoteConsole, bounded};

use crate::{ControllerConfig, MatchSettings};

#[derive(Default)]
struct Shared {
    whitelist: HashSet<SteamId>,
    /// Player list from the most recent successful listing.
    last_players: Vec<PlayerRecord>,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

struct VerifyTicker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Exclusive remote control of the game server bound to one lobby.
pub struct ServerController<K: ConsoleConnector> {
    lobby: LobbyId,
    settings: MatchSettings,
    connector: Arc<K>,
    config: ControllerConfig,
    console: Option<Arc<K::Console>>,
    shared: Arc<Mutex<Shared>>,
    ticker: Option<VerifyTicker>,
}

impl<K: ConsoleConnector> ServerController<K> {
    pub fn new(
        lobby: LobbyId,
        settings: MatchSettings,
        connector: Arc<K>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            lobby,
            settings,
            connector,
            config,
            console: None,
            shared: Arc::new(Mutex::new(Shared::default())),
            ticker: None,
        }
    }

    /// `true` while a console is open or the ticker is running.
    pub fn is_bound(&self) -> bool {
        self.console.is_some() || self.ticker.is_some()
    }

    pub fn is_connected(&self) -> bool {
        self.console.is_some()
    }

    pub fn is_verifying(&self) -> bool {
        self.ticker.is_some()
    }

    /// Opens the console if it isn't open yet, and returns it.
    ///
    /// Called at lobby creation to validate the credentials; [`start`]
    /// reuses the connection.
    ///
    /// [`start`]: Self::start
    pub async fn connect(&mut self) -> Result<Arc<K::Console>, ConsoleError> {
        if let Some(console) = &self.console {
            return Ok(Arc::clone(console));
        }
        let server = &self.settings.server;
        debug!(lobby_id = %self.lobby, host = %server.host, "connecting to game server");
        let console = bounded(
            self.config.remote_timeout(),
            "connect",
            self.connector.connect(&server.host, &server.rcon_password),
        )
        .await?;

        let console = Arc::new(console);
        self.console = Some(Arc::clone(&console));
        Ok(console)
    }

    /// Takes the server over for the match and starts verification.
    ///
    /// Any failing step aborts the sequence. Steps already done are not
    /// undone; calling `start` again re-runs the whole sequence on the
    /// same connection.
    pub async fn start(&mut self, password: &str) -> Result<(), ConsoleError> {
        let limit = self.config.remote_timeout();
        let console = self.connect().await?;

        bounded(limit, "change_password", console.change_password(password)).await?;

        debug!(lobby_id = %self.lobby, "clearing server before setup");
        self.kick_all(console.as_ref()).await?;

        let exec = self.settings.exec_command();
        debug!(lobby_id = %self.lobby, config = %exec, "executing server config");
        bounded(limit, "exec_config", console.exec_config(&exec)).await?;

        bounded(limit, "change_map", console.change_map(&self.settings.map)).await?;

        if self.ticker.is_none() {
            self.ticker = Some(self.spawn_ticker(console));
        }
        info!(lobby_id = %self.lobby, map = %self.settings.map, "game server set up");
        Ok(())
    }

    /// Kicks everyone, bots included. Stops at the first failed kick.
    async fn kick_all(&self, console: &K::Console) -> Result<(), ConsoleError> {
        let limit = self.config.remote_timeout();
        let players = bounded(limit, "list_players", console.list_players()).await?;
        for player in &players {
            bounded(limit, "kick", console.kick(player, &self.config.setup_message)).await?;
        }
        Ok(())
    }

    /// Runs one verification pass right now. Returns how many players
    /// were evicted.
    ///
    /// # Errors
    /// [`ConsoleError::Closed`] if no console is open; otherwise whatever
    /// listing the players failed with. Individual kick failures are only
    /// logged.
    pub async fn verify(&self) -> Result<usize, ConsoleError> {
        let console = self.console.as_ref().ok_or(ConsoleError::Closed)?;
        verify_pass(self.lobby, console.as_ref(), &self.shared, &self.config, None).await
    }

    fn spawn_ticker(&self, console: Arc<K::Console>) -> VerifyTicker {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let shared = Arc::clone(&self.shared);
        let config = self.config.clone();
        let lobby = self.lobby;

        let handle = tokio::spawn(async move {
            let mut scheduler = TickScheduler::new(config.tick_config());
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = scheduler.wait_for_tick() => {}
                }
                match verify_pass(lobby, console.as_ref(), &shared, &config, Some(&token)).await {
                    Ok(kicked) => debug!(lobby_id = %lobby, kicked, "verification pass done"),
                    Err(e) => warn!(lobby_id = %lobby, error = %e, "verification pass failed, retrying next tick"),
                }
                scheduler.record_tick_end();
            }
            debug!(lobby_id = %lobby, "verification ticker stopped");
        });

        VerifyTicker { cancel, handle }
    }

    /// Stops the ticker and closes the console.
    ///
    /// Safe to call in any state and any number of times; only the first
    /// call on a bound controller does anything. Returns `true` if this
    /// call released the binding.
    pub async fn end(&mut self) -> bool {
        let ticker = self.ticker.take();
        let console = self.console.take();
        if ticker.is_none() && console.is_none() {
            return false;
        }
        let limit = self.config.remote_timeout();

        if let Some(VerifyTicker { cancel, mut handle }) = ticker {
            cancel.cancel();
            // A pass in flight finishes its current call, then exits.
            if tokio::time::timeout(limit, &mut handle).await.is_err() {
                handle.abort();
            }
        }

        if let Some(console) = console {
            let closed = bounded(limit, "close", async {
                console.close().await;
                Ok(())
            })
            .await;
            if let Err(e) = closed {
                warn!(lobby_id = %self.lobby, error = %e, "console close did not finish");
            }
        }

        info!(lobby_id = %self.lobby, "server binding released");
        true
    }

    // -- Whitelist ----------------------------------------------------------

    /// Lets `player` stay on the server from the next pass on.
    pub fn allow_player(&mut self, player: SteamId) {
        lock(&self.shared).whitelist.insert(player);
    }

    pub fn disallow_player(&mut self, player: &SteamId) {
        lock(&self.shared).whitelist.remove(player);
    }

    /// Replaces the whole whitelist.
    pub fn set_allowed_players(&mut self, players: impl IntoIterator<Item = SteamId>) {
        lock(&self.shared).whitelist = players.into_iter().collect();
    }

    pub fn is_player_allowed(&self, player: &SteamId) -> bool {
        lock(&self.shared).whitelist.contains(player)
    }

    /// The whitelist, sorted.
    pub fn allowed_players(&self) -> Vec<SteamId> {
        let mut players: Vec<_> = lock(&self.shared).whitelist.iter().cloned().collect();
        players.sort();
        players
    }

    // -- Snapshot -----------------------------------------------------------

    /// Players seen by the most recent listing.
    pub fn last_players(&self) -> Vec<PlayerRecord> {
        lock(&self.shared).last_players.clone()
    }

    /// Whether `player` was on the server at the last listing.
    pub fn is_player_in_server(&self, player: &SteamId) -> bool {
        lock(&self.shared)
            .last_players
            .iter()
            .filter_map(|record| SteamId::parse(&record.steam_id).ok())
            .any(|id| &id == player)
    }
}

impl<K: ConsoleConnector> Drop for ServerController<K> {
    fn drop(&mut self) {
        if let Some(ticker) = &self.ticker {
            ticker.cancel.cancel();
        }
    }
}

/// Lists the connected players and evicts everyone not whitelisted.
///
/// Bots are left alone. Identities that can't be normalized count as not
/// whitelisted. Stops kicking early once `cancel` fires.
async fn verify_pass<C: RemoteConsole>(
    lobby: LobbyId,
    console: &C,
    shared: &Mutex<Shared>,
    config: &ControllerConfig,
    cancel: Option<&CancellationToken>,
) -> Result<usize, ConsoleError> {
    let limit = config.remote_timeout();
    let whitelist = lock(shared).whitelist.clone();
    let players = bounded(limit, "list_players", console.list_players()).await?;

    let mut kicked = 0;
    for record in &players {
        if is_bot_identity(&record.steam_id) {
            continue;
        }
        let allowed = match SteamId::parse(&record.steam_id) {
            Ok(id) => whitelist.contains(&id),
            Err(e) => {
                debug!(lobby_id = %lobby, error = %e, "unrecognized identity on server");
                false
            }
        };
        if allowed {
            continue;
        }
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            break;
        }
        match bounded(limit, "kick", console.kick(record, &config.not_allowed_message)).await {
            Ok(()) => {
                kicked += 1;
                info!(
                    lobby_id = %lobby,
                    name = %record.name,
                    steam_id = %record.steam_id,
                    "kicked player not in lobby"
                );
            }
            Err(e) => warn!(lobby_id = %lobby, steam_id = %record.steam_id, error = %e, "kick failed"),
        }
    }

    lock(shared).last_players = players;
    Ok(kicked)
}
