//! The event ingestor: one consumer task applying game-server events.
//!
//! Every frame from every agent goes through a single bounded queue and
//! is handled here, one at a time, in arrival order. Together with the
//! per-lobby lock in [`LobbyManager`], that keeps each lobby's events in
//! order without any extra bookkeeping.

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use warden_ledger::Store;
use warden_lobby::{LobbyManager, Notification, Notifier};
use warden_protocol::{Codec, ErrorKind, IncomingEvent, JsonCodec, LobbyId, SteamId};
use warden_transport::ConsoleConnector;

use crate::WardenError;

/// Decodes event frames and applies them to the lobbies.
pub struct EventIngestor<K: ConsoleConnector, S: Store, N: Notifier, C: Codec = JsonCodec> {
    manager: LobbyManager<K, S, N>,
    codec: C,
}

impl<K: ConsoleConnector, S: Store, N: Notifier> EventIngestor<K, S, N> {
    pub fn new(manager: LobbyManager<K, S, N>) -> Self {
        Self::with_codec(manager, JsonCodec)
    }
}

impl<K, S, N, C> EventIngestor<K, S, N, C>
where
    K: ConsoleConnector,
    S: Store,
    N: Notifier,
    C: Codec,
{
    pub fn with_codec(manager: LobbyManager<K, S, N>, codec: C) -> Self {
        Self { manager, codec }
    }

    /// Consumes `events` until `stop` fires or every sender is gone.
    ///
    /// A handler is never interrupted: the stop signal is only looked at
    /// between events. Frames already queued when it fires are still
    /// applied, then the loop ends.
    pub async fn run(self, mut events: mpsc::Receiver<Vec<u8>>, stop: CancellationToken) {
        info!("event ingestor started");
        loop {
            let frame = tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                frame = events.recv() => match frame {
                    Some(frame) => frame,
                    None => {
                        info!("event queue closed, ingestor stopping");
                        return;
                    }
                },
            };
            self.process(&frame).await;
        }

        events.close();
        let mut drained = 0usize;
        while let Some(frame) = events.recv().await {
            self.process(&frame).await;
            drained += 1;
        }
        info!(drained, "event ingestor stopped");
    }

    /// Handles one frame, logging instead of returning failures.
    pub async fn process(&self, frame: &[u8]) {
        if let Err(e) = self.handle_frame(frame).await {
            match e.kind() {
                ErrorKind::MalformedEvent => warn!(error = %e, "malformed event skipped"),
                kind => warn!(error = %e, %kind, "event handler failed"),
            }
        }
    }

    /// Decodes one frame and applies it.
    ///
    /// # Errors
    /// [`WardenError::Protocol`] for a malformed frame; otherwise whatever
    /// the lobby or ledger operation failed with.
    pub async fn handle_frame(&self, frame: &[u8]) -> Result<(), WardenError> {
        let event = self.codec.decode_event(frame)?;
        self.handle(event).await
    }

    /// Applies one validated event.
    pub async fn handle(&self, event: IncomingEvent) -> Result<(), WardenError> {
        debug!(event = event.name(), lobby_id = %event.lobby(), "handling event");
        match event {
            IncomingEvent::PlayerConnected { player, lobby } => {
                self.manager.set_in_game(lobby, &player).await?;
                let name = self.manager.display_name(&player).await;
                self.notice(lobby, format!("{name} has connected to the server."));
            }
            IncomingEvent::PlayerDisconnected { player, lobby } => {
                self.manager.set_not_in_game(lobby, &player).await?;
                let name = self.manager.display_name(&player).await;
                self.notice(lobby, format!("{name} has disconnected from the server."));
            }
            IncomingEvent::PlayerSubstituted {
                player,
                lobby,
                self_requested,
            } => self.substituted(player, lobby, self_requested).await?,
            IncomingEvent::PlayerChat {
                player,
                lobby,
                message,
            } => {
                self.manager.lobby_info(lobby).await?;
                self.manager.notifier().notify(Notification::Chat {
                    lobby,
                    player,
                    message,
                });
            }
            IncomingEvent::ServerDisconnected { lobby } => {
                self.manager.close(lobby, false, false).await?;
            }
            IncomingEvent::MatchEnded {
                lobby,
                logs_id,
                class_times,
            } => {
                self.manager.finish_match(lobby, logs_id).await?;
                if let Some(logs_id) = logs_id {
                    self.notice(lobby, format!("Lobby Ended. Logs: http://logs.tf/{logs_id}"));
                }
                let ledger = self.manager.ledger();
                for (player, times) in &class_times {
                    if let Err(e) = ledger.record_class_times(player, times).await {
                        warn!(lobby_id = %lobby, player = %player, error = %e, "could not record class times");
                    }
                }
            }
        }
        Ok(())
    }

    async fn substituted(
        &self,
        player: SteamId,
        lobby: LobbyId,
        self_requested: bool,
    ) -> Result<(), WardenError> {
        if !self.manager.substitute(lobby, &player).await? {
            return Ok(());
        }

        let ledger = self.manager.ledger();
        let now = Utc::now();
        if self_requested {
            if let Some(ban) = ledger.self_substituted(&player, lobby, now).await? {
                info!(lobby_id = %lobby, player = %player, until = %ban.expires_at(), "repeat substitution banned");
            }
        } else {
            ledger.reported(&player, lobby, now).await?;
        }

        let name = self.manager.display_name(&player).await;
        self.notice(lobby, format!("{name} has been reported."));
        Ok(())
    }

    fn notice(&self, lobby: LobbyId, text: String) {
        self.manager
            .notifier()
            .notify(Notification::Notice { lobby, text });
    }
}
