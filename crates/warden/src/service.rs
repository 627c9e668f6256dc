//! The `Warden` host: owns the lobby manager and the background tasks.
//!
//! Lifecycle:
//!
//! ```text
//! new ──→ start ──→ (bind_feed / serve_feed)* ──→ shutdown
//! ```
//!
//! `start` and `shutdown` each run exactly once. Shutdown goes in this
//! order, so nothing is torn down while something else still uses it:
//!
//! 1. broadcast the maintenance notice
//! 2. stop the event feed (no new frames)
//! 3. stop the ingestor (queued frames are still applied)
//! 4. wait for in-flight lobby operations
//! 5. release every server binding

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use warden_ledger::{BanLedger, Store};
use warden_lobby::{LobbyManager, Notification, Notifier};
use warden_transport::{ConsoleConnector, Transport, WebSocketTransport};

use crate::{EventFeed, EventIngestor, WardenConfig, WardenError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Created,
    Running,
    Stopped,
}

/// A Lobby Warden host.
pub struct Warden<K: ConsoleConnector, S: Store, N: Notifier> {
    config: WardenConfig,
    manager: LobbyManager<K, S, N>,
    queue: mpsc::Sender<Vec<u8>>,
    inbox: Option<mpsc::Receiver<Vec<u8>>>,
    stop_feeds: CancellationToken,
    stop_ingest: CancellationToken,
    feeds: Vec<JoinHandle<()>>,
    ingestor: Option<JoinHandle<()>>,
    phase: Phase,
}

impl<K: ConsoleConnector, S: Store, N: Notifier> Warden<K, S, N> {
    /// Builds the manager and ledger from `config`. Nothing runs until
    /// [`start`](Self::start).
    pub fn new(config: WardenConfig, connector: Arc<K>, store: Arc<S>, notifier: N) -> Self {
        let ledger = Arc::new(BanLedger::new(store, config.bans.clone()));
        let manager = LobbyManager::new(
            connector,
            ledger,
            notifier,
            config.lobby.clone(),
            config.controller.clone(),
        );
        let (queue, inbox) = mpsc::channel(config.queue_capacity());
        Self {
            config,
            manager,
            queue,
            inbox: Some(inbox),
            stop_feeds: CancellationToken::new(),
            stop_ingest: CancellationToken::new(),
            feeds: Vec::new(),
            ingestor: None,
            phase: Phase::Created,
        }
    }

    pub fn config(&self) -> &WardenConfig {
        &self.config
    }

    /// The lobby manager. Clones share the same lobbies.
    pub fn manager(&self) -> &LobbyManager<K, S, N> {
        &self.manager
    }

    /// A sender into the ingestion queue, for event sources other than
    /// the built-in feed.
    pub fn events(&self) -> mpsc::Sender<Vec<u8>> {
        self.queue.clone()
    }

    pub fn is_running(&self) -> bool {
        self.phase == Phase::Running
    }

    /// Spawns the event ingestor.
    ///
    /// # Errors
    /// [`WardenError::Lifecycle`] if already started or shut down.
    pub fn start(&mut self) -> Result<(), WardenError> {
        if self.phase != Phase::Created {
            return Err(WardenError::Lifecycle("start called twice"));
        }
        let inbox = self
            .inbox
            .take()
            .ok_or(WardenError::Lifecycle("event queue already consumed"))?;
        let ingestor = EventIngestor::new(self.manager.clone());
        self.ingestor = Some(tokio::spawn(ingestor.run(inbox, self.stop_ingest.clone())));
        self.phase = Phase::Running;
        info!("warden started");
        Ok(())
    }

    /// Serves an agent feed over `transport` until shutdown.
    pub fn serve_feed<T: Transport>(&mut self, transport: T) -> Result<(), WardenError> {
        if self.phase != Phase::Running {
            return Err(WardenError::Lifecycle("feed served before start"));
        }
        let feed = EventFeed::new(transport);
        self.feeds
            .push(tokio::spawn(feed.run(self.queue.clone(), self.stop_feeds.clone())));
        Ok(())
    }

    /// Binds the WebSocket feed on `config.feed_addr` and serves it.
    /// Returns the bound address.
    pub async fn bind_feed(&mut self) -> Result<SocketAddr, WardenError> {
        if self.phase != Phase::Running {
            return Err(WardenError::Lifecycle("feed bound before start"));
        }
        let transport =
            WebSocketTransport::bind_with(&self.config.feed_addr, self.config.feed_limits()).await?;
        let addr = transport
            .local_addr()
            .map_err(warden_transport::TransportError::AcceptFailed)?;
        self.serve_feed(transport)?;
        Ok(addr)
    }

    /// Stops everything in order. See the module docs.
    ///
    /// # Errors
    /// [`WardenError::Lifecycle`] if called twice.
    pub async fn shutdown(&mut self) -> Result<(), WardenError> {
        if self.phase == Phase::Stopped {
            return Err(WardenError::Lifecycle("shutdown called twice"));
        }
        self.phase = Phase::Stopped;
        info!("warden shutting down");

        self.manager.notifier().notify(Notification::Maintenance {
            text: self.config.maintenance_message.clone(),
        });

        self.stop_feeds.cancel();
        for feed in self.feeds.drain(..) {
            if let Err(e) = feed.await {
                warn!(error = %e, "event feed task failed");
            }
        }

        self.stop_ingest.cancel();
        if let Some(ingestor) = self.ingestor.take() {
            if let Err(e) = ingestor.await {
                warn!(error = %e, "event ingestor task failed");
            }
        }

        self.manager.shutdown_drain().await;
        let released = self.manager.release_servers().await;
        info!(released, "warden stopped");
        Ok(())
    }
}
