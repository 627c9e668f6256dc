//! Shared mock game server for the integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex, MutexGuard};

use warden::prelude::*;

#[derive(Default)]
pub struct ServerState {
    pub log: Vec<String>,
    pub players: Vec<PlayerRecord>,
    pub connects: u32,
    pub closes: u32,
}

/// Records every console command; `players` is what `list_players` sees.
#[derive(Clone, Default)]
pub struct MockServer(Arc<Mutex<ServerState>>);

impl MockServer {
    pub fn state(&self) -> MutexGuard<'_, ServerState> {
        self.0.lock().unwrap()
    }
}

pub struct MockConnector {
    pub server: MockServer,
}

impl ConsoleConnector for MockConnector {
    type Console = MockConsole;

    async fn connect(&self, _host: &str, _secret: &str) -> Result<MockConsole, ConsoleError> {
        self.server.state().connects += 1;
        Ok(MockConsole {
            server: self.server.clone(),
        })
    }
}

pub struct MockConsole {
    server: MockServer,
}

impl RemoteConsole for MockConsole {
    async fn change_password(&self, password: &str) -> Result<(), ConsoleError> {
        self.server.state().log.push(format!("sv_password {password}"));
        Ok(())
    }

    async fn list_players(&self) -> Result<Vec<PlayerRecord>, ConsoleError> {
        Ok(self.server.state().players.clone())
    }

    async fn kick(&self, player: &PlayerRecord, _reason: &str) -> Result<(), ConsoleError> {
        let mut state = self.server.state();
        state.log.push(format!("kick {}", player.steam_id));
        state.players.retain(|p| p.user_id != player.user_id);
        Ok(())
    }

    async fn exec_config(&self, config: &str) -> Result<(), ConsoleError> {
        self.server.state().log.push(config.to_string());
        Ok(())
    }

    async fn change_map(&self, map: &str) -> Result<(), ConsoleError> {
        self.server.state().log.push(format!("changelevel {map}"));
        Ok(())
    }

    async fn close(&self) {
        self.server.state().closes += 1;
    }
}

pub type Manager = LobbyManager<MockConnector, MemoryStore, ChannelNotifier>;

pub fn steam(n: u64) -> SteamId {
    SteamId::parse(&format!("[U:1:{n}]")).unwrap()
}

pub fn settings() -> MatchSettings {
    MatchSettings {
        map: "cp_process_final".into(),
        format: LobbyFormat::Debug,
        league: League::Ugc,
        server: ServerInfo {
            host: "192.0.2.10:27015".into(),
            rcon_password: "secret".into(),
        },
    }
}

/// Controller settings with the ticker jitter removed.
pub fn controller_config() -> ControllerConfig {
    ControllerConfig {
        verify_jitter_ms: 0,
        ..ControllerConfig::default()
    }
}

/// Creates a Debug lobby (two slots) seated with `players`, everyone ready.
pub async fn live_lobby(manager: &Manager, players: [u64; 2]) -> LobbyId {
    let id = manager.create_lobby(settings()).await.unwrap();
    for (slot, n) in players.iter().enumerate() {
        manager.add_player(id, steam(*n), slot).await.unwrap();
    }
    for n in players {
        manager.ready_player(id, &steam(n)).await.unwrap();
    }
    assert_eq!(manager.lobby_info(id).await.unwrap().state, LobbyState::Live);
    id
}

pub fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<Notification>) -> Vec<Notification> {
    let mut out = Vec::new();
    while let Ok(n) = rx.try_recv() {
        out.push(n);
    }
    out
}

pub fn notices(notes: &[Notification]) -> Vec<String> {
    notes
        .iter()
        .filter_map(|n| match n {
            Notification::Notice { text, .. } => Some(text.clone()),
            _ => None,
        })
        .collect()
}
