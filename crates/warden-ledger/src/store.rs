//! The persistence interface and its in-memory implementation.
//!
//! Lobby Warden never talks to a database directly. The host hands the
//! ledger and the lobby manager something that implements [`Store`]; the
//! schema behind it is the host's business.
//!
//! Writes for bans and incident histories are append-only. Implementations
//! create the player record on first write if it doesn't exist yet.

use std::collections::HashMap;
use std::future::Future;

use tokio::sync::Mutex;
use warden_protocol::{ClassTimes, LobbyId, SteamId};

use crate::{Ban, IncidentKind, IncidentRecord, LobbyRecord, Player, StoreError};

/// Persistent storage for players and lobby records.
///
/// Follows the same shape as the other capability traits in the
/// workspace: methods return `impl Future + Send`, so implementors can
/// write plain `async fn` and callers can use the store from spawned
/// tasks.
pub trait Store: Send + Sync + 'static {
    /// Loads a player. `Ok(None)` if the player has never been seen.
    fn get_player(
        &self,
        id: &SteamId,
    ) -> impl Future<Output = Result<Option<Player>, StoreError>> + Send;

    /// Inserts or replaces a player record.
    fn save_player(&self, player: Player) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Appends a ban to the ban's player.
    fn append_ban(&self, ban: Ban) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Appends an entry to one of the player's incident histories.
    fn append_incident(
        &self,
        player: &SteamId,
        kind: IncidentKind,
        record: IncidentRecord,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Adds per-class playtime to the player's lifetime totals.
    fn add_class_times(
        &self,
        player: &SteamId,
        times: &ClassTimes,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn get_lobby(
        &self,
        id: LobbyId,
    ) -> impl Future<Output = Result<Option<LobbyRecord>, StoreError>> + Send;

    /// Inserts or replaces a lobby record.
    fn save_lobby(&self, record: LobbyRecord)
    -> impl Future<Output = Result<(), StoreError>> + Send;
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Tables {
    players: HashMap<SteamId, Player>,
    lobbies: HashMap<LobbyId, LobbyRecord>,
}

impl Tables {
    fn player_mut(&mut self, id: &SteamId) -> &mut Player {
        self.players
            .entry(id.clone())
            .or_insert_with(|| Player::new(id.clone()))
    }
}

/// A [`Store`] that keeps everything in process memory.
///
/// Nothing survives a restart. Good for tests and for running without a
/// database.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of players with a record.
    pub async fn player_count(&self) -> usize {
        self.tables.lock().await.players.len()
    }

    /// Every saved lobby record, in id order.
    pub async fn lobbies(&self) -> Vec<LobbyRecord> {
        let tables = self.tables.lock().await;
        let mut records: Vec<_> = tables.lobbies.values().cloned().collect();
        records.sort_by_key(|r| r.id);
        records
    }
}

impl Store for MemoryStore {
    async fn get_player(&self, id: &SteamId) -> Result<Option<Player>, StoreError> {
        Ok(self.tables.lock().await.players.get(id).cloned())
    }

    async fn save_player(&self, player: Player) -> Result<(), StoreError> {
        self.tables
            .lock()
            .await
            .players
            .insert(player.steam_id.clone(), player);
        Ok(())
    }

    async fn append_ban(&self, ban: Ban) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        tables.player_mut(ban.player()).bans.push(ban);
        Ok(())
    }

    async fn append_incident(
        &self,
        player: &SteamId,
        kind: IncidentKind,
        record: IncidentRecord,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        tables.player_mut(player).incidents_mut(kind).push(record);
        Ok(())
    }

    async fn add_class_times(&self, player: &SteamId, times: &ClassTimes) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        let stats = &mut tables.player_mut(player).stats;
        for (class, duration) in times.iter() {
            stats.add(class, duration);
        }
        Ok(())
    }

    async fn get_lobby(&self, id: LobbyId) -> Result<Option<LobbyRecord>, StoreError> {
        Ok(self.tables.lock().await.lobbies.get(&id).cloned())
    }

    async fn save_lobby(&self, record: LobbyRecord) -> Result<(), StoreError> {
        self.tables.lock().await.lobbies.insert(record.id, record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use warden_protocol::PlayerClass;

    use super::*;

    fn steam(n: u64) -> SteamId {
        SteamId::parse(&format!("[U:1:{n}]")).unwrap()
    }

    #[tokio::test]
    async fn test_get_player_unknown_is_none() {
        let store = MemoryStore::new();
        assert!(store.get_player(&steam(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_append_incident_creates_player() {
        let store = MemoryStore::new();
        let record = IncidentRecord {
            lobby: LobbyId(3),
            at: Utc::now(),
        };
        store
            .append_incident(&steam(1), IncidentKind::Report, record)
            .await
            .unwrap();

        let p = store.get_player(&steam(1)).await.unwrap().unwrap();
        assert_eq!(p.reports, vec![record]);
        assert!(p.ragequits.is_empty());
        assert_eq!(store.player_count().await, 1);
    }

    #[tokio::test]
    async fn test_add_class_times_accumulates() {
        let store = MemoryStore::new();
        let times: ClassTimes = [(PlayerClass::Scout, Duration::from_secs(600))]
            .into_iter()
            .collect();
        store.add_class_times(&steam(1), &times).await.unwrap();
        store.add_class_times(&steam(1), &times).await.unwrap();

        let p = store.get_player(&steam(1)).await.unwrap().unwrap();
        assert_eq!(p.stats.get(PlayerClass::Scout), Duration::from_secs(1200));
    }
}
