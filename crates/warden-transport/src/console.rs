//! The remote console capability: an open control channel to one game
//! server process.
//!
//! Lobby Warden never speaks the RCON wire protocol itself. Whoever hosts
//! it supplies a [`ConsoleConnector`], and the server controller drives the
//! resulting [`RemoteConsole`] through this narrow interface: password,
//! config, map, player list, kick.
//!
//! Methods return `impl Future + Send` so implementors can write plain
//! `async fn` while generic callers can still move the futures onto
//! spawned tasks (the verification ticker runs on its own task).

use std::future::Future;
use std::time::Duration;

use crate::ConsoleError;

/// One player as reported by the game server's status listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerRecord {
    /// Server-side user id, used to address kicks.
    pub user_id: u32,
    /// In-game name.
    pub name: String,
    /// Identity as the server prints it: `[U:1:n]`, `STEAM_0:y:z`, or `BOT`.
    pub steam_id: String,
}

/// Opens control channels to game servers.
pub trait ConsoleConnector: Send + Sync + 'static {
    /// The console type produced by this connector.
    type Console: RemoteConsole;

    /// Connects to `host` and authenticates with the RCON `secret`.
    fn connect(
        &self,
        host: &str,
        secret: &str,
    ) -> impl Future<Output = Result<Self::Console, ConsoleError>> + Send;
}

/// An open control channel to one game server.
pub trait RemoteConsole: Send + Sync + 'static {
    /// Sets the password players need to join the server.
    fn change_password(
        &self,
        password: &str,
    ) -> impl Future<Output = Result<(), ConsoleError>> + Send;

    /// Lists everyone currently connected, bots included.
    fn list_players(
        &self,
    ) -> impl Future<Output = Result<Vec<PlayerRecord>, ConsoleError>> + Send;

    /// Evicts one player with a reason shown on their screen.
    fn kick(
        &self,
        player: &PlayerRecord,
        reason: &str,
    ) -> impl Future<Output = Result<(), ConsoleError>> + Send;

    /// Executes a block of server configuration.
    fn exec_config(
        &self,
        config: &str,
    ) -> impl Future<Output = Result<(), ConsoleError>> + Send;

    /// Changes the running map.
    fn change_map(
        &self,
        map: &str,
    ) -> impl Future<Output = Result<(), ConsoleError>> + Send;

    /// Closes the channel. Closing never fails from the caller's view.
    fn close(&self) -> impl Future<Output = ()> + Send;
}

/// Runs one remote call with an upper bound on how long it may take.
///
/// A single unresponsive server must never stall its caller forever; every
/// console call made by the controller goes through here.
pub async fn bounded<T, F>(limit: Duration, op: &'static str, call: F) -> Result<T, ConsoleError>
where
    F: Future<Output = Result<T, ConsoleError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::debug!(op, ?limit, "remote console call timed out");
            Err(ConsoleError::Timeout { op, after: limit })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_bounded_passes_through_result() {
        let ok = bounded(Duration::from_secs(1), "status", async { Ok::<_, ConsoleError>(7) }).await;
        assert_eq!(ok.unwrap(), 7);

        let err = bounded(Duration::from_secs(1), "kick", async {
            Err::<(), _>(ConsoleError::Closed)
        })
        .await;
        assert!(matches!(err, Err(ConsoleError::Closed)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_times_out_slow_call() {
        let result = bounded(Duration::from_secs(5), "changelevel", async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, ConsoleError>(())
        })
        .await;

        assert!(matches!(
            result,
            Err(ConsoleError::Timeout { op: "changelevel", after }) if after == Duration::from_secs(5)
        ));
    }
}
