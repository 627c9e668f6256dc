//! The ban ledger: applies [`BanPolicy`] and answers eligibility queries.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info};
use warden_protocol::{ClassTimes, LobbyId, SteamId};

use crate::{
    Ban, BanPolicy, BanReason, IncidentKind, IncidentRecord, LedgerError, Player, Store,
};

/// Records bans and incident history on top of a [`Store`].
///
/// Every operation takes the current time explicitly. Callers pass
/// `Utc::now()`; tests pass fixed instants.
pub struct BanLedger<S> {
    store: Arc<S>,
    policy: BanPolicy,
}

impl<S: Store> BanLedger<S> {
    pub fn new(store: Arc<S>, policy: BanPolicy) -> Self {
        Self { store, policy }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn policy(&self) -> &BanPolicy {
        &self.policy
    }

    /// Loads a player, or a fresh record if the player is unknown.
    pub async fn player(&self, id: &SteamId) -> Result<Player, LedgerError> {
        Ok(self
            .store
            .get_player(id)
            .await?
            .unwrap_or_else(|| Player::new(id.clone())))
    }

    /// Appends a ban that lasts until `expires_at`.
    pub async fn ban_until(
        &self,
        player: &SteamId,
        expires_at: DateTime<Utc>,
        reason: BanReason,
        now: DateTime<Utc>,
    ) -> Result<Ban, LedgerError> {
        let ban = Ban::new(player.clone(), reason, now, expires_at);
        self.store.append_ban(ban.clone()).await?;
        info!(player = %player, reason = %ban.reason(), until = %expires_at, "ban issued");
        Ok(ban)
    }

    /// The longest-running active ban, if any.
    pub async fn active_ban(
        &self,
        player: &SteamId,
        now: DateTime<Utc>,
    ) -> Result<Option<Ban>, LedgerError> {
        let Some(record) = self.store.get_player(player).await? else {
            return Ok(None);
        };
        Ok(record.active_ban(now).cloned())
    }

    pub async fn is_eligible(&self, player: &SteamId, now: DateTime<Utc>) -> Result<bool, LedgerError> {
        Ok(self.active_ban(player, now).await?.is_none())
    }

    /// Fails with [`LedgerError::Banned`] if the player has an active ban.
    pub async fn check_eligible(&self, player: &SteamId, now: DateTime<Utc>) -> Result<(), LedgerError> {
        match self.active_ban(player, now).await? {
            Some(ban) => Err(LedgerError::Banned {
                player: player.clone(),
                reason: ban.reason().message().to_string(),
                until: ban.expires_at(),
            }),
            None => Ok(()),
        }
    }

    /// The player left `lobby` and never came back: history entry plus a
    /// ragequit ban.
    pub async fn ragequit(
        &self,
        player: &SteamId,
        lobby: LobbyId,
        now: DateTime<Utc>,
    ) -> Result<Ban, LedgerError> {
        self.store
            .append_incident(player, IncidentKind::Ragequit, IncidentRecord { lobby, at: now })
            .await?;
        self.ban_for(player, BanReason::Ragequit, now).await
    }

    /// Teammates asked for the player to be replaced. Always bans.
    pub async fn reported(
        &self,
        player: &SteamId,
        lobby: LobbyId,
        now: DateTime<Utc>,
    ) -> Result<Ban, LedgerError> {
        self.store
            .append_incident(player, IncidentKind::Report, IncidentRecord { lobby, at: now })
            .await?;
        self.ban_for(player, BanReason::Reported, now).await
    }

    /// The player asked to be replaced in `lobby`.
    ///
    /// Records the substitution, and bans only if the player already
    /// subbed out of a *different* lobby within the repeat window.
    pub async fn self_substituted(
        &self,
        player: &SteamId,
        lobby: LobbyId,
        now: DateTime<Utc>,
    ) -> Result<Option<Ban>, LedgerError> {
        let since = now
            .checked_sub_signed(self.policy.repeat_window())
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let repeat = self.store.get_player(player).await?.is_some_and(|record| {
            record
                .substitutions
                .iter()
                .any(|sub| sub.lobby != lobby && sub.at > since)
        });

        self.store
            .append_incident(player, IncidentKind::Substitution, IncidentRecord { lobby, at: now })
            .await?;

        if !repeat {
            debug!(player = %player, lobby_id = %lobby, "self substitution recorded");
            return Ok(None);
        }
        self.ban_for(player, BanReason::RepeatSubstitution, now)
            .await
            .map(Some)
    }

    /// Folds a finished match's playtime into the player's lifetime stats.
    pub async fn record_class_times(&self, player: &SteamId, times: &ClassTimes) -> Result<(), LedgerError> {
        if times.is_empty() {
            return Ok(());
        }
        self.store.add_class_times(player, times).await?;
        debug!(player = %player, total_secs = times.total().as_secs(), "class times recorded");
        Ok(())
    }

    async fn ban_for(
        &self,
        player: &SteamId,
        reason: BanReason,
        now: DateTime<Utc>,
    ) -> Result<Ban, LedgerError> {
        let length = self.policy.duration_for(&reason).unwrap_or(TimeDelta::zero());
        let until = now.checked_add_signed(length).unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.ban_until(player, until, reason, now).await
    }
}
