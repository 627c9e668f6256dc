//! Integration tests for the ban ledger over the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, TimeZone, Utc};
use pretty_assertions::assert_eq;
use warden_ledger::{BanLedger, BanPolicy, BanReason, LedgerError, MemoryStore, Store};
use warden_protocol::{ClassTimes, LobbyId, PlayerClass, SteamId};

// =========================================================================
// Helpers
// =========================================================================

fn steam(n: u64) -> SteamId {
    SteamId::parse(&format!("[U:1:{n}]")).unwrap()
}

fn ledger() -> BanLedger<MemoryStore> {
    BanLedger::new(Arc::new(MemoryStore::new()), BanPolicy::default())
}

fn t0() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 20, 0, 0).unwrap()
}

// =========================================================================
// Eligibility
// =========================================================================

#[tokio::test]
async fn test_is_eligible_unknown_player_true() {
    assert!(ledger().is_eligible(&steam(1), t0()).await.unwrap());
}

#[tokio::test]
async fn test_check_eligible_active_ban_blocks() {
    let l = ledger();
    l.ban_until(&steam(1), t0() + TimeDelta::minutes(5), BanReason::Operator("afk".into()), t0())
        .await
        .unwrap();

    let err = l.check_eligible(&steam(1), t0()).await.unwrap_err();
    match err {
        LedgerError::Banned { player, reason, until } => {
            assert_eq!(player, steam(1));
            assert_eq!(reason, "afk");
            assert_eq!(until, t0() + TimeDelta::minutes(5));
        }
        other => panic!("expected Banned, got {other:?}"),
    }
}

#[tokio::test]
async fn test_check_eligible_expired_ban_never_blocks() {
    let l = ledger();
    l.ban_until(&steam(1), t0() - TimeDelta::seconds(1), BanReason::Ragequit, t0() - TimeDelta::hours(1))
        .await
        .unwrap();

    assert!(l.check_eligible(&steam(1), t0()).await.is_ok());
    assert_eq!(l.active_ban(&steam(1), t0()).await.unwrap(), None);
}

// =========================================================================
// Rules
// =========================================================================

#[tokio::test]
async fn test_ragequit_bans_thirty_minutes_and_records_history() {
    let l = ledger();
    let ban = l.ragequit(&steam(1), LobbyId(1), t0()).await.unwrap();

    assert_eq!(ban.reason(), &BanReason::Ragequit);
    assert_eq!(ban.expires_at() - ban.created_at(), TimeDelta::minutes(30));

    let p = l.player(&steam(1)).await.unwrap();
    assert_eq!(p.ragequits.len(), 1);
    assert_eq!(p.ragequits[0].lobby, LobbyId(1));
    assert_eq!(p.bans.len(), 1);
}

#[tokio::test]
async fn test_reported_always_bans() {
    let l = ledger();
    l.reported(&steam(1), LobbyId(1), t0()).await.unwrap();
    l.reported(&steam(1), LobbyId(1), t0()).await.unwrap();

    let p = l.player(&steam(1)).await.unwrap();
    assert_eq!(p.reports.len(), 2);
    assert_eq!(p.bans.len(), 2);
    assert!(!p.is_eligible(t0() + TimeDelta::minutes(29)));
    assert!(p.is_eligible(t0() + TimeDelta::minutes(30)));
}

#[tokio::test]
async fn test_self_substituted_first_time_no_ban() {
    let l = ledger();
    let ban = l.self_substituted(&steam(1), LobbyId(1), t0()).await.unwrap();

    assert_eq!(ban, None);
    assert_eq!(l.player(&steam(1)).await.unwrap().substitutions.len(), 1);
}

#[tokio::test]
async fn test_self_substituted_twice_from_different_lobbies_bans() {
    let l = ledger();
    l.self_substituted(&steam(1), LobbyId(1), t0()).await.unwrap();
    let ban = l
        .self_substituted(&steam(1), LobbyId(2), t0() + TimeDelta::minutes(20))
        .await
        .unwrap()
        .expect("second sub inside the window bans");

    assert_eq!(ban.reason(), &BanReason::RepeatSubstitution);
    assert_eq!(ban.expires_at(), t0() + TimeDelta::minutes(50));
}

#[tokio::test]
async fn test_self_substituted_same_lobby_no_ban() {
    let l = ledger();
    l.self_substituted(&steam(1), LobbyId(1), t0()).await.unwrap();
    let ban = l
        .self_substituted(&steam(1), LobbyId(1), t0() + TimeDelta::minutes(1))
        .await
        .unwrap();
    assert_eq!(ban, None);
}

#[tokio::test]
async fn test_self_substituted_outside_window_no_ban() {
    let l = ledger();
    l.self_substituted(&steam(1), LobbyId(1), t0()).await.unwrap();
    let ban = l
        .self_substituted(&steam(1), LobbyId(2), t0() + TimeDelta::minutes(31))
        .await
        .unwrap();
    assert_eq!(ban, None);
}

#[tokio::test]
async fn test_oversized_policy_saturates_instead_of_overflowing() {
    let policy = BanPolicy {
        ragequit_secs: u64::MAX,
        repeat_substitution_secs: u64::MAX,
        repeat_window_secs: u64::MAX,
        ..BanPolicy::default()
    };
    let l = BanLedger::new(Arc::new(MemoryStore::new()), policy);

    let ban = l.ragequit(&steam(1), LobbyId(1), t0()).await.unwrap();
    assert_eq!(ban.expires_at(), chrono::DateTime::<Utc>::MAX_UTC);
    assert!(!l.is_eligible(&steam(1), t0() + TimeDelta::days(365 * 100)).await.unwrap());

    // An unbounded window reaches back to the first substitution.
    l.self_substituted(&steam(2), LobbyId(1), t0()).await.unwrap();
    let ban = l
        .self_substituted(&steam(2), LobbyId(2), t0() + TimeDelta::days(365 * 100))
        .await
        .unwrap()
        .expect("repeat inside an unbounded window bans");
    assert_eq!(ban.expires_at(), chrono::DateTime::<Utc>::MAX_UTC);
}

// =========================================================================
// Stats
// =========================================================================

#[tokio::test]
async fn test_record_class_times_merges_into_stats() {
    let l = ledger();
    let times: ClassTimes = [(PlayerClass::Scout, Duration::from_secs(600))]
        .into_iter()
        .collect();
    l.record_class_times(&steam(1), &times).await.unwrap();

    let p = l.store().get_player(&steam(1)).await.unwrap().unwrap();
    assert_eq!(p.stats.get(PlayerClass::Scout), Duration::from_secs(600));
    assert_eq!(p.stats.total(), Duration::from_secs(600));
}

#[tokio::test]
async fn test_record_class_times_empty_is_noop() {
    let l = ledger();
    l.record_class_times(&steam(1), &ClassTimes::new()).await.unwrap();
    assert_eq!(l.store().player_count().await, 0);
}
