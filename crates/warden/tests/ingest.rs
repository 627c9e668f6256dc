//! Integration tests for the event ingestor.

mod common;

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use warden::prelude::*;

use common::{Manager, MockConnector, MockServer, controller_config, drain, live_lobby, notices, steam};

// =========================================================================
// Helpers
// =========================================================================

struct Harness {
    manager: Manager,
    ingestor: EventIngestor<MockConnector, MemoryStore, ChannelNotifier>,
    rx: mpsc::UnboundedReceiver<Notification>,
}

fn harness() -> Harness {
    let connector = Arc::new(MockConnector {
        server: MockServer::default(),
    });
    let ledger = Arc::new(BanLedger::new(Arc::new(MemoryStore::new()), BanPolicy::default()));
    let (notifier, rx) = ChannelNotifier::new();
    let manager = LobbyManager::new(
        connector,
        ledger,
        notifier,
        LobbyConfig::default(),
        controller_config(),
    );
    let ingestor = EventIngestor::new(manager.clone());
    Harness {
        manager,
        ingestor,
        rx,
    }
}

fn frame(json: &str) -> Vec<u8> {
    json.as_bytes().to_vec()
}

// =========================================================================
// Handlers
// =========================================================================

#[tokio::test]
async fn test_match_ended_adds_class_time_and_ends_lobby() {
    let mut h = harness();
    let id = live_lobby(&h.manager, [1, 2]).await;
    drain(&mut h.rx);

    let json = format!(
        r#"{{"name":"matchEnded","lobbyId":{},"logsId":1234,
            "classTimes":{{"[U:1:1]":{{"scout":600000000000}}}}}}"#,
        id.0
    );
    h.ingestor.handle_frame(json.as_bytes()).await.unwrap();

    let info = h.manager.lobby_info(id).await.unwrap();
    assert_eq!(info.state, LobbyState::Ended);

    let stats = h.manager.ledger().player(&steam(1)).await.unwrap().stats;
    assert_eq!(stats.get(PlayerClass::Scout), Duration::from_secs(600));
    assert_eq!(stats.total(), Duration::from_secs(600));

    let notes = drain(&mut h.rx);
    assert!(notes.contains(&Notification::LobbyClosed {
        lobby: id,
        reason: CloseReason::MatchCompleted,
    }));
    assert_eq!(notices(&notes), vec!["Lobby Ended. Logs: http://logs.tf/1234".to_string()]);
}

#[tokio::test]
async fn test_match_ended_twice_adds_time_twice_but_closes_once() {
    let h = harness();
    let id = live_lobby(&h.manager, [1, 2]).await;
    let json = format!(
        r#"{{"name":"matchEnded","lobbyId":{},"classTimes":{{"[U:1:2]":{{"medic":60000000000}}}}}}"#,
        id.0
    );

    h.ingestor.handle_frame(json.as_bytes()).await.unwrap();
    h.ingestor.handle_frame(json.as_bytes()).await.unwrap();

    let stats = h.manager.ledger().player(&steam(2)).await.unwrap().stats;
    assert_eq!(stats.get(PlayerClass::Medic), Duration::from_secs(120));
    let record = h.manager.ledger().store().get_lobby(id).await.unwrap().unwrap();
    assert_eq!(record.close_reason, Some(CloseReason::MatchCompleted));
}

#[tokio::test]
async fn test_server_disconnected_closes_connection_lost() {
    let mut h = harness();
    let id = live_lobby(&h.manager, [1, 2]).await;
    drain(&mut h.rx);

    h.ingestor
        .handle(IncomingEvent::ServerDisconnected { lobby: id })
        .await
        .unwrap();

    assert_eq!(h.manager.lobby_info(id).await.unwrap().state, LobbyState::Ended);
    assert!(drain(&mut h.rx).contains(&Notification::LobbyClosed {
        lobby: id,
        reason: CloseReason::ConnectionLost,
    }));
}

#[tokio::test]
async fn test_player_disconnected_then_connected_notices() {
    let mut h = harness();
    let id = live_lobby(&h.manager, [1, 2]).await;
    drain(&mut h.rx);

    h.ingestor
        .handle(IncomingEvent::PlayerDisconnected { player: steam(1), lobby: id })
        .await
        .unwrap();
    assert_eq!(h.manager.pending_grace_timers(id).await.unwrap(), 1);

    h.ingestor
        .handle(IncomingEvent::PlayerConnected { player: steam(1), lobby: id })
        .await
        .unwrap();
    assert_eq!(h.manager.pending_grace_timers(id).await.unwrap(), 0);

    let name = steam(1).to_string();
    assert_eq!(
        notices(&drain(&mut h.rx)),
        vec![
            format!("{name} has disconnected from the server."),
            format!("{name} has connected to the server."),
        ]
    );
}

#[tokio::test]
async fn test_reported_substitution_bans_and_notifies() {
    let mut h = harness();
    let id = live_lobby(&h.manager, [1, 2]).await;
    drain(&mut h.rx);

    h.ingestor
        .handle(IncomingEvent::PlayerSubstituted {
            player: steam(2),
            lobby: id,
            self_requested: false,
        })
        .await
        .unwrap();

    let record = h.manager.ledger().player(&steam(2)).await.unwrap();
    assert_eq!(record.bans.len(), 1);
    assert_eq!(record.bans[0].reason(), &BanReason::Reported);
    assert_eq!(record.reports.len(), 1);

    let notes = drain(&mut h.rx);
    assert!(notes.iter().any(|n| matches!(n, Notification::SlotVacated { slot: 1, .. })));
    assert_eq!(notices(&notes), vec![format!("{} has been reported.", steam(2))]);
}

#[tokio::test]
async fn test_self_substitution_bans_only_on_repeat_from_other_lobby() {
    let h = harness();
    let first = live_lobby(&h.manager, [1, 2]).await;
    let sub = |lobby| IncomingEvent::PlayerSubstituted {
        player: steam(1),
        lobby,
        self_requested: true,
    };

    h.ingestor.handle(sub(first)).await.unwrap();
    assert!(h.manager.ledger().player(&steam(1)).await.unwrap().bans.is_empty());

    let second = live_lobby(&h.manager, [1, 3]).await;
    h.ingestor.handle(sub(second)).await.unwrap();

    let record = h.manager.ledger().player(&steam(1)).await.unwrap();
    assert_eq!(record.substitutions.len(), 2);
    assert_eq!(record.bans.len(), 1);
    assert_eq!(record.bans[0].reason(), &BanReason::RepeatSubstitution);
}

#[tokio::test]
async fn test_substitution_of_absent_player_is_noop() {
    let mut h = harness();
    let id = live_lobby(&h.manager, [1, 2]).await;
    drain(&mut h.rx);

    h.ingestor
        .handle(IncomingEvent::PlayerSubstituted {
            player: steam(9),
            lobby: id,
            self_requested: false,
        })
        .await
        .unwrap();

    assert!(h.manager.ledger().player(&steam(9)).await.unwrap().bans.is_empty());
    assert!(drain(&mut h.rx).is_empty());
}

#[tokio::test]
async fn test_player_chat_forwarded() {
    let mut h = harness();
    let id = live_lobby(&h.manager, [1, 2]).await;
    drain(&mut h.rx);

    let json = format!(
        r#"{{"name":"playerChat","lobbyId":{},"steamId":"[U:1:1]","message":"gg"}}"#,
        id.0
    );
    h.ingestor.handle_frame(json.as_bytes()).await.unwrap();

    assert_eq!(
        drain(&mut h.rx),
        vec![Notification::Chat {
            lobby: id,
            player: steam(1),
            message: "gg".into(),
        }]
    );
}

#[tokio::test]
async fn test_handle_unknown_lobby_not_found() {
    let h = harness();
    let err = h
        .ingestor
        .handle(IncomingEvent::ServerDisconnected { lobby: LobbyId(77) })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_handle_frame_malformed_is_malformed_event() {
    let h = harness();
    let frames: [&[u8]; 3] = [
        b"{not json",
        br#"{"name":"playerConn"}"#,
        br#"{"name":"test","lobbyId":1}"#,
    ];
    for bad in frames {
        let err = h.ingestor.handle_frame(bad).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedEvent);
    }
}

// =========================================================================
// Run loop
// =========================================================================

#[tokio::test]
async fn test_run_skips_malformed_frame_and_continues() {
    let h = harness();
    let id = live_lobby(&h.manager, [1, 2]).await;
    let (tx, rx) = mpsc::channel(8);

    tx.send(frame("garbage")).await.unwrap();
    tx.send(frame(&format!(r#"{{"name":"discFromServer","lobbyId":{}}}"#, id.0)))
        .await
        .unwrap();
    drop(tx);

    h.ingestor.run(rx, CancellationToken::new()).await;

    assert_eq!(h.manager.lobby_info(id).await.unwrap().state, LobbyState::Ended);
}

#[tokio::test]
async fn test_run_out_of_range_steam_id_skipped_and_continues() {
    let h = harness();
    let id = live_lobby(&h.manager, [1, 2]).await;
    let (tx, rx) = mpsc::channel(8);

    for steam_id in ["[U:1:18446744073709551615]", "STEAM_0:1:18446744073709551615"] {
        let json = format!(r#"{{"name":"playerConn","lobbyId":{},"steamId":"{steam_id}"}}"#, id.0);
        tx.send(frame(&json)).await.unwrap();
    }
    tx.send(frame(&format!(r#"{{"name":"discFromServer","lobbyId":{}}}"#, id.0)))
        .await
        .unwrap();
    drop(tx);

    let ingestor = h.ingestor;
    let task = tokio::spawn(async move { ingestor.run(rx, CancellationToken::new()).await });
    task.await.unwrap();

    assert_eq!(h.manager.lobby_info(id).await.unwrap().state, LobbyState::Ended);
}

#[tokio::test]
async fn test_run_stop_applies_queued_frames_then_returns() {
    let h = harness();
    let a = live_lobby(&h.manager, [1, 2]).await;
    let b = live_lobby(&h.manager, [3, 4]).await;
    let (tx, rx) = mpsc::channel(8);
    for id in [a, b] {
        tx.send(frame(&format!(r#"{{"name":"discFromServer","lobbyId":{}}}"#, id.0)))
            .await
            .unwrap();
    }
    let stop = CancellationToken::new();
    stop.cancel();

    // The sender is still alive: only the stop signal can end the loop.
    h.ingestor.run(rx, stop).await;

    for id in [a, b] {
        assert_eq!(h.manager.lobby_info(id).await.unwrap().state, LobbyState::Ended);
    }
    assert!(tx.is_closed());
}

#[tokio::test]
async fn test_run_events_for_one_lobby_apply_in_order() {
    let mut h = harness();
    let id = live_lobby(&h.manager, [1, 2]).await;
    drain(&mut h.rx);
    let (tx, rx) = mpsc::channel(8);

    for name in ["playerDisc", "playerConn", "playerDisc"] {
        let json = format!(r#"{{"name":"{name}","lobbyId":{},"steamId":"[U:1:1]"}}"#, id.0);
        tx.send(frame(&json)).await.unwrap();
    }
    drop(tx);
    h.ingestor.run(rx, CancellationToken::new()).await;

    let info = h.manager.lobby_info(id).await.unwrap();
    assert!(!info.slots[0].in_game);
    assert_eq!(h.manager.pending_grace_timers(id).await.unwrap(), 1);
    assert_eq!(notices(&drain(&mut h.rx)).len(), 3);
}
