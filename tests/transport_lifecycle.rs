//! Connection lifecycle: retries, timeouts, drops and liveness

mod support;

use std::time::Duration;

use support::*;
use tokio_test::{assert_pending, assert_ready_eq, task};
use vibescale::{ConnectionState, PlayerState, RoomEvent, RoomEventKind, ThresholdDetector, TransportError};

fn errors(log: &EventLog) -> Vec<TransportError> {
    log.all()
        .into_iter()
        .filter_map(|e| match e {
            RoomEvent::Error(e) => Some(e),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_connect_retries_until_accepted() {
    let (connector, mut accepted) = MemoryConnector::new();
    connector.refuse_next(2);
    let room = room_with(test_config("lobby"), &connector, ThresholdDetector::default());
    let log = EventLog::attach(&room);

    assert_eq!(room.connect().await, ConnectionState::Connected);
    let _server = accepted.recv().await.unwrap();

    assert_eq!(connector.attempts(), 3);
    assert_eq!(log.count(RoomEventKind::Connected), 1);
    assert!(errors(&log).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_connect_gives_up_after_retries() {
    let (connector, _accepted) = MemoryConnector::new();
    connector.refuse_next(10);
    let room = room_with(test_config("lobby"), &connector, ThresholdDetector::default());
    let log = EventLog::attach(&room);

    assert_eq!(room.connect().await, ConnectionState::Idle);

    assert_eq!(connector.attempts(), 3);
    assert_eq!(room.connection_state(), ConnectionState::Idle);
    assert_eq!(
        errors(&log),
        vec![TransportError::RetriesExhausted { attempts: 3 }]
    );
    assert_eq!(log.count(RoomEventKind::Connected), 0);
}

#[tokio::test(start_paused = true)]
async fn test_silent_server_times_out_handshake() {
    let (connector, _accepted) = MemoryConnector::new();
    connector.go_silent(true);
    let mut config = test_config("lobby");
    config.reconnect.max_attempts = 0;
    let room = room_with(config, &connector, ThresholdDetector::default());
    let log = EventLog::attach(&room);

    assert_eq!(room.connect().await, ConnectionState::Idle);
    assert_eq!(connector.attempts(), 1);
    assert_eq!(
        errors(&log),
        vec![TransportError::RetriesExhausted { attempts: 1 }]
    );
    assert!(room.local_player().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_retry() {
    let (connector, _accepted) = MemoryConnector::new();
    connector.refuse_next(10);
    let mut config = test_config("lobby");
    config.reconnect.initial_delay = Duration::from_secs(5);
    let room = room_with(config, &connector, ThresholdDetector::default());
    let log = EventLog::attach(&room);

    // First attempt fails at once, then the retry sleeps
    let mut connecting = task::spawn(room.connect());
    assert_pending!(connecting.poll());
    assert_eq!(room.connection_state(), ConnectionState::Connecting);

    room.disconnect();
    assert!(connecting.is_woken());
    assert_ready_eq!(connecting.poll(), ConnectionState::Disconnected);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.attempts(), 1);
    assert!(errors(&log).is_empty());
    assert_eq!(log.count(RoomEventKind::Disconnected), 1);
}

#[tokio::test(start_paused = true)]
async fn test_backlog_before_handshake_is_replayed() {
    let (connector, mut accepted) = MemoryConnector::new();
    connector.before_welcome(state_frame(&PlayerState::new("early").with_position(3.0, 4.0)));
    connector.welcome_as(PlayerState::new("me"));
    let room = room_with(test_config("lobby"), &connector, ThresholdDetector::default());

    room.connect().await;
    let _server = accepted.recv().await.unwrap();
    settle().await;

    let early = room.player("early").unwrap();
    assert_eq!(early.position.y, 4.0);
    assert!(!early.is_local);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_connection_reconnects() {
    let (connector, mut accepted) = MemoryConnector::new();
    connector.welcome_as(PlayerState::new("me"));
    let room = room_with(test_config("lobby"), &connector, ThresholdDetector::default());
    let log = EventLog::attach(&room);

    room.connect().await;
    let first = accepted.recv().await.unwrap();
    first.push(state_frame(&PlayerState::new("alice")));
    settle().await;

    connector.welcome_as(PlayerState::new("me"));
    drop(first);

    let mut second = accepted.recv().await.unwrap();
    settle().await;

    assert!(room.is_connected());
    assert_eq!(connector.attempts(), 2);
    assert_eq!(log.count(RoomEventKind::Disconnected), 1);
    assert_eq!(log.count(RoomEventKind::Connected), 2);

    // Alice was marked offline, then dropped on re-join
    let alice_offline = log.all().into_iter().any(|e| {
        matches!(&e, RoomEvent::PlayerUpdated(p) if p.id == "alice" && !p.is_connected)
    });
    assert!(alice_offline);
    assert!(room.player("alice").is_none());

    room.mutate_player(|p| p.username = "back".into());
    assert_eq!(second.drain().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_connection_without_auto_reconnect() {
    let (connector, mut accepted) = MemoryConnector::new();
    let mut config = test_config("lobby");
    config.auto_reconnect = false;
    let room = room_with(config, &connector, ThresholdDetector::default());

    room.connect().await;
    drop(accepted.recv().await.unwrap());
    settle().await;

    assert_eq!(room.connection_state(), ConnectionState::Disconnected);
    assert_eq!(connector.attempts(), 1);
    assert!(!room.local_player().unwrap().is_connected);
}

#[tokio::test(start_paused = true)]
async fn test_silent_players_expire() {
    let (connector, mut accepted) = MemoryConnector::new();
    let room = room_with(test_config("lobby"), &connector, ThresholdDetector::default());
    let log = EventLog::attach(&room);

    room.connect().await;
    let server = accepted.recv().await.unwrap();
    server.push(state_frame(&PlayerState::new("quiet")));
    server.push(state_frame(&PlayerState::new("chatty")));
    settle().await;

    for _ in 0..8 {
        tokio::time::sleep(Duration::from_secs(4)).await;
        server.push(state_frame(&PlayerState::new("chatty")));
    }
    settle().await;

    assert!(room.player("quiet").is_none());
    assert!(room.player("chatty").is_some());
    assert_eq!(log.count(RoomEventKind::PlayerLeft), 1);
    assert!(room.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_dropping_last_room_closes_connection() {
    let (connector, mut accepted) = MemoryConnector::new();
    let room = room_with(test_config("lobby"), &connector, ThresholdDetector::default());
    let other = room.clone();

    room.connect().await;
    let mut server = accepted.recv().await.unwrap();

    drop(room);
    settle().await;
    assert!(other.is_connected());
    assert!(server.to_client.send(state_frame(&PlayerState::new("x"))).is_ok());

    drop(other);
    settle().await;
    assert!(server.from_client.recv().await.is_none());
    assert!(server
        .to_client
        .send(state_frame(&PlayerState::new("late")))
        .is_err());

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_room_stops_reconnecting() {
    let (connector, mut accepted) = MemoryConnector::new();
    let room = room_with(test_config("lobby"), &connector, ThresholdDetector::default());

    room.connect().await;
    let server = accepted.recv().await.unwrap();

    connector.refuse_next(10);
    drop(server);
    settle().await;
    assert_eq!(connector.attempts(), 2);
    assert_eq!(room.connection_state(), ConnectionState::Connecting);

    drop(room);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.attempts(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_connect_and_disconnect_agree_on_final_state() {
    for _ in 0..200 {
        let (connector, _accepted) = MemoryConnector::new();
        let room = room_with(test_config("lobby"), &connector, ThresholdDetector::default());
        let log = EventLog::attach(&room);

        let connecting = tokio::spawn({
            let room = room.clone();
            async move { room.connect().await }
        });
        let closing = tokio::spawn({
            let room = room.clone();
            async move {
                tokio::task::yield_now().await;
                room.disconnect();
            }
        });
        connecting.await.unwrap();
        closing.await.unwrap();

        let last = log.all().into_iter().rev().find_map(|e| match e {
            RoomEvent::Connected => Some(ConnectionState::Connected),
            RoomEvent::Disconnected => Some(ConnectionState::Disconnected),
            _ => None,
        });
        let phase = room.connection_state();
        if let Some(last) = last {
            assert_eq!(last, phase);
        }
        if let Some(me) = room.local_player() {
            assert_eq!(me.is_connected, phase == ConnectionState::Connected);
        }
    }
}
