// In-memory room server shared by the integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::mpsc;
use url::Url;

use vibescale::net::{Connector, Link, ReconnectConfig};
use vibescale::{
    PlayerState, Room, RoomConfig, RoomEvent, RoomEventKind, StateChangeDetector, TransportError,
};

/// Server side of one accepted connection
pub struct ServerEnd {
    pub to_client: mpsc::UnboundedSender<String>,
    pub from_client: mpsc::UnboundedReceiver<String>,
}

impl ServerEnd {
    pub fn push(&self, frame: String) {
        self.to_client.send(frame).expect("client link open");
    }

    /// Every frame the client has sent so far
    pub fn drain(&mut self) -> Vec<serde_json::Value> {
        let mut frames = Vec::new();
        while let Ok(text) = self.from_client.try_recv() {
            frames.push(serde_json::from_str(&text).expect("client frames are json"));
        }
        frames
    }
}

#[derive(Default)]
struct Script {
    refuse: AtomicU32,
    silent: AtomicBool,
    attempts: AtomicU32,
    next_id: AtomicU32,
    welcomes: Mutex<VecDeque<PlayerState>>,
    preamble: Mutex<Vec<String>>,
}

/// Connector that hands each accepted connection to the test
#[derive(Clone)]
pub struct MemoryConnector {
    script: Arc<Script>,
    accepted: mpsc::UnboundedSender<ServerEnd>,
}

impl MemoryConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ServerEnd>) {
        let (accepted, accepted_rx) = mpsc::unbounded_channel();
        (
            Self {
                script: Arc::new(Script::default()),
                accepted,
            },
            accepted_rx,
        )
    }

    /// Refuse the next `n` connection attempts
    pub fn refuse_next(&self, n: u32) {
        self.script.refuse.store(n, Ordering::SeqCst);
    }

    /// Accept connections but never complete the handshake
    pub fn go_silent(&self, silent: bool) {
        self.script.silent.store(silent, Ordering::SeqCst);
    }

    /// State handed out by the next handshake
    pub fn welcome_as(&self, state: PlayerState) {
        self.script.welcomes.lock().push_back(state);
    }

    /// Frame delivered before the next handshake
    pub fn before_welcome(&self, frame: String) {
        self.script.preamble.lock().push(frame);
    }

    pub fn attempts(&self) -> u32 {
        self.script.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, _url: &Url) -> Result<Link, TransportError> {
        self.script.attempts.fetch_add(1, Ordering::SeqCst);

        let refuse = self.script.refuse.load(Ordering::SeqCst);
        if refuse > 0 {
            self.script.refuse.store(refuse - 1, Ordering::SeqCst);
            return Err(TransportError::Connect("connection refused".into()));
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        for frame in self.script.preamble.lock().drain(..) {
            let _ = inbound_tx.send(frame);
        }

        if !self.script.silent.load(Ordering::SeqCst) {
            let state = self.script.welcomes.lock().pop_front().unwrap_or_else(|| {
                let n = self.script.next_id.fetch_add(1, Ordering::SeqCst);
                PlayerState::new(format!("local-{n}"))
            });
            let _ = inbound_tx.send(welcome_frame(&state));
        }

        let _ = self.accepted.send(ServerEnd {
            to_client: inbound_tx,
            from_client: outbound_rx,
        });

        Ok(Link {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

pub fn welcome_frame(state: &PlayerState) -> String {
    json!({ "type": "player:id", "data": state }).to_string()
}

pub fn state_frame(state: &PlayerState) -> String {
    json!({ "type": "player:state", "data": state }).to_string()
}

pub fn joined_frame(state: &PlayerState) -> String {
    json!({ "type": "player:joined", "data": state }).to_string()
}

pub fn leave_frame(id: &str) -> String {
    json!({ "type": "player:leave", "data": { "id": id } }).to_string()
}

pub fn error_frame(message: &str) -> String {
    json!({ "type": "player:error", "data": { "message": message } }).to_string()
}

/// Fast, jitter-free settings for tests
pub fn test_config(room_id: &str) -> RoomConfig {
    let mut config = RoomConfig::new(
        Url::parse("ws://rooms.test/parties/main/").expect("valid url"),
        room_id,
    );
    config.join_timeout = Duration::from_millis(500);
    config.reconnect = ReconnectConfig {
        initial_delay: Duration::from_millis(100),
        backoff_multiplier: 2.0,
        max_delay: Duration::from_secs(1),
        max_attempts: 2,
        jitter: 0.0,
    };
    config
}

pub fn room_with(
    config: RoomConfig,
    connector: &MemoryConnector,
    detector: impl StateChangeDetector + 'static,
) -> Room {
    Room::with_parts(config, Arc::new(connector.clone()), detector).expect("valid room config")
}

/// Records every event a room publishes
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<RoomEvent>>>,
}

impl EventLog {
    pub fn attach(room: &Room) -> Self {
        let log = Self::default();
        let events = log.events.clone();
        room.on_any(move |_, event| events.lock().push(event.clone()));
        log
    }

    pub fn count(&self, kind: RoomEventKind) -> usize {
        use vibescale::events::Event;
        self.events.lock().iter().filter(|e| e.kind() == kind).count()
    }

    pub fn all(&self) -> Vec<RoomEvent> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

/// Let spawned room tasks drain their queues
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}
