//! Room facade: the object applications hold
//!
//! A [`Room`] combines the player store, the transport and the event
//! emitter. Cloning a room is cheap and every clone refers to the same
//! connection, so it can be handed to consumers such as the movement
//! controller directly. Dropping the last clone closes the connection and
//! stops any reconnect in progress.

pub mod detector;
pub mod player;
pub mod store;

pub use detector::{AnyChange, StateChangeDetector, ThresholdDetector};
pub use player::{InvalidPlayer, PlayerState, Vec3};
pub use store::{Mutation, RoomStateStore};

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::config::{ConfigError, RoomConfig};
use crate::events::{EventEmitter, HandlerId, RoomEvent, RoomEventKind};
use crate::net::{ConnectionState, Connector, RoomTransport, WsConnector};

/// Store plus emitter, shared by the facade and the transport
///
/// Store changes are applied under the lock and published after it is
/// released.
pub(crate) struct RoomCore {
    room_id: String,
    store: Mutex<RoomStateStore>,
    events: EventEmitter<RoomEvent>,
}

impl RoomCore {
    fn new(room_id: String, detector: Box<dyn StateChangeDetector>) -> Self {
        Self {
            room_id,
            store: Mutex::new(RoomStateStore::new(detector)),
            events: EventEmitter::new(),
        }
    }

    pub(crate) fn room_id(&self) -> &str {
        &self.room_id
    }

    pub(crate) fn emit(&self, event: RoomEvent) {
        self.events.emit(&event);
    }

    pub(crate) fn publish(&self, events: impl IntoIterator<Item = RoomEvent>) {
        for event in events {
            self.events.emit(&event);
        }
    }

    pub(crate) fn is_local(&self, id: &str) -> bool {
        self.store.lock().local_id() == Some(id)
    }

    pub(crate) fn apply_remote(&self, state: PlayerState) {
        let event = self.store.lock().apply_remote_update(state, Instant::now());
        self.publish(event);
    }

    pub(crate) fn remove_player(&self, id: &str) {
        let event = self.store.lock().remove_player(id);
        self.publish(event);
    }

    /// Apply the handshake; returns the events for the caller to publish
    pub(crate) fn install_local(&self, state: PlayerState) -> Vec<RoomEvent> {
        self.store.lock().install_local(state)
    }

    /// Mark the view offline; returns the events for the caller to publish
    pub(crate) fn connection_lost(&self) -> Vec<RoomEvent> {
        self.store.lock().mark_connection_lost()
    }

    pub(crate) fn expire_stale(&self, timeout: std::time::Duration) {
        let events = self.store.lock().expire_stale(Instant::now(), timeout);
        self.publish(events);
    }
}

/// Shared by every clone of a [`Room`]; closes the connection when the last
/// one goes away
struct Owner(RoomTransport);

impl Drop for Owner {
    fn drop(&mut self) {
        self.0.shutdown();
    }
}

#[derive(Clone)]
pub struct Room {
    core: Arc<RoomCore>,
    transport: RoomTransport,
    _owner: Arc<Owner>,
}

impl Room {
    /// Room over WebSocket with the default threshold detector
    pub fn new(config: RoomConfig) -> Result<Self, ConfigError> {
        Self::with_parts(config, Arc::new(WsConnector), ThresholdDetector::default())
    }

    /// Room with an explicit connector and state-change detector
    pub fn with_parts(
        config: RoomConfig,
        connector: Arc<dyn Connector>,
        detector: impl StateChangeDetector + 'static,
    ) -> Result<Self, ConfigError> {
        let url = config.room_url()?;
        let core = Arc::new(RoomCore::new(config.room_id.clone(), Box::new(detector)));
        let transport = RoomTransport::new(core.clone(), connector, config, url);
        Ok(Self {
            core,
            _owner: Arc::new(Owner(transport.clone())),
            transport,
        })
    }

    /// Connect and join; resolves once joined, cancelled, or out of retries
    pub async fn connect(&self) -> ConnectionState {
        self.transport.connect().await
    }

    pub fn disconnect(&self) {
        self.transport.disconnect();
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.transport.phase()
    }

    pub fn room_id(&self) -> &str {
        self.core.room_id()
    }

    pub fn player(&self, id: &str) -> Option<PlayerState> {
        self.core.store.lock().get_player(id).cloned()
    }

    pub fn local_player(&self) -> Option<PlayerState> {
        self.core.store.lock().local_player().cloned()
    }

    /// Snapshot of every known player, local first
    pub fn all_players(&self) -> Vec<PlayerState> {
        self.core.store.lock().all_players()
    }

    /// Connected remote players
    pub fn remote_players(&self) -> Vec<PlayerState> {
        self.core
            .store
            .lock()
            .remote_players()
            .filter(|p| p.is_connected)
            .cloned()
            .collect()
    }

    /// Mutate the local player and transmit if the change is significant
    ///
    /// The mutator edits a copy of the current state; it must not call back
    /// into the room. While offline the view still changes but nothing is
    /// sent or queued.
    pub fn mutate_player<F>(&self, mutator: F) -> Mutation
    where
        F: FnOnce(&mut PlayerState),
    {
        let (outcome, event) = self.core.store.lock().mutate_local(mutator);
        self.core.publish(event);

        if let Some(state) = outcome.transmittable() {
            self.transport.send(state);
        }
        outcome
    }

    /// Send the current local state regardless of the detector
    pub fn resync(&self) -> bool {
        let state = self.core.store.lock().resync();
        match state {
            Some(state) => self.transport.send(&state),
            None => false,
        }
    }

    pub fn on<F>(&self, kind: RoomEventKind, handler: F) -> HandlerId
    where
        F: Fn(&RoomEvent) + Send + Sync + 'static,
    {
        self.core.events.on(kind, handler)
    }

    pub fn on_any<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(RoomEventKind, &RoomEvent) + Send + Sync + 'static,
    {
        self.core.events.on_any(handler)
    }

    pub fn off(&self, id: HandlerId) -> bool {
        self.core.events.off(id)
    }
}
