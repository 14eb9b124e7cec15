//! Room event surface

pub mod emitter;

pub use emitter::{Event, EventEmitter, HandlerId};

use crate::net::TransportError;
use crate::room::PlayerState;

/// Everything a room publishes to application code
#[derive(Debug, Clone)]
pub enum RoomEvent {
    /// Join handshake completed
    Connected,
    /// Connection closed, by request or unexpectedly
    Disconnected,
    /// Connection failure surfaced after retries, or a server error indicator
    Error(TransportError),
    /// First time a player id is seen (local player included)
    PlayerJoined(PlayerState),
    /// Subsequent update of a known player
    PlayerUpdated(PlayerState),
    /// Local player changed enough to be transmitted
    PlayerMutated(PlayerState),
    /// Player removed; carries its last known state
    PlayerLeft(PlayerState),
    /// Raw inbound frame
    Rx(String),
    /// Raw outbound frame
    Tx(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomEventKind {
    Connected,
    Disconnected,
    Error,
    PlayerJoined,
    PlayerUpdated,
    PlayerMutated,
    PlayerLeft,
    Rx,
    Tx,
}

impl Event for RoomEvent {
    type Kind = RoomEventKind;

    fn kind(&self) -> RoomEventKind {
        match self {
            RoomEvent::Connected => RoomEventKind::Connected,
            RoomEvent::Disconnected => RoomEventKind::Disconnected,
            RoomEvent::Error(_) => RoomEventKind::Error,
            RoomEvent::PlayerJoined(_) => RoomEventKind::PlayerJoined,
            RoomEvent::PlayerUpdated(_) => RoomEventKind::PlayerUpdated,
            RoomEvent::PlayerMutated(_) => RoomEventKind::PlayerMutated,
            RoomEvent::PlayerLeft(_) => RoomEventKind::PlayerLeft,
            RoomEvent::Rx(_) => RoomEventKind::Rx,
            RoomEvent::Tx(_) => RoomEventKind::Tx,
        }
    }
}

impl RoomEvent {
    /// Player payload, if this event carries one
    pub fn player(&self) -> Option<&PlayerState> {
        match self {
            RoomEvent::PlayerJoined(p)
            | RoomEvent::PlayerUpdated(p)
            | RoomEvent::PlayerMutated(p)
            | RoomEvent::PlayerLeft(p) => Some(p),
            _ => None,
        }
    }
}
