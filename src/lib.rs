//! Vibescale - real-time multiplayer room client
//!
//! - [`room::Room`]: connect to a room, read players, mutate the local player
//! - [`events`]: typed event subscription for room changes
//! - [`net`]: wire codec, connection lifecycle and reconnection policy
//! - [`game`]: per-frame movement with collision response and scoring

pub mod config;
pub mod events;
pub mod game;
pub mod net;
pub mod room;
pub mod util;

pub use config::{ConfigError, RoomConfig};
pub use events::{EventEmitter, HandlerId, RoomEvent, RoomEventKind};
pub use net::{ConnectionState, TransportError};
pub use room::{Mutation, PlayerState, Room, StateChangeDetector, ThresholdDetector, Vec3};
