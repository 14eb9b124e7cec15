//! Player state shared between the store, the wire codec and the movement code

use std::f32::consts::TAU;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Three-component vector in room-local coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Distance in the x/y plane
    pub fn planar_distance(&self, other: &Vec3) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Largest per-component turn between two rotations, in radians
    ///
    /// Components are angles, so the short way round counts: 6.27 to 0.01
    /// is a turn of about 0.02.
    pub fn max_angle_delta(&self, other: &Vec3) -> f32 {
        angle_between(self.x, other.x)
            .max(angle_between(self.y, other.y))
            .max(angle_between(self.z, other.z))
    }
}

fn angle_between(a: f32, b: f32) -> f32 {
    let turn = (b - a).rem_euclid(TAU);
    turn.min(TAU - turn)
}

fn default_connected() -> bool {
    true
}

/// One participant in a room
///
/// Fields other than the fixed ones are carried in `extra` and serialized
/// flat next to them, so domain attributes (`points`, `collision`, ...)
/// round-trip without the sync layer knowing about them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    pub id: String,
    #[serde(default)]
    pub position: Vec3,
    #[serde(default)]
    pub rotation: Vec3,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub is_local: bool,
    #[serde(default = "default_connected")]
    pub is_connected: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PlayerState {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            color: String::new(),
            username: String::new(),
            is_local: false,
            is_connected: true,
            extra: Map::new(),
        }
    }

    pub fn with_position(mut self, x: f32, y: f32) -> Self {
        self.position.x = x;
        self.position.y = y;
        self
    }

    pub fn with_heading(mut self, radians: f32) -> Self {
        self.rotation.z = radians;
        self
    }

    /// Check the invariants every stored player must satisfy
    pub fn validate(&self) -> Result<(), InvalidPlayer> {
        if self.id.trim().is_empty() {
            return Err(InvalidPlayer::MissingId);
        }
        if !self.position.is_finite() {
            return Err(InvalidPlayer::NonFinite { field: "position" });
        }
        if !self.rotation.is_finite() {
            return Err(InvalidPlayer::NonFinite { field: "rotation" });
        }
        Ok(())
    }

    /// Heading used by movement and collision (rotation around z)
    pub fn heading(&self) -> f32 {
        self.rotation.z
    }

    pub fn ext(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    pub fn ext_f64(&self, key: &str) -> Option<f64> {
        self.extra.get(key).and_then(Value::as_f64)
    }

    pub fn set_ext(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.extra.insert(key.into(), value.into());
    }

    /// Whether anything besides position and rotation differs
    pub fn attributes_differ(&self, other: &PlayerState) -> bool {
        self.id != other.id
            || self.color != other.color
            || self.username != other.username
            || self.is_connected != other.is_connected
            || self.extra != other.extra
    }
}

/// Reasons a player payload is refused
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvalidPlayer {
    #[error("player id is missing or empty")]
    MissingId,

    #[error("player {field} contains a non-finite number")]
    NonFinite { field: &'static str },
}
