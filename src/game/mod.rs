//! Local movement, collision response and collision scoring

pub mod collision;
pub mod controller;
pub mod movement;
pub mod scoring;

pub use collision::{Aabb, ArenaBounds, CollisionDebounce, Resolution, ResolvedMove};
pub use controller::{
    points_of, CollisionEvent, MovementController, MovementControllerBuilder, TickOutcome,
    COLLISION_FIELD, POINTS_FIELD,
};
pub use movement::{
    AxisInput, InputDevice, MovementConfig, MovementDelta, MovementState, SpeedModel,
};
pub use scoring::{CollisionResult, Impact, ImpactZone, ScoringConfig};
