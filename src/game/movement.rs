//! Input-driven movement: speed model, input devices and delta selection

use std::f32::consts::TAU;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::room::PlayerState;

/// Movement constants for the local player
#[derive(Debug, Clone, Copy)]
pub struct MovementConfig {
    /// Maximum forward speed (units per second)
    pub max_speed: f32,
    /// Rate at which speed ramps toward the target while input is held
    pub acceleration: f32,
    /// Rate at which speed decays toward zero while idle
    pub deceleration: f32,
    /// Turn rate in radians per second at full steer
    pub max_rotation_speed: f32,
    /// Fraction of `max_speed` reachable in reverse
    pub reverse_speed_factor: f32,
    /// Half width of every player's bounding box
    pub half_width: f32,
    /// Half height of every player's bounding box
    pub half_height: f32,
    /// Frames longer than this (seconds) are skipped, not integrated
    pub max_frame_gap: f32,
    /// Separation beyond which a scored pair may score again
    pub rearm_distance: f32,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            max_speed: 200.0,
            acceleration: 300.0,
            deceleration: 200.0,
            max_rotation_speed: 3.0,
            reverse_speed_factor: 0.5,
            half_width: 20.0,
            half_height: 20.0,
            max_frame_gap: 0.25,
            rearm_distance: 60.0,
        }
    }
}

/// Per-player movement state kept across frames, never synchronized
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MovementState {
    /// Signed scalar speed; negative is reverse
    pub speed: f32,
}

/// What one device proposes for one frame
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MovementDelta {
    pub delta_x: f32,
    pub delta_y: f32,
    pub delta_rotation: f32,
    pub new_speed: f32,
}

impl MovementDelta {
    /// Combined translational and rotational activity
    pub fn magnitude(&self) -> f32 {
        self.delta_x.abs() + self.delta_y.abs() + self.delta_rotation.abs()
    }

    pub fn is_zero(&self) -> bool {
        self.delta_x == 0.0 && self.delta_y == 0.0 && self.delta_rotation == 0.0
    }
}

/// A source of movement input (keyboard, on-screen joystick, bot, ...)
///
/// Must be a pure function of its arguments and its own input state.
pub trait InputDevice: Send + Sync {
    fn get_delta(
        &self,
        player: &PlayerState,
        movement: &MovementState,
        config: &MovementConfig,
        dt: f32,
    ) -> MovementDelta;
}

/// Speed ramp shared by the built-in devices
pub struct SpeedModel;

impl SpeedModel {
    /// Advance `current` one frame given a throttle in [-1, 1]
    pub fn advance(current: f32, throttle: f32, config: &MovementConfig, dt: f32) -> f32 {
        let throttle = throttle.clamp(-1.0, 1.0);

        if throttle != 0.0 {
            // Reverse is slower
            let target = if throttle > 0.0 {
                throttle * config.max_speed
            } else {
                throttle * config.max_speed * config.reverse_speed_factor
            };
            approach(current, target, config.acceleration * dt)
        } else {
            approach(current, 0.0, config.deceleration * dt)
        }
    }

    /// Delta for a heading, a speed input and a steer input in [-1, 1]
    pub fn integrate(
        heading: f32,
        current_speed: f32,
        throttle: f32,
        steer: f32,
        config: &MovementConfig,
        dt: f32,
    ) -> MovementDelta {
        let steer = steer.clamp(-1.0, 1.0);
        let delta_rotation = steer * config.max_rotation_speed * dt;
        let new_speed = Self::advance(current_speed, throttle, config, dt);

        let new_heading = (heading + delta_rotation).rem_euclid(TAU);
        MovementDelta {
            delta_x: new_heading.cos() * new_speed * dt,
            delta_y: new_heading.sin() * new_speed * dt,
            delta_rotation,
            new_speed,
        }
    }
}

fn approach(current: f32, target: f32, max_step: f32) -> f32 {
    if current < target {
        (current + max_step).min(target)
    } else {
        (current - max_step).max(target)
    }
}

/// Pick the most active device's delta for this frame
pub fn select_delta(
    devices: &[Box<dyn InputDevice>],
    player: &PlayerState,
    movement: &MovementState,
    config: &MovementConfig,
    dt: f32,
) -> MovementDelta {
    devices
        .iter()
        .map(|device| device.get_delta(player, movement, config, dt))
        .fold(None::<MovementDelta>, |best, delta| match best {
            Some(b) if b.magnitude() >= delta.magnitude() => Some(b),
            _ => Some(delta),
        })
        .unwrap_or(MovementDelta {
            new_speed: movement.speed,
            ..Default::default()
        })
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Axes {
    throttle: f32,
    steer: f32,
}

/// Throttle/steer axes in [-1, 1] written by an input adapter
///
/// Clones share the same axes, so one handle can live in the controller
/// while another is fed from key or joystick events.
#[derive(Debug, Clone, Default)]
pub struct AxisInput {
    axes: Arc<Mutex<Axes>>,
}

impl AxisInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, throttle: f32, steer: f32) {
        *self.axes.lock() = Axes {
            throttle: throttle.clamp(-1.0, 1.0),
            steer: steer.clamp(-1.0, 1.0),
        };
    }

    pub fn release(&self) {
        *self.axes.lock() = Axes::default();
    }

    pub fn axes(&self) -> (f32, f32) {
        let axes = *self.axes.lock();
        (axes.throttle, axes.steer)
    }
}

impl InputDevice for AxisInput {
    fn get_delta(
        &self,
        player: &PlayerState,
        movement: &MovementState,
        config: &MovementConfig,
        dt: f32,
    ) -> MovementDelta {
        let (throttle, steer) = self.axes();
        SpeedModel::integrate(player.heading(), movement.speed, throttle, steer, config, dt)
    }
}
