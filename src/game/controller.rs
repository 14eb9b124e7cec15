//! Per-frame movement of the local player against the rest of the room

use std::f32::consts::TAU;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::room::{PlayerState, Room};
use crate::util::time::{elapsed_secs, frame_interval, unix_millis};

use super::collision::{resolve_move, ArenaBounds, CollisionDebounce, Resolution};
use super::movement::{select_delta, InputDevice, MovementConfig, MovementState};
use super::scoring::{score_collision, CollisionResult, Impact, ScoringConfig};

/// Extension field holding a player's accumulated points
pub const POINTS_FIELD: &str = "points";
/// Extension field describing the player's latest scored collision
pub const COLLISION_FIELD: &str = "collision";

/// A scored collision, handed to the presentation callback
#[derive(Debug, Clone, PartialEq)]
pub struct CollisionEvent {
    pub other_id: String,
    pub result: CollisionResult,
    /// Midpoint between the two players at contact
    pub midpoint: (f32, f32),
}

pub type CollisionCallback = Arc<dyn Fn(&CollisionEvent) + Send + Sync>;

/// What a single frame did
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Not joined yet
    NoLocalPlayer,
    /// First frame, or elapsed time outside the sane range
    Skipped,
    /// No input and no residual speed
    Idle,
    Moved {
        x: f32,
        y: f32,
        resolution: Resolution,
        collision: Option<CollisionEvent>,
    },
}

struct ControllerState {
    movement: MovementState,
    last_tick: Option<Instant>,
    debounce: CollisionDebounce,
}

struct ControllerInner {
    room: Room,
    devices: Vec<Box<dyn InputDevice>>,
    config: MovementConfig,
    arena: ArenaBounds,
    scoring: ScoringConfig,
    on_collision: Option<CollisionCallback>,
    state: Mutex<ControllerState>,
    frame_task: Mutex<Option<JoinHandle<()>>>,
}

pub struct MovementControllerBuilder {
    room: Room,
    devices: Vec<Box<dyn InputDevice>>,
    config: MovementConfig,
    arena: ArenaBounds,
    scoring: ScoringConfig,
    on_collision: Option<CollisionCallback>,
}

impl MovementControllerBuilder {
    pub fn device(mut self, device: impl InputDevice + 'static) -> Self {
        self.devices.push(Box::new(device));
        self
    }

    pub fn config(mut self, config: MovementConfig) -> Self {
        self.config = config;
        self
    }

    pub fn arena(mut self, arena: ArenaBounds) -> Self {
        self.arena = arena;
        self
    }

    pub fn scoring(mut self, scoring: ScoringConfig) -> Self {
        self.scoring = scoring;
        self
    }

    pub fn on_collision<F>(mut self, callback: F) -> Self
    where
        F: Fn(&CollisionEvent) + Send + Sync + 'static,
    {
        self.on_collision = Some(Arc::new(callback));
        self
    }

    pub fn build(self) -> MovementController {
        MovementController {
            inner: Arc::new(ControllerInner {
                room: self.room,
                devices: self.devices,
                config: self.config,
                arena: self.arena,
                scoring: self.scoring,
                on_collision: self.on_collision,
                state: Mutex::new(ControllerState {
                    movement: MovementState::default(),
                    last_tick: None,
                    debounce: CollisionDebounce::new(self.config.rearm_distance),
                }),
                frame_task: Mutex::new(None),
            }),
        }
    }
}

/// Drives the local player from input devices, resolving collisions and
/// awarding collision points through [`Room::mutate_player`]
#[derive(Clone)]
pub struct MovementController {
    inner: Arc<ControllerInner>,
}

impl MovementController {
    pub fn builder(room: Room) -> MovementControllerBuilder {
        MovementControllerBuilder {
            room,
            devices: Vec::new(),
            config: MovementConfig::default(),
            arena: ArenaBounds::default(),
            scoring: ScoringConfig::default(),
            on_collision: None,
        }
    }

    /// Start the frame loop on the current runtime; no-op if running
    pub fn start(&self) {
        let mut task = self.inner.frame_task.lock();
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let weak = Arc::downgrade(&self.inner);
        *task = Some(tokio::spawn(frame_loop(weak)));
        info!(room_id = self.inner.room.room_id(), "Movement loop started");
    }

    /// Stop the frame loop and forget collision contacts; safe to repeat
    pub fn stop(&self) {
        if let Some(handle) = self.inner.frame_task.lock().take() {
            handle.abort();
            info!(room_id = self.inner.room.room_id(), "Movement loop stopped");
        }

        let mut state = self.inner.state.lock();
        state.debounce.clear();
        state.last_tick = None;
        state.movement = MovementState::default();
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .frame_task
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn movement_state(&self) -> MovementState {
        self.inner.state.lock().movement
    }

    /// Run one frame at `now`, deriving the elapsed time from the previous call
    pub fn tick(&self, now: Instant) -> TickOutcome {
        let previous = self.inner.state.lock().last_tick.replace(now);
        let Some(previous) = previous else {
            return TickOutcome::Skipped;
        };

        let dt = elapsed_secs(previous, now);
        if dt <= 0.0 || dt > self.inner.config.max_frame_gap {
            debug!(dt, "Skipping frame outside sane elapsed range");
            return TickOutcome::Skipped;
        }

        self.step(dt)
    }

    /// Run one frame of `dt` seconds
    pub fn step(&self, dt: f32) -> TickOutcome {
        let inner = &*self.inner;
        let Some(local) = inner.room.local_player() else {
            return TickOutcome::NoLocalPlayer;
        };
        let config = &inner.config;

        let mut state = inner.state.lock();
        let delta = select_delta(&inner.devices, &local, &state.movement, config, dt);
        state.movement.speed = delta.new_speed;

        if delta.is_zero() {
            return TickOutcome::Idle;
        }

        let heading = (local.heading() + delta.delta_rotation).rem_euclid(TAU);
        let half = (config.half_width, config.half_height);
        let from = (local.position.x, local.position.y);
        let to = inner.arena.clamp(
            from.0 + delta.delta_x,
            from.1 + delta.delta_y,
            half.0,
            half.1,
        );

        let others = inner.room.remote_players();
        let centers: Vec<(f32, f32)> = others
            .iter()
            .map(|p| (p.position.x, p.position.y))
            .collect();

        state.debounce.release_separated(
            from,
            others
                .iter()
                .map(|p| (p.id.as_str(), p.position.x, p.position.y)),
        );

        let resolved = resolve_move(from, to, half, &centers);

        let speed_fraction = (state.movement.speed.abs() / config.max_speed).clamp(0.0, 1.0);
        let turn_rate = delta.delta_rotation / dt;

        let collision = resolved
            .contacts
            .iter()
            .map(|&i| &others[i])
            .find(|victim| state.debounce.try_engage(&victim.id))
            .map(|victim| {
                let impact = Impact {
                    attacker_x: resolved.x,
                    attacker_y: resolved.y,
                    victim_x: victim.position.x,
                    victim_y: victim.position.y,
                    victim_heading: victim.heading(),
                    speed_fraction,
                    turn_rate,
                };
                CollisionEvent {
                    other_id: victim.id.clone(),
                    result: score_collision(&impact, &inner.scoring),
                    midpoint: (
                        (resolved.x + victim.position.x) / 2.0,
                        (resolved.y + victim.position.y) / 2.0,
                    ),
                }
            });
        drop(state);

        if let Some(hit) = &collision {
            info!(
                other_id = %hit.other_id,
                points = hit.result.total_points,
                zone = ?hit.result.zone,
                "Collision scored"
            );
        }

        inner.room.mutate_player(|player| {
            player.position.x = resolved.x;
            player.position.y = resolved.y;
            player.rotation.z = heading;
            if let Some(hit) = &collision {
                record_collision(player, hit);
            }
        });

        if let (Some(hit), Some(callback)) = (&collision, &inner.on_collision) {
            callback(hit);
        }

        TickOutcome::Moved {
            x: resolved.x,
            y: resolved.y,
            resolution: resolved.resolution,
            collision,
        }
    }
}

/// Accumulated points on a player, zero if absent
///
/// Peers may send the total as a float (`12.0`); it is rounded.
pub fn points_of(player: &PlayerState) -> u64 {
    player
        .ext(POINTS_FIELD)
        .and_then(Value::as_f64)
        .filter(|points| points.is_finite() && *points > 0.0)
        .map(|points| points.round() as u64)
        .unwrap_or(0)
}

fn record_collision(player: &mut PlayerState, hit: &CollisionEvent) {
    let points = points_of(player) + u64::from(hit.result.total_points);
    player.set_ext(POINTS_FIELD, points);
    player.set_ext(
        COLLISION_FIELD,
        json!({
            "with": hit.other_id,
            "points": hit.result.total_points,
            "x": hit.midpoint.0,
            "y": hit.midpoint.1,
            "at": unix_millis(),
        }),
    );
}

async fn frame_loop(controller: Weak<ControllerInner>) {
    let mut frames = interval(frame_interval());
    frames.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        frames.tick().await;
        let Some(inner) = controller.upgrade() else {
            break;
        };
        MovementController { inner }.tick(Instant::now());
    }
}
