//! Collision scoring - points for ramming another player

use std::f32::consts::{FRAC_PI_4, PI, TAU};

use serde::Serialize;

/// Scoring constants
#[derive(Debug, Clone, Copy)]
pub struct ScoringConfig {
    /// Floor of the speed-scaled base points
    pub base_min: u32,
    /// Base points at full speed
    pub base_max: u32,
    /// Bonus for hitting the victim's front
    pub front_bonus: u32,
    /// Bonus for hitting the victim's rear
    pub rear_bonus: u32,
    /// Bonus at or above the reference turn rate
    pub rotation_bonus_max: u32,
    /// Turn rate (rad/s) that earns the full rotation bonus
    pub rotation_reference_rate: f32,
    /// Turn rates at or below this earn nothing
    pub rotation_activation: f32,
    /// Absolute cap on the total
    pub total_max: u32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            base_min: 10,
            base_max: 30,
            front_bonus: 15,
            rear_bonus: 15 / 2,
            rotation_bonus_max: 5,
            rotation_reference_rate: 3.0,
            rotation_activation: 0.1,
            total_max: 50,
        }
    }
}

/// Where on the victim the impact landed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactZone {
    Front,
    Rear,
    Side,
}

/// Points awarded for one collision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CollisionResult {
    pub total_points: u32,
    pub base_points: u32,
    pub zone_bonus: u32,
    pub rotation_bonus: u32,
    pub zone: ImpactZone,
}

/// Geometry and attacker motion at the moment of impact
#[derive(Debug, Clone, Copy)]
pub struct Impact {
    pub attacker_x: f32,
    pub attacker_y: f32,
    pub victim_x: f32,
    pub victim_y: f32,
    /// Victim facing, radians
    pub victim_heading: f32,
    /// Attacker |speed| / max speed
    pub speed_fraction: f32,
    /// Attacker turn rate, rad/s (sign ignored)
    pub turn_rate: f32,
}

/// Wrap an angle into [-PI, PI)
fn wrap_angle(angle: f32) -> f32 {
    (angle + PI).rem_euclid(TAU) - PI
}

/// Classify the impact by the angle between the direction it came from and
/// the victim's facing
pub fn impact_zone(impact: &Impact) -> ImpactZone {
    let from_angle = (impact.attacker_y - impact.victim_y).atan2(impact.attacker_x - impact.victim_x);
    let offset = wrap_angle(from_angle - impact.victim_heading).abs();

    if offset <= FRAC_PI_4 {
        ImpactZone::Front
    } else if offset >= PI - FRAC_PI_4 {
        ImpactZone::Rear
    } else {
        ImpactZone::Side
    }
}

pub fn score_collision(impact: &Impact, config: &ScoringConfig) -> CollisionResult {
    let fraction = if impact.speed_fraction.is_finite() {
        impact.speed_fraction.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let base_points = ((config.base_max as f32 * fraction).round() as u32)
        .clamp(config.base_min, config.base_max);

    let zone = impact_zone(impact);
    let zone_bonus = match zone {
        ImpactZone::Front => config.front_bonus,
        ImpactZone::Rear => config.rear_bonus,
        ImpactZone::Side => 0,
    };

    let rate = impact.turn_rate.abs();
    let rotation_bonus = if rate.is_finite() && rate > config.rotation_activation {
        let scale = (rate / config.rotation_reference_rate).min(1.0);
        (config.rotation_bonus_max as f32 * scale).round() as u32
    } else {
        0
    };

    let total_points = (base_points + zone_bonus + rotation_bonus).min(config.total_max);

    CollisionResult {
        total_points,
        base_points,
        zone_bonus,
        rotation_bonus,
        zone,
    }
}
