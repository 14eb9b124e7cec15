//! State-change detection for outbound throttling

use super::player::PlayerState;

/// Decides whether a local mutation is significant enough to transmit
///
/// `baseline` is the last state handed to the network, `next` the candidate.
pub trait StateChangeDetector: Send + Sync {
    fn has_changed(&self, baseline: &PlayerState, next: &PlayerState) -> bool;
}

impl<F> StateChangeDetector for F
where
    F: Fn(&PlayerState, &PlayerState) -> bool + Send + Sync,
{
    fn has_changed(&self, baseline: &PlayerState, next: &PlayerState) -> bool {
        self(baseline, next)
    }
}

/// Position/rotation thresholds combined with OR; non-spatial changes always count
#[derive(Debug, Clone, Copy)]
pub struct ThresholdDetector {
    /// Minimum planar position delta (world units)
    pub position: f32,
    /// Minimum per-axis rotation delta (radians)
    pub rotation: f32,
}

impl Default for ThresholdDetector {
    fn default() -> Self {
        Self {
            position: 3.0,
            rotation: 0.05,
        }
    }
}

impl StateChangeDetector for ThresholdDetector {
    fn has_changed(&self, baseline: &PlayerState, next: &PlayerState) -> bool {
        if baseline.attributes_differ(next) {
            return true;
        }
        if baseline.position.planar_distance(&next.position) >= self.position {
            return true;
        }
        if (next.position.z - baseline.position.z).abs() >= self.position {
            return true;
        }
        baseline.rotation.max_angle_delta(&next.rotation) >= self.rotation
    }
}

/// Every difference counts
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyChange;

impl StateChangeDetector for AnyChange {
    fn has_changed(&self, baseline: &PlayerState, next: &PlayerState) -> bool {
        baseline != next
    }
}
