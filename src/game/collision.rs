//! Collision detection and response between player bounding boxes

use std::collections::HashSet;

/// Axis-aligned bounding box around a player's center
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub center_x: f32,
    pub center_y: f32,
    pub half_width: f32,
    pub half_height: f32,
}

impl Aabb {
    pub fn around(x: f32, y: f32, half_width: f32, half_height: f32) -> Self {
        Self {
            center_x: x,
            center_y: y,
            half_width,
            half_height,
        }
    }

    /// Strict overlap; boxes that only touch do not collide
    pub fn overlaps(&self, other: &Aabb) -> bool {
        (self.center_x - other.center_x).abs() < self.half_width + other.half_width
            && (self.center_y - other.center_y).abs() < self.half_height + other.half_height
    }
}

/// Rectangular playing field
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArenaBounds {
    pub min_x: f32,
    pub max_x: f32,
    pub min_y: f32,
    pub max_y: f32,
}

impl Default for ArenaBounds {
    fn default() -> Self {
        Self {
            min_x: -500.0,
            max_x: 500.0,
            min_y: -500.0,
            max_y: 500.0,
        }
    }
}

impl ArenaBounds {
    /// Clamp a center so the whole box stays inside the arena
    pub fn clamp(&self, x: f32, y: f32, half_width: f32, half_height: f32) -> (f32, f32) {
        (
            clamp_axis(x, self.min_x + half_width, self.max_x - half_width),
            clamp_axis(y, self.min_y + half_height, self.max_y - half_height),
        )
    }
}

// Arena narrower than the box pins the center to the middle.
fn clamp_axis(value: f32, lo: f32, hi: f32) -> f32 {
    if lo > hi {
        (lo + hi) / 2.0
    } else {
        value.clamp(lo, hi)
    }
}

/// How a proposed move was settled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// No overlap
    Free,
    /// Overlapping, but moving apart; allowed unmodified
    Disengaging,
    /// Only the x component was kept
    SlidX,
    /// Only the y component was kept
    SlidY,
    /// Both axes blocked; previous position kept
    Blocked,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMove {
    pub x: f32,
    pub y: f32,
    pub resolution: Resolution,
    /// Indices into `others` that blocked the full move
    pub contacts: Vec<usize>,
}

fn distance(a: (f32, f32), b: (f32, f32)) -> f32 {
    let dx = b.0 - a.0;
    let dy = b.1 - a.1;
    (dx * dx + dy * dy).sqrt()
}

/// Others that `candidate` overlaps without moving away from them
fn blockers(
    from: (f32, f32),
    candidate: (f32, f32),
    half: (f32, f32),
    others: &[(f32, f32)],
) -> Vec<usize> {
    let mover = Aabb::around(candidate.0, candidate.1, half.0, half.1);
    others
        .iter()
        .enumerate()
        .filter(|&(_, &other)| {
            mover.overlaps(&Aabb::around(other.0, other.1, half.0, half.1))
                && distance(candidate, other) <= distance(from, other)
        })
        .map(|(i, _)| i)
        .collect()
}

/// Resolve a move from `from` to `to` against the other players' centers
///
/// A move into someone is retried per axis; the axis that frees the mover is
/// kept. When both would, the larger component wins.
pub fn resolve_move(
    from: (f32, f32),
    to: (f32, f32),
    half: (f32, f32),
    others: &[(f32, f32)],
) -> ResolvedMove {
    let contacts = blockers(from, to, half, others);

    if contacts.is_empty() {
        let mover = Aabb::around(to.0, to.1, half.0, half.1);
        let touching = others
            .iter()
            .any(|o| mover.overlaps(&Aabb::around(o.0, o.1, half.0, half.1)));
        return ResolvedMove {
            x: to.0,
            y: to.1,
            resolution: if touching {
                Resolution::Disengaging
            } else {
                Resolution::Free
            },
            contacts,
        };
    }

    let x_only = (to.0, from.1);
    let y_only = (from.0, to.1);
    let x_ok = x_only != from && blockers(from, x_only, half, others).is_empty();
    let y_ok = y_only != from && blockers(from, y_only, half, others).is_empty();

    let take_x = match (x_ok, y_ok) {
        (true, true) => (to.0 - from.0).abs() >= (to.1 - from.1).abs(),
        (true, false) => true,
        (false, true) => false,
        (false, false) => {
            return ResolvedMove {
                x: from.0,
                y: from.1,
                resolution: Resolution::Blocked,
                contacts,
            }
        }
    };

    let (pos, resolution) = if take_x {
        (x_only, Resolution::SlidX)
    } else {
        (y_only, Resolution::SlidY)
    };

    ResolvedMove {
        x: pos.0,
        y: pos.1,
        resolution,
        contacts,
    }
}

/// Suppresses repeated scoring while a pair stays in contact
#[derive(Debug, Clone)]
pub struct CollisionDebounce {
    rearm_distance: f32,
    engaged: HashSet<String>,
}

impl CollisionDebounce {
    pub fn new(rearm_distance: f32) -> Self {
        Self {
            rearm_distance,
            engaged: HashSet::new(),
        }
    }

    /// Arm a score against `other`; false if that pair is still engaged
    pub fn try_engage(&mut self, other: &str) -> bool {
        self.engaged.insert(other.to_string())
    }

    /// Release pairs that separated beyond the re-arm distance or vanished
    pub fn release_separated<'a>(
        &mut self,
        local: (f32, f32),
        others: impl IntoIterator<Item = (&'a str, f32, f32)>,
    ) {
        let near: HashSet<&str> = others
            .into_iter()
            .filter(|(_, x, y)| distance(local, (*x, *y)) <= self.rearm_distance)
            .map(|(id, _, _)| id)
            .collect();
        self.engaged.retain(|id| near.contains(id.as_str()));
    }

    pub fn is_engaged(&self, other: &str) -> bool {
        self.engaged.contains(other)
    }

    pub fn clear(&mut self) {
        self.engaged.clear();
    }
}
