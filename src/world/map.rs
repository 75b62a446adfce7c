//! Arena geometry
//!
//! The engine's environment model: rectangular bounds, line-of-sight blocking
//! pillars, and the indoor/arena flags consulted by environment checks.

use bevy::prelude::*;

/// A cylindrical line-of-sight blocker.
#[derive(Clone, Copy, Debug)]
pub struct Pillar {
    pub x: f32,
    pub z: f32,
    pub radius: f32,
}

/// The arena the simulation runs in.
#[derive(Resource, Clone)]
pub struct ArenaMap {
    pub name: String,
    /// Half-extent on X; positions outside the bounds are unreachable.
    pub half_x: f32,
    /// Half-extent on Z.
    pub half_z: f32,
    pub indoor: bool,
    /// Arena-rule instances refuse spells flagged `not_in_arena`.
    pub is_arena: bool,
    pub pillars: Vec<Pillar>,
}

impl Default for ArenaMap {
    fn default() -> Self {
        Self {
            name: "BasicArena".to_string(),
            half_x: 36.5,
            half_z: 21.5,
            indoor: false,
            is_arena: true,
            pillars: vec![
                Pillar {
                    x: -10.0,
                    z: 6.0,
                    radius: 2.0,
                },
                Pillar {
                    x: 10.0,
                    z: -6.0,
                    radius: 2.0,
                },
            ],
        }
    }
}

impl ArenaMap {
    pub fn contains(&self, pos: Vec3) -> bool {
        pos.x.abs() <= self.half_x && pos.z.abs() <= self.half_z
    }

    /// Line of sight test in the XZ plane: blocked when the segment between
    /// the two points passes through any pillar.
    pub fn line_of_sight(&self, from: Vec3, to: Vec3) -> bool {
        let a = Vec2::new(from.x, from.z);
        let b = Vec2::new(to.x, to.z);
        for pillar in &self.pillars {
            if segment_intersects_circle(a, b, Vec2::new(pillar.x, pillar.z), pillar.radius) {
                return false;
            }
        }
        true
    }
}

/// Whether segment a-b passes within `radius` of `center`.
fn segment_intersects_circle(a: Vec2, b: Vec2, center: Vec2, radius: f32) -> bool {
    let ab = b - a;
    let len_sq = ab.length_squared();
    let t = if len_sq <= f32::EPSILON {
        0.0
    } else {
        ((center - a).dot(ab) / len_sq).clamp(0.0, 1.0)
    };
    let closest = a + ab * t;
    center.distance_squared(closest) <= radius * radius
}
