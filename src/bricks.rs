// ==============================================================================
// bricks.rs — BRICK STRUCTURES (PYRAMID / TOWER / ZIGZAG)
// ------------------------------------------------------------------------------
// A structure is a group node (position + yaw on the floor) whose children are
// bricks placed in group-local space. Layouts return *base* slots: the brick
// bottom centre in group space. brick_pose() lifts the slot by half a brick
// and adds the small hand-placed jitter (±0.015 m in x/z, ±0.1 rad yaw,
// ±0.025 rad pitch/roll) drawn from the arena RNG.
// ==============================================================================

use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};
use rand::Rng;
use rapier3d::prelude::Real;
use serde::{Deserialize, Serialize};

use crate::body::{BodyDesc, ShapeDesc, ShapePart};

pub const BRICK_W: Real = 0.575;
pub const BRICK_H: Real = 0.275;
pub const BRICK_D: Real = 0.2775;
pub const BRICK_MASS: Real = 8.0;
pub const BRICK_FRICTION: Real = 0.6;
pub const BRICK_RESTITUTION: Real = 0.3;

const PYRAMID_ROWS: usize = 7;
const TOWER_WIDTH: usize = 4;
const TOWER_ROWS: usize = 12;
const ZIGZAG_SEGMENTS: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    Pyramid,
    Tower,
    Zigzag,
}

impl Layout {
    pub fn name(&self) -> &'static str {
        match self {
            Layout::Pyramid => "pyramid",
            Layout::Tower => "tower",
            Layout::Zigzag => "zigzag",
        }
    }

    /// Unjittered brick base positions in group space.
    pub fn slots(&self) -> Vec<Vector3<Real>> {
        match self {
            Layout::Pyramid => pyramid_slots(),
            Layout::Tower => tower_slots(),
            Layout::Zigzag => zigzag_slots(),
        }
    }
}

/// One placed structure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BrickGroup {
    pub layout: Layout,
    pub x: Real,
    pub z: Real,
    pub rot_y: Real,
}

impl BrickGroup {
    pub const fn new(layout: Layout, x: Real, z: Real, rot_y: Real) -> Self {
        Self { layout, x, z, rot_y }
    }

    pub fn pose(&self) -> Isometry3<Real> {
        Isometry3::from_parts(
            Translation3::new(self.x, 0.0, self.z),
            UnitQuaternion::from_axis_angle(&Vector3::y_axis(), self.rot_y),
        )
    }
}

/// The arena's seven structures.
pub fn arena_groups() -> Vec<BrickGroup> {
    use std::f32::consts::PI;
    vec![
        BrickGroup::new(Layout::Pyramid, 1.0, -15.0, 0.0),
        BrickGroup::new(Layout::Zigzag, 15.0, -20.0, PI / 6.0),
        BrickGroup::new(Layout::Tower, -8.0, 10.0, 0.0),
        BrickGroup::new(Layout::Pyramid, -9.0, -3.0, PI / 4.0),
        BrickGroup::new(Layout::Zigzag, 14.0, 11.0, -PI * 0.25),
        BrickGroup::new(Layout::Tower, -17.5, -19.0, PI * 0.15),
        BrickGroup::new(Layout::Zigzag, -19.0, 13.0, PI * 0.25),
    ]
}

fn pyramid_slots() -> Vec<Vector3<Real>> {
    let mut slots = Vec::new();
    for row in 0..PYRAMID_ROWS {
        let count = PYRAMID_ROWS - row;
        let start_x = -(count as Real * BRICK_W) / 2.0 + BRICK_W / 2.0;
        let stagger = if row % 2 == 1 { BRICK_W / 2.0 } else { 0.0 };
        for i in 0..count {
            slots.push(Vector3::new(start_x + i as Real * BRICK_W + stagger, row as Real * BRICK_H, 0.0));
        }
    }
    slots
}

fn tower_slots() -> Vec<Vector3<Real>> {
    let mut slots = Vec::with_capacity(TOWER_WIDTH * TOWER_ROWS);
    let start_x = -((TOWER_WIDTH - 1) as Real * BRICK_W / 2.0);
    for row in 0..TOWER_ROWS {
        let offset = if row % 2 == 1 { BRICK_W / 2.0 } else { 0.0 };
        for i in 0..TOWER_WIDTH {
            slots.push(Vector3::new(start_x + i as Real * BRICK_W + offset, row as Real * BRICK_H, 0.0));
        }
    }
    slots
}

fn zigzag_slots() -> Vec<Vector3<Real>> {
    let mut slots = Vec::new();
    let (mut x, mut z, mut dir) = (0.0, 0.0, 1.0);
    for segment in 0..ZIGZAG_SEGMENTS {
        let height = 4 + segment % 3;
        for h in 0..height {
            for w in 0..2 {
                slots.push(Vector3::new(x + w as Real * BRICK_W, h as Real * BRICK_H, z));
            }
        }
        x += dir * 2.0 * BRICK_W;
        z += BRICK_D * 3.0;
        dir = -dir;
    }
    slots
}

/// Group-local brick pose for a base slot. `rng = None` places it exactly.
pub fn brick_pose<R: Rng + ?Sized>(slot: Vector3<Real>, rng: Option<&mut R>) -> Isometry3<Real> {
    let centre = Translation3::new(slot.x, slot.y + BRICK_H / 2.0, slot.z);
    let Some(rng) = rng else {
        return Isometry3::from_parts(centre, UnitQuaternion::identity());
    };

    let jx = rng.gen_range(-0.015..0.015);
    let jz = rng.gen_range(-0.015..0.015);
    let yaw = rng.gen_range(-0.1..0.1);
    let pitch = rng.gen_range(-0.025..0.025);
    let roll = rng.gen_range(-0.025..0.025);

    Isometry3::from_parts(
        Translation3::new(centre.x + jx, centre.y, centre.z + jz),
        euler_xyz(pitch, yaw, roll),
    )
}

/// Intrinsic X-then-Y-then-Z rotation.
pub fn euler_xyz(x: Real, y: Real, z: Real) -> UnitQuaternion<Real> {
    UnitQuaternion::from_axis_angle(&Vector3::x_axis(), x)
        * UnitQuaternion::from_axis_angle(&Vector3::y_axis(), y)
        * UnitQuaternion::from_axis_angle(&Vector3::z_axis(), z)
}

pub fn brick_desc() -> BodyDesc {
    BodyDesc::dynamic(
        BRICK_MASS,
        vec![ShapePart::centered(ShapeDesc::Box {
            half_extents: [BRICK_W / 2.0, BRICK_H / 2.0, BRICK_D / 2.0],
        })],
    )
    .with_material(BRICK_FRICTION, BRICK_RESTITUTION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn pyramid_has_descending_rows() {
        let slots = Layout::Pyramid.slots();
        assert_eq!(slots.len(), 7 + 6 + 5 + 4 + 3 + 2 + 1);
        let top = slots.last().unwrap();
        assert_relative_eq!(top.y, 6.0 * BRICK_H);
        // odd row count 1 -> centred, even-index row 6 has no stagger
        assert_relative_eq!(top.x, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn tower_is_four_by_twelve_and_staggered() {
        let slots = Layout::Tower.slots();
        assert_eq!(slots.len(), 48);
        assert_relative_eq!(slots[0].x, -1.5 * BRICK_W, epsilon = 1e-6);
        assert_relative_eq!(slots[4].x, -1.5 * BRICK_W + BRICK_W / 2.0, epsilon = 1e-6);
    }

    #[test]
    fn zigzag_segments_alternate() {
        let slots = Layout::Zigzag.slots();
        // heights 4,5,6,4,5,6,4 two bricks wide
        assert_eq!(slots.len(), 2 * (4 + 5 + 6 + 4 + 5 + 6 + 4));
        let second = slots[8];
        assert_relative_eq!(second.x, 2.0 * BRICK_W, epsilon = 1e-6);
        assert_relative_eq!(second.z, 3.0 * BRICK_D, epsilon = 1e-6);
    }

    #[test]
    fn exact_pose_sits_on_the_slot() {
        let pose = brick_pose::<StdRng>(Vector3::new(1.0, 0.0, 2.0), None);
        assert_relative_eq!(pose.translation.vector, Vector3::new(1.0, BRICK_H / 2.0, 2.0));
        assert_eq!(pose.rotation, UnitQuaternion::identity());
    }

    #[test]
    fn jitter_is_small_and_seeded() {
        let mut a = StdRng::seed_from_u64(3);
        let mut b = StdRng::seed_from_u64(3);
        let slot = Vector3::new(0.0, BRICK_H, 0.0);
        let pa = brick_pose(slot, Some(&mut a));
        let pb = brick_pose(slot, Some(&mut b));
        assert_eq!(pa, pb);
        assert!(pa.translation.x.abs() <= 0.015);
        assert_relative_eq!(pa.translation.y, 1.5 * BRICK_H);
        assert!(pa.rotation.angle() < 0.2);
    }

    #[test]
    fn seven_arena_groups() {
        let groups = arena_groups();
        assert_eq!(groups.len(), 7);
        assert_eq!(groups.iter().filter(|g| g.layout == Layout::Tower).count(), 2);
    }
}
