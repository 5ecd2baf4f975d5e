// ==============================================================================
// body.rs — BODY DECLARATIONS (SCENE -> WORLD)
// ------------------------------------------------------------------------------
// Engine-agnostic description of a rigid body as scene population declares it:
// - mass (0 = fixed, >0 = dynamic)
// - one or more shape parts, each with a local offset
// - material + damping
//
// PhysicsWorld::insert_body() turns a BodyDesc into rapier bodies/colliders.
// Density is derived from mass / total shape volume, so compound shapes keep
// the requested total mass.
// ==============================================================================

use nalgebra::{Isometry3, UnitQuaternion, Vector3};
use rapier3d::prelude::*;
use serde::{Deserialize, Serialize};

/// Per-body sleep bookkeeping, mirrored from the world's post-step hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SleepState {
    Awake,
    Sleepy,
    Sleeping,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ShapeDesc {
    /// Box given by half extents.
    Box { half_extents: [Real; 3] },
    Sphere { radius: Real },
    /// Y-aligned cylinder.
    Cylinder { half_height: Real, radius: Real },
}

impl ShapeDesc {
    pub fn to_shared(&self) -> SharedShape {
        match *self {
            ShapeDesc::Box { half_extents: [hx, hy, hz] } => SharedShape::cuboid(hx, hy, hz),
            ShapeDesc::Sphere { radius } => SharedShape::ball(radius),
            ShapeDesc::Cylinder { half_height, radius } => SharedShape::cylinder(half_height, radius),
        }
    }

    /// Volume at unit density.
    pub fn volume(&self) -> Real {
        self.to_shared().mass_properties(1.0).mass()
    }
}

/// One collider of a (possibly compound) body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapePart {
    pub shape: ShapeDesc,
    pub offset: Isometry3<Real>,
}

impl ShapePart {
    pub fn centered(shape: ShapeDesc) -> Self {
        Self { shape, offset: Isometry3::identity() }
    }

    pub fn at(shape: ShapeDesc, x: Real, y: Real, z: Real) -> Self {
        Self {
            shape,
            offset: Isometry3::from_parts(Vector3::new(x, y, z).into(), UnitQuaternion::identity()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub friction: Real,
    pub restitution: Real,
}

impl Default for Material {
    fn default() -> Self {
        Self { friction: 0.3, restitution: 0.0 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BodyDesc {
    pub mass: Real,                  // kg, 0 = fixed
    pub shapes: Vec<ShapePart>,
    pub material: Material,
    pub linear_damping: Real,
    pub angular_damping: Real,
    pub can_sleep: bool,             // false = never put to sleep
}

impl BodyDesc {
    pub fn fixed(shapes: Vec<ShapePart>) -> Self {
        Self {
            mass: 0.0,
            shapes,
            material: Material::default(),
            linear_damping: 0.0,
            angular_damping: 0.0,
            can_sleep: true,
        }
    }

    pub fn dynamic(mass: Real, shapes: Vec<ShapePart>) -> Self {
        Self { mass, ..Self::fixed(shapes) }
    }

    pub fn with_material(mut self, friction: Real, restitution: Real) -> Self {
        self.material = Material { friction, restitution };
        self
    }

    pub fn with_damping(mut self, linear: Real, angular: Real) -> Self {
        self.linear_damping = linear;
        self.angular_damping = angular;
        self
    }

    pub fn never_sleep(mut self) -> Self {
        self.can_sleep = false;
        self
    }

    pub fn is_fixed(&self) -> bool {
        self.mass <= 0.0
    }

    /// ρ = m / V over all parts; 0 for fixed bodies or empty shape lists.
    pub fn density(&self) -> Real {
        let volume: Real = self.shapes.iter().map(|p| p.shape.volume()).sum();
        if self.is_fixed() || volume <= Real::EPSILON {
            0.0
        } else {
            self.mass / volume
        }
    }
}
