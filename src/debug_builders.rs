// ==============================================================================
// debug_builders.rs — VEHICLE TELEMETRY (SERVER -> CLIENT)
// ------------------------------------------------------------------------------
// Serializable per-frame view of the raycast vehicle:
// - DebugChassis: pose + box size
// - DebugRay: one suspension ray per wheel (origin, dir, reach, hit)
// - DebugWheel: numeric wheel state (contact, compression, load, slip)
//
// build_overlay() reads the vehicle's last update and the current chassis
// pose. Purely visualization scaffolding, no physics side effects.
// ==============================================================================

use rapier3d::prelude::*;
use serde::Serialize;

use crate::physics::PhysicsWorld;
use crate::suspension_contact::ray_length;
use crate::vehicle::{Vehicle, WheelState};

const WHEEL_IDS: [&str; 4] = ["FL", "FR", "RL", "RR"];
const RAY_HIT: [f32; 3] = [0.2, 0.9, 0.2];
const RAY_MISS: [f32; 3] = [0.9, 0.2, 0.2];

#[derive(Debug, Clone, Default, Serialize)]
pub struct DebugOverlay {
    pub chassis: Option<DebugChassis>,
    pub suspension_rays: Vec<DebugRay>,
    pub wheels: Vec<DebugWheel>,
    pub speed_kmh: f32,
    pub wheels_on_ground: usize,
    pub jumps: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DebugRay {
    pub origin: [f32; 3],
    pub direction: [f32; 3],
    pub length: f32,
    pub hit: Option<[f32; 3]>,
    pub color: [f32; 3],
}

#[derive(Debug, Clone, Serialize)]
pub struct DebugChassis {
    pub position: [f32; 3],
    pub rotation: [f32; 4], // quaternion xyzw
    pub half_extents: [f32; 3],
}

#[derive(Debug, Clone, Serialize)]
pub struct DebugWheel {
    pub id: String,
    pub center: [f32; 3],           // world space
    pub radius: f32,
    pub grounded: bool,
    pub compression: f32,
    pub suspension_force: f32,
    pub engine_force: f32,
    pub brake_force: f32,
    pub steer: f32,
    pub rotation: f32,
    pub skid: f32,
    pub sliding: bool,
    pub steering: bool,
    pub drive: bool,
}

impl DebugOverlay {
    pub fn clear(&mut self) {
        self.chassis = None;
        self.suspension_rays.clear();
        self.wheels.clear();
    }
}

fn wheel_id(index: usize) -> String {
    WHEEL_IDS.get(index).map(|s| s.to_string()).unwrap_or_else(|| format!("W{index}"))
}

fn suspension_ray(pose: &Isometry<Real>, wheel: &WheelState) -> DebugRay {
    let c = &wheel.config;
    let origin = pose * Point::from(Vector::from(c.connection_point));
    let direction = pose.rotation * Vector::from(c.direction).normalize();
    DebugRay {
        origin: origin.into(),
        direction: direction.into(),
        length: ray_length(c),
        hit: wheel.in_contact().then(|| wheel.contact.hit_point.into()),
        color: if wheel.in_contact() { RAY_HIT } else { RAY_MISS },
    }
}

pub fn push_wheel_debug(overlay: &mut DebugOverlay, index: usize, wheel: &WheelState, center: Point<Real>) {
    overlay.wheels.push(DebugWheel {
        id: wheel_id(index),
        center: center.into(),
        radius: wheel.config.radius,
        grounded: wheel.in_contact(),
        compression: wheel.compression(),
        suspension_force: wheel.suspension_force,
        engine_force: wheel.applied_engine_force,
        brake_force: wheel.applied_brake_force,
        steer: wheel.steering,
        rotation: wheel.rotation,
        skid: wheel.friction.skid,
        sliding: wheel.friction.sliding,
        steering: wheel.config.steerable,
        drive: wheel.config.driven,
    });
}

pub fn build_overlay(vehicle: &Vehicle, world: &PhysicsWorld, half_extents: [f32; 3]) -> DebugOverlay {
    let mut overlay = DebugOverlay {
        speed_kmh: vehicle.speed_kmh(world),
        wheels_on_ground: vehicle.wheels_on_ground(),
        jumps: vehicle.jumps_fired(),
        ..DebugOverlay::default()
    };
    let Some(pose) = world.pose(vehicle.chassis()) else {
        return overlay;
    };

    let q = pose.rotation.coords;
    overlay.chassis = Some(DebugChassis {
        position: pose.translation.vector.into(),
        rotation: [q.x, q.y, q.z, q.w],
        half_extents,
    });

    for (i, wheel) in vehicle.wheels().iter().enumerate() {
        overlay.suspension_rays.push(suspension_ray(&pose, wheel));
        let center = vehicle
            .wheel_transform(world, i)
            .map(|t| Point::from(t.translation.vector))
            .unwrap_or_else(Point::origin);
        push_wheel_debug(&mut overlay, i, wheel, center);
    }
    overlay
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorldConfig;
    use crate::vehicle::VehicleConfig;
    use rapier3d::na::Isometry3;

    #[test]
    fn overlay_lists_every_wheel_and_ray() {
        let mut world = PhysicsWorld::new(&WorldConfig::default());
        let config = VehicleConfig::default();
        let chassis = world.insert_body(&config.chassis_desc(), Isometry3::translation(0.0, 5.0, 0.0));
        let vehicle = Vehicle::new(&config, chassis).unwrap();

        let overlay = build_overlay(&vehicle, &world, config.chassis.half_extents);
        assert_eq!(overlay.wheels.len(), 4);
        assert_eq!(overlay.suspension_rays.len(), 4);
        assert_eq!(overlay.wheels[0].id, "FL");
        assert!(overlay.wheels[0].steering && !overlay.wheels[0].drive);
        assert!(overlay.suspension_rays.iter().all(|r| r.hit.is_none()));

        let json = serde_json::to_value(&overlay).unwrap();
        assert_eq!(json["wheels"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn missing_chassis_gives_empty_overlay() {
        let mut world = PhysicsWorld::new(&WorldConfig::default());
        let config = VehicleConfig::default();
        let chassis = world.insert_body(&config.chassis_desc(), Isometry3::identity());
        let vehicle = Vehicle::new(&config, chassis).unwrap();
        world.remove_body(chassis);

        let mut overlay = build_overlay(&vehicle, &world, config.chassis.half_extents);
        assert!(overlay.chassis.is_none());
        assert!(overlay.wheels.is_empty());
        overlay.clear();
    }
}
