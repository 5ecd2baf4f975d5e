// ==============================================================================
// vehicle.rs — RAYCAST VEHICLE (CHASSIS + 4 RAY WHEELS)
// ------------------------------------------------------------------------------
// update() runs once per physics substep, before the world integrates:
//
//   1) wheel frames      connection point / suspension dir / steered axle
//                        taken from the chassis pose
//   2) rays              suspension_contact::probe_wheel() per wheel
//   3) suspension        spring+damper impulse along the contact normal
//   4) friction          tire::solve_friction() -> forward + side impulses,
//                        side lever arm scaled by roll influence, reaction
//                        pushed into dynamic ground bodies
//   5) jump              consumes a pending request; fires only with enough
//                        wheels on the ground
//   6) wheel spin        rolling speed, or the custom sliding speed while a
//                        driven wheel slides / hangs in the air
//
// Engine and brake commands last exactly one update. Wheel world transforms are
// never stored; wheel_transform() derives them from the chassis pose and the
// last suspension length whenever asked.
//
// Axis convention (defaults): suspension dir -Y, axle -Z, forward = up × axle
// = -X, left = +Z. Positive engine force drives forward, positive steer turns
// left.
// ==============================================================================

use std::f32::consts::TAU;

use rapier3d::na::{Isometry3, Point3, UnitQuaternion, Vector3};
use rapier3d::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::body::{BodyDesc, ShapeDesc, ShapePart};
use crate::error::{Result, SandboxError};
use crate::physics::PhysicsWorld;
use crate::suspension_contact::{SuspensionContact, compute_suspension_force, probe_wheel};
use crate::tire::friction::FrictionInput;
use crate::tire::kinematics::safe_normalize;
use crate::tire::steering::steer_rotation;
use crate::tire::{WheelFriction, solve_friction};

pub const WHEEL_COUNT: usize = 4;
const SPIN_DECAY: Real = 0.99;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WheelConfig {
    pub connection_point: [Real; 3],   // chassis local
    pub direction: [Real; 3],          // chassis local, suspension travel
    pub axle: [Real; 3],               // chassis local
    pub radius: Real,
    pub suspension_rest_length: Real,
    pub suspension_stiffness: Real,
    pub damping_compression: Real,
    pub damping_relaxation: Real,
    pub max_suspension_travel: Real,
    pub max_suspension_force: Real,
    pub friction_slip: Real,
    pub roll_influence: Real,
    /// Demand / budget ratio above which the wheel counts as sliding.
    pub sliding_threshold: Real,
    /// Spin (rad/s) forced onto a driven wheel while it slides or hangs free.
    pub custom_sliding_rotational_speed: Option<Real>,
    pub steerable: bool,
    pub driven: bool,
}

impl Default for WheelConfig {
    fn default() -> Self {
        Self {
            connection_point: [0.0, 0.0, 0.0],
            direction: [0.0, -1.0, 0.0],
            axle: [0.0, 0.0, -1.0],
            radius: 0.17,
            suspension_rest_length: 0.4,
            suspension_stiffness: 45.0,
            damping_compression: 4.4,
            damping_relaxation: 2.3,
            max_suspension_travel: 0.3,
            max_suspension_force: 200_000.0,
            friction_slip: 6.0,
            roll_influence: 0.01,
            sliding_threshold: 1.0,
            custom_sliding_rotational_speed: Some(30.0),
            steerable: false,
            driven: false,
        }
    }
}

fn finite3(v: &[Real; 3]) -> bool {
    v.iter().all(|c| c.is_finite())
}

impl WheelConfig {
    pub fn validate(&self, index: usize) -> Result<()> {
        let fail = |reason: String| Err(SandboxError::invalid_wheel(index, reason));

        let scalars = [
            ("radius", self.radius),
            ("suspension_rest_length", self.suspension_rest_length),
            ("suspension_stiffness", self.suspension_stiffness),
            ("max_suspension_force", self.max_suspension_force),
            ("sliding_threshold", self.sliding_threshold),
        ];
        for (name, value) in scalars {
            if !value.is_finite() || value <= 0.0 {
                return fail(format!("{name} must be positive, got {value}"));
            }
        }

        let non_negative = [
            ("damping_compression", self.damping_compression),
            ("damping_relaxation", self.damping_relaxation),
            ("max_suspension_travel", self.max_suspension_travel),
            ("friction_slip", self.friction_slip),
            ("roll_influence", self.roll_influence),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return fail(format!("{name} must be non-negative, got {value}"));
            }
        }

        if let Some(speed) = self.custom_sliding_rotational_speed {
            if !speed.is_finite() {
                return fail("custom_sliding_rotational_speed must be finite".to_string());
            }
        }
        if !finite3(&self.connection_point) {
            return fail("connection_point must be finite".to_string());
        }

        let dir = Vector3::from(self.direction);
        let axle = Vector3::from(self.axle);
        if !finite3(&self.direction) || dir.norm() < 1e-6 {
            return fail("direction must be a non-zero vector".to_string());
        }
        if !finite3(&self.axle) || axle.norm() < 1e-6 {
            return fail("axle must be a non-zero vector".to_string());
        }
        if dir.normalize().cross(&axle.normalize()).norm() < 1e-3 {
            return fail("axle must not be parallel to the suspension direction".to_string());
        }
        Ok(())
    }

    fn direction_local(&self) -> Vector3<Real> {
        Vector3::from(self.direction).normalize()
    }

    fn axle_local(&self) -> Vector3<Real> {
        Vector3::from(self.axle).normalize()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChassisConfig {
    pub half_extents: [Real; 3],
    pub mass: Real,
    pub linear_damping: Real,
    pub angular_damping: Real,
    pub friction: Real,
    pub restitution: Real,
    pub can_sleep: bool,
}

impl Default for ChassisConfig {
    fn default() -> Self {
        Self {
            half_extents: [0.75, 0.125, 0.375],
            mass: 800.0,
            linear_damping: 0.01,
            angular_damping: 0.01,
            friction: 0.3,
            restitution: 0.0,
            can_sleep: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    pub chassis: ChassisConfig,
    pub wheels: Vec<WheelConfig>,  // FL, FR, RL, RR
    pub jump_impulse: Real,        // N·s, straight up at the center of mass
    pub jump_min_wheels: usize,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        let chassis = ChassisConfig::default();
        let (half_base, half_track) = (0.3375, 0.525);
        let wheel = |x: Real, z: Real, front: bool| WheelConfig {
            connection_point: [x, -0.3, z],
            steerable: front,
            driven: !front,
            ..WheelConfig::default()
        };
        Self {
            chassis,
            wheels: vec![
                wheel(-half_base, half_track, true),
                wheel(-half_base, -half_track, true),
                wheel(half_base, half_track, false),
                wheel(half_base, -half_track, false),
            ],
            jump_impulse: 1200.0,
            jump_min_wheels: 3,
        }
    }
}

impl VehicleConfig {
    pub fn validate(&self) -> Result<()> {
        if self.wheels.len() != WHEEL_COUNT {
            return Err(SandboxError::invalid_config(format!(
                "vehicle needs exactly {WHEEL_COUNT} wheels, got {}",
                self.wheels.len()
            )));
        }
        for (i, wheel) in self.wheels.iter().enumerate() {
            wheel.validate(i)?;
        }

        let c = &self.chassis;
        if !c.mass.is_finite() || c.mass <= 0.0 {
            return Err(SandboxError::invalid_config(format!("chassis mass must be positive, got {}", c.mass)));
        }
        if !c.half_extents.iter().all(|h| h.is_finite() && *h > 0.0) {
            return Err(SandboxError::invalid_config("chassis half extents must be positive"));
        }
        if c.linear_damping < 0.0 || c.angular_damping < 0.0 {
            return Err(SandboxError::invalid_config("chassis damping must be non-negative"));
        }
        if !self.jump_impulse.is_finite() || self.jump_impulse < 0.0 {
            return Err(SandboxError::invalid_config("jump_impulse must be non-negative"));
        }
        if self.jump_min_wheels > WHEEL_COUNT {
            return Err(SandboxError::invalid_config(format!(
                "jump_min_wheels cannot exceed {WHEEL_COUNT}"
            )));
        }
        Ok(())
    }

    /// Body declaration for the chassis node.
    pub fn chassis_desc(&self) -> BodyDesc {
        let c = &self.chassis;
        let desc = BodyDesc::dynamic(
            c.mass,
            vec![ShapePart::centered(ShapeDesc::Box { half_extents: c.half_extents })],
        )
        .with_material(c.friction, c.restitution)
        .with_damping(c.linear_damping, c.angular_damping);
        if c.can_sleep { desc } else { desc.never_sleep() }
    }
}

/// Runtime state of one wheel.
#[derive(Debug, Clone)]
pub struct WheelState {
    pub config: WheelConfig,

    // commands (one update only)
    pub engine_force: Real,
    pub brake_force: Real,
    pub steering: Real,

    // what the last update used
    pub applied_engine_force: Real,
    pub applied_brake_force: Real,

    // derived per update
    pub contact: SuspensionContact,
    pub suspension_force: Real,
    pub friction: WheelFriction,
    pub rotation: Real,
    pub delta_rotation: Real,
}

impl WheelState {
    fn new(config: WheelConfig) -> Self {
        let dir = config.direction_local();
        let contact = SuspensionContact::airborne(&config, Point3::from(Vector3::from(config.connection_point)), dir);
        Self {
            config,
            engine_force: 0.0,
            brake_force: 0.0,
            steering: 0.0,
            applied_engine_force: 0.0,
            applied_brake_force: 0.0,
            contact,
            suspension_force: 0.0,
            friction: WheelFriction::default(),
            rotation: 0.0,
            delta_rotation: 0.0,
        }
    }

    pub fn in_contact(&self) -> bool {
        self.contact.in_contact
    }

    pub fn compression(&self) -> Real {
        self.contact.compression(&self.config)
    }

    fn up_local(&self) -> Vector3<Real> {
        -self.config.direction_local()
    }

    /// Steered axle in chassis space.
    fn steered_axle_local(&self) -> Vector3<Real> {
        steer_rotation(&self.up_local(), self.steering) * self.config.axle_local()
    }

    /// Wheel pose in chassis space: hub at connection + dir * length,
    /// oriented by steering about up, then spin about the axle.
    fn local_transform(&self) -> Isometry3<Real> {
        let c = &self.config;
        let hub = Point3::from(Vector3::from(c.connection_point)) + c.direction_local() * self.contact.suspension_length;
        let steer = steer_rotation(&self.up_local(), self.steering);
        let spin = UnitQuaternion::from_scaled_axis(c.axle_local() * self.rotation);
        Isometry3::from_parts(hub.coords.into(), steer * spin)
    }
}

/// What one vehicle update did.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VehicleStep {
    pub wheels_on_ground: usize,
    pub sliding_wheels: usize,
    pub jumped: bool,
    pub suspension_force: Real,   // summed over wheels
}

#[derive(Debug, Clone)]
pub struct Vehicle {
    chassis: RigidBodyHandle,
    wheels: Vec<WheelState>,
    forward_local: Vector3<Real>,
    jump_impulse: Real,
    jump_min_wheels: usize,
    jump_requested: bool,
    jumps_fired: u64,
    wheels_on_ground: usize,
}

impl Vehicle {
    /// Validates every wheel before anything is built.
    pub fn new(config: &VehicleConfig, chassis: RigidBodyHandle) -> Result<Self> {
        config.validate()?;
        let wheels: Vec<WheelState> = config.wheels.iter().cloned().map(WheelState::new).collect();
        let first = &wheels[0];
        let forward_local = safe_normalize(first.up_local().cross(&first.config.axle_local()))
            .ok_or_else(|| SandboxError::invalid_wheel(0, "axle and direction give no forward axis"))?;

        Ok(Self {
            chassis,
            wheels,
            forward_local,
            jump_impulse: config.jump_impulse,
            jump_min_wheels: config.jump_min_wheels,
            jump_requested: false,
            jumps_fired: 0,
            wheels_on_ground: 0,
        })
    }

    pub fn chassis(&self) -> RigidBodyHandle {
        self.chassis
    }

    pub fn wheels(&self) -> &[WheelState] {
        &self.wheels
    }

    pub fn wheel(&self, index: usize) -> Option<&WheelState> {
        self.wheels.get(index)
    }

    pub fn wheels_on_ground(&self) -> usize {
        self.wheels_on_ground
    }

    pub fn jumps_fired(&self) -> u64 {
        self.jumps_fired
    }

    pub fn jump_pending(&self) -> bool {
        self.jump_requested
    }

    fn wheel_mut(&mut self, index: usize) -> Result<&mut WheelState> {
        self.wheels
            .get_mut(index)
            .ok_or_else(|| SandboxError::invalid_wheel(index, format!("no such wheel, vehicle has {}", WHEEL_COUNT)))
    }

    /// Forward tangential force for the next update only.
    pub fn apply_engine_force(&mut self, force: Real, index: usize) -> Result<()> {
        self.wheel_mut(index)?.engine_force = if force.is_finite() { force } else { 0.0 };
        Ok(())
    }

    /// Steering angle (radians) about the wheel's up axis.
    pub fn set_steering_value(&mut self, angle: Real, index: usize) -> Result<()> {
        self.wheel_mut(index)?.steering = if angle.is_finite() { angle } else { 0.0 };
        Ok(())
    }

    /// Brake force magnitude for the next update only.
    pub fn set_brake(&mut self, force: Real, index: usize) -> Result<()> {
        self.wheel_mut(index)?.brake_force = if force.is_finite() { force.abs() } else { 0.0 };
        Ok(())
    }

    /// Arm a jump. The next update consumes it whether or not it fires.
    pub fn request_jump(&mut self) {
        self.jump_requested = true;
    }

    /// Signed speed along the chassis forward axis (m/s).
    pub fn forward_speed(&self, world: &PhysicsWorld) -> Real {
        world
            .body(self.chassis)
            .map(|b| b.linvel().dot(&(b.position().rotation * self.forward_local)))
            .unwrap_or(0.0)
    }

    pub fn speed_kmh(&self, world: &PhysicsWorld) -> Real {
        3.6 * self.forward_speed(world)
    }

    /// World pose of a wheel from the current chassis pose.
    pub fn wheel_transform(&self, world: &PhysicsWorld, index: usize) -> Option<Isometry3<Real>> {
        let chassis = world.pose(self.chassis)?;
        let wheel = self.wheels.get(index)?;
        Some(chassis * wheel.local_transform())
    }

    /// One substep of raycast vehicle dynamics. Call before the world steps.
    pub fn update(&mut self, world: &mut PhysicsWorld, dt: Real) -> VehicleStep {
        let mut report = VehicleStep::default();
        world.refresh_queries();

        let Some((pose, mass)) = world.body(self.chassis).map(|b| (*b.position(), b.mass())) else {
            self.clear_commands();
            return report;
        };
        if !pose.translation.vector.iter().all(|c| c.is_finite()) {
            self.clear_commands();
            return report;
        }

        let driving = self.wheels.iter().any(|w| w.engine_force != 0.0);
        if driving && world.body(self.chassis).is_some_and(|b| b.is_sleeping()) {
            world.wake(self.chassis);
        }

        // --------------------------------------------------------------
        // 1) + 2) wheel frames and rays
        // --------------------------------------------------------------
        let rot = pose.rotation;
        let mut frames: Vec<(Point<Real>, Vector<Real>, Vector<Real>)> = Vec::with_capacity(self.wheels.len());
        for wheel in self.wheels.iter_mut() {
            let origin = pose * Point3::from(Vector3::from(wheel.config.connection_point));
            let dir = rot * wheel.config.direction_local();
            let axle = rot * wheel.steered_axle_local();
            wheel.contact = probe_wheel(world, self.chassis, origin, dir, &wheel.config);
            frames.push((origin, dir, axle));
        }
        self.wheels_on_ground = self.wheels.iter().filter(|w| w.in_contact()).count();
        report.wheels_on_ground = self.wheels_on_ground;

        // --------------------------------------------------------------
        // 3) suspension impulses
        // --------------------------------------------------------------
        let mut impulses: Vec<(RigidBodyHandle, Vector<Real>, Option<Point<Real>>)> = Vec::new();
        for wheel in self.wheels.iter_mut() {
            wheel.suspension_force = compute_suspension_force(&wheel.contact, &wheel.config, mass);
            report.suspension_force += wheel.suspension_force;
            if wheel.suspension_force > 0.0 {
                let impulse = wheel.contact.ground_normal * (wheel.suspension_force * dt);
                impulses.push((self.chassis, impulse, Some(wheel.contact.hit_point)));
            }
        }
        for (h, imp, at) in impulses.drain(..) {
            world.apply_impulse(h, imp, at);
        }

        // --------------------------------------------------------------
        // 4) friction
        // --------------------------------------------------------------
        let inputs: Vec<FrictionInput> = self
            .wheels
            .iter()
            .zip(&frames)
            .map(|(w, (_, _, axle))| FrictionInput {
                in_contact: w.in_contact(),
                ground: w.contact.ground,
                point: w.contact.hit_point,
                normal: w.contact.ground_normal,
                axle_world: *axle,
                suspension_force: w.suspension_force,
                engine_force: w.engine_force,
                brake_force: w.brake_force,
                friction_slip: w.config.friction_slip,
                sliding_threshold: w.config.sliding_threshold,
            })
            .collect();

        if let Some(body) = world.body(self.chassis) {
            let friction = solve_friction(body, &world.bodies, &inputs, dt);
            let com = *body.center_of_mass();

            for (wheel, f) in self.wheels.iter_mut().zip(friction) {
                wheel.friction = f;
                if !wheel.in_contact() {
                    continue;
                }
                let point = wheel.contact.hit_point;

                if f.forward_impulse != 0.0 {
                    impulses.push((self.chassis, f.forward * f.forward_impulse, Some(point)));
                }
                if f.side_impulse != 0.0 {
                    // roll influence: shrink the lever arm along chassis up
                    let up = wheel.up_local();
                    let mut rel = rot.inverse() * (point - com);
                    rel -= up * (rel.dot(&up) * (1.0 - wheel.config.roll_influence));
                    let side = f.axle * f.side_impulse;
                    impulses.push((self.chassis, side, Some(com + rot * rel)));

                    if let Some(ground) = wheel.contact.ground {
                        if world.body(ground).is_some_and(|g| g.is_dynamic()) {
                            impulses.push((ground, -side, Some(point)));
                        }
                    }
                }
                if f.sliding {
                    report.sliding_wheels += 1;
                }
            }
        }
        for (h, imp, at) in impulses.drain(..) {
            world.apply_impulse(h, imp, at);
        }

        // --------------------------------------------------------------
        // 5) jump
        // --------------------------------------------------------------
        if self.jump_requested {
            self.jump_requested = false;
            if self.wheels_on_ground >= self.jump_min_wheels {
                world.apply_impulse(self.chassis, vector![0.0, self.jump_impulse, 0.0], None);
                self.jumps_fired += 1;
                report.jumped = true;
                info!(wheels = self.wheels_on_ground, impulse = self.jump_impulse, "jump");
            } else {
                debug!(wheels = self.wheels_on_ground, "jump refused, not enough wheels on ground");
            }
        }

        // --------------------------------------------------------------
        // 6) wheel spin
        // --------------------------------------------------------------
        if let Some(body) = world.body(self.chassis) {
            let chassis_forward = rot * self.forward_local;
            for (wheel, (origin, _, _)) in self.wheels.iter_mut().zip(&frames) {
                let vel = body.velocity_at_point(origin);
                if wheel.in_contact() {
                    let n = wheel.contact.ground_normal;
                    let fwd = chassis_forward - n * chassis_forward.dot(&n);
                    wheel.delta_rotation = fwd.dot(&vel) * dt / wheel.config.radius;
                }

                let slipping = wheel.friction.sliding || !wheel.in_contact();
                if slipping && wheel.engine_force != 0.0 {
                    if let Some(speed) = wheel.config.custom_sliding_rotational_speed {
                        wheel.delta_rotation = wheel.engine_force.signum() * speed * dt;
                    }
                }
                if wheel.brake_force.abs() > wheel.engine_force.abs() {
                    wheel.delta_rotation = 0.0;
                }

                if wheel.delta_rotation.is_finite() {
                    wheel.rotation = (wheel.rotation + wheel.delta_rotation).rem_euclid(TAU);
                    wheel.delta_rotation *= SPIN_DECAY;
                } else {
                    wheel.delta_rotation = 0.0;
                }
            }
        }

        self.clear_commands();
        report
    }

    fn clear_commands(&mut self) {
        for wheel in self.wheels.iter_mut() {
            wheel.applied_engine_force = wheel.engine_force;
            wheel.applied_brake_force = wheel.brake_force;
            wheel.engine_force = 0.0;
            wheel.brake_force = 0.0;
        }
    }
}
