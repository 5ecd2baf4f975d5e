// ==============================================================================
// physics.rs — RIGID BODY WORLD (FIXED STEP + SLEEP DRIVER)
// ------------------------------------------------------------------------------
// Owns the rapier sets and advances them on a fixed timestep:
// - step(): accumulator driven, at most `max_substeps` substeps per call,
//   leftover time is carried into the next call (bounded by one frame)
// - pre_step hook runs before every substep (vehicle forces go here)
// - post-step hooks run after every substep, in order:
//     1) apply_sleep_policy()   slow bodies -> SLEEPY -> SLEEPING
//     2) reset_runaway_bodies() non-finite / out-of-bounds bodies respawn
//
// Contact + constraint solving is rapier's job. Sleeping bodies are left out
// of rapier's active set, so their pose is untouched until something wakes
// them (a contact from an active body, or apply_impulse / add_force here).
// ==============================================================================

use std::collections::HashMap;
use std::num::NonZeroUsize;

use rapier3d::na::{Isometry3, Translation3, UnitQuaternion};
use rapier3d::prelude::*;
use tracing::{debug, warn};

use crate::body::{BodyDesc, SleepState};
use crate::config::WorldConfig;

/// Per-body bookkeeping the world keeps next to rapier's own state.
#[derive(Debug, Clone, Copy)]
pub struct BodyRecord {
    pub sleep: SleepState,
    pub slow_time: Real,     // seconds spent under the sleep thresholds
    pub can_sleep: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub body: RigidBodyHandle,
    pub collider: ColliderHandle,
    pub point: Point<Real>,
    pub normal: Vector<Real>,
    pub distance: Real,
}

/// What one call to `step` did.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepReport {
    pub substeps: u32,
    pub simulated: Real,     // seconds integrated this call
    pub deferred: Real,      // seconds left in the accumulator
    pub slept: usize,        // bodies sent to sleep this call
    pub resets: usize,       // runaway bodies respawned this call
}

#[derive(Debug, Clone, Copy)]
struct SleepPolicy {
    linear_sq: Real,
    angular_sq: Real,
    time_limit: Real,
}

pub struct PhysicsWorld {
    pub gravity: Vector<Real>, // gravity vector
    pub pipeline: PhysicsPipeline, // physics pipeline
    pub island_manager: IslandManager, // manages islands of bodies
    pub broad_phase: DefaultBroadPhase, // broad-phase collision detection
    pub narrow_phase: NarrowPhase, // collision detection
    pub bodies: RigidBodySet, // for rigid bodies
    pub colliders: ColliderSet, // for collision shapes
    pub joints: ImpulseJointSet, // unused by the arena, required by the pipeline
    pub multibody_joints: MultibodyJointSet,
    pub ccd: CCDSolver, // continuous collision detection
    pub query_pipeline: QueryPipeline, // for raycasting

    records: HashMap<RigidBodyHandle, BodyRecord>,
    solver_iterations: NonZeroUsize,
    sleep: SleepPolicy,
    world_bound: Real,
    respawn: Isometry3<Real>,
    accumulator: Real,
    queries_dirty: bool,
}

impl PhysicsWorld {
    pub fn new(config: &WorldConfig) -> Self {
        let [gx, gy, gz] = config.gravity;
        let [rx, ry, rz] = config.respawn_point;

        Self {
            gravity: vector![gx, gy, gz],
            pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            records: HashMap::new(),
            solver_iterations: NonZeroUsize::new(config.solver_iterations).unwrap_or(NonZeroUsize::MIN),
            sleep: SleepPolicy {
                linear_sq: config.sleep_linear_sq,
                angular_sq: config.sleep_angular_sq,
                time_limit: config.sleep_time_limit,
            },
            world_bound: config.world_bound,
            respawn: Isometry3::from_parts(Translation3::new(rx, ry, rz), UnitQuaternion::identity()),
            accumulator: 0.0,
            queries_dirty: false,
        }
    }

    // --------------------------------------------------------------
    // body management
    // --------------------------------------------------------------

    /// Build a rapier body + colliders from a declaration at a world pose.
    pub fn insert_body(&mut self, desc: &BodyDesc, pose: Isometry3<Real>) -> RigidBodyHandle {
        let builder = if desc.is_fixed() {
            RigidBodyBuilder::fixed()
        } else {
            RigidBodyBuilder::dynamic()
                .linear_damping(desc.linear_damping)
                .angular_damping(desc.angular_damping)
                .can_sleep(desc.can_sleep)
        };
        let handle = self.bodies.insert(builder.position(pose).build());

        let density = desc.density();
        for part in &desc.shapes {
            let collider = ColliderBuilder::new(part.shape.to_shared())
                .position(part.offset)
                .density(density)
                .friction(desc.material.friction)
                .restitution(desc.material.restitution)
                .build();
            self.colliders.insert_with_parent(collider, handle, &mut self.bodies);
        }

        self.records.insert(
            handle,
            BodyRecord { sleep: SleepState::Awake, slow_time: 0.0, can_sleep: desc.can_sleep },
        );
        self.queries_dirty = true;
        handle
    }

    pub fn remove_body(&mut self, handle: RigidBodyHandle) -> bool {
        self.records.remove(&handle);
        let removed = self
            .bodies
            .remove(
                handle,
                &mut self.island_manager,
                &mut self.colliders,
                &mut self.joints,
                &mut self.multibody_joints,
                true,
            )
            .is_some();
        self.queries_dirty |= removed;
        removed
    }

    pub fn contains(&self, handle: RigidBodyHandle) -> bool {
        self.bodies.contains(handle)
    }

    pub fn body(&self, handle: RigidBodyHandle) -> Option<&RigidBody> {
        self.bodies.get(handle)
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn pose(&self, handle: RigidBodyHandle) -> Option<Isometry3<Real>> {
        self.bodies.get(handle).map(|b| *b.position())
    }

    /// (linear, angular) velocity.
    pub fn velocity(&self, handle: RigidBodyHandle) -> Option<(Vector<Real>, Vector<Real>)> {
        self.bodies.get(handle).map(|b| (*b.linvel(), *b.angvel()))
    }

    pub fn sleep_state(&self, handle: RigidBodyHandle) -> Option<SleepState> {
        self.records.get(&handle).map(|r| r.sleep)
    }

    /// Impulse at a world point, or at the center of mass when `point` is None.
    /// Always wakes the body.
    pub fn apply_impulse(
        &mut self,
        handle: RigidBodyHandle,
        impulse: Vector<Real>,
        point: Option<Point<Real>>,
    ) -> bool {
        let Some(body) = self.bodies.get_mut(handle) else {
            return false;
        };
        match point {
            Some(p) => body.apply_impulse_at_point(impulse, p, true),
            None => body.apply_impulse(impulse, true),
        }
        self.mark_awake(handle);
        true
    }

    /// Force applied over the next substep. Always wakes the body.
    pub fn add_force(&mut self, handle: RigidBodyHandle, force: Vector<Real>) -> bool {
        let Some(body) = self.bodies.get_mut(handle) else {
            return false;
        };
        body.add_force(force, true);
        self.mark_awake(handle);
        true
    }

    pub fn wake(&mut self, handle: RigidBodyHandle) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.wake_up(true);
            self.mark_awake(handle);
        }
    }

    fn mark_awake(&mut self, handle: RigidBodyHandle) {
        if let Some(record) = self.records.get_mut(&handle) {
            record.sleep = SleepState::Awake;
            record.slow_time = 0.0;
        }
    }

    // --------------------------------------------------------------
    // queries
    // --------------------------------------------------------------

    /// Bring the query pipeline up to date with inserted/removed colliders.
    /// `step` keeps it current afterwards.
    pub fn refresh_queries(&mut self) {
        if self.queries_dirty {
            self.query_pipeline.update(&self.colliders);
            self.queries_dirty = false;
        }
    }

    /// Closest hit along `dir` within `max_len`. A zero or non-finite
    /// direction never hits.
    pub fn cast_ray(
        &self,
        origin: Point<Real>,
        dir: Vector<Real>,
        max_len: Real,
        exclude: Option<RigidBodyHandle>,
    ) -> Option<RayHit> {
        let len = dir.norm();
        if !len.is_finite() || len < 1e-6 || !origin.coords.iter().all(|c| c.is_finite()) {
            return None;
        }
        let ray = Ray::new(origin, dir / len);

        let mut filter = QueryFilter::default();
        if let Some(h) = exclude {
            filter = filter.exclude_rigid_body(h);
        }

        let (collider, hit) = self.query_pipeline.cast_ray_and_get_normal(
            &self.bodies,
            &self.colliders,
            &ray,
            max_len,
            true,
            filter,
        )?;
        let body = self.colliders.get(collider)?.parent()?;

        Some(RayHit {
            body,
            collider,
            point: ray.point_at(hit.time_of_impact),
            normal: hit.normal,
            distance: hit.time_of_impact,
        })
    }

    // --------------------------------------------------------------
    // stepping
    // --------------------------------------------------------------

    /// Advance by whole `fixed_dt` substeps to catch up with `wall_dt`.
    ///
    /// At most `max_substeps` substeps run per call; what is left stays in the
    /// accumulator for the next call, capped at `max_substeps * fixed_dt` so
    /// a long stall is dropped instead of replayed.
    pub fn step<F>(&mut self, fixed_dt: Real, wall_dt: Real, max_substeps: u32, mut pre_step: F) -> StepReport
    where
        F: FnMut(&mut PhysicsWorld, Real),
    {
        let mut report = StepReport::default();
        if !fixed_dt.is_finite() || fixed_dt <= 0.0 || max_substeps == 0 {
            return report;
        }

        let wall_dt = if wall_dt.is_finite() { wall_dt.max(0.0) } else { 0.0 };
        self.accumulator += wall_dt;

        // tolerance keeps an exact 1/60 frame from rounding down to zero steps
        let due = ((self.accumulator + fixed_dt * 1e-4) / fixed_dt).floor() as u32;
        let substeps = due.min(max_substeps);

        for _ in 0..substeps {
            self.refresh_queries();
            pre_step(self, fixed_dt);
            let (slept, resets) = self.step_fixed(fixed_dt);
            report.slept += slept;
            report.resets += resets;
        }

        let cap = fixed_dt * max_substeps as Real;
        self.accumulator = (self.accumulator - substeps as Real * fixed_dt).clamp(0.0, cap);

        if due > max_substeps {
            debug!(due, max_substeps, deferred = self.accumulator, "substeps capped");
        }

        report.substeps = substeps;
        report.simulated = substeps as Real * fixed_dt;
        report.deferred = self.accumulator;
        report
    }

    /// One fixed substep followed by the post-step hooks.
    /// Returns (bodies sent to sleep, bodies respawned).
    pub fn step_fixed(&mut self, dt: Real) -> (usize, usize) {
        self.refresh_queries();

        self.pipeline.step(
            &self.gravity,
            &IntegrationParameters {
                dt,
                num_solver_iterations: self.solver_iterations,
                ..IntegrationParameters::default()
            },
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.joints,
            &mut self.multibody_joints,
            &mut self.ccd,
            Some(&mut self.query_pipeline),
            &(),
            &(),
        );
        // user forces last one substep
        for (_, body) in self.bodies.iter_mut() {
            body.reset_forces(false);
        }

        let slept = self.apply_sleep_policy(dt);
        let resets = self.reset_runaway_bodies();
        (slept, resets)
    }

    /// Post-step hook: mirror rapier's sleeping flag and put bodies that have
    /// stayed under both velocity thresholds for `sleep_time_limit` to sleep.
    fn apply_sleep_policy(&mut self, dt: Real) -> usize {
        let mut slept = 0;

        for (handle, record) in self.records.iter_mut() {
            let Some(body) = self.bodies.get_mut(*handle) else {
                continue;
            };
            if !body.is_dynamic() || !record.can_sleep {
                record.sleep = SleepState::Awake;
                continue;
            }
            if body.is_sleeping() {
                record.sleep = SleepState::Sleeping;
                continue;
            }
            if record.sleep == SleepState::Sleeping {
                // woken by rapier through a contact: slowness starts over
                record.sleep = SleepState::Awake;
                record.slow_time = 0.0;
            }

            let slow = body.linvel().norm_squared() < self.sleep.linear_sq
                && body.angvel().norm_squared() < self.sleep.angular_sq;
            if !slow {
                record.sleep = SleepState::Awake;
                record.slow_time = 0.0;
                continue;
            }

            record.slow_time += dt;
            if record.slow_time >= self.sleep.time_limit {
                body.sleep();
                record.sleep = SleepState::Sleeping;
                slept += 1;
            } else {
                record.sleep = SleepState::Sleepy;
            }
        }

        slept
    }

    /// Post-step hook: prevent bodies from exploding to insane coordinates.
    fn reset_runaway_bodies(&mut self) -> usize {
        let mut resets = 0;

        for (handle, body) in self.bodies.iter_mut() {
            if !body.is_dynamic() {
                continue;
            }
            let pose = body.position();
            let t = pose.translation.vector;
            let bad = !t.iter().all(|c| c.is_finite() && c.abs() <= self.world_bound)
                || !pose.rotation.coords.iter().all(|c| c.is_finite());

            if bad {
                body.set_position(self.respawn, true);
                body.set_linvel(Vector::zeros(), true);
                body.set_angvel(Vector::zeros(), true);
                if let Some(record) = self.records.get_mut(&handle) {
                    record.sleep = SleepState::Awake;
                    record.slow_time = 0.0;
                }
                resets += 1;
                warn!(body = ?handle, respawn = ?self.respawn.translation.vector, "reset runaway body");
            }
        }

        resets
    }
}
