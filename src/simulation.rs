// ==============================================================================
// simulation.rs — SIMULATION CONTEXT (ONE ARENA, ONE CAR)
// ------------------------------------------------------------------------------
// Owns everything one running sandbox needs; no globals. A frame is:
//
//   1) input      InputMapper::begin_frame() -> ControlIntent
//   2) command    DriveCommand::shape() from intent + chassis speed
//   3) step       PhysicsWorld::step(); before every substep the command is
//                 pushed into the vehicle and Vehicle::update() runs
//   4) sync       reconcile::sync_bodies() + sync_wheels()
//
// The mapper keeps offering a held jump until the vehicle fires it. A jump
// taken on a frame that runs zero substeps is carried to the next frame.
// ==============================================================================

use rand::SeedableRng;
use rand::rngs::StdRng;
use rapier3d::prelude::Real;
use tracing::{debug, info, warn};

use crate::arena::{self, ArenaNodes};
use crate::config::SimulationConfig;
use crate::debug_builders::{DebugOverlay, build_overlay};
use crate::error::{Result, SandboxError};
use crate::input::{Action, DriveCommand, InputMapper, KeyEvent};
use crate::physics::PhysicsWorld;
use crate::reconcile::{self, SyncReport};
use crate::scene::{NodeId, SceneGraph};
use crate::state::{SceneLayout, Snapshot};
use crate::vehicle::Vehicle;

/// What one frame did.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameReport {
    pub frame: u64,
    pub substeps: u32,
    pub simulated: Real,
    pub deferred: Real,
    pub slept: usize,
    pub resets: usize,
    pub sync: SyncReport,
    pub wheels_on_ground: usize,
    pub jumped: bool,
    pub command: DriveCommand,
}

pub struct Simulation {
    config: SimulationConfig,
    world: PhysicsWorld,
    scene: SceneGraph,
    vehicle: Vehicle,
    input: InputMapper,
    nodes: ArenaNodes,
    car: NodeId,
    frame: u64,
    pending_jump: bool,
}

impl Simulation {
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;

        let mut rng = StdRng::seed_from_u64(config.arena.seed);
        let mut scene = SceneGraph::new();
        let nodes = arena::populate(&mut scene, &config.arena, &config.vehicle, &mut rng)?;

        let mut world = PhysicsWorld::new(&config.world);
        reconcile::attach_declared(&mut scene, &mut world)?;

        let car = nodes
            .car
            .ok_or_else(|| SandboxError::invalid_config("arena has no car node"))?;
        let chassis = scene
            .node(car)?
            .body
            .map(|link| link.body)
            .ok_or(SandboxError::NoBodyDeclared(car.0))?;
        let vehicle = Vehicle::new(&config.vehicle, chassis)?;
        world.refresh_queries();
        reconcile::sync_wheels(&mut scene, &world, &vehicle, &nodes.wheels)?;

        info!(
            bodies = world.body_count(),
            nodes = scene.len(),
            seed = config.arena.seed,
            "simulation ready"
        );

        Ok(Self {
            config,
            world,
            scene,
            vehicle,
            input: InputMapper::new(),
            nodes,
            car,
            frame: 0,
            pending_jump: false,
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn world(&self) -> &PhysicsWorld {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut PhysicsWorld {
        &mut self.world
    }

    pub fn scene(&self) -> &SceneGraph {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut SceneGraph {
        &mut self.scene
    }

    pub fn vehicle(&self) -> &Vehicle {
        &self.vehicle
    }

    pub fn nodes(&self) -> &ArenaNodes {
        &self.nodes
    }

    pub fn car_node(&self) -> NodeId {
        self.car
    }

    pub fn frame_count(&self) -> u64 {
        self.frame
    }

    pub fn handle_key(&mut self, event: KeyEvent) {
        self.input.handle(event);
    }

    pub fn handle_action(&mut self, action: Action, pressed: bool) {
        self.input.handle(KeyEvent { action, pressed });
    }

    /// Attach any node that declares a body but has none yet.
    pub fn attach_declared(&mut self) -> Result<usize> {
        reconcile::attach_declared(&mut self.scene, &mut self.world)
    }

    pub fn frame(&mut self, wall_dt: Real) -> FrameReport {
        let intent = self.input.begin_frame();
        let chassis = self.vehicle.chassis();
        let forward = self.vehicle.forward_speed(&self.world);
        let speed = self.world.velocity(chassis).map(|(v, _)| v.norm()).unwrap_or(0.0);

        let mut command = DriveCommand::shape(&intent, &self.config.drive, forward, speed);
        command.jump |= std::mem::take(&mut self.pending_jump);

        let world_cfg = &self.config.world;
        let vehicle = &mut self.vehicle;
        let mut jump = command.jump;
        let mut jumped = false;
        let mut wheels_on_ground = vehicle.wheels_on_ground();

        let step = self.world.step(world_cfg.fixed_dt, wall_dt, world_cfg.max_substeps, |world, dt| {
            let substep = DriveCommand { jump: std::mem::take(&mut jump), ..command };
            if let Err(err) = substep.apply(vehicle) {
                warn!(%err, "drive command rejected");
            }
            let result = vehicle.update(world, dt);
            jumped |= result.jumped;
            wheels_on_ground = result.wheels_on_ground;
        });
        // no substep ran, keep the press for next frame
        self.pending_jump = jump;
        if jumped {
            self.input.jump_fired();
        }

        let sync = reconcile::sync_bodies(&mut self.scene, &self.world);
        if let Err(err) = reconcile::sync_wheels(&mut self.scene, &self.world, &self.vehicle, &self.nodes.wheels) {
            warn!(%err, "wheel sync failed");
        }

        self.frame += 1;
        let report = FrameReport {
            frame: self.frame,
            substeps: step.substeps,
            simulated: step.simulated,
            deferred: step.deferred,
            slept: step.slept,
            resets: step.resets,
            sync,
            wheels_on_ground,
            jumped,
            command,
        };
        debug!(
            frame = report.frame,
            substeps = report.substeps,
            synced = sync.synced,
            skipped = sync.skipped,
            wheels = wheels_on_ground,
            "frame"
        );
        report
    }

    pub fn telemetry(&self) -> DebugOverlay {
        build_overlay(&self.vehicle, &self.world, self.config.vehicle.chassis.half_extents)
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot::capture(self.frame, &self.scene, self.telemetry())
    }

    pub fn layout(&self) -> SceneLayout {
        SceneLayout::capture(&self.scene)
    }
}
