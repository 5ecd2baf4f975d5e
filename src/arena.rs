// ==============================================================================
// arena.rs — SCENE POPULATION
// ------------------------------------------------------------------------------
// Fills a SceneGraph with the driving arena. Nothing here touches physics:
// nodes only *declare* bodies (BodyDesc) and reconcile::attach_declared()
// builds them afterwards.
//
//   floor + 4 walls     fixed boxes, 50 x 50 arena
//   trees (50)          fixed compound: trunk cylinder + leaves sphere
//   rocks (25)          fixed spheres, one shared size rolled from the RNG
//   brick structures    group nodes with dynamic brick children
//   car                 chassis node (dynamic) + 4 wheel child nodes (no body)
// ==============================================================================

use std::f32::consts::FRAC_PI_2;

use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};
use rand::Rng;
use rapier3d::prelude::Real;
use tracing::info;

use crate::body::{BodyDesc, ShapeDesc, ShapePart};
use crate::bricks::{self, BrickGroup};
use crate::config::ArenaConfig;
use crate::error::Result;
use crate::scene::{MeshKey, NodeId, SceneGraph};
use crate::vehicle::VehicleConfig;

const ARENA_HALF: Real = 25.0;
const WALL_HALF: [Real; 3] = [25.0, 25.0, 0.125];
const WALL_Y: Real = 1.5;

const TRUNK_RADIUS: Real = 0.18;
const TRUNK_HALF_HEIGHT: Real = 1.0;
const LEAVES_RADIUS: Real = 1.2;
const LEAVES_Y: Real = 2.8;

const ROCK_BASE_RADIUS: Real = 0.5;
const ROCK_INFLATE: Real = 1.075;

const WHEEL_NAMES: [&str; 4] = ["wheel_fl", "wheel_fr", "wheel_rl", "wheel_rr"];

// (x, z, yaw)
const TREES: [(Real, Real, Real); 50] = [
    (-23.543, -11.237, 4.936), (19.877, 10.360, 1.336), (7.621, 7.142, 5.236),
    (17.699, -10.112, 5.219), (-16.836, -5.560, 5.049), (12.376, -11.986, 5.592),
    (2.681, 9.414, 5.911), (-13.454, 2.336, 2.920), (-1.742, 21.303, 5.357),
    (1.740, 4.939, 5.096), (9.986, -5.879, 5.817), (-22.955, 16.822, 2.552),
    (11.787, 8.789, 0.906), (22.926, -15.366, 5.269), (-1.177, -6.949, 6.099),
    (-1.617, 7.199, 4.056), (-5.024, -7.833, 2.151), (-16.541, 21.151, 0.541),
    (-23.565, 8.038, 5.635), (11.337, 5.224, 5.430), (6.894, -14.969, 0.712),
    (-20.350, -17.312, 4.857), (-8.245, -17.388, 2.303), (6.639, 5.944, 5.805),
    (-6.000, 3.087, 2.650), (3.472, 4.718, 6.123), (-8.104, 2.431, 1.646),
    (-13.279, -7.193, 1.420), (14.147, -2.708, 0.659), (20.468, 4.384, 4.550),
    (21.582, 0.212, 2.964), (10.132, 22.861, 1.880), (-22.637, -2.349, 4.205),
    (-10.063, -21.639, 6.115), (-3.684, -10.782, 2.440), (13.811, -6.136, 4.516),
    (14.168, 18.518, 2.644), (12.623, -23.618, 4.726), (-1.739, 7.059, 4.111),
    (-20.480, -16.075, 0.204), (-2.649, -6.100, 3.404), (20.197, -10.453, 2.987),
    (-1.532, 8.394, 0.371), (5.512, -9.133, 3.928), (-13.147, -18.664, 1.877),
    (11.166, 19.076, 2.456), (-1.336, 14.635, 3.185), (-0.171, -21.113, 6.191),
    (12.305, 2.382, 6.013), (10.132, -22.580, 2.731),
];

// (x, y, z, rot_x, rot_y, rot_z)
const ROCKS: [(Real, Real, Real, Real, Real, Real); 25] = [
    (-12.649, 0.114, -14.998, -0.161, 0.198, 0.098),
    (0.592, 0.122, 17.238, 0.059, -0.037, -0.184),
    (13.511, 0.065, 3.047, 0.041, -0.074, 0.083),
    (5.066, 0.064, 8.441, -0.196, 0.153, -0.145),
    (-16.585, 0.074, 9.855, 0.174, 0.020, -0.116),
    (8.038, 0.108, 14.577, -0.160, -0.082, -0.032),
    (7.775, 0.146, -16.327, -0.052, -0.128, -0.058),
    (-24.230, 0.034, 17.235, -0.046, -0.081, -0.106),
    (18.939, 0.027, 15.687, 0.189, 0.132, 0.069),
    (2.403, 0.039, 19.388, -0.132, 0.126, -0.188),
    (-5.213, 0.054, 4.087, 0.180, 0.121, 0.047),
    (19.761, 0.019, -17.028, -0.197, 0.034, 0.186),
    (-18.665, 0.128, 17.291, -0.105, 0.016, 0.196),
    (-10.498, 0.071, 14.440, -0.162, 0.163, -0.009),
    (-22.261, 0.114, -6.482, -0.122, -0.135, 0.124),
    (-23.441, 0.034, -17.148, 0.087, 0.143, -0.073),
    (-10.328, 0.065, 3.859, 0.031, -0.104, -0.090),
    (-7.612, 0.076, -15.163, 0.020, -0.151, -0.144),
    (15.152, 0.146, -10.894, -0.190, -0.128, -0.050),
    (-5.591, 0.145, 3.850, -0.099, 0.172, 0.172),
    (19.566, 0.094, 13.983, -0.030, -0.130, 0.088),
    (5.071, 0.059, 10.230, -0.092, -0.066, -0.107),
    (5.420, 0.123, -11.357, -0.004, 0.035, 0.120),
    (-14.674, 0.140, 18.216, 0.017, 0.132, -0.147),
    (-0.492, 0.009, -19.967, -0.161, 0.032, 0.009),
];

/// Ids of the nodes the simulation needs to find again.
#[derive(Debug, Clone, Default)]
pub struct ArenaNodes {
    pub floor: Option<NodeId>,
    pub walls: Vec<NodeId>,
    pub trees: Vec<NodeId>,
    pub rocks: Vec<NodeId>,
    pub groups: Vec<NodeId>,
    pub bricks: Vec<NodeId>,
    pub car: Option<NodeId>,
    pub wheels: Vec<NodeId>,
}

fn yaw(angle: Real) -> UnitQuaternion<Real> {
    UnitQuaternion::from_axis_angle(&Vector3::y_axis(), angle)
}

fn placed(x: Real, y: Real, z: Real, rotation: UnitQuaternion<Real>) -> Isometry3<Real> {
    Isometry3::from_parts(Translation3::new(x, y, z), rotation)
}

pub fn populate<R: Rng + ?Sized>(
    scene: &mut SceneGraph,
    arena: &ArenaConfig,
    vehicle: &VehicleConfig,
    rng: &mut R,
) -> Result<ArenaNodes> {
    let mut nodes = ArenaNodes::default();
    let root = scene.root();

    // --------------------------------------------------------------
    // floor + walls
    // --------------------------------------------------------------
    let floor = BodyDesc::fixed(vec![ShapePart::centered(ShapeDesc::Box {
        half_extents: [ARENA_HALF, 0.5, ARENA_HALF],
    })]);
    nodes.floor = Some(scene.add_body_node(root, "floor", Isometry3::translation(0.0, -0.5, 0.0), MeshKey::Floor, floor)?);

    let wall = BodyDesc::fixed(vec![ShapePart::centered(ShapeDesc::Box { half_extents: WALL_HALF })]);
    let walls = [
        placed(0.0, WALL_Y, -ARENA_HALF, UnitQuaternion::identity()),
        placed(0.0, WALL_Y, ARENA_HALF, UnitQuaternion::identity()),
        placed(ARENA_HALF, WALL_Y, 0.0, yaw(FRAC_PI_2)),
        placed(-ARENA_HALF, WALL_Y, 0.0, yaw(-FRAC_PI_2)),
    ];
    for (i, pose) in walls.into_iter().enumerate() {
        nodes.walls.push(scene.add_body_node(root, format!("wall_{i}"), pose, MeshKey::Wall, wall.clone())?);
    }

    // --------------------------------------------------------------
    // trees + rocks
    // --------------------------------------------------------------
    if arena.trees {
        let tree = BodyDesc::fixed(vec![
            ShapePart::at(ShapeDesc::Cylinder { half_height: TRUNK_HALF_HEIGHT, radius: TRUNK_RADIUS }, 0.0, 1.0, 0.0),
            ShapePart::at(ShapeDesc::Sphere { radius: LEAVES_RADIUS }, 0.0, LEAVES_Y, 0.0),
        ]);
        for (i, &(x, z, rot)) in TREES.iter().enumerate() {
            let id = scene.add_body_node(root, format!("tree_{i}"), placed(x, 0.0, z, yaw(rot)), MeshKey::Tree, tree.clone())?;
            nodes.trees.push(id);
        }
    }

    if arena.rocks {
        // every rock shares one mesh, so one size
        let radius = ROCK_BASE_RADIUS * rng.gen_range(0.5..1.5) * ROCK_INFLATE;
        let rock = BodyDesc::fixed(vec![ShapePart::centered(ShapeDesc::Sphere { radius })]);
        for (i, &(x, y, z, rx, ry, rz)) in ROCKS.iter().enumerate() {
            let pose = placed(x, y, z, bricks::euler_xyz(rx, ry, rz));
            nodes.rocks.push(scene.add_body_node(root, format!("rock_{i}"), pose, MeshKey::Rock, rock.clone())?);
        }
    }

    // --------------------------------------------------------------
    // brick structures
    // --------------------------------------------------------------
    if arena.bricks {
        let desc = bricks::brick_desc();
        for (g, group) in bricks::arena_groups().iter().enumerate() {
            let group_node = add_brick_group(scene, g, group, &desc, arena.brick_jitter, rng, &mut nodes.bricks)?;
            nodes.groups.push(group_node);
        }
    }

    // --------------------------------------------------------------
    // car
    // --------------------------------------------------------------
    let [cx, cy, cz] = arena.car_spawn;
    let car = scene.add_body_node(
        root,
        "car",
        Isometry3::translation(cx, cy, cz),
        MeshKey::Chassis,
        vehicle.chassis_desc(),
    )?;
    for (wheel, name) in vehicle.wheels.iter().zip(WHEEL_NAMES) {
        let [x, y, z] = wheel.connection_point;
        let id = scene.add_node(car, name, Isometry3::translation(x, y, z))?;
        scene.node_mut(id)?.mesh = Some(MeshKey::Wheel);
        nodes.wheels.push(id);
    }
    nodes.car = Some(car);

    info!(
        nodes = scene.len(),
        trees = nodes.trees.len(),
        rocks = nodes.rocks.len(),
        bricks = nodes.bricks.len(),
        "arena populated"
    );
    Ok(nodes)
}

/// Add one structure under the root. Bricks become children of the group node.
pub fn add_brick_group<R: Rng + ?Sized>(
    scene: &mut SceneGraph,
    index: usize,
    group: &BrickGroup,
    desc: &BodyDesc,
    jitter: bool,
    rng: &mut R,
    out: &mut Vec<NodeId>,
) -> Result<NodeId> {
    let name = group.layout.name();
    let group_node = scene.add_node(scene.root(), format!("{name}_{index}"), group.pose())?;
    for (b, slot) in group.layout.slots().into_iter().enumerate() {
        let local = if jitter {
            bricks::brick_pose(slot, Some(&mut *rng))
        } else {
            bricks::brick_pose::<R>(slot, None)
        };
        let id = scene.add_body_node(group_node, format!("{name}_{index}_brick_{b}"), local, MeshKey::Brick, desc.clone())?;
        out.push(id);
    }
    Ok(group_node)
}
