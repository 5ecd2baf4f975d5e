// ==============================================================================
// reconcile.rs — TRANSFORM RECONCILER (WORLD POSES <-> PARENT-LOCAL NODES)
// ------------------------------------------------------------------------------
// attach(): node world pose (composed through all ancestors) becomes the new
//           body's initial pose; the node's current parent is recorded as the
//           reference frame for the lifetime of the link.
// sync_bodies(): body world pose -> node local transform, expressed relative
//           to the recorded frame's *current* world pose (the root's own
//           transform included, as in SceneGraph::world_pose).
//
// Data flows physics -> visuals only. Bodies are looked up through the node's
// own BodyLink; a node whose body is gone is skipped and counted.
// ==============================================================================

use std::collections::HashMap;

use rapier3d::na::Isometry3;
use rapier3d::prelude::{Real, RigidBodyHandle};
use tracing::{debug, info};

use crate::error::{Result, SandboxError};
use crate::physics::PhysicsWorld;
use crate::scene::{BodyLink, NodeId, SceneGraph};
use crate::vehicle::Vehicle;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub synced: usize,
    pub skipped: usize,
}

/// Give `node` a body built from its declaration, posed at the node's current
/// world transform. An existing body on the node is replaced, never doubled.
pub fn attach(scene: &mut SceneGraph, world: &mut PhysicsWorld, node: NodeId) -> Result<RigidBodyHandle> {
    let (desc, previous, frame) = {
        let n = scene.node(node)?;
        let desc = n.body_desc.clone().ok_or(SandboxError::NoBodyDeclared(node.0))?;
        (desc, n.body, n.parent.unwrap_or(scene.root()))
    };
    let pose = scene.world_pose(node)?;

    if let Some(old) = previous {
        world.remove_body(old.body);
        debug!(node = node.0, body = ?old.body, "replaced body on re-attach");
    }

    let body = world.insert_body(&desc, pose);
    scene.node_mut(node)?.body = Some(BodyLink { body, frame });
    Ok(body)
}

/// Attach every node that declares a body but has none yet. Safe to call
/// again after new dynamic nodes are added; attached nodes are left alone.
pub fn attach_declared(scene: &mut SceneGraph, world: &mut PhysicsWorld) -> Result<usize> {
    let pending: Vec<NodeId> = scene
        .iter()
        .filter(|(_, n)| n.body_desc.is_some() && n.body.is_none())
        .map(|(id, _)| id)
        .collect();

    for &id in &pending {
        attach(scene, world, id)?;
    }

    if !pending.is_empty() {
        info!(attached = pending.len(), bodies = world.body_count(), "attached declared bodies");
    }
    Ok(pending.len())
}

/// Write every linked body's pose into its node's local transform.
pub fn sync_bodies(scene: &mut SceneGraph, world: &PhysicsWorld) -> SyncReport {
    let mut report = SyncReport::default();
    let links: Vec<(NodeId, BodyLink)> = scene.linked().collect();
    // bricks of one group share a frame; compose it once per sync
    let mut frames: HashMap<NodeId, Isometry3<Real>> = HashMap::new();

    for (id, link) in links {
        let Some(pose) = world.pose(link.body) else {
            debug!(node = id.0, body = ?link.body, "linked body missing, skipping sync");
            report.skipped += 1;
            continue;
        };

        let inverse = match frames.get(&link.frame) {
            Some(inv) => *inv,
            None => match scene.world_to_frame(link.frame) {
                Ok(inv) => {
                    frames.insert(link.frame, inv);
                    inv
                }
                Err(_) => {
                    report.skipped += 1;
                    continue;
                }
            },
        };
        let local = inverse * pose;

        if let Some(node) = scene.get_mut(id) {
            node.local = local;
            report.synced += 1;
        }
    }

    report
}

/// Place a body-less node (e.g. a wheel) at a world pose by converting it into
/// its parent's frame.
pub fn write_world_pose(scene: &mut SceneGraph, node: NodeId, pose: Isometry3<Real>) -> Result<()> {
    let parent = scene.node(node)?.parent.unwrap_or(scene.root());
    let local = scene.world_to_frame(parent)? * pose;
    scene.set_local(node, local)
}

/// Write the vehicle's wheel poses into the wheel nodes. Wheels have no body;
/// their pose comes from the chassis pose and suspension state.
pub fn sync_wheels(scene: &mut SceneGraph, world: &PhysicsWorld, vehicle: &Vehicle, wheel_nodes: &[NodeId]) -> Result<usize> {
    let mut written = 0;
    for (i, &node) in wheel_nodes.iter().enumerate() {
        let Some(pose) = vehicle.wheel_transform(world, i) else {
            continue;
        };
        write_world_pose(scene, node, pose)?;
        written += 1;
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{BodyDesc, ShapeDesc, ShapePart};
    use crate::config::WorldConfig;
    use crate::scene::MeshKey;
    use approx::assert_relative_eq;
    use rapier3d::na::{Translation3, UnitQuaternion, Vector3};

    fn brick_desc() -> BodyDesc {
        BodyDesc::dynamic(8.0, vec![ShapePart::centered(ShapeDesc::Box { half_extents: [0.29, 0.14, 0.14] })])
    }

    fn rotated_group(scene: &mut SceneGraph) -> NodeId {
        let pose = Isometry3::from_parts(
            Translation3::new(3.0, 0.0, -2.0),
            UnitQuaternion::from_axis_angle(&Vector3::y_axis(), 0.7),
        );
        scene.add_node(scene.root(), "group", pose).unwrap()
    }

    #[test]
    fn attach_records_parent_frame_and_world_pose() {
        let mut scene = SceneGraph::new();
        let mut world = PhysicsWorld::new(&WorldConfig::default());
        let group = rotated_group(&mut scene);
        let brick = scene
            .add_body_node(group, "brick", Isometry3::translation(0.5, 0.2, 0.0), MeshKey::Brick, brick_desc())
            .unwrap();

        let handle = attach(&mut scene, &mut world, brick).unwrap();
        let link = scene.node(brick).unwrap().body.unwrap();
        assert_eq!(link.frame, group);
        assert_eq!(link.body, handle);

        let expected = scene.world_pose(brick).unwrap();
        let actual = world.pose(handle).unwrap();
        assert_relative_eq!(actual.translation.vector, expected.translation.vector, epsilon = 1e-5);
    }

    #[test]
    fn attach_then_sync_keeps_local_transform() {
        let mut scene = SceneGraph::new();
        let mut world = PhysicsWorld::new(&WorldConfig::default());
        let group = rotated_group(&mut scene);
        let local = Isometry3::from_parts(
            Translation3::new(-0.4, 0.6, 0.1),
            UnitQuaternion::from_euler_angles(0.02, -0.08, 0.01),
        );
        let brick = scene.add_body_node(group, "brick", local, MeshKey::Brick, brick_desc()).unwrap();

        attach(&mut scene, &mut world, brick).unwrap();
        let report = sync_bodies(&mut scene, &world);
        assert_eq!(report, SyncReport { synced: 1, skipped: 0 });

        let synced = scene.node(brick).unwrap().local;
        assert_relative_eq!(synced.translation.vector, local.translation.vector, epsilon = 1e-5);
        assert!(synced.rotation.angle_to(&local.rotation) < 1e-4);
    }

    #[test]
    fn sync_follows_a_frame_that_moved_after_attach() {
        let mut scene = SceneGraph::new();
        let mut world = PhysicsWorld::new(&WorldConfig::default());
        let group = rotated_group(&mut scene);
        let local = Isometry3::translation(0.5, 0.2, 0.0);
        let brick = scene.add_body_node(group, "brick", local, MeshKey::Brick, brick_desc()).unwrap();
        let handle = attach(&mut scene, &mut world, brick).unwrap();

        let moved = Isometry3::from_parts(
            Translation3::new(-4.0, 1.0, 6.0),
            UnitQuaternion::from_axis_angle(&Vector3::y_axis(), -1.2),
        );
        scene.set_local(group, moved).unwrap();
        sync_bodies(&mut scene, &world);

        let body_pose = world.pose(handle).unwrap();
        let node_pose = scene.world_pose(brick).unwrap();
        assert_relative_eq!(node_pose.translation.vector, body_pose.translation.vector, epsilon = 1e-5);
        assert!(node_pose.rotation.angle_to(&body_pose.rotation) < 1e-4);
        let synced = scene.node(brick).unwrap().local;
        assert!((synced.translation.vector - local.translation.vector).norm() > 1.0);
    }

    #[test]
    fn root_transform_is_honoured_by_attach_and_sync() {
        let mut scene = SceneGraph::new();
        let mut world = PhysicsWorld::new(&WorldConfig::default());
        scene.set_local(scene.root(), Isometry3::translation(0.0, 5.0, 0.0)).unwrap();
        let local = Isometry3::translation(1.0, 1.0, 0.0);
        let brick = scene.add_body_node(scene.root(), "brick", local, MeshKey::Brick, brick_desc()).unwrap();
        let wheel = scene.add_node(scene.root(), "wheel", Isometry3::identity()).unwrap();

        let handle = attach(&mut scene, &mut world, brick).unwrap();
        assert_relative_eq!(world.pose(handle).unwrap().translation.y, 6.0, epsilon = 1e-5);

        sync_bodies(&mut scene, &world);
        let synced = scene.node(brick).unwrap().local;
        assert_relative_eq!(synced.translation.vector, local.translation.vector, epsilon = 1e-5);

        write_world_pose(&mut scene, wheel, Isometry3::translation(0.0, 5.5, 0.0)).unwrap();
        assert_relative_eq!(scene.node(wheel).unwrap().local.translation.y, 0.5, epsilon = 1e-5);
    }

    #[test]
    fn reattach_replaces_body() {
        let mut scene = SceneGraph::new();
        let mut world = PhysicsWorld::new(&WorldConfig::default());
        let brick = scene
            .add_body_node(scene.root(), "brick", Isometry3::translation(0.0, 1.0, 0.0), MeshKey::Brick, brick_desc())
            .unwrap();

        let first = attach(&mut scene, &mut world, brick).unwrap();
        let second = attach(&mut scene, &mut world, brick).unwrap();
        assert_ne!(first, second);
        assert!(!world.contains(first));
        assert_eq!(world.body_count(), 1);
    }

    #[test]
    fn attach_declared_is_idempotent() {
        let mut scene = SceneGraph::new();
        let mut world = PhysicsWorld::new(&WorldConfig::default());
        for i in 0..3 {
            scene
                .add_body_node(scene.root(), format!("b{i}"), Isometry3::translation(i as Real, 1.0, 0.0), MeshKey::Brick, brick_desc())
                .unwrap();
        }
        assert_eq!(attach_declared(&mut scene, &mut world).unwrap(), 3);
        assert_eq!(attach_declared(&mut scene, &mut world).unwrap(), 0);
        assert_eq!(world.body_count(), 3);
    }

    #[test]
    fn node_without_declaration_cannot_attach() {
        let mut scene = SceneGraph::new();
        let mut world = PhysicsWorld::new(&WorldConfig::default());
        let plain = scene.add_node(scene.root(), "plain", Isometry3::identity()).unwrap();
        let err = attach(&mut scene, &mut world, plain).unwrap_err();
        assert!(matches!(err, SandboxError::NoBodyDeclared(_)));
    }

    #[test]
    fn missing_body_is_skipped_not_fatal() {
        let mut scene = SceneGraph::new();
        let mut world = PhysicsWorld::new(&WorldConfig::default());
        let a = scene
            .add_body_node(scene.root(), "a", Isometry3::translation(0.0, 1.0, 0.0), MeshKey::Brick, brick_desc())
            .unwrap();
        let b = scene
            .add_body_node(scene.root(), "b", Isometry3::translation(2.0, 1.0, 0.0), MeshKey::Brick, brick_desc())
            .unwrap();
        attach_declared(&mut scene, &mut world).unwrap();

        let gone = scene.node(a).unwrap().body.unwrap().body;
        world.remove_body(gone);

        let report = sync_bodies(&mut scene, &world);
        assert_eq!(report, SyncReport { synced: 1, skipped: 1 });
        assert!(scene.node(b).unwrap().body.is_some());
    }

    #[test]
    fn write_world_pose_converts_into_parent_frame() {
        let mut scene = SceneGraph::new();
        let group = rotated_group(&mut scene);
        let wheel = scene.add_node(group, "wheel", Isometry3::identity()).unwrap();
        let target = Isometry3::translation(1.0, 0.3, 1.0);

        write_world_pose(&mut scene, wheel, target).unwrap();
        let world = scene.world_pose(wheel).unwrap();
        assert_relative_eq!(world.translation.vector, target.translation.vector, epsilon = 1e-5);
    }
}
