// ==============================================================================
// state.rs — CLIENT REGISTRY + RENDER SNAPSHOTS
// ------------------------------------------------------------------------------
// - NodeSnapshot / Snapshot: the per-frame render payload. Every node with a
//   mesh that moves (dynamic body or wheel) is listed with its parent-local
//   pose; static props go out once, in the layout sent on connect.
// - SharedServerState: connected clients and their outgoing channels. The tick
//   loop broadcasts, socket tasks register / unregister.
// ==============================================================================

use std::collections::HashMap;

use rapier3d::prelude::Real;
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;
use uuid::Uuid;

use crate::debug_builders::DebugOverlay;
use crate::scene::{MeshKey, NodeId, SceneGraph, SceneNode};

#[derive(Debug, Clone, Serialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub name: String,
    pub parent: Option<NodeId>,
    pub mesh: Option<MeshKey>,
    pub position: [Real; 3],
    pub rotation: [Real; 4], // quaternion xyzw, parent-local
}

impl NodeSnapshot {
    fn of(id: NodeId, node: &SceneNode) -> Self {
        let q = node.local.rotation.coords;
        Self {
            id,
            name: node.name.clone(),
            parent: node.parent,
            mesh: node.mesh,
            position: node.local.translation.vector.into(),
            rotation: [q.x, q.y, q.z, q.w],
        }
    }
}

fn moves(node: &SceneNode) -> bool {
    node.mesh == Some(MeshKey::Wheel) || node.body_desc.as_ref().is_some_and(|d| !d.is_fixed())
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename = "snapshot")]
pub struct Snapshot {
    pub frame: u64,
    pub nodes: Vec<NodeSnapshot>,
    pub vehicle: DebugOverlay,
}

impl Snapshot {
    pub fn capture(frame: u64, scene: &SceneGraph, vehicle: DebugOverlay) -> Self {
        let nodes = scene
            .iter()
            .filter(|(_, n)| moves(n))
            .map(|(id, n)| NodeSnapshot::of(id, n))
            .collect();
        Self { frame, nodes, vehicle }
    }
}

/// Every node, static or not, including group nodes without a mesh.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename = "layout")]
pub struct SceneLayout {
    pub nodes: Vec<NodeSnapshot>,
}

impl SceneLayout {
    pub fn capture(scene: &SceneGraph) -> Self {
        let nodes = scene
            .iter()
            .filter(|(id, _)| *id != scene.root())
            .map(|(id, n)| NodeSnapshot::of(id, n))
            .collect();
        Self { nodes }
    }
}

pub struct SharedServerState {
    pub frame: u64,
    pub clients: HashMap<Uuid, UnboundedSender<String>>,
    pub layout: Option<String>,
}

impl Default for SharedServerState {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedServerState {
    pub fn new() -> Self {
        Self {
            frame: 0,
            clients: HashMap::new(),
            layout: None,
        }
    }

    pub fn register_client(&mut self, tx: UnboundedSender<String>) -> Uuid {
        let id = Uuid::new_v4();
        self.clients.insert(id, tx);
        id
    }

    pub fn remove_client(&mut self, id: &Uuid) -> bool {
        self.clients.remove(id).is_some()
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Send to every client; drops clients whose channel has closed.
    pub fn broadcast(&mut self, json: &str) {
        let before = self.clients.len();
        self.clients.retain(|_, tx| tx.send(json.to_string()).is_ok());
        let dropped = before - self.clients.len();
        if dropped > 0 {
            debug!(dropped, "pruned closed client channels");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{BodyDesc, ShapeDesc, ShapePart};
    use rapier3d::na::Isometry3;
    use tokio::sync::mpsc;

    #[test]
    fn snapshot_lists_only_moving_nodes() {
        let mut scene = SceneGraph::new();
        let shape = vec![ShapePart::centered(ShapeDesc::Box { half_extents: [0.5, 0.5, 0.5] })];
        scene
            .add_body_node(scene.root(), "wall", Isometry3::identity(), MeshKey::Wall, BodyDesc::fixed(shape.clone()))
            .unwrap();
        let brick = scene
            .add_body_node(scene.root(), "brick", Isometry3::translation(0.0, 1.0, 0.0), MeshKey::Brick, BodyDesc::dynamic(8.0, shape))
            .unwrap();

        let snap = Snapshot::capture(3, &scene, DebugOverlay::default());
        assert_eq!(snap.nodes.len(), 1);
        assert_eq!(snap.nodes[0].id, brick);

        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["type"], "snapshot");
        assert_eq!(json["frame"], 3);
        assert_eq!(json["nodes"][0]["mesh"], "brick");

        let layout = serde_json::to_value(SceneLayout::capture(&scene)).unwrap();
        assert_eq!(layout["type"], "layout");
        assert_eq!(layout["nodes"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn broadcast_prunes_closed_clients() {
        let mut state = SharedServerState::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();
        state.register_client(tx_a);
        state.register_client(tx_b);
        drop(rx_b);

        state.broadcast("{}");
        assert_eq!(state.client_count(), 1);
        assert_eq!(rx_a.try_recv().unwrap(), "{}");
    }
}
