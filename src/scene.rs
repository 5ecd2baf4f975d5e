//! Visual scene graph.
//!
//! Nodes live in an arena indexed by [`NodeId`]; each keeps its transform
//! relative to its parent. The graph never owns physics state: a node only
//! carries an optional [`BodyLink`] naming the body the world owns for it.

use nalgebra::Isometry3;
use rapier3d::prelude::{Real, RigidBodyHandle};
use serde::Serialize;

use crate::body::BodyDesc;
use crate::error::{Result, SandboxError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub usize);

/// Shared geometry identity. Many nodes may render the same mesh; it is never
/// used to find a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MeshKey {
    Floor,
    Wall,
    Tree,
    Rock,
    Brick,
    Chassis,
    Wheel,
}

/// Association between a node and the body driving it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyLink {
    pub body: RigidBodyHandle,
    /// Parent of the node when the body was attached; sync expresses the
    /// body pose relative to this node.
    pub frame: NodeId,
}

#[derive(Debug, Clone)]
pub struct SceneNode {
    pub name: String,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub local: Isometry3<Real>,
    pub mesh: Option<MeshKey>,
    pub body_desc: Option<BodyDesc>,
    pub body: Option<BodyLink>,
}

#[derive(Debug, Clone)]
pub struct SceneGraph {
    nodes: Vec<SceneNode>,
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneGraph {
    pub fn new() -> Self {
        Self {
            nodes: vec![SceneNode {
                name: "root".to_string(),
                parent: None,
                children: Vec::new(),
                local: Isometry3::identity(),
                mesh: None,
                body_desc: None,
                body: None,
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        // the root is always present
        false
    }

    pub fn add_node(&mut self, parent: NodeId, name: impl Into<String>, local: Isometry3<Real>) -> Result<NodeId> {
        if parent.0 >= self.nodes.len() {
            return Err(SandboxError::UnknownNode(parent.0));
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(SceneNode {
            name: name.into(),
            parent: Some(parent),
            children: Vec::new(),
            local,
            mesh: None,
            body_desc: None,
            body: None,
        });
        self.nodes[parent.0].children.push(id);
        Ok(id)
    }

    /// Node with a mesh and a body declaration, ready for attach.
    pub fn add_body_node(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
        local: Isometry3<Real>,
        mesh: MeshKey,
        desc: BodyDesc,
    ) -> Result<NodeId> {
        let id = self.add_node(parent, name, local)?;
        let node = &mut self.nodes[id.0];
        node.mesh = Some(mesh);
        node.body_desc = Some(desc);
        Ok(id)
    }

    pub fn get(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(id.0)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut SceneNode> {
        self.nodes.get_mut(id.0)
    }

    pub fn node(&self, id: NodeId) -> Result<&SceneNode> {
        self.get(id).ok_or(SandboxError::UnknownNode(id.0))
    }

    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut SceneNode> {
        self.nodes.get_mut(id.0).ok_or(SandboxError::UnknownNode(id.0))
    }

    pub fn set_local(&mut self, id: NodeId, local: Isometry3<Real>) -> Result<()> {
        self.node_mut(id)?.local = local;
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().position(|n| n.name == name).map(NodeId)
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &SceneNode)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    /// Nodes currently linked to a body.
    pub fn linked(&self) -> impl Iterator<Item = (NodeId, BodyLink)> + '_ {
        self.iter().filter_map(|(id, n)| n.body.map(|link| (id, link)))
    }

    /// World pose of a node: root ∘ … ∘ parent ∘ local, composed bottom-up.
    pub fn world_pose(&self, id: NodeId) -> Result<Isometry3<Real>> {
        let mut pose = self.node(id)?.local;
        let mut cursor = self.nodes[id.0].parent;
        // parent links always point at earlier nodes, so this terminates
        while let Some(parent) = cursor {
            let node = &self.nodes[parent.0];
            pose = node.local * pose;
            cursor = node.parent;
        }
        Ok(pose)
    }

    /// Transform taking world coordinates into `frame`'s local coordinates.
    pub fn world_to_frame(&self, frame: NodeId) -> Result<Isometry3<Real>> {
        if frame == self.root() {
            self.node(frame)?;
            return Ok(self.nodes[0].local.inverse());
        }
        Ok(self.world_pose(frame)?.inverse())
    }
}
