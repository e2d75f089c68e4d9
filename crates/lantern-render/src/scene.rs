//! Arena-backed scene graph.
//!
//! Nodes live in one growable arena and refer to each other by index, so
//! parent and child links stay valid as the arena grows. World transforms
//! are propagated iteratively from the roots.

use glam::{Mat4, Quat, Vec3, Vec4};

/// Handle to a node in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// Local translation, rotation, and scale.
#[derive(Debug, Clone, Copy)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Transform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// One node: a local transform, an optional mesh attachment, and links.
#[derive(Debug, Clone)]
pub struct SceneNode {
    pub transform: Transform,
    /// Index into the caller's mesh list, if this node draws one.
    pub mesh: Option<usize>,
    pub tint: Vec4,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    world: Mat4,
}

/// A node with a mesh, flattened for drawing.
#[derive(Debug, Clone, Copy)]
pub struct MeshInstance {
    pub node: NodeId,
    pub mesh: usize,
    pub world: Mat4,
    pub tint: Vec4,
}

/// The scene hierarchy.
#[derive(Debug, Default)]
pub struct SceneGraph {
    nodes: Vec<SceneNode>,
    roots: Vec<NodeId>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node under `parent`, or as a root when `parent` is `None`.
    pub fn add_node(&mut self, parent: Option<NodeId>, transform: Transform) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(SceneNode {
            transform,
            mesh: None,
            tint: Vec4::ONE,
            parent,
            children: Vec::new(),
            world: Mat4::IDENTITY,
        });

        match parent {
            Some(parent) => self.nodes[parent.0].children.push(id),
            None => self.roots.push(id),
        }

        id
    }

    /// Insert a node that draws a mesh.
    pub fn add_mesh_node(
        &mut self,
        parent: Option<NodeId>,
        transform: Transform,
        mesh: usize,
        tint: Vec4,
    ) -> NodeId {
        let id = self.add_node(parent, transform);
        let node = &mut self.nodes[id.0];
        node.mesh = Some(mesh);
        node.tint = tint;
        id
    }

    pub fn node(&self, id: NodeId) -> &SceneNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut SceneNode {
        &mut self.nodes[id.0]
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Recompute every node's world transform from the roots down.
    pub fn update_world_transforms(&mut self) {
        let mut stack: Vec<(NodeId, Mat4)> = self
            .roots
            .iter()
            .map(|&root| (root, Mat4::IDENTITY))
            .collect();

        while let Some((id, parent_world)) = stack.pop() {
            let world = parent_world * self.nodes[id.0].transform.matrix();
            self.nodes[id.0].world = world;
            for &child in &self.nodes[id.0].children {
                stack.push((child, world));
            }
        }
    }

    /// World transform as of the last propagation.
    pub fn world_transform(&self, id: NodeId) -> Mat4 {
        self.nodes[id.0].world
    }

    /// All mesh-bearing nodes with their propagated transforms.
    pub fn mesh_instances(&self) -> impl Iterator<Item = MeshInstance> + '_ {
        self.nodes.iter().enumerate().filter_map(|(index, node)| {
            node.mesh.map(|mesh| MeshInstance {
                node: NodeId(index),
                mesh,
                world: node.world,
                tint: node.tint,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn child_inherits_parent_translation() {
        let mut scene = SceneGraph::new();
        let parent = scene.add_node(None, Transform::from_translation(Vec3::new(1.0, 0.0, 0.0)));
        let child = scene.add_node(
            Some(parent),
            Transform::from_translation(Vec3::new(0.0, 2.0, 0.0)),
        );

        scene.update_world_transforms();

        let world = scene.world_transform(child);
        let position = world.transform_point3(Vec3::ZERO);
        assert_relative_eq!(position.x, 1.0);
        assert_relative_eq!(position.y, 2.0);
        assert_relative_eq!(position.z, 0.0);
    }

    #[test]
    fn parent_scale_applies_to_child_offset() {
        let mut scene = SceneGraph::new();
        let parent = scene.add_node(
            None,
            Transform {
                scale: Vec3::splat(2.0),
                ..Transform::IDENTITY
            },
        );
        let child = scene.add_node(
            Some(parent),
            Transform::from_translation(Vec3::new(3.0, 0.0, 0.0)),
        );

        scene.update_world_transforms();

        let position = scene.world_transform(child).transform_point3(Vec3::ZERO);
        assert_relative_eq!(position.x, 6.0);
    }

    #[test]
    fn links_are_consistent_as_the_arena_grows() {
        let mut scene = SceneGraph::new();
        let root = scene.add_node(None, Transform::IDENTITY);
        let children: Vec<_> = (0..64)
            .map(|_| scene.add_node(Some(root), Transform::IDENTITY))
            .collect();

        assert_eq!(scene.children(root), &children[..]);
        for &child in &children {
            assert_eq!(scene.parent(child), Some(root));
            assert!(scene.children(child).is_empty());
        }
    }

    #[test]
    fn three_level_chain_composes() {
        let mut scene = SceneGraph::new();
        let a = scene.add_node(None, Transform::from_translation(Vec3::new(1.0, 0.0, 0.0)));
        let b = scene.add_node(
            Some(a),
            Transform::from_translation(Vec3::new(0.0, 1.0, 0.0)),
        );
        let c = scene.add_node(
            Some(b),
            Transform::from_translation(Vec3::new(0.0, 0.0, 1.0)),
        );

        scene.update_world_transforms();

        let position = scene.world_transform(c).transform_point3(Vec3::ZERO);
        assert_relative_eq!(position.x, 1.0);
        assert_relative_eq!(position.y, 1.0);
        assert_relative_eq!(position.z, 1.0);
    }

    #[test]
    fn mesh_instances_skip_empty_nodes() {
        let mut scene = SceneGraph::new();
        let root = scene.add_node(None, Transform::IDENTITY);
        scene.add_mesh_node(Some(root), Transform::IDENTITY, 0, Vec4::ONE);
        scene.add_mesh_node(Some(root), Transform::IDENTITY, 2, Vec4::new(1.0, 0.0, 0.0, 1.0));

        scene.update_world_transforms();

        let instances: Vec<_> = scene.mesh_instances().collect();
        assert_eq!(instances.len(), 2);
        assert_eq!(instances[0].mesh, 0);
        assert_eq!(instances[1].mesh, 2);
    }
}
