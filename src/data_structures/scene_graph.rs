//! Scene graph and hierarchical scene organization.
//!
//! The graph is an arena of [`Node`]s addressed by [`NodeId`]. It holds no GPU
//! resources: meshes and images are referred to by index and realised by
//! [`crate::render::Renderer`], which appends its GPU data in the same order
//! the graph hands out ids. This keeps everything the scene setup does to the
//! graph (freezing, material wiring, picking) testable without a device.

use cgmath::{EuclideanSpace, InnerSpace, Transform};
use log::warn;

use crate::data_structures::{
    instance::Instance,
    material::{MaterialId, StandardMaterial, TextureId, TextureInfo, TextureSource},
};

pub type NodeId = usize;
/// Index of a GPU mesh owned by the renderer.
pub type MeshId = usize;

/// Per-node rendering optimisations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MeshFlags {
    /// Considered by [`SceneGraph::pick`].
    pub pickable: bool,
    /// Recompute the world bounding box whenever the world matrix changes.
    pub sync_bounding_info: bool,
    /// World matrix is cached and never recomputed. There is no way back.
    pub world_matrix_frozen: bool,
}

impl Default for MeshFlags {
    fn default() -> Self {
        Self {
            pickable: true,
            sync_bounding_info: true,
            world_matrix_frozen: false,
        }
    }
}

/// Axis aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: cgmath::Point3<f32>,
    pub max: cgmath::Point3<f32>,
}

impl Aabb {
    pub fn from_points<I: IntoIterator<Item = [f32; 3]>>(points: I) -> Option<Self> {
        points.into_iter().fold(None, |bounds, [x, y, z]| {
            let p = cgmath::Point3::new(x, y, z);
            Some(match bounds {
                None => Aabb { min: p, max: p },
                Some(b) => b.including(p),
            })
        })
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        self.including(other.min).including(other.max)
    }

    pub fn center(&self) -> cgmath::Point3<f32> {
        self.min.midpoint(self.max)
    }

    /// Box enclosing all eight transformed corners.
    pub fn transform(&self, matrix: &cgmath::Matrix4<f32>) -> Aabb {
        let (lo, hi) = (self.min, self.max);
        let corners = [
            [lo.x, lo.y, lo.z],
            [hi.x, lo.y, lo.z],
            [lo.x, hi.y, lo.z],
            [lo.x, lo.y, hi.z],
            [hi.x, hi.y, lo.z],
            [hi.x, lo.y, hi.z],
            [lo.x, hi.y, hi.z],
            [hi.x, hi.y, hi.z],
        ]
        .map(|c| matrix.transform_point(c.into()).into());
        // Eight corners are never empty
        Aabb::from_points(corners).unwrap_or(*self)
    }

    /// Distance along the ray to the first hit, using the slab method.
    pub fn intersect(&self, ray: &Ray) -> Option<f32> {
        let mut t_min = f32::NEG_INFINITY;
        let mut t_max = f32::INFINITY;
        for axis in 0..3 {
            let origin = ray.origin[axis];
            let dir = ray.direction[axis];
            if dir.abs() < f32::EPSILON {
                if origin < self.min[axis] || origin > self.max[axis] {
                    return None;
                }
                continue;
            }
            let t1 = (self.min[axis] - origin) / dir;
            let t2 = (self.max[axis] - origin) / dir;
            t_min = t_min.max(t1.min(t2));
            t_max = t_max.min(t1.max(t2));
        }
        if t_max < t_min.max(0.0) {
            return None;
        }
        Some(if t_min >= 0.0 { t_min } else { t_max })
    }

    fn including(&self, p: cgmath::Point3<f32>) -> Aabb {
        Aabb {
            min: cgmath::Point3::new(self.min.x.min(p.x), self.min.y.min(p.y), self.min.z.min(p.z)),
            max: cgmath::Point3::new(self.max.x.max(p.x), self.max.y.max(p.y), self.max.z.max(p.z)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray {
    pub origin: cgmath::Point3<f32>,
    pub direction: cgmath::Vector3<f32>,
}

impl Ray {
    pub fn new(origin: cgmath::Point3<f32>, direction: cgmath::Vector3<f32>) -> Self {
        Self {
            origin,
            direction: direction.normalize(),
        }
    }
}

/// Work deferred until a node's GPU resources exist.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadyAction {
    PlayVideo(TextureId),
}

/// A drawable piece of a node: one GPU mesh with its material.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Primitive {
    pub mesh: MeshId,
    pub material: Option<MaterialId>,
}

#[derive(Clone, Debug)]
pub struct Node {
    name: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    pub local: Instance,
    world: cgmath::Matrix4<f32>,
    primitives: Vec<Primitive>,
    bounds: Option<Aabb>,
    world_bounds: Option<Aabb>,
    flags: MeshFlags,
    on_ready: Option<ReadyAction>,
}

impl Node {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn world_matrix(&self) -> &cgmath::Matrix4<f32> {
        &self.world
    }

    pub fn world_position(&self) -> cgmath::Point3<f32> {
        cgmath::Point3::from_vec(self.world.w.truncate())
    }

    pub fn primitives(&self) -> &[Primitive] {
        &self.primitives
    }

    pub fn is_mesh(&self) -> bool {
        !self.primitives.is_empty()
    }

    pub fn flags(&self) -> MeshFlags {
        self.flags
    }

    pub fn set_pickable(&mut self, pickable: bool) {
        self.flags.pickable = pickable;
    }

    pub fn set_sync_bounding_info(&mut self, sync: bool) {
        self.flags.sync_bounding_info = sync;
    }

    /// World space bounding box as of the last sync.
    pub fn bounding_box(&self) -> Option<Aabb> {
        self.world_bounds
    }

    /// Assign one material to every primitive of this node.
    pub fn set_material(&mut self, material: MaterialId) {
        self.primitives
            .iter_mut()
            .for_each(|p| p.material = Some(material));
    }

    /// Register a one-shot action run once the node is ready to draw.
    pub fn set_on_ready(&mut self, action: ReadyAction) {
        self.on_ready = Some(action);
    }

    fn sync_bounds(&mut self) {
        if self.flags.sync_bounding_info {
            self.world_bounds = self.bounds.map(|b| b.transform(&self.world));
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SceneGraph {
    nodes: Vec<Node>,
    roots: Vec<NodeId>,
    materials: Vec<StandardMaterial>,
    textures: Vec<TextureInfo>,
    mesh_count: usize,
    image_count: usize,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn add_node(
        &mut self,
        name: impl Into<String>,
        parent: Option<NodeId>,
        local: Instance,
    ) -> NodeId {
        let id = self.nodes.len();
        let parent = parent.filter(|&p| {
            let exists = p < id;
            if !exists {
                warn!("parent {p} does not exist, adding node {id} as a root");
            }
            exists
        });
        self.nodes.push(Node {
            name: name.into(),
            parent,
            children: Vec::new(),
            local,
            world: cgmath::Matrix4::from_scale(1.0),
            primitives: Vec::new(),
            bounds: None,
            world_bounds: None,
            flags: MeshFlags::default(),
            on_ready: None,
        });
        match parent {
            Some(p) => self.nodes[p].children.push(id),
            None => self.roots.push(id),
        }
        id
    }

    /// Attach a mesh to a node. `bounds` are in the node's local space.
    pub fn add_primitive(
        &mut self,
        id: NodeId,
        mesh: MeshId,
        material: Option<MaterialId>,
        bounds: Option<Aabb>,
    ) {
        self.mesh_count = self.mesh_count.max(mesh + 1);
        if let Some(node) = self.nodes.get_mut(id) {
            node.primitives.push(Primitive { mesh, material });
            node.bounds = match (node.bounds, bounds) {
                (Some(a), Some(b)) => Some(a.union(&b)),
                (a, b) => a.or(b),
            };
        }
    }

    pub fn add_material(&mut self, material: StandardMaterial) -> MaterialId {
        self.materials.push(material);
        self.materials.len() - 1
    }

    pub fn add_texture(&mut self, texture: TextureInfo) -> TextureId {
        if let TextureSource::Image(image) = texture.source {
            self.image_count = self.image_count.max(image + 1);
        }
        self.textures.push(texture);
        self.textures.len() - 1
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate()
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn material(&self, id: MaterialId) -> Option<&StandardMaterial> {
        self.materials.get(id)
    }

    pub fn materials(&self) -> &[StandardMaterial] {
        &self.materials
    }

    pub fn texture(&self, id: TextureId) -> Option<&TextureInfo> {
        self.textures.get(id)
    }

    pub fn texture_mut(&mut self, id: TextureId) -> Option<&mut TextureInfo> {
        self.textures.get_mut(id)
    }

    pub fn textures(&self) -> &[TextureInfo] {
        &self.textures
    }

    /// Number of GPU meshes the graph refers to.
    pub fn mesh_count(&self) -> usize {
        self.mesh_count
    }

    /// Number of decoded images the graph refers to.
    pub fn image_count(&self) -> usize {
        self.image_count
    }

    /// First node with the given name.
    pub fn get_node_by_name(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().position(|n| n.name == name)
    }

    /// First node with the given name that carries geometry.
    pub fn get_mesh_by_name(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().position(|n| n.name == name && n.is_mesh())
    }

    /// All descendants of `id` that carry geometry, depth first.
    pub fn child_meshes(&self, id: NodeId) -> Vec<NodeId> {
        let mut meshes = Vec::new();
        let mut stack: Vec<NodeId> = self
            .node(id)
            .map(|n| n.children.iter().rev().copied().collect())
            .unwrap_or_default();
        while let Some(current) = stack.pop() {
            let node = &self.nodes[current];
            if node.is_mesh() {
                meshes.push(current);
            }
            stack.extend(node.children.iter().rev());
        }
        meshes
    }

    /// Compute the node's world matrix now and never recompute it.
    pub fn freeze_world_matrix(&mut self, id: NodeId) {
        if id >= self.nodes.len() {
            warn!("cannot freeze unknown node {id}");
            return;
        }
        let world = self.compute_world(id);
        let node = &mut self.nodes[id];
        node.world = world;
        node.sync_bounds();
        node.flags.world_matrix_frozen = true;
    }

    /// Recompute world matrices of every unfrozen node.
    ///
    /// Returns the ids whose world matrix was recomputed so their GPU copy
    /// can be refreshed.
    pub fn update_world_matrices(&mut self) -> Vec<NodeId> {
        let mut updated = Vec::new();
        let identity = cgmath::Matrix4::from_scale(1.0);
        let mut stack: Vec<(NodeId, cgmath::Matrix4<f32>)> =
            self.roots.iter().rev().map(|&r| (r, identity)).collect();
        while let Some((id, parent_world)) = stack.pop() {
            let node = &mut self.nodes[id];
            if !node.flags.world_matrix_frozen {
                node.world = parent_world * node.local.to_matrix();
                node.sync_bounds();
                updated.push(id);
            }
            let world = node.world;
            stack.extend(node.children.iter().rev().map(|&c| (c, world)));
        }
        updated
    }

    /// Nearest pickable mesh hit by the ray.
    pub fn pick(&self, ray: &Ray) -> Option<NodeId> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.flags.pickable && n.is_mesh())
            .filter_map(|(id, n)| Some((id, n.world_bounds?.intersect(ray)?)))
            .min_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(id, _)| id)
    }

    /// Take the node's pending ready action. Each action is handed out once.
    pub fn take_ready_action(&mut self, id: NodeId) -> Option<ReadyAction> {
        self.nodes.get_mut(id).and_then(|n| n.on_ready.take())
    }

    /// Move all nodes, materials and textures of `other` into `self`.
    ///
    /// Ids inside `other` are shifted past the ones already in use. World
    /// matrices and bounds of the appended nodes are computed right away.
    /// Returns the new ids of the appended nodes in their original order.
    pub fn append(&mut self, other: SceneGraph) -> Vec<NodeId> {
        let node_offset = self.nodes.len();
        let material_offset = self.materials.len();
        let texture_offset = self.textures.len();
        let mesh_offset = self.mesh_count;
        let image_offset = self.image_count;

        for mut texture in other.textures {
            if let TextureSource::Image(image) = &mut texture.source {
                *image += image_offset;
            }
            self.textures.push(texture);
        }
        for mut material in other.materials {
            material.diffuse_texture = material.diffuse_texture.map(|t| t + texture_offset);
            material.emissive_texture = material.emissive_texture.map(|t| t + texture_offset);
            self.materials.push(material);
        }
        for mut node in other.nodes {
            node.parent = node.parent.map(|p| p + node_offset);
            node.children.iter_mut().for_each(|c| *c += node_offset);
            node.primitives.iter_mut().for_each(|p| {
                p.mesh += mesh_offset;
                p.material = p.material.map(|m| m + material_offset);
            });
            if let Some(ReadyAction::PlayVideo(t)) = &mut node.on_ready {
                *t += texture_offset;
            }
            self.nodes.push(node);
        }
        self.roots
            .extend(other.roots.iter().map(|r| r + node_offset));
        self.mesh_count += other.mesh_count;
        self.image_count += other.image_count;

        let appended: Vec<NodeId> = (node_offset..self.nodes.len()).collect();
        for &root in &other.roots {
            let id = root + node_offset;
            let mut stack = vec![(id, cgmath::Matrix4::from_scale(1.0))];
            while let Some((id, parent_world)) = stack.pop() {
                let node = &mut self.nodes[id];
                node.world = parent_world * node.local.to_matrix();
                node.sync_bounds();
                let world = node.world;
                stack.extend(node.children.iter().map(|&c| (c, world)));
            }
        }
        appended
    }

    fn compute_world(&self, id: NodeId) -> cgmath::Matrix4<f32> {
        let node = &self.nodes[id];
        if node.flags.world_matrix_frozen {
            return node.world;
        }
        let local = node.local.to_matrix();
        match node.parent {
            Some(parent) => self.compute_world(parent) * local,
            None => local,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box() -> Option<Aabb> {
        Aabb::from_points([[-0.5, -0.5, -0.5], [0.5, 0.5, 0.5]])
    }

    fn at(x: f32, y: f32, z: f32) -> Instance {
        Instance::from(cgmath::Vector3::new(x, y, z))
    }

    /// root -> (a (mesh) -> b (mesh)), c (mesh)
    fn sample() -> (SceneGraph, [NodeId; 4]) {
        let mut graph = SceneGraph::new();
        let root = graph.add_node("__root__", None, Instance::default());
        let a = graph.add_node("a", Some(root), at(1.0, 0.0, 0.0));
        let b = graph.add_node("b", Some(a), at(0.0, 1.0, 0.0));
        let c = graph.add_node("c", Some(root), at(0.0, 0.0, -3.0));
        graph.add_primitive(a, 0, None, unit_box());
        graph.add_primitive(b, 1, None, unit_box());
        graph.add_primitive(c, 2, None, unit_box());
        graph.update_world_matrices();
        (graph, [root, a, b, c])
    }

    #[test]
    fn world_matrices_compose_through_parents() {
        let (graph, [_, _, b, _]) = sample();
        let p = graph.node(b).unwrap().world_position();
        assert_eq!(p, cgmath::Point3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn frozen_nodes_keep_their_world_matrix() {
        let (mut graph, [_, a, b, _]) = sample();
        graph.freeze_world_matrix(a);
        graph.node_mut(a).unwrap().local = at(10.0, 0.0, 0.0);
        let updated = graph.update_world_matrices();
        assert!(!updated.contains(&a));
        assert!(updated.contains(&b));
        assert_eq!(
            graph.node(a).unwrap().world_position(),
            cgmath::Point3::new(1.0, 0.0, 0.0)
        );
        // children follow the frozen parent
        assert_eq!(
            graph.node(b).unwrap().world_position(),
            cgmath::Point3::new(1.0, 1.0, 0.0)
        );
    }

    #[test]
    fn bounding_boxes_stop_following_when_sync_is_disabled() {
        let (mut graph, [_, _, _, c]) = sample();
        let before = graph.node(c).unwrap().bounding_box();
        graph.node_mut(c).unwrap().set_sync_bounding_info(false);
        graph.node_mut(c).unwrap().local = at(5.0, 5.0, 5.0);
        graph.update_world_matrices();
        assert_eq!(graph.node(c).unwrap().bounding_box(), before);
        assert_eq!(
            graph.node(c).unwrap().world_position(),
            cgmath::Point3::new(5.0, 5.0, 5.0)
        );
    }

    #[test]
    fn finds_nodes_and_child_meshes_by_name() {
        let (graph, [root, a, b, c]) = sample();
        assert_eq!(graph.get_node_by_name("a"), Some(a));
        assert_eq!(graph.get_mesh_by_name("__root__"), None);
        assert_eq!(graph.get_node_by_name("missing"), None);
        assert_eq!(graph.child_meshes(root), vec![a, b, c]);
        assert_eq!(graph.child_meshes(a), vec![b]);
        assert!(graph.child_meshes(c).is_empty());
    }

    #[test]
    fn picks_the_nearest_pickable_mesh() {
        let (mut graph, [_, _, _, c]) = sample();
        let far = graph.add_node("far", None, at(0.0, 0.0, -6.0));
        graph.add_primitive(far, 3, None, unit_box());
        graph.update_world_matrices();

        let ray = Ray::new([0.0, 0.0, 5.0].into(), [0.0, 0.0, -1.0].into());
        assert_eq!(graph.pick(&ray), Some(c));

        graph.node_mut(c).unwrap().set_pickable(false);
        assert_eq!(graph.pick(&ray), Some(far));

        let miss = Ray::new([0.0, 10.0, 5.0].into(), [0.0, 0.0, -1.0].into());
        assert_eq!(graph.pick(&miss), None);
    }

    #[test]
    fn ray_starting_inside_a_box_hits_its_far_side() {
        let bounds = unit_box().unwrap();
        let ray = Ray::new([0.0, 0.0, 0.0].into(), [1.0, 0.0, 0.0].into());
        assert_eq!(bounds.intersect(&ray), Some(0.5));
        let behind = Ray::new([2.0, 0.0, 0.0].into(), [1.0, 0.0, 0.0].into());
        assert_eq!(bounds.intersect(&behind), None);
    }

    #[test]
    fn ready_actions_fire_once() {
        let (mut graph, [_, a, _, _]) = sample();
        graph.node_mut(a).unwrap().set_on_ready(ReadyAction::PlayVideo(0));
        assert_eq!(graph.take_ready_action(a), Some(ReadyAction::PlayVideo(0)));
        assert_eq!(graph.take_ready_action(a), None);
    }

    #[test]
    fn appending_shifts_every_id() {
        let (mut graph, _) = sample();
        graph.add_texture(TextureInfo::new("t0", TextureSource::Image(0)));
        graph.add_material(StandardMaterial::new("m0"));

        let mut other = SceneGraph::new();
        let t = other.add_texture(TextureInfo::new("t1", TextureSource::Image(0)));
        let mut material = StandardMaterial::new("m1");
        material.diffuse_texture = Some(t);
        let m = other.add_material(material);
        let root = other.add_node("root", None, at(0.0, 2.0, 0.0));
        let child = other.add_node("child", Some(root), Instance::default());
        other.add_primitive(child, 0, Some(m), unit_box());

        let appended = graph.append(other);
        assert_eq!(appended, vec![4, 5]);
        assert_eq!(graph.roots(), &[0, 4]);

        let child = graph.node(5).unwrap();
        assert_eq!(child.parent(), Some(4));
        assert_eq!(child.primitives()[0], Primitive { mesh: 3, material: Some(1) });
        assert_eq!(child.world_position(), cgmath::Point3::new(0.0, 2.0, 0.0));
        assert_eq!(graph.material(1).unwrap().diffuse_texture, Some(1));
        assert_eq!(graph.texture(1).unwrap().source, TextureSource::Image(1));
        assert_eq!(graph.mesh_count(), 4);
        assert_eq!(graph.image_count(), 2);
    }

    #[test]
    fn setting_a_material_covers_all_primitives() {
        let (mut graph, [_, a, _, _]) = sample();
        graph.add_primitive(a, 7, None, None);
        let m = graph.add_material(StandardMaterial::new("screen"));
        graph.node_mut(a).unwrap().set_material(m);
        assert!(graph.node(a).unwrap().primitives().iter().all(|p| p.material == Some(m)));
    }
}
