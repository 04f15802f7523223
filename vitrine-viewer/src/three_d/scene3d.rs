//! 3D scene management

use crate::three_d::bounds::{Aabb, Ray};
use crate::three_d::{CameraType, Light, Material3D, Mesh3D};
use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What a scene-graph node carries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    /// Pure transform node
    Group,
    /// Renderable geometry
    Mesh {
        /// Indices into [`Scene3D::meshes`], one per primitive
        primitives: Vec<usize>,
        /// Index into [`Scene3D::skins`] for skinned meshes
        skin: Option<usize>,
    },
    /// Punctual light
    Light(Light),
    /// Camera
    Camera(CameraType),
}

/// A node in the 3D scene graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node3D {
    /// Node name
    pub name: String,
    /// Payload of the node
    pub kind: NodeKind,
    /// Local translation
    pub translation: Vec3,
    /// Local rotation
    pub rotation: Quat,
    /// Local scale
    pub scale: Vec3,
    /// Morph target weights
    pub weights: Vec<f32>,
    /// Parent node index
    pub parent: Option<usize>,
    /// Children node indices
    pub children: Vec<usize>,
}

impl Node3D {
    /// Create a new group node
    pub fn new(name: String) -> Self {
        Self::with_kind(name, NodeKind::Group)
    }

    /// Create a node with the given payload
    pub fn with_kind(name: String, kind: NodeKind) -> Self {
        Self {
            name,
            kind,
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            weights: Vec::new(),
            parent: None,
            children: Vec::new(),
        }
    }

    /// Set position
    pub fn set_position(&mut self, position: Vec3) {
        self.translation = position;
    }

    /// Local transform matrix
    pub fn local_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    /// Human readable type tag used in graph dumps
    pub fn type_name(&self) -> &'static str {
        match self.kind {
            NodeKind::Group => "Group",
            NodeKind::Mesh { skin: Some(_), .. } => "SkinnedMesh",
            NodeKind::Mesh { .. } => "Mesh",
            NodeKind::Light(_) => "Light",
            NodeKind::Camera(_) => "Camera",
        }
    }
}

/// Joint hierarchy of a skinned mesh
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skin {
    /// Skin name
    pub name: String,
    /// Joint node indices
    pub joints: Vec<usize>,
}

/// Decoded texture image
#[derive(Debug, Clone)]
pub struct TextureImage {
    /// Texture name or source URI
    pub name: String,
    /// RGBA8 texels, `None` when the source could not be resolved
    pub image: Option<image::RgbaImage>,
}

/// Result of a successful pick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PickHit {
    /// Index of the mesh node that was hit
    pub node: usize,
    /// Distance along the ray
    pub distance: f32,
}

/// A complete 3D scene
#[derive(Debug, Clone)]
pub struct Scene3D {
    /// Scene name
    pub name: String,
    /// All nodes in the scene
    pub nodes: Vec<Node3D>,
    /// Root node indices
    pub roots: Vec<usize>,
    /// All mesh primitives
    pub meshes: Vec<Mesh3D>,
    /// All materials
    pub materials: Vec<Material3D>,
    /// All textures
    pub textures: Vec<TextureImage>,
    /// All skins
    pub skins: Vec<Skin>,
    /// Named node lookup
    node_map: HashMap<String, usize>,
}

impl Scene3D {
    /// Create a new empty scene
    pub fn new(name: String) -> Self {
        Self {
            name,
            nodes: Vec::new(),
            roots: Vec::new(),
            meshes: Vec::new(),
            materials: Vec::new(),
            textures: Vec::new(),
            skins: Vec::new(),
            node_map: HashMap::new(),
        }
    }

    /// Add a root node to the scene
    pub fn add_node(&mut self, mut node: Node3D) -> usize {
        let index = self.nodes.len();
        node.parent = None;
        self.node_map.entry(node.name.clone()).or_insert(index);
        self.nodes.push(node);
        self.roots.push(index);
        index
    }

    /// Add a child node
    pub fn add_child(&mut self, parent_index: usize, mut child: Node3D) -> Option<usize> {
        if parent_index >= self.nodes.len() {
            return None;
        }

        let child_index = self.nodes.len();
        child.parent = Some(parent_index);
        self.node_map.entry(child.name.clone()).or_insert(child_index);
        self.nodes.push(child);
        self.nodes[parent_index].children.push(child_index);

        Some(child_index)
    }

    /// Move node `child` under `parent`; returns false when either index is invalid
    pub fn attach(&mut self, child: usize, parent: usize) -> bool {
        if child == parent || child >= self.nodes.len() || parent >= self.nodes.len() {
            return false;
        }
        match self.nodes[child].parent {
            Some(old) => self.nodes[old].children.retain(|&c| c != child),
            None => self.roots.retain(|&r| r != child),
        }
        self.nodes[child].parent = Some(parent);
        self.nodes[parent].children.push(child);
        true
    }

    /// Put every current root under a new root node and return its index
    pub fn wrap_roots(&mut self, name: String) -> usize {
        let old_roots = std::mem::take(&mut self.roots);
        let wrapper = self.add_node(Node3D::new(name));
        for &root in &old_roots {
            self.nodes[root].parent = Some(wrapper);
        }
        self.nodes[wrapper].children = old_roots;
        wrapper
    }

    /// Add a mesh primitive
    pub fn add_mesh(&mut self, mesh: Mesh3D) -> usize {
        let index = self.meshes.len();
        self.meshes.push(mesh);
        index
    }

    /// Add a material
    pub fn add_material(&mut self, material: Material3D) -> usize {
        let index = self.materials.len();
        self.materials.push(material);
        index
    }

    /// Get a node by name
    pub fn get_node(&self, name: &str) -> Option<&Node3D> {
        self.node_map.get(name).and_then(|&idx| self.nodes.get(idx))
    }

    /// Index of the first node with the given name
    pub fn node_index(&self, name: &str) -> Option<usize> {
        self.node_map.get(name).copied()
    }

    /// Visit every node reachable from the roots, parents before children
    pub fn traverse<F: FnMut(usize, &Node3D)>(&self, mut visit: F) {
        let mut stack: Vec<usize> = self.roots.iter().rev().copied().collect();
        while let Some(index) = stack.pop() {
            let Some(node) = self.nodes.get(index) else {
                continue;
            };
            visit(index, node);
            stack.extend(node.children.iter().rev().copied());
        }
    }

    /// World transform of every node (identity for unreachable nodes)
    pub fn world_transforms(&self) -> Vec<Mat4> {
        let mut world = vec![Mat4::IDENTITY; self.nodes.len()];
        self.traverse(|index, node| {
            let parent = node.parent.map(|p| world[p]).unwrap_or(Mat4::IDENTITY);
            world[index] = parent * node.local_matrix();
        });
        world
    }

    /// Calculate world transform for a single node
    pub fn world_transform(&self, node_index: usize) -> Mat4 {
        let mut transform = Mat4::IDENTITY;
        let mut current = Some(node_index);
        while let Some(index) = current {
            let Some(node) = self.nodes.get(index) else {
                break;
            };
            transform = node.local_matrix() * transform;
            current = node.parent;
        }
        transform
    }

    /// Indices of materials referenced by reachable mesh nodes
    pub fn materials_in_use(&self) -> Vec<usize> {
        let mut used = Vec::new();
        self.traverse(|_, node| {
            if let NodeKind::Mesh { primitives, .. } = &node.kind {
                for &primitive in primitives {
                    let material = self.meshes.get(primitive).and_then(|m| m.material_index);
                    if let Some(material) = material {
                        if !used.contains(&material) {
                            used.push(material);
                        }
                    }
                }
            }
        });
        used
    }

    /// Apply `f` to every material referenced by a reachable mesh node
    pub fn traverse_materials<F: FnMut(&mut Material3D)>(&mut self, mut f: F) {
        for index in self.materials_in_use() {
            if let Some(material) = self.materials.get_mut(index) {
                f(material);
            }
        }
    }

    /// Whether the scene carries any punctual light
    pub fn has_lights(&self) -> bool {
        let mut found = false;
        self.traverse(|_, node| {
            if matches!(node.kind, NodeKind::Light(_)) {
                found = true;
            }
        });
        found
    }

    /// Names of camera nodes, in traversal order
    pub fn camera_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.traverse(|_, node| {
            if matches!(node.kind, NodeKind::Camera(_)) {
                names.push(node.name.clone());
            }
        });
        names
    }

    /// Index of the camera node with the given name
    pub fn find_camera(&self, name: &str) -> Option<usize> {
        let mut found = None;
        self.traverse(|index, node| {
            if found.is_none() && node.name == name && matches!(node.kind, NodeKind::Camera(_)) {
                found = Some(index);
            }
        });
        found
    }

    /// Bounds of one mesh node's primitives under the `world` transform
    pub fn node_bounds(&self, node_index: usize, world: &Mat4) -> Option<Aabb> {
        let NodeKind::Mesh { primitives, .. } = &self.nodes.get(node_index)?.kind else {
            return None;
        };
        primitives
            .iter()
            .filter_map(|&p| self.meshes.get(p)?.bounding_box())
            .map(|aabb| aabb.transformed(world))
            .reduce(|a, b| a.union(&b))
    }

    /// World-space bounds of all geometry, placed under `base`
    pub fn bounding_box(&self, base: &Mat4) -> Option<Aabb> {
        let world = self.world_transforms();
        let mut bounds: Option<Aabb> = None;
        self.traverse(|index, _| {
            if let Some(node_bounds) = self.node_bounds(index, &(*base * world[index])) {
                bounds = Some(match bounds {
                    Some(b) => b.union(&node_bounds),
                    None => node_bounds,
                });
            }
        });
        bounds
    }

    /// Nearest mesh node whose bounds the ray crosses, with the scene placed under `base`
    pub fn pick(&self, ray: &Ray, base: &Mat4) -> Option<PickHit> {
        let world = self.world_transforms();
        let mut best: Option<PickHit> = None;
        self.traverse(|index, _| {
            let Some(bounds) = self.node_bounds(index, &(*base * world[index])) else {
                return;
            };
            if let Some(distance) = ray.intersect_aabb(&bounds) {
                match best {
                    Some(hit) if distance >= hit.distance => {}
                    _ => best = Some(PickHit { node: index, distance }),
                }
            }
        });
        best
    }

    /// Translate every root node by `offset`
    pub fn translate_roots(&mut self, offset: Vec3) {
        for &root in &self.roots {
            if let Some(node) = self.nodes.get_mut(root) {
                node.translation += offset;
            }
        }
    }

    /// Indented ` <Type> name` lines describing the node hierarchy
    pub fn graph_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        let mut stack: Vec<(usize, usize)> = self.roots.iter().rev().map(|&r| (r, 0)).collect();
        while let Some((index, depth)) = stack.pop() {
            let Some(node) = self.nodes.get(index) else {
                continue;
            };
            lines.push(format!("{}<{}> {}", "  ".repeat(depth), node.type_name(), node.name));
            stack.extend(node.children.iter().rev().map(|&c| (c, depth + 1)));
        }
        lines
    }

    /// Create a simple test scene: a cube named `Cube` and a unit camera
    pub fn create_test_scene() -> Self {
        let mut scene = Self::new("Test Scene".to_string());
        let material = scene.add_material(Material3D::default());

        let mut cube = Mesh3D::create_cube(2.0);
        cube.material_index = Some(material);
        let cube_idx = scene.add_mesh(cube);

        let mut cube_node = Node3D::with_kind(
            "Cube".to_string(),
            NodeKind::Mesh {
                primitives: vec![cube_idx],
                skin: None,
            },
        );
        cube_node.set_position(Vec3::new(-2.0, 0.0, 0.0));
        scene.add_node(cube_node);

        let mut camera = Node3D::with_kind(
            "Overview".to_string(),
            NodeKind::Camera(CameraType::Perspective {
                fov: 1.0,
                near: 0.1,
                far: 100.0,
            }),
        );
        camera.set_position(Vec3::new(0.0, 0.0, 10.0));
        scene.add_node(camera);

        scene
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_world_transform_composes_parents() {
        let mut scene = Scene3D::new("t".to_string());
        let mut parent = Node3D::new("parent".to_string());
        parent.set_position(Vec3::new(1.0, 0.0, 0.0));
        let parent_idx = scene.add_node(parent);
        let mut child = Node3D::new("child".to_string());
        child.set_position(Vec3::new(0.0, 2.0, 0.0));
        let child_idx = scene.add_child(parent_idx, child).unwrap();

        let expected = Vec3::new(1.0, 2.0, 0.0);
        assert_eq!(scene.world_transform(child_idx).transform_point3(Vec3::ZERO), expected);
        assert_eq!(scene.world_transforms()[child_idx].transform_point3(Vec3::ZERO), expected);
    }

    #[test]
    fn test_bounds_and_pick() {
        let scene = Scene3D::create_test_scene();
        let bounds = scene.bounding_box(&Mat4::IDENTITY).unwrap();
        assert_eq!(bounds.center(), Vec3::new(-2.0, 0.0, 0.0));

        let ray = Ray::new(Vec3::new(-2.0, 0.0, 20.0), -Vec3::Z);
        let hit = scene.pick(&ray, &Mat4::IDENTITY).unwrap();
        assert_eq!(scene.nodes[hit.node].name, "Cube");

        let offset = Mat4::from_translation(Vec3::new(400.0, 0.0, 0.0));
        assert!(scene.pick(&ray, &offset).is_none());
    }

    #[test]
    fn test_camera_lookup_and_lights() {
        let scene = Scene3D::create_test_scene();
        assert_eq!(scene.camera_names(), vec!["Overview".to_string()]);
        assert!(scene.find_camera("Cube").is_none());
        assert!(!scene.has_lights());
    }

    #[test]
    fn test_wrap_roots() {
        let mut scene = Scene3D::create_test_scene();
        let root = scene.wrap_roots("model".to_string());
        assert_eq!(scene.roots, vec![root]);
        assert_eq!(scene.nodes[root].children.len(), 2);
        assert_eq!(scene.graph_lines()[1], "  <Mesh> Cube");
    }
}
