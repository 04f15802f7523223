//! Render backend abstraction
//!
//! Viewers never talk to a graphics API directly. Every tick they describe
//! what should be drawn as a [`Frame`] and hand it to a [`RenderBackend`],
//! which owns the GPU copies of geometry, textures and environment maps.

use crate::environment::EnvironmentMap;
use crate::error::Result;
use crate::primitives::Color;
use crate::three_d::scene3d::TextureImage;
use crate::three_d::{LightType, Material3D, MaterialType, Mesh3D, NodeKind, Scene3D, TextureSlot};
use glam::{Mat4, Vec3};
use std::collections::{HashMap, HashSet};

/// GPU geometry owned by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GeometryHandle(pub u64);

/// GPU texture (2D or cube) owned by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u64);

/// What fills the pixels no geometry covers
#[derive(Debug, Clone, PartialEq)]
pub enum Background {
    /// Vertical gradient from the first color (top) to the second (bottom)
    Gradient(Color, Color),
    /// Flat clear color
    Solid(Color),
    /// Environment cube map
    Environment(TextureHandle),
}

/// A light resolved to world space
#[derive(Debug, Clone, PartialEq)]
pub struct FrameLight {
    /// Light parameters
    pub light: LightType,
    /// World position
    pub position: Vec3,
    /// World direction the light points along
    pub direction: Vec3,
}

/// Material parameters as the shader sees them
#[derive(Debug, Clone, PartialEq)]
pub struct DrawMaterial {
    /// Base color factor
    pub base_color: Color,
    /// Metallic factor
    pub metallic: f32,
    /// Roughness factor
    pub roughness: f32,
    /// Emissive color
    pub emissive: Color,
    /// Opacity
    pub opacity: f32,
    /// Render both faces
    pub double_sided: bool,
    /// Render edges only
    pub wireframe: bool,
    /// Base color texture
    pub base_color_texture: Option<TextureHandle>,
    /// Whether the base color texture is sRGB encoded
    pub srgb: bool,
    /// Environment reflection map
    pub env_map: Option<TextureHandle>,
    /// Refraction as (intensity, index of refraction, texture)
    pub refraction: Option<(f32, f32, Option<TextureHandle>)>,
}

impl DrawMaterial {
    /// Snapshot `material`, mapping its texture slots through `textures`
    pub fn from_material(material: &Material3D, textures: &[Option<TextureHandle>]) -> Self {
        let (metallic, roughness, emissive) = match &material.material_type {
            MaterialType::PBR {
                metallic,
                roughness,
                emissive,
                ..
            } => (*metallic, *roughness, *emissive),
            MaterialType::Unlit { .. } => (0.0, 1.0, Color::black()),
        };
        let base = material.texture(TextureSlot::BaseColor);
        Self {
            base_color: material.base_color(),
            metallic,
            roughness,
            emissive,
            opacity: material.opacity,
            double_sided: material.double_sided,
            wireframe: material.wireframe,
            base_color_texture: base.and_then(|b| textures.get(b.texture).copied().flatten()),
            srgb: base.map_or(true, |b| b.encoding == crate::three_d::TextureEncoding::Srgb),
            env_map: material.env_map,
            refraction: material
                .refraction
                .as_ref()
                .map(|r| (r.intensity, r.index_of_refraction, r.texture)),
        }
    }
}

/// One geometry drawn with one material
#[derive(Debug, Clone, PartialEq)]
pub struct DrawItem {
    /// Geometry to draw
    pub geometry: GeometryHandle,
    /// Model matrix
    pub world: Mat4,
    /// Material to draw with
    pub material: DrawMaterial,
}

/// Debug overlays
#[derive(Debug, Clone, PartialEq)]
pub enum Helper {
    /// Ground grid on the XZ plane
    Grid {
        /// Edge length
        size: f32,
        /// Cells per edge
        divisions: u32,
    },
    /// RGB axes at the origin, drawn over everything
    Axes {
        /// Axis length
        size: f32,
    },
    /// Bone segments of a skeleton
    Skeleton {
        /// Node that owns the skin
        node: usize,
        /// Parent-to-joint line segments in world space
        segments: Vec<(Vec3, Vec3)>,
    },
}

/// Everything a backend needs to draw one image
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// View matrix
    pub view: Mat4,
    /// Projection matrix
    pub projection: Mat4,
    /// Camera position in world space
    pub camera_position: Vec3,
    /// Background fill
    pub background: Background,
    /// Tone mapping exposure
    pub exposure: f32,
    /// Active lights
    pub lights: Vec<FrameLight>,
    /// Draw list
    pub draws: Vec<DrawItem>,
    /// Debug overlays
    pub helpers: Vec<Helper>,
}

impl Frame {
    /// Empty frame seen through `view`/`projection`
    pub fn new(view: Mat4, projection: Mat4, camera_position: Vec3) -> Self {
        Self {
            view,
            projection,
            camera_position,
            background: Background::Solid(Color::white()),
            exposure: 1.0,
            lights: Vec::new(),
            draws: Vec::new(),
            helpers: Vec::new(),
        }
    }
}

/// A graphics API the viewers can draw through
pub trait RenderBackend {
    /// Upload a mesh primitive
    fn upload_geometry(&mut self, mesh: &Mesh3D) -> Result<GeometryHandle>;

    /// Upload a decoded 2D texture
    fn upload_texture(&mut self, texture: &TextureImage) -> Result<TextureHandle>;

    /// Upload a prefiltered environment cube map
    fn upload_environment(&mut self, environment: &EnvironmentMap) -> Result<TextureHandle>;

    /// Free geometry; unknown handles are ignored
    fn release_geometry(&mut self, handle: GeometryHandle);

    /// Free a texture or environment map; unknown handles are ignored
    fn release_texture(&mut self, handle: TextureHandle);

    /// Resize the drawing surface
    fn resize(&mut self, width: u32, height: u32);

    /// Draw one frame
    fn render(&mut self, frame: &Frame) -> Result<()>;
}

/// Backend that draws nothing and keeps books on what it holds
///
/// Used by tests and tooling to observe what a viewer uploads, releases and
/// submits without a GPU.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    next_id: u64,
    geometries: HashMap<GeometryHandle, usize>,
    textures: HashSet<TextureHandle>,
    size: (u32, u32),
    frames: u64,
    last_frame: Option<Frame>,
}

impl HeadlessBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Number of geometries uploaded and not yet released
    pub fn live_geometry_count(&self) -> usize {
        self.geometries.len()
    }

    /// Number of textures (including environment maps) not yet released
    pub fn live_texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Triangles across all live geometry
    pub fn live_triangle_count(&self) -> usize {
        self.geometries.values().sum()
    }

    /// Number of frames rendered
    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    /// The most recently rendered frame
    pub fn last_frame(&self) -> Option<&Frame> {
        self.last_frame.as_ref()
    }

    /// Surface size set by the last resize
    pub fn size(&self) -> (u32, u32) {
        self.size
    }
}

impl RenderBackend for HeadlessBackend {
    fn upload_geometry(&mut self, mesh: &Mesh3D) -> Result<GeometryHandle> {
        let handle = GeometryHandle(self.next_id());
        self.geometries.insert(handle, mesh.triangle_count());
        Ok(handle)
    }

    fn upload_texture(&mut self, _texture: &TextureImage) -> Result<TextureHandle> {
        let handle = TextureHandle(self.next_id());
        self.textures.insert(handle);
        Ok(handle)
    }

    fn upload_environment(&mut self, _environment: &EnvironmentMap) -> Result<TextureHandle> {
        let handle = TextureHandle(self.next_id());
        self.textures.insert(handle);
        Ok(handle)
    }

    fn release_geometry(&mut self, handle: GeometryHandle) {
        self.geometries.remove(&handle);
    }

    fn release_texture(&mut self, handle: TextureHandle) {
        self.textures.remove(&handle);
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.size = (width, height);
    }

    fn render(&mut self, frame: &Frame) -> Result<()> {
        self.frames += 1;
        self.last_frame = Some(frame.clone());
        Ok(())
    }
}

/// GPU handles of one scene's meshes and textures
#[derive(Debug, Default)]
pub struct SceneResources {
    geometries: Vec<Option<GeometryHandle>>,
    textures: Vec<Option<TextureHandle>>,
}

impl SceneResources {
    /// Upload every mesh primitive and every resolved texture of `scene`
    pub fn upload<B: RenderBackend>(scene: &Scene3D, backend: &mut B) -> Result<Self> {
        let mut resources = Self::default();
        for mesh in &scene.meshes {
            let handle = match backend.upload_geometry(mesh) {
                Ok(handle) => handle,
                Err(e) => {
                    resources.release(backend);
                    return Err(e);
                }
            };
            resources.geometries.push(Some(handle));
        }
        for texture in &scene.textures {
            if texture.image.is_none() {
                resources.textures.push(None);
                continue;
            }
            match backend.upload_texture(texture) {
                Ok(handle) => resources.textures.push(Some(handle)),
                Err(e) => {
                    resources.release(backend);
                    return Err(e);
                }
            }
        }
        Ok(resources)
    }

    /// Release everything uploaded by [`SceneResources::upload`]
    pub fn release<B: RenderBackend>(&mut self, backend: &mut B) {
        for handle in self.geometries.drain(..).flatten() {
            backend.release_geometry(handle);
        }
        for handle in self.textures.drain(..).flatten() {
            backend.release_texture(handle);
        }
    }

    /// Whether nothing is held
    pub fn is_empty(&self) -> bool {
        self.geometries.iter().all(Option::is_none) && self.textures.iter().all(Option::is_none)
    }

    /// Append draw items for every reachable mesh node of `scene` placed under `base`
    pub fn collect_draws(&self, scene: &Scene3D, base: &Mat4, draws: &mut Vec<DrawItem>) {
        let world = scene.world_transforms();
        let fallback = Material3D::default();
        scene.traverse(|index, node| {
            let NodeKind::Mesh { primitives, .. } = &node.kind else {
                return;
            };
            for &primitive in primitives {
                let Some(geometry) = self.geometries.get(primitive).copied().flatten() else {
                    continue;
                };
                let material = scene
                    .meshes
                    .get(primitive)
                    .and_then(|m| m.material_index)
                    .and_then(|i| scene.materials.get(i))
                    .unwrap_or(&fallback);
                draws.push(DrawItem {
                    geometry,
                    world: *base * world[index],
                    material: DrawMaterial::from_material(material, &self.textures),
                });
            }
        });
    }
}

/// World-space lights carried by the light nodes of `scene` placed under `base`
pub fn scene_lights(scene: &Scene3D, base: &Mat4) -> Vec<FrameLight> {
    let world = scene.world_transforms();
    let mut lights = Vec::new();
    scene.traverse(|index, node| {
        if let NodeKind::Light(light) = &node.kind {
            let transform = *base * world[index];
            lights.push(FrameLight {
                light: light.light_type.clone(),
                position: transform.transform_point3(Vec3::ZERO),
                direction: transform.transform_vector3(Vec3::NEG_Z).normalize_or_zero(),
            });
        }
    });
    lights
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scene_resources_round_trip_releases_everything() {
        let scene = Scene3D::create_test_scene();
        let mut backend = HeadlessBackend::new();

        let mut resources = SceneResources::upload(&scene, &mut backend).unwrap();
        assert_eq!(backend.live_geometry_count(), 1);
        assert_eq!(backend.live_triangle_count(), 12);

        let mut draws = Vec::new();
        resources.collect_draws(&scene, &Mat4::IDENTITY, &mut draws);
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].world.transform_point3(Vec3::ZERO), Vec3::new(-2.0, 0.0, 0.0));

        resources.release(&mut backend);
        assert!(resources.is_empty());
        assert_eq!(backend.live_geometry_count(), 0);
    }

    #[test]
    fn test_headless_render_keeps_last_frame() {
        let mut backend = HeadlessBackend::new();
        let mut frame = Frame::new(Mat4::IDENTITY, Mat4::IDENTITY, Vec3::ZERO);
        frame.exposure = 2.0;
        backend.render(&frame).unwrap();
        backend.render(&frame).unwrap();
        assert_eq!(backend.frame_count(), 2);
        assert_eq!(backend.last_frame().unwrap().exposure, 2.0);
    }

    #[test]
    fn test_scene_lights_use_node_transform() {
        let mut scene = Scene3D::new("lights".to_string());
        let mut node = crate::three_d::Node3D::with_kind(
            "sun".to_string(),
            NodeKind::Light(crate::three_d::Light::new_directional(
                "sun",
                Vec3::ZERO,
                Color::white(),
                3.0,
            )),
        );
        node.set_position(Vec3::new(0.0, 5.0, 0.0));
        scene.add_node(node);

        let lights = scene_lights(&scene, &Mat4::IDENTITY);
        assert_eq!(lights.len(), 1);
        assert_eq!(lights[0].position, Vec3::new(0.0, 5.0, 0.0));
        assert_eq!(lights[0].direction, Vec3::NEG_Z);
    }
}
