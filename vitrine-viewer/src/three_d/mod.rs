//! 3D scene support
//!
//! This module provides the scene graph, glTF import, cameras, lighting,
//! materials and the bounds/ray math used for picking.

pub mod bounds;
pub mod camera;
pub mod gltf_loader;
pub mod lighting;
pub mod material;
pub mod mesh;
pub mod scene3d;

pub use bounds::{Aabb, Ray};
pub use camera::{ArcRotateCamera, Camera3D, CameraType, OrbitControls};
pub use gltf_loader::LoadedContent;
pub use lighting::{Light, LightType};
pub use material::{Material3D, MaterialType, TextureEncoding, TextureSlot};
pub use mesh::{Mesh3D, Vertex3D};
pub use scene3d::{Node3D, NodeKind, PickHit, Scene3D};
