//! 3D mesh representation

use crate::three_d::bounds::Aabb;
use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// A 3D vertex with position, normal, and texture coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vertex3D {
    /// Position in 3D space
    pub position: Vec3,
    /// Surface normal
    pub normal: Vec3,
    /// Texture coordinates
    pub tex_coords: Vec2,
    /// Vertex color (optional)
    pub color: Option<[f32; 4]>,
}

impl Vertex3D {
    /// Create a new vertex
    pub fn new(position: Vec3, normal: Vec3, tex_coords: Vec2) -> Self {
        Self {
            position,
            normal,
            tex_coords,
            color: None,
        }
    }

    /// Create a vertex with color
    pub fn with_color(position: Vec3, normal: Vec3, tex_coords: Vec2, color: [f32; 4]) -> Self {
        Self {
            position,
            normal,
            tex_coords,
            color: Some(color),
        }
    }
}

/// A single drawable primitive: vertices, triangle indices and a material
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mesh3D {
    /// Mesh name
    pub name: String,
    /// Vertex data
    pub vertices: Vec<Vertex3D>,
    /// Index data (triangles)
    pub indices: Vec<u32>,
    /// Material index
    pub material_index: Option<usize>,
}

impl Mesh3D {
    /// Create a new mesh
    pub fn new(name: String) -> Self {
        Self {
            name,
            vertices: Vec::new(),
            indices: Vec::new(),
            material_index: None,
        }
    }

    /// Local-space bounding box, `None` for an empty mesh
    pub fn bounding_box(&self) -> Option<Aabb> {
        Aabb::from_points(self.vertices.iter().map(|v| v.position))
    }

    /// Number of triangles described by the index buffer
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Create an axis-aligned cube mesh centered on the origin
    pub fn create_cube(size: f32) -> Self {
        let half = size * 0.5;

        let faces = [
            (Vec3::Z, Vec3::X, Vec3::Y),
            (-Vec3::Z, -Vec3::X, Vec3::Y),
            (Vec3::Y, Vec3::X, -Vec3::Z),
            (-Vec3::Y, Vec3::X, Vec3::Z),
            (Vec3::X, -Vec3::Z, Vec3::Y),
            (-Vec3::X, Vec3::Z, Vec3::Y),
        ];

        let mut mesh = Self::new("Cube".to_string());
        for (normal, u, v) in faces {
            let base = mesh.vertices.len() as u32;
            let center = normal * half;
            for (du, dv, uv) in [
                (-1.0, -1.0, Vec2::new(0.0, 0.0)),
                (1.0, -1.0, Vec2::new(1.0, 0.0)),
                (1.0, 1.0, Vec2::new(1.0, 1.0)),
                (-1.0, 1.0, Vec2::new(0.0, 1.0)),
            ] {
                let position = center + u * (du * half) + v * (dv * half);
                mesh.vertices.push(Vertex3D::new(position, normal, uv));
            }
            mesh.indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
        }

        mesh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_bounds() {
        let cube = Mesh3D::create_cube(2.0);
        let aabb = cube.bounding_box().unwrap();
        assert_eq!(aabb.min, Vec3::splat(-1.0));
        assert_eq!(aabb.max, Vec3::splat(1.0));
        assert_eq!(cube.triangle_count(), 12);
    }

    #[test]
    fn test_empty_mesh_has_no_bounds() {
        assert!(Mesh3D::new("empty".to_string()).bounding_box().is_none());
    }
}
