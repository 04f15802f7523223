//! Material system for 3D objects

use crate::backend::TextureHandle;
use crate::primitives::Color;
use serde::{Deserialize, Serialize};

/// Color space a texture's texels are stored in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TextureEncoding {
    /// Gamma-encoded sRGB texels
    #[default]
    #[serde(rename = "sRGB")]
    Srgb,
    /// Linear texels
    Linear,
}

/// Texture slots a glTF material can fill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureSlot {
    /// Base color (albedo) map
    BaseColor,
    /// Packed metallic (B) / roughness (G) map
    MetallicRoughness,
    /// Tangent-space normal map
    Normal,
    /// Ambient occlusion map
    Occlusion,
    /// Emissive map
    Emissive,
}

impl TextureSlot {
    /// Slots whose texels carry color and therefore follow the viewer's encoding
    pub fn is_color(&self) -> bool {
        matches!(self, TextureSlot::BaseColor | TextureSlot::Emissive)
    }
}

/// A texture referenced from a material slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextureBinding {
    /// Slot the texture is bound to
    pub slot: TextureSlot,
    /// Index into the owning scene's texture list
    pub texture: usize,
    /// Encoding the sampler decodes with
    pub encoding: TextureEncoding,
}

/// Types of materials
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MaterialType {
    /// Basic unlit material
    Unlit {
        /// Base color
        color: Color,
    },
    /// Physically-based rendering material (metallic-roughness)
    PBR {
        /// Base color
        base_color: Color,
        /// Metallic factor (0.0 = dielectric, 1.0 = metal)
        metallic: f32,
        /// Roughness factor (0.0 = smooth, 1.0 = rough)
        roughness: f32,
        /// Emissive color (for glowing materials)
        emissive: Color,
    },
}

/// Sub-surface refraction through an environment texture
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Refraction {
    /// Refraction strength
    pub intensity: f32,
    /// Index of refraction
    pub index_of_refraction: f32,
    /// Texture refracted through the surface
    #[serde(skip)]
    pub texture: Option<TextureHandle>,
}

/// A material defines how a surface looks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Material3D {
    /// Material name
    pub name: String,
    /// Material type
    pub material_type: MaterialType,
    /// Textures bound to the material
    pub textures: Vec<TextureBinding>,
    /// Transparency (1.0 = opaque)
    pub opacity: f32,
    /// Double-sided rendering
    pub double_sided: bool,
    /// Render as wireframe
    pub wireframe: bool,
    /// Environment map used for reflections
    #[serde(skip)]
    pub env_map: Option<TextureHandle>,
    /// Optional sub-surface refraction
    pub refraction: Option<Refraction>,
    /// Set whenever a change requires the backend to rebuild its program
    #[serde(skip)]
    pub needs_update: bool,
}

impl Material3D {
    fn with_type(name: String, material_type: MaterialType) -> Self {
        Self {
            name,
            material_type,
            textures: Vec::new(),
            opacity: 1.0,
            double_sided: false,
            wireframe: false,
            env_map: None,
            refraction: None,
            needs_update: false,
        }
    }

    /// Create a new unlit material
    pub fn new_unlit(name: String, color: Color) -> Self {
        Self::with_type(name, MaterialType::Unlit { color })
    }

    /// Create a new PBR material
    pub fn new_pbr(name: String, base_color: Color, metallic: f32, roughness: f32) -> Self {
        Self::with_type(
            name,
            MaterialType::PBR {
                base_color,
                metallic,
                roughness,
                emissive: Color::black(),
            },
        )
    }

    /// Whether the material is lit through the PBR path and takes an environment map
    pub fn is_pbr(&self) -> bool {
        matches!(self.material_type, MaterialType::PBR { .. })
    }

    /// Base color regardless of material type
    pub fn base_color(&self) -> Color {
        match self.material_type {
            MaterialType::Unlit { color } => color,
            MaterialType::PBR { base_color, .. } => base_color,
        }
    }

    /// Texture bound to `slot`, if any
    pub fn texture(&self, slot: TextureSlot) -> Option<&TextureBinding> {
        self.textures.iter().find(|binding| binding.slot == slot)
    }

    /// Re-encode every color texture; returns whether anything was bound
    pub fn set_color_encoding(&mut self, encoding: TextureEncoding) -> bool {
        let mut touched = false;
        for binding in self.textures.iter_mut().filter(|b| b.slot.is_color()) {
            binding.encoding = encoding;
            touched = true;
        }
        if touched {
            self.needs_update = true;
        }
        touched
    }
}

impl Default for Material3D {
    fn default() -> Self {
        Self::new_pbr(
            "Default".to_string(),
            Color::new(0.8, 0.8, 0.8, 1.0),
            0.0,
            0.5,
        )
    }
}
