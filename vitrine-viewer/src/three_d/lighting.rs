//! Lighting system for 3D scenes

use crate::primitives::Color;
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Types of lights supported
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LightType {
    /// Ambient light - uniform lighting from all directions
    Ambient {
        /// Light color
        color: Color,
        /// Intensity
        intensity: f32,
    },
    /// Hemisphere light - sky color from above fading to ground color below
    Hemisphere {
        /// Color from above
        sky_color: Color,
        /// Color from below
        ground_color: Color,
        /// Intensity
        intensity: f32,
    },
    /// Directional light - parallel rays (like the sun)
    Directional {
        /// Light color
        color: Color,
        /// Intensity
        intensity: f32,
    },
    /// Point light - radiates from a point in all directions
    Point {
        /// Light color
        color: Color,
        /// Intensity
        intensity: f32,
        /// Attenuation range, infinite when absent
        range: Option<f32>,
    },
    /// Spot light - cone of light
    Spot {
        /// Light color
        color: Color,
        /// Intensity
        intensity: f32,
        /// Attenuation range, infinite when absent
        range: Option<f32>,
        /// Inner cone angle (full intensity)
        inner_angle: f32,
        /// Outer cone angle (falloff to zero)
        outer_angle: f32,
    },
}

/// A light source
///
/// Lights imported from a glTF asset take their position and direction from
/// the node they hang off. Rig lights created by a viewer carry an `offset`
/// relative to the object they are attached to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Light {
    /// Light name
    pub name: String,
    /// Type of light
    pub light_type: LightType,
    /// Position relative to the parent (rig lights)
    pub offset: Vec3,
}

impl Light {
    /// Create a new ambient light
    pub fn new_ambient(name: &str, color: Color, intensity: f32) -> Self {
        Self {
            name: name.to_string(),
            light_type: LightType::Ambient { color, intensity },
            offset: Vec3::ZERO,
        }
    }

    /// Create a new hemisphere light
    pub fn new_hemisphere(
        name: &str,
        sky_color: Color,
        ground_color: Color,
        intensity: f32,
    ) -> Self {
        Self {
            name: name.to_string(),
            light_type: LightType::Hemisphere {
                sky_color,
                ground_color,
                intensity,
            },
            offset: Vec3::ZERO,
        }
    }

    /// Create a new directional light placed at `offset`, shining toward the world origin
    pub fn new_directional(name: &str, offset: Vec3, color: Color, intensity: f32) -> Self {
        Self {
            name: name.to_string(),
            light_type: LightType::Directional { color, intensity },
            offset,
        }
    }

    /// Set intensity and color, whatever the light type
    pub fn set_intensity_and_color(&mut self, new_intensity: f32, new_color: Color) {
        match &mut self.light_type {
            LightType::Ambient { color, intensity }
            | LightType::Directional { color, intensity }
            | LightType::Point { color, intensity, .. }
            | LightType::Spot { color, intensity, .. } => {
                *color = new_color;
                *intensity = new_intensity;
            }
            LightType::Hemisphere { sky_color, intensity, .. } => {
                *sky_color = new_color;
                *intensity = new_intensity;
            }
        }
    }

    /// Current intensity
    pub fn intensity(&self) -> f32 {
        match self.light_type {
            LightType::Ambient { intensity, .. }
            | LightType::Hemisphere { intensity, .. }
            | LightType::Directional { intensity, .. }
            | LightType::Point { intensity, .. }
            | LightType::Spot { intensity, .. } => intensity,
        }
    }
}

/// Default hemispheric light used by the showcase scene
pub fn default_hemisphere() -> Light {
    Light::new_hemisphere(
        "default_light",
        Color::white(),
        Color::black(),
        1.0,
    )
}
