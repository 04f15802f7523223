//! Viewer state store
//!
//! Every control a host UI can touch lives here. The viewer reads it back
//! whenever one of its `update_*` operations runs.

use crate::config::{Preset, ViewerOptions};
use crate::environment::ENVIRONMENTS;
use crate::three_d::TextureEncoding;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Camera name selecting the viewer's own orbit camera
pub const DEFAULT_CAMERA: &str = "[default]";

/// User-facing controls of a [`crate::viewer::Viewer`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerState {
    /// Environment catalog name
    pub environment: String,
    /// Show the environment as background instead of the gradient
    pub background: bool,
    /// Animation speed multiplier
    pub playback_speed: f32,
    /// Clip name to playing flag
    pub action_states: BTreeMap<String, bool>,
    /// Active camera: [`DEFAULT_CAMERA`] or a camera node name
    pub camera: String,
    /// Draw every material as wireframe
    pub wireframe: bool,
    /// Draw skeleton helpers for skinned meshes
    pub skeleton: bool,
    /// Draw grid and axes helpers
    pub grid: bool,
    /// Add the viewer's light rig
    pub add_lights: bool,
    /// Tone mapping exposure
    pub exposure: f32,
    /// Encoding of color textures
    pub texture_encoding: TextureEncoding,
    /// Ambient rig light intensity
    pub ambient_intensity: f32,
    /// Ambient rig light color as `0xRRGGBB`
    pub ambient_color: u32,
    /// Directional rig light intensity
    pub direct_intensity: f32,
    /// Directional rig light color as `0xRRGGBB`
    pub direct_color: u32,
    /// Gradient top color
    pub bg_color1: String,
    /// Gradient bottom color
    pub bg_color2: String,
}

impl ViewerState {
    /// Initial state for a viewer created with `options`
    pub fn new(options: &ViewerOptions) -> Self {
        let environment = match options.preset() {
            Preset::AssetGenerator => "Footprint Court (HDR)",
            Preset::Default => ENVIRONMENTS[1].name,
        };
        Self {
            environment: environment.to_string(),
            background: false,
            playback_speed: 1.0,
            action_states: BTreeMap::new(),
            camera: DEFAULT_CAMERA.to_string(),
            wireframe: false,
            skeleton: false,
            grid: false,
            add_lights: true,
            exposure: 1.0,
            texture_encoding: TextureEncoding::Srgb,
            ambient_intensity: 0.3,
            ambient_color: 0xFFFFFF,
            direct_intensity: 0.8 * std::f32::consts::PI,
            direct_color: 0xFFFFFF,
            bg_color1: "#ffffff".to_string(),
            bg_color2: "#353535".to_string(),
        }
    }
}

impl Default for ViewerState {
    fn default() -> Self {
        Self::new(&ViewerOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let state = ViewerState::default();
        assert_eq!(state.environment, "Bridge");
        assert_eq!(state.camera, DEFAULT_CAMERA);
        assert_eq!(state.ambient_intensity, 0.3);
        assert!((state.direct_intensity - 2.513_274).abs() < 1e-5);
        assert_eq!(state.bg_color2, "#353535");
    }

    #[test]
    fn test_asset_generator_environment() {
        let options = ViewerOptions {
            preset: "assetgenerator".to_string(),
            ..ViewerOptions::default()
        };
        assert_eq!(ViewerState::new(&options).environment, "Footprint Court (HDR)");
    }

    #[test]
    fn test_snapshot_uses_host_field_names() {
        let json = serde_json::to_value(ViewerState::default()).unwrap();
        assert_eq!(json["textureEncoding"], "sRGB");
        assert_eq!(json["bgColor1"], "#ffffff");
        assert_eq!(json["ambientColor"], 0xFFFFFF);
    }
}
