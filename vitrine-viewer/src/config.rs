//! Viewer and showcase configuration

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Look presets a [`crate::viewer::Viewer`] can start with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Preset {
    /// Regular viewer defaults
    #[default]
    Default,
    /// Settings matching the glTF asset generator's reference renders
    AssetGenerator,
}

impl Preset {
    /// Parse a preset name; anything unrecognised is the default preset
    pub fn parse(name: &str) -> Self {
        match name {
            "assetgenerator" => Preset::AssetGenerator,
            _ => Preset::Default,
        }
    }
}

/// Options fixed when a viewer is created
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ViewerOptions {
    /// Model URL to load
    pub model: String,

    /// Preset name (`"assetgenerator"` or empty)
    pub preset: String,

    /// Fixed default camera position; framed automatically when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_position: Option<[f32; 3]>,
}

impl ViewerOptions {
    /// Parsed preset
    pub fn preset(&self) -> Preset {
        Preset::parse(&self.preset)
    }

    /// Parse options from a JSON string
    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

fn default_showcase_environment() -> String {
    "Studio 13".to_string()
}

/// Which models the showcase loads and how it lights them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowcaseConfig {
    /// Titles to include; every catalog model when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub models: Option<Vec<String>>,

    /// Environment name from the catalog
    #[serde(default = "default_showcase_environment")]
    pub environment: String,
}

impl Default for ShowcaseConfig {
    fn default() -> Self {
        Self {
            models: None,
            environment: default_showcase_environment(),
        }
    }
}

impl ShowcaseConfig {
    /// Parse a config from a JSON string
    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    /// Read a config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Save the config as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ViewerError;

    #[test]
    fn test_viewer_options_from_json() {
        let json = r#"{
            "model": "m1/scene.gltf",
            "preset": "assetgenerator",
            "cameraPosition": [1, 2, 3]
        }"#;
        let options = ViewerOptions::from_json(json).unwrap();
        assert_eq!(options.preset(), Preset::AssetGenerator);
        assert_eq!(options.camera_position, Some([1.0, 2.0, 3.0]));

        let defaults = ViewerOptions::from_json("{}").unwrap();
        assert_eq!(defaults.preset(), Preset::Default);
        assert!(defaults.camera_position.is_none());
    }

    #[test]
    fn test_showcase_config_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("showcase.json");
        let config = ShowcaseConfig {
            models: Some(vec!["puregon".to_string()]),
            ..ShowcaseConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(ShowcaseConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_showcase_config_defaults_and_errors() {
        let config = ShowcaseConfig::from_json("{}").unwrap();
        assert_eq!(config.environment, "Studio 13");
        assert!(config.models.is_none());
        assert!(matches!(
            ShowcaseConfig::from_json("{\"models\": 3}"),
            Err(ViewerError::Config(_))
        ));
    }
}
