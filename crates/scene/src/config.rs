//! Scene description loaded from JSON.

use crate::SceneError;
use crate::object::ShadingKind;
use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A batch of objects sharing mesh, texture and shading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectGroup {
    pub mesh: String,
    pub texture: String,
    #[serde(default)]
    pub normal_map: Option<String>,
    #[serde(default = "default_count")]
    pub count: usize,
    /// Positions are drawn as whole numbers in `[0, spread)` on each axis.
    #[serde(default = "default_spread")]
    pub spread: u32,
    #[serde(default)]
    pub shading: ShadingKind,
    #[serde(default = "default_true")]
    pub depth_test: bool,
    #[serde(default = "default_scale")]
    pub scale: f32,
}

fn default_count() -> usize {
    1
}

fn default_spread() -> u32 {
    6
}

fn default_true() -> bool {
    true
}

fn default_scale() -> f32 {
    1.0
}

/// Top-level scene file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Seed for placement and velocities.
    pub seed: u64,
    /// Skip groups whose assets fail to load instead of aborting.
    pub skip_failed: bool,
    pub light_position: Vec3,
    pub groups: Vec<ObjectGroup>,
}

impl Default for SceneConfig {
    /// The rock field: eleven rocks sharing one mesh and one texture.
    fn default() -> Self {
        Self {
            seed: 1,
            skip_failed: false,
            light_position: Vec3::new(50.0, 50.0, 50.0),
            groups: vec![ObjectGroup {
                mesh: "models/rock/model1.obj".into(),
                texture: "models/rock/texture.dds".into(),
                normal_map: None,
                count: 11,
                spread: default_spread(),
                shading: ShadingKind::Lit,
                depth_test: true,
                scale: 1.0,
            }],
        }
    }
}

impl SceneConfig {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SceneError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SceneError::ConfigIo {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text).map_err(|source| SceneError::ConfigParse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn object_count(&self) -> usize {
        self.groups.iter().map(|g| g.count).sum()
    }
}
