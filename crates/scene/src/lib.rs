//! Scene: renderable objects, the fixed-step update, scene setup.
//!
//! # Invariants
//! - Objects hold cache handles, never GPU resources.
//! - An object is in the scene only if all of its assets resolved.
//! - `advance_all` moves each object by its own velocity once, with no
//!   delta time and no cross-object reads.

mod config;
mod object;
mod scene;

pub use config::{ObjectGroup, SceneConfig};
pub use object::{AttachedAssets, ObjectDesc, RenderableObject, ShadingKind};
pub use scene::{PopulateReport, Scene, shutdown};

use snowscape_assets::AssetError;

#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("object ({mesh}, {texture}) failed to load: {source}")]
    Asset {
        mesh: String,
        texture: String,
        #[source]
        source: AssetError,
    },
    #[error("cannot read scene config {path}: {source}")]
    ConfigIo {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid scene config {path}: {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

pub fn crate_info() -> &'static str {
    "snowscape-scene v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("scene"));
    }

    #[test]
    fn asset_errors_name_both_paths() {
        let err = SceneError::Asset {
            mesh: "models/rock/model1.obj".into(),
            texture: "models/rock/texture.dds".into(),
            source: AssetError::EmptyMesh,
        };
        let text = err.to_string();
        assert!(text.contains("model1.obj"));
        assert!(text.contains("texture.dds"));
    }
}
