//! Where asset bytes come from.

use crate::AssetError;
use crate::mesh::MeshSource;
use crate::obj::parse_obj;
use crate::texture::TextureImage;
use std::path::{Path, PathBuf};

/// Loader collaborator consulted by the cache on a miss.
pub trait AssetSource {
    fn load_mesh(&mut self, path: &str) -> Result<MeshSource, AssetError>;
    fn load_texture(&mut self, path: &str) -> Result<TextureImage, AssetError>;
}

/// Reads OBJ meshes and image files relative to a root directory.
#[derive(Debug, Clone)]
pub struct FileSource {
    root: PathBuf,
}

impl FileSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

impl Default for FileSource {
    fn default() -> Self {
        Self::new(".")
    }
}

impl AssetSource for FileSource {
    fn load_mesh(&mut self, path: &str) -> Result<MeshSource, AssetError> {
        let full = self.resolve(path);
        let text = std::fs::read_to_string(&full).map_err(|source| AssetError::Io {
            path: full.display().to_string(),
            source,
        })?;
        parse_obj(&text).map_err(|source| AssetError::Obj {
            path: full.display().to_string(),
            source,
        })
    }

    fn load_texture(&mut self, path: &str) -> Result<TextureImage, AssetError> {
        TextureImage::load(&self.resolve(path))
    }
}
