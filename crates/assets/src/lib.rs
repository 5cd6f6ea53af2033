//! Asset cache for the snowscape renderer.
//!
//! Meshes and textures are resolved by path through an [`AssetCache`]. The
//! first resolve of a path loads it through a loader, prepares it on the CPU
//! (OBJ parse via `tobj`, optional tangent frames, vertex indexing) and uploads it
//! through a [`GpuBackend`]. Every later resolve of the same path returns the
//! same handle without touching disk or GPU.
//!
//! # Invariants
//! - At most one load and one upload per distinct path per cache.
//! - The cache is the sole owner of GPU handles; handles given to objects
//!   are non-owning indices.
//! - A failed resolve inserts nothing and leaks no GPU handle.

mod cache;
pub mod gpu;
pub mod mesh;
pub mod obj;
mod source;
pub mod tangent;
pub mod texture;

pub use cache::{AssetCache, CacheStats, MeshHandle, TeardownReport, TextureHandle};
pub use gpu::{GpuBackend, GpuBuffer, GpuError, GpuTexture, HeadlessBackend, TextureFormat};
pub use mesh::{MeshAsset, MeshBuffers, MeshData, MeshSource, VertexLayout};
pub use source::{AssetSource, FileSource};
pub use texture::{TextureAsset, TextureImage};

/// Errors from loading or uploading an asset.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("OBJ parse error in {path}: {source}")]
    Obj {
        path: String,
        #[source]
        source: tobj::LoadError,
    },
    #[error("image decode error in {path}: {source}")]
    Image {
        path: String,
        #[source]
        source: image::ImageError,
    },
    #[error("mesh has no triangles")]
    EmptyMesh,
    #[error(
        "mesh attribute arrays disagree: {positions} positions, {uvs} uvs, {normals} normals"
    )]
    MismatchedAttributes {
        positions: usize,
        uvs: usize,
        normals: usize,
    },
    #[error("mesh has {corners} corners, not a whole number of triangles")]
    PartialTriangle { corners: usize },
    #[error("GPU error: {0}")]
    Gpu(#[from] GpuError),
}

pub fn crate_info() -> &'static str {
    "snowscape-assets v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("assets"));
    }

    #[test]
    fn errors_name_the_path() {
        let err = AssetError::Io {
            path: "models/rock/model1.obj".into(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(err.to_string().contains("models/rock/model1.obj"));
    }
}
