use crate::AssetError;
use crate::gpu::{GpuBackend, TextureFormat};
use crate::mesh::{MeshAsset, MeshBuffers, MeshData, MeshSource, VertexLayout};
use crate::texture::{TextureAsset, TextureImage};
use std::collections::HashMap;

/// Non-owning reference to a cached mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshHandle(pub u32);

/// Non-owning reference to a cached texture or normal map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub u32);

/// Counters describing what the cache holds and how it was used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub meshes: usize,
    pub textures: usize,
    pub normal_maps: usize,
    pub mesh_loads: usize,
    pub texture_loads: usize,
    pub hits: usize,
    pub gpu_buffers: usize,
    pub gpu_textures: usize,
}

/// What [`AssetCache::teardown`] released.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub meshes: usize,
    pub textures: usize,
    pub buffers_freed: usize,
    pub textures_freed: usize,
}

/// Path-keyed store of loaded meshes and textures.
///
/// The cache is the only owner of the GPU handles inside its entries. Objects
/// refer to entries through [`MeshHandle`] and [`TextureHandle`], which are
/// plain indices and free nothing when dropped.
///
/// # Invariants
/// - A path is loaded and uploaded at most once per cache.
/// - A failed resolve leaves the cache exactly as it was.
/// - Every GPU handle is freed exactly once, by [`AssetCache::teardown`].
#[derive(Debug, Default)]
pub struct AssetCache {
    meshes: Vec<MeshAsset>,
    textures: Vec<TextureAsset>,
    mesh_paths: HashMap<String, MeshHandle>,
    texture_paths: HashMap<String, TextureHandle>,
    normal_map_paths: HashMap<String, TextureHandle>,
    mesh_loads: usize,
    texture_loads: usize,
    hits: usize,
}

impl AssetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the mesh cached under `path`, loading and uploading it first if
    /// absent.
    ///
    /// `loader` runs only on a miss, and `layout` only shapes that first
    /// load. A hit returns the existing entry whatever layout it was built
    /// with; callers check [`MeshBuffers::layout`] before relying on tangents.
    pub fn resolve_mesh<G, F>(
        &mut self,
        gpu: &mut G,
        path: &str,
        layout: VertexLayout,
        loader: F,
    ) -> Result<MeshHandle, AssetError>
    where
        G: GpuBackend,
        F: FnOnce(&str) -> Result<MeshSource, AssetError>,
    {
        if let Some(&handle) = self.mesh_paths.get(path) {
            self.hits += 1;
            let cached = self.meshes[handle.0 as usize].buffers.layout;
            if cached == VertexLayout::Standard && layout == VertexLayout::TangentSpace {
                tracing::warn!(path, "mesh cached without tangents, normal map will be ignored");
            }
            tracing::debug!(path, ?handle, "mesh cache hit");
            return Ok(handle);
        }

        let _span = tracing::info_span!("load_mesh", path).entered();
        let source = loader(path)?;
        self.mesh_loads += 1;
        let data = MeshData::build(&source, layout)?;
        let buffers = MeshBuffers::upload(gpu, path, &data)?;
        tracing::info!(
            corners = source.corner_count(),
            vertices = data.vertex_count(),
            indices = data.index_count(),
            ?layout,
            "mesh uploaded"
        );

        let handle = MeshHandle(self.meshes.len() as u32);
        self.meshes.push(MeshAsset {
            path: path.to_string(),
            data,
            buffers,
        });
        self.mesh_paths.insert(path.to_string(), handle);
        Ok(handle)
    }

    /// Return the colour texture cached under `path`, loading it on a miss.
    pub fn resolve_texture<G, F>(
        &mut self,
        gpu: &mut G,
        path: &str,
        loader: F,
    ) -> Result<TextureHandle, AssetError>
    where
        G: GpuBackend,
        F: FnOnce(&str) -> Result<TextureImage, AssetError>,
    {
        self.resolve_image(gpu, path, TextureFormat::Rgba8Srgb, loader)
    }

    /// Return the normal map cached under `path`, loading it on a miss.
    ///
    /// `None` means "no normal map": the loader is not called, nothing is
    /// cached and the result is `Ok(None)`.
    pub fn resolve_normal_map<G, F>(
        &mut self,
        gpu: &mut G,
        path: Option<&str>,
        loader: F,
    ) -> Result<Option<TextureHandle>, AssetError>
    where
        G: GpuBackend,
        F: FnOnce(&str) -> Result<TextureImage, AssetError>,
    {
        match path {
            Some(path) => self
                .resolve_image(gpu, path, TextureFormat::Rgba8Unorm, loader)
                .map(Some),
            None => Ok(None),
        }
    }

    fn resolve_image<G, F>(
        &mut self,
        gpu: &mut G,
        path: &str,
        format: TextureFormat,
        loader: F,
    ) -> Result<TextureHandle, AssetError>
    where
        G: GpuBackend,
        F: FnOnce(&str) -> Result<TextureImage, AssetError>,
    {
        let paths = match format {
            TextureFormat::Rgba8Srgb => &self.texture_paths,
            TextureFormat::Rgba8Unorm => &self.normal_map_paths,
        };
        if let Some(&handle) = paths.get(path) {
            self.hits += 1;
            tracing::debug!(path, ?handle, "texture cache hit");
            return Ok(handle);
        }

        let _span = tracing::info_span!("load_texture", path).entered();
        let image = loader(path)?;
        self.texture_loads += 1;
        let asset = TextureAsset::upload(gpu, path, &image, format)?;
        tracing::info!(
            width = asset.width,
            height = asset.height,
            ?format,
            "texture uploaded"
        );

        let handle = TextureHandle(self.textures.len() as u32);
        self.textures.push(asset);
        let paths = match format {
            TextureFormat::Rgba8Srgb => &mut self.texture_paths,
            TextureFormat::Rgba8Unorm => &mut self.normal_map_paths,
        };
        paths.insert(path.to_string(), handle);
        Ok(handle)
    }

    pub fn mesh(&self, handle: MeshHandle) -> Option<&MeshAsset> {
        self.meshes.get(handle.0 as usize)
    }

    pub fn texture(&self, handle: TextureHandle) -> Option<&TextureAsset> {
        self.textures.get(handle.0 as usize)
    }

    pub fn mesh_handle(&self, path: &str) -> Option<MeshHandle> {
        self.mesh_paths.get(path).copied()
    }

    pub fn contains_mesh(&self, path: &str) -> bool {
        self.mesh_paths.contains_key(path)
    }

    pub fn contains_texture(&self, path: &str) -> bool {
        self.texture_paths.contains_key(path)
    }

    pub fn contains_normal_map(&self, path: &str) -> bool {
        self.normal_map_paths.contains_key(path)
    }

    /// Iterate cached meshes in load order.
    pub fn meshes(&self) -> impl Iterator<Item = (MeshHandle, &MeshAsset)> {
        self.meshes
            .iter()
            .enumerate()
            .map(|(i, m)| (MeshHandle(i as u32), m))
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            meshes: self.mesh_paths.len(),
            textures: self.texture_paths.len(),
            normal_maps: self.normal_map_paths.len(),
            mesh_loads: self.mesh_loads,
            texture_loads: self.texture_loads,
            hits: self.hits,
            gpu_buffers: self.meshes.iter().map(|m| m.buffers.handles().len()).sum(),
            gpu_textures: self.textures.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty() && self.textures.is_empty()
    }

    /// Free every GPU handle the cache owns, exactly once, and consume the
    /// cache. Run this after the scene referencing the assets is cleared.
    pub fn teardown(mut self, gpu: &mut impl GpuBackend) -> TeardownReport {
        let mut report = TeardownReport::default();
        for mesh in std::mem::take(&mut self.meshes) {
            mesh.buffers.release(gpu);
            report.buffers_freed += mesh.buffers.handles().len();
            report.meshes += 1;
        }
        for texture in std::mem::take(&mut self.textures) {
            gpu.free_texture(texture.texture);
            report.textures_freed += 1;
            report.textures += 1;
        }
        self.mesh_paths.clear();
        self.texture_paths.clear();
        self.normal_map_paths.clear();
        tracing::info!(
            meshes = report.meshes,
            textures = report.textures,
            buffers = report.buffers_freed,
            "asset cache torn down"
        );
        report
    }
}

impl Drop for AssetCache {
    fn drop(&mut self) {
        if !self.is_empty() {
            tracing::warn!(
                meshes = self.meshes.len(),
                textures = self.textures.len(),
                "asset cache dropped without teardown; GPU handles leaked"
            );
        }
    }
}
