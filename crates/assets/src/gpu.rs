//! GPU capability boundary.
//!
//! The asset cache only ever allocates and frees buffers and textures. Anything
//! that can do those four things can back the cache: the wgpu backend in the
//! desktop app, or [`HeadlessBackend`] for tests and the CLI.

use std::collections::BTreeSet;

/// Opaque handle to a GPU buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GpuBuffer(pub u64);

/// Opaque handle to a GPU texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GpuTexture(pub u64);

/// What a buffer will be bound as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    Vertex,
    Index,
}

/// Pixel format of an uploaded texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// Colour data, sampled with sRGB decoding.
    Rgba8Srgb,
    /// Linear data such as tangent-space normals.
    Rgba8Unorm,
}

/// CPU-side description of a texture upload.
#[derive(Debug, Clone, Copy)]
pub struct TextureUpload<'a> {
    pub label: &'a str,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub pixels: &'a [u8],
}

#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    #[error("buffer '{label}' is empty")]
    EmptyBuffer { label: String },
    #[error("texture '{label}' has {got} bytes, expected {expected}")]
    TextureSize {
        label: String,
        expected: usize,
        got: usize,
    },
    #[error("out of GPU memory allocating '{label}'")]
    OutOfMemory { label: String },
}

/// The graphics API surface the asset cache depends on.
pub trait GpuBackend {
    fn allocate_buffer(
        &mut self,
        label: &str,
        usage: BufferUsage,
        data: &[u8],
    ) -> Result<GpuBuffer, GpuError>;

    fn free_buffer(&mut self, buffer: GpuBuffer);

    fn allocate_texture(&mut self, upload: TextureUpload<'_>) -> Result<GpuTexture, GpuError>;

    fn free_texture(&mut self, texture: GpuTexture);
}

/// Validate a texture upload's byte length against its dimensions.
pub fn check_texture_upload(upload: &TextureUpload<'_>) -> Result<(), GpuError> {
    let expected = upload.width as usize * upload.height as usize * 4;
    if upload.pixels.len() != expected {
        return Err(GpuError::TextureSize {
            label: upload.label.to_string(),
            expected,
            got: upload.pixels.len(),
        });
    }
    Ok(())
}

/// A backend that hands out ids without touching a GPU.
///
/// It records every allocation and free so tests can check that each handle
/// is released exactly once. Freeing an unknown or already-freed handle is
/// counted in [`HeadlessBackend::double_frees`].
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    next_id: u64,
    live_buffers: BTreeSet<GpuBuffer>,
    live_textures: BTreeSet<GpuTexture>,
    buffers_allocated: usize,
    textures_allocated: usize,
    buffers_freed: usize,
    textures_freed: usize,
    double_frees: usize,
    bytes_uploaded: usize,
    /// Remaining successful allocations before every further one fails.
    budget: Option<usize>,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend whose allocations start failing after `count` successes.
    pub fn failing_after(count: usize) -> Self {
        Self {
            budget: Some(count),
            ..Self::default()
        }
    }

    pub fn live_buffers(&self) -> usize {
        self.live_buffers.len()
    }

    pub fn live_textures(&self) -> usize {
        self.live_textures.len()
    }

    pub fn buffers_allocated(&self) -> usize {
        self.buffers_allocated
    }

    pub fn textures_allocated(&self) -> usize {
        self.textures_allocated
    }

    pub fn buffers_freed(&self) -> usize {
        self.buffers_freed
    }

    pub fn textures_freed(&self) -> usize {
        self.textures_freed
    }

    pub fn double_frees(&self) -> usize {
        self.double_frees
    }

    pub fn bytes_uploaded(&self) -> usize {
        self.bytes_uploaded
    }

    fn take_id(&mut self, label: &str) -> Result<u64, GpuError> {
        if let Some(budget) = self.budget.as_mut() {
            if *budget == 0 {
                return Err(GpuError::OutOfMemory {
                    label: label.to_string(),
                });
            }
            *budget -= 1;
        }
        self.next_id += 1;
        Ok(self.next_id)
    }
}

impl GpuBackend for HeadlessBackend {
    fn allocate_buffer(
        &mut self,
        label: &str,
        _usage: BufferUsage,
        data: &[u8],
    ) -> Result<GpuBuffer, GpuError> {
        if data.is_empty() {
            return Err(GpuError::EmptyBuffer {
                label: label.to_string(),
            });
        }
        let buffer = GpuBuffer(self.take_id(label)?);
        self.live_buffers.insert(buffer);
        self.buffers_allocated += 1;
        self.bytes_uploaded += data.len();
        Ok(buffer)
    }

    fn free_buffer(&mut self, buffer: GpuBuffer) {
        if self.live_buffers.remove(&buffer) {
            self.buffers_freed += 1;
        } else {
            tracing::error!(?buffer, "free of a buffer that is not live");
            self.double_frees += 1;
        }
    }

    fn allocate_texture(&mut self, upload: TextureUpload<'_>) -> Result<GpuTexture, GpuError> {
        check_texture_upload(&upload)?;
        let texture = GpuTexture(self.take_id(upload.label)?);
        self.live_textures.insert(texture);
        self.textures_allocated += 1;
        self.bytes_uploaded += upload.pixels.len();
        Ok(texture)
    }

    fn free_texture(&mut self, texture: GpuTexture) {
        if self.live_textures.remove(&texture) {
            self.textures_freed += 1;
        } else {
            tracing::error!(?texture, "free of a texture that is not live");
            self.double_frees += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headless_tracks_allocations_and_frees() {
        let mut gpu = HeadlessBackend::new();
        let a = gpu
            .allocate_buffer("a", BufferUsage::Vertex, &[0u8; 12])
            .unwrap();
        let b = gpu
            .allocate_buffer("b", BufferUsage::Index, &[0u8; 4])
            .unwrap();
        assert_ne!(a, b);
        assert_eq!(gpu.live_buffers(), 2);
        assert_eq!(gpu.bytes_uploaded(), 16);

        gpu.free_buffer(a);
        gpu.free_buffer(a);
        assert_eq!(gpu.live_buffers(), 1);
        assert_eq!(gpu.buffers_freed(), 1);
        assert_eq!(gpu.double_frees(), 1);
    }

    #[test]
    fn empty_buffer_is_rejected() {
        let mut gpu = HeadlessBackend::new();
        let err = gpu.allocate_buffer("empty", BufferUsage::Vertex, &[]);
        assert!(matches!(err, Err(GpuError::EmptyBuffer { .. })));
        assert_eq!(gpu.buffers_allocated(), 0);
    }

    #[test]
    fn texture_size_is_checked() {
        let mut gpu = HeadlessBackend::new();
        let pixels = [255u8; 2 * 2 * 4];
        let ok = gpu.allocate_texture(TextureUpload {
            label: "ok",
            width: 2,
            height: 2,
            format: TextureFormat::Rgba8Srgb,
            pixels: &pixels,
        });
        assert!(ok.is_ok());

        let bad = gpu.allocate_texture(TextureUpload {
            label: "bad",
            width: 3,
            height: 2,
            format: TextureFormat::Rgba8Srgb,
            pixels: &pixels,
        });
        assert!(matches!(bad, Err(GpuError::TextureSize { expected: 24, .. })));
        assert_eq!(gpu.live_textures(), 1);
    }

    #[test]
    fn failing_backend_runs_out() {
        let mut gpu = HeadlessBackend::failing_after(1);
        assert!(gpu.allocate_buffer("one", BufferUsage::Vertex, &[1]).is_ok());
        assert!(matches!(
            gpu.allocate_buffer("two", BufferUsage::Vertex, &[1]),
            Err(GpuError::OutOfMemory { .. })
        ));
    }
}
