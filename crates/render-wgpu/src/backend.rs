use snowscape_assets::gpu::{
    BufferUsage, GpuBackend, GpuBuffer, GpuError, GpuTexture, TextureFormat, TextureUpload,
    check_texture_upload,
};
use std::collections::HashMap;
use wgpu::util::DeviceExt;

/// A live wgpu texture and its default view.
pub struct LiveTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

/// wgpu objects behind the handles the asset cache holds.
///
/// Entries are created and destroyed only through [`WgpuBackend`], i.e. only
/// by the asset cache. The renderer looks them up read-only.
#[derive(Default)]
pub struct GpuResources {
    next_id: u64,
    buffers: HashMap<GpuBuffer, wgpu::Buffer>,
    textures: HashMap<GpuTexture, LiveTexture>,
}

impl GpuResources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffer(&self, handle: GpuBuffer) -> Option<&wgpu::Buffer> {
        self.buffers.get(&handle)
    }

    pub fn texture_view(&self, handle: GpuTexture) -> Option<&wgpu::TextureView> {
        self.textures.get(&handle).map(|t| &t.view)
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// [`GpuBackend`] over a wgpu device, writing into a [`GpuResources`].
pub struct WgpuBackend<'a> {
    device: &'a wgpu::Device,
    queue: &'a wgpu::Queue,
    resources: &'a mut GpuResources,
}

impl<'a> WgpuBackend<'a> {
    pub fn new(
        device: &'a wgpu::Device,
        queue: &'a wgpu::Queue,
        resources: &'a mut GpuResources,
    ) -> Self {
        Self {
            device,
            queue,
            resources,
        }
    }
}

pub(crate) fn wgpu_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::Rgba8Srgb => wgpu::TextureFormat::Rgba8UnormSrgb,
        TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
    }
}

pub(crate) fn upload_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    upload: &TextureUpload<'_>,
) -> LiveTexture {
    let texture = device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some(upload.label),
            size: wgpu::Extent3d {
                width: upload.width,
                height: upload.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu_format(upload.format),
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        wgpu::util::TextureDataOrder::LayerMajor,
        upload.pixels,
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    LiveTexture { texture, view }
}

impl GpuBackend for WgpuBackend<'_> {
    fn allocate_buffer(
        &mut self,
        label: &str,
        usage: BufferUsage,
        data: &[u8],
    ) -> Result<GpuBuffer, GpuError> {
        if data.is_empty() {
            return Err(GpuError::EmptyBuffer {
                label: label.to_string(),
            });
        }
        let usage = match usage {
            BufferUsage::Vertex => wgpu::BufferUsages::VERTEX,
            BufferUsage::Index => wgpu::BufferUsages::INDEX,
        };
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: data,
                usage,
            });
        let handle = GpuBuffer(self.resources.next());
        self.resources.buffers.insert(handle, buffer);
        tracing::trace!(label, bytes = data.len(), ?handle, "buffer allocated");
        Ok(handle)
    }

    fn free_buffer(&mut self, buffer: GpuBuffer) {
        match self.resources.buffers.remove(&buffer) {
            Some(b) => b.destroy(),
            None => tracing::error!(?buffer, "free of a buffer that is not live"),
        }
    }

    fn allocate_texture(&mut self, upload: TextureUpload<'_>) -> Result<GpuTexture, GpuError> {
        check_texture_upload(&upload)?;
        let live = upload_texture(self.device, self.queue, &upload);
        let handle = GpuTexture(self.resources.next());
        self.resources.textures.insert(handle, live);
        Ok(handle)
    }

    fn free_texture(&mut self, texture: GpuTexture) {
        match self.resources.textures.remove(&texture) {
            Some(t) => t.texture.destroy(),
            None => tracing::error!(?texture, "free of a texture that is not live"),
        }
    }
}
