use crate::backend::{GpuResources, LiveTexture, upload_texture};
use crate::camera::FlyCamera;
use crate::shaders;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use snowscape_assets::gpu::{TextureFormat, TextureUpload};
use snowscape_assets::{AssetCache, GpuBuffer, GpuTexture, VertexLayout};
use snowscape_render::{DrawItem, PipelineKind};
use std::collections::HashMap;
use wgpu::util::DeviceExt;

/// Light intensity at unit distance; falls off with the squared distance.
const LIGHT_POWER: f32 = 7500.0;

/// Most objects drawn in one frame; the rest are skipped with a warning.
const MAX_INSTANCES: usize = 1024;

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct FrameUniforms {
    view_proj: [[f32; 4]; 4],
    camera_position: [f32; 4],
    light: [f32; 4],
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct InstanceData {
    model: [[f32; 4]; 4],
}

const POSITION_ATTRS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x3];
const UV_ATTRS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![1 => Float32x2];
const NORMAL_ATTRS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![2 => Float32x3];
const TANGENT_ATTRS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![3 => Float32x3];
const BITANGENT_ATTRS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![4 => Float32x3];
const INSTANCE_ATTRS: [wgpu::VertexAttribute; 4] = wgpu::vertex_attr_array![
    5 => Float32x4,
    6 => Float32x4,
    7 => Float32x4,
    8 => Float32x4
];

fn per_vertex(
    stride: usize,
    attributes: &'static [wgpu::VertexAttribute],
) -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: stride as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes,
    }
}

/// Vertex buffer slots for a pipeline; the instance buffer is always last.
fn vertex_layouts(kind: PipelineKind) -> Vec<wgpu::VertexBufferLayout<'static>> {
    let vec3 = std::mem::size_of::<[f32; 3]>();
    let mut layouts = vec![
        per_vertex(vec3, &POSITION_ATTRS),
        per_vertex(std::mem::size_of::<[f32; 2]>(), &UV_ATTRS),
    ];
    match kind {
        PipelineKind::Unlit => {}
        PipelineKind::Lit => layouts.push(per_vertex(vec3, &NORMAL_ATTRS)),
        PipelineKind::NormalMapped => {
            layouts.push(per_vertex(vec3, &NORMAL_ATTRS));
            layouts.push(per_vertex(vec3, &TANGENT_ATTRS));
            layouts.push(per_vertex(vec3, &BITANGENT_ATTRS));
        }
    }
    layouts.push(wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<InstanceData>() as u64,
        step_mode: wgpu::VertexStepMode::Instance,
        attributes: &INSTANCE_ATTRS,
    });
    layouts
}

fn entry_points(kind: PipelineKind) -> (&'static str, &'static str) {
    match kind {
        PipelineKind::Unlit => ("vs_unlit", "fs_unlit"),
        PipelineKind::Lit => ("vs_lit", "fs_lit"),
        PipelineKind::NormalMapped => ("vs_normal_mapped", "fs_normal_mapped"),
    }
}

/// wgpu-based scene renderer.
///
/// Reads GPU objects through [`GpuResources`] and never creates or frees
/// anything the asset cache owns. Material bind groups are built lazily and
/// must be dropped with [`WgpuRenderer::clear_bindings`] before the cache is
/// torn down.
pub struct WgpuRenderer {
    pipelines: HashMap<(PipelineKind, bool), wgpu::RenderPipeline>,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    material_layout: wgpu::BindGroupLayout,
    material_bind_groups: HashMap<(GpuTexture, Option<GpuTexture>), wgpu::BindGroup>,
    sampler: wgpu::Sampler,
    flat_normal: LiveTexture,
    instance_buffer: wgpu::Buffer,
    depth_texture: wgpu::TextureView,
    surface_format: wgpu::TextureFormat,
}

impl WgpuRenderer {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        surface_format: wgpu::TextureFormat,
        width: u32,
        height: u32,
    ) -> Self {
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("frame_uniforms"),
            contents: bytemuck::bytes_of(&FrameUniforms {
                view_proj: Mat4::IDENTITY.to_cols_array_2d(),
                camera_position: [0.0; 4],
                light: [0.0; 4],
            }),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("frame_uniform_layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("frame_uniform_bind_group"),
            layout: &uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let texture_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };
        let material_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("material_layout"),
            entries: &[
                texture_entry(0),
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                texture_entry(2),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("object_pipeline_layout"),
            bind_group_layouts: &[&uniform_layout, &material_layout],
            push_constant_ranges: &[],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("object_shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::OBJECT_SHADER.into()),
        });

        let mut pipelines = HashMap::new();
        for kind in PipelineKind::ALL {
            for depth_test in [true, false] {
                let pipeline = Self::create_pipeline(
                    device,
                    &pipeline_layout,
                    &shader,
                    surface_format,
                    kind,
                    depth_test,
                );
                pipelines.insert((kind, depth_test), pipeline);
            }
        }

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("material_sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        // Bound in the normal-map slot by pipelines that do not sample it.
        let flat_normal = upload_texture(
            device,
            queue,
            &TextureUpload {
                label: "flat_normal",
                width: 1,
                height: 1,
                format: TextureFormat::Rgba8Unorm,
                pixels: &[128, 128, 255, 255],
            },
        );

        let instance_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("instance_buffer"),
            size: (MAX_INSTANCES * std::mem::size_of::<InstanceData>()) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let depth_texture = Self::create_depth_texture(device, width, height);

        Self {
            pipelines,
            uniform_buffer,
            uniform_bind_group,
            material_layout,
            material_bind_groups: HashMap::new(),
            sampler,
            flat_normal,
            instance_buffer,
            depth_texture,
            surface_format,
        }
    }

    fn create_pipeline(
        device: &wgpu::Device,
        layout: &wgpu::PipelineLayout,
        shader: &wgpu::ShaderModule,
        surface_format: wgpu::TextureFormat,
        kind: PipelineKind,
        depth_test: bool,
    ) -> wgpu::RenderPipeline {
        let (vs, fs) = entry_points(kind);
        let buffers = vertex_layouts(kind);
        let suffix = if depth_test { "" } else { "_no_depth" };
        let label = format!("{}_pipeline{suffix}", kind.name());
        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&label),
            layout: Some(layout),
            vertex: wgpu::VertexState {
                module: shader,
                entry_point: Some(vs),
                compilation_options: Default::default(),
                buffers: &buffers,
            },
            fragment: Some(wgpu::FragmentState {
                module: shader,
                entry_point: Some(fs),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: Some(wgpu::Face::Back),
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: depth_test,
                depth_compare: if depth_test {
                    wgpu::CompareFunction::Less
                } else {
                    wgpu::CompareFunction::Always
                },
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample: Default::default(),
            multiview: None,
            cache: None,
        })
    }

    pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) {
        self.depth_texture = Self::create_depth_texture(device, width, height);
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.surface_format
    }

    /// Drop every material bind group. Call before the textures they
    /// reference are freed.
    pub fn clear_bindings(&mut self) {
        self.material_bind_groups.clear();
    }

    fn ensure_material(
        &mut self,
        device: &wgpu::Device,
        resources: &GpuResources,
        diffuse: GpuTexture,
        normal: Option<GpuTexture>,
    ) -> bool {
        let key = (diffuse, normal);
        if self.material_bind_groups.contains_key(&key) {
            return true;
        }
        let Some(diffuse_view) = resources.texture_view(diffuse) else {
            return false;
        };
        let normal_view = match normal {
            Some(n) => match resources.texture_view(n) {
                Some(view) => view,
                None => return false,
            },
            None => &self.flat_normal.view,
        };
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("material_bind_group"),
            layout: &self.material_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(diffuse_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(normal_view),
                },
            ],
        });
        self.material_bind_groups.insert(key, bind_group);
        true
    }

    /// Render one frame of draw items.
    #[allow(clippy::too_many_arguments)]
    pub fn render(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        view: &wgpu::TextureView,
        camera: &FlyCamera,
        light_position: Vec3,
        items: &[DrawItem],
        cache: &AssetCache,
        resources: &GpuResources,
    ) {
        queue.write_buffer(
            &self.uniform_buffer,
            0,
            bytemuck::bytes_of(&FrameUniforms {
                view_proj: camera.view_projection().to_cols_array_2d(),
                camera_position: camera.position.extend(1.0).to_array(),
                light: light_position.extend(LIGHT_POWER).to_array(),
            }),
        );

        if items.len() > MAX_INSTANCES {
            tracing::warn!(
                drawn = MAX_INSTANCES,
                skipped = items.len() - MAX_INSTANCES,
                "draw list exceeds the instance buffer"
            );
        }
        let items = &items[..items.len().min(MAX_INSTANCES)];

        let mut draws = Vec::with_capacity(items.len());
        let mut instances = Vec::with_capacity(items.len());
        for item in items {
            let Some(mesh) = cache.mesh(item.mesh) else {
                continue;
            };
            let Some(texture) = cache.texture(item.texture) else {
                continue;
            };
            let normal = item
                .normal_map
                .and_then(|h| cache.texture(h))
                .map(|t| t.texture);
            if !self.ensure_material(device, resources, texture.texture, normal) {
                tracing::warn!(id = %item.object.short(), "material texture is not live; skipping");
                continue;
            }
            let Some(slots) = vertex_slots(item.pipeline, &mesh.buffers) else {
                tracing::warn!(
                    id = %item.object.short(),
                    mesh = %mesh.path,
                    "mesh lacks the pipeline's attributes; skipping"
                );
                continue;
            };
            draws.push((
                item.pipeline,
                item.depth_test,
                slots,
                mesh.buffers.indices,
                mesh.buffers.index_count,
                (texture.texture, normal),
            ));
            instances.push(InstanceData {
                model: item.model.to_cols_array_2d(),
            });
        }

        if !instances.is_empty() {
            queue.write_buffer(&self.instance_buffer, 0, bytemuck::cast_slice(&instances));
        }

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("render_encoder"),
        });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("main_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: 0.0,
                            g: 0.05,
                            b: 0.0,
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_texture,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });

            pass.set_bind_group(0, &self.uniform_bind_group, &[]);
            for (instance, (kind, depth_test, slots, indices, index_count, material)) in
                draws.iter().enumerate()
            {
                let (Some(pipeline), Some(material)) = (
                    self.pipelines.get(&(*kind, *depth_test)),
                    self.material_bind_groups.get(material),
                ) else {
                    continue;
                };
                let Some(index_buffer) = resources.buffer(*indices) else {
                    continue;
                };
                let bound: Option<Vec<&wgpu::Buffer>> =
                    slots.iter().map(|b| resources.buffer(*b)).collect();
                let Some(bound) = bound else {
                    continue;
                };

                pass.set_pipeline(pipeline);
                pass.set_bind_group(1, material, &[]);
                for (slot, buffer) in bound.iter().enumerate() {
                    pass.set_vertex_buffer(slot as u32, buffer.slice(..));
                }
                pass.set_vertex_buffer(bound.len() as u32, self.instance_buffer.slice(..));
                pass.set_index_buffer(index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                let instance = instance as u32;
                pass.draw_indexed(0..*index_count, 0, instance..instance + 1);
            }
        }

        queue.submit(std::iter::once(encoder.finish()));
    }

    fn create_depth_texture(
        device: &wgpu::Device,
        width: u32,
        height: u32,
    ) -> wgpu::TextureView {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("depth_texture"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        texture.create_view(&Default::default())
    }
}

/// Per-vertex buffers in slot order for `kind`, or `None` when the mesh was
/// uploaded without the attributes the pipeline reads.
fn vertex_slots(
    kind: PipelineKind,
    buffers: &snowscape_assets::MeshBuffers,
) -> Option<Vec<GpuBuffer>> {
    let mut slots = vec![buffers.positions, buffers.uvs];
    match kind {
        PipelineKind::Unlit => {}
        PipelineKind::Lit => slots.push(buffers.normals),
        PipelineKind::NormalMapped => {
            if buffers.layout != VertexLayout::TangentSpace {
                return None;
            }
            slots.push(buffers.normals);
            slots.push(buffers.tangents?);
            slots.push(buffers.bitangents?);
        }
    }
    Some(slots)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffers(layout: VertexLayout) -> snowscape_assets::MeshBuffers {
        let tangent_space = layout == VertexLayout::TangentSpace;
        snowscape_assets::MeshBuffers {
            positions: GpuBuffer(1),
            uvs: GpuBuffer(2),
            normals: GpuBuffer(3),
            tangents: tangent_space.then_some(GpuBuffer(4)),
            bitangents: tangent_space.then_some(GpuBuffer(5)),
            indices: GpuBuffer(6),
            index_count: 36,
            layout,
        }
    }

    #[test]
    fn slot_count_matches_vertex_layouts() {
        let standard = buffers(VertexLayout::Standard);
        let tangent = buffers(VertexLayout::TangentSpace);
        for kind in PipelineKind::ALL {
            let mesh = if kind == PipelineKind::NormalMapped { &tangent } else { &standard };
            let slots = vertex_slots(kind, mesh).unwrap();
            // Instance buffer takes the extra slot.
            assert_eq!(slots.len() + 1, vertex_layouts(kind).len(), "{}", kind.name());
        }
    }

    #[test]
    fn normal_mapped_needs_tangent_space_mesh() {
        let plain = buffers(VertexLayout::Standard);
        assert!(vertex_slots(PipelineKind::NormalMapped, &plain).is_none());
        let tbn = buffers(VertexLayout::TangentSpace);
        let slots = vertex_slots(PipelineKind::NormalMapped, &tbn).unwrap();
        assert_eq!(slots[3], GpuBuffer(4));
        assert_eq!(slots[4], GpuBuffer(5));
    }

    #[test]
    fn shader_locations_are_unique_per_pipeline() {
        for kind in PipelineKind::ALL {
            let mut seen = std::collections::BTreeSet::new();
            for layout in vertex_layouts(kind) {
                for attr in layout.attributes {
                    assert!(seen.insert(attr.shader_location), "{} reuses a location", kind.name());
                }
            }
        }
    }

    #[test]
    fn instance_data_is_one_matrix() {
        assert_eq!(std::mem::size_of::<InstanceData>(), 64);
        assert_eq!(std::mem::size_of::<FrameUniforms>(), 96);
    }
}
