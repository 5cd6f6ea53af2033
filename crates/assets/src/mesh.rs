//! Mesh geometry: raw corners, indexed vertex data, GPU buffers.
//!
//! # Invariants
//! - All attribute arrays of a [`MeshData`] have the same length.
//! - Every index is a valid offset into those arrays.
//! - A [`MeshBuffers`] is owned by exactly one cache entry.

use crate::AssetError;
use crate::gpu::{BufferUsage, GpuBackend, GpuBuffer, GpuError};
use crate::tangent::{TangentFrames, compute_tangents};
use glam::{Vec2, Vec3};
use std::collections::HashMap;

/// Raw geometry as produced by a mesh loader: one entry per triangle corner.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshSource {
    pub positions: Vec<Vec3>,
    pub uvs: Vec<Vec2>,
    pub normals: Vec<Vec3>,
}

impl MeshSource {
    pub fn corner_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.positions.len() / 3
    }
}

/// Which vertex attributes a mesh carries on the GPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexLayout {
    /// Position, UV, normal.
    Standard,
    /// Position, UV, normal, tangent, bitangent.
    TangentSpace,
}

/// Indexed, deduplicated vertex data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub positions: Vec<Vec3>,
    pub uvs: Vec<Vec2>,
    pub normals: Vec<Vec3>,
    pub tangents: Option<Vec<Vec3>>,
    pub bitangents: Option<Vec<Vec3>>,
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Run the CPU side of the mesh pipeline: validate the loader output,
    /// compute tangent frames if `layout` asks for them, then index.
    pub fn build(source: &MeshSource, layout: VertexLayout) -> Result<Self, AssetError> {
        let n = source.corner_count();
        if n == 0 {
            return Err(AssetError::EmptyMesh);
        }
        if source.uvs.len() != n || source.normals.len() != n {
            return Err(AssetError::MismatchedAttributes {
                positions: n,
                uvs: source.uvs.len(),
                normals: source.normals.len(),
            });
        }
        if n % 3 != 0 {
            return Err(AssetError::PartialTriangle { corners: n });
        }
        let frames = match layout {
            VertexLayout::Standard => None,
            VertexLayout::TangentSpace => Some(compute_tangents(source)),
        };
        Ok(index_geometry(source, frames.as_ref()))
    }

    pub fn layout(&self) -> VertexLayout {
        if self.tangents.is_some() {
            VertexLayout::TangentSpace
        } else {
            VertexLayout::Standard
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }
}

pub(crate) fn key3(v: Vec3) -> [u32; 3] {
    // adding +0.0 folds -0.0 into +0.0 so equal floats have equal bits
    (v + Vec3::ZERO).to_array().map(f32::to_bits)
}

pub(crate) fn key2(v: Vec2) -> [u32; 2] {
    (v + Vec2::ZERO).to_array().map(f32::to_bits)
}

type VertexKey = ([u32; 3], [u32; 2], [u32; 3], [u32; 3], [u32; 3]);

/// Collapse corners whose attribute tuples match exactly into shared
/// vertices, producing an index list in corner order.
pub fn index_geometry(source: &MeshSource, frames: Option<&TangentFrames>) -> MeshData {
    let mut seen: HashMap<VertexKey, u32> = HashMap::new();
    let mut out = MeshData {
        tangents: frames.map(|_| Vec::new()),
        bitangents: frames.map(|_| Vec::new()),
        ..MeshData::default()
    };

    for i in 0..source.corner_count() {
        let frame = frames.map(|f| (f.tangents[i], f.bitangents[i]));
        let (t, b) = frame.unwrap_or((Vec3::ZERO, Vec3::ZERO));
        let key = (
            key3(source.positions[i]),
            key2(source.uvs[i]),
            key3(source.normals[i]),
            key3(t),
            key3(b),
        );
        let index = *seen.entry(key).or_insert_with(|| {
            out.positions.push(source.positions[i]);
            out.uvs.push(source.uvs[i]);
            out.normals.push(source.normals[i]);
            if let (Some(ts), Some(bs)) = (out.tangents.as_mut(), out.bitangents.as_mut()) {
                ts.push(t);
                bs.push(b);
            }
            (out.positions.len() - 1) as u32
        });
        out.indices.push(index);
    }
    out
}

/// GPU buffers holding one mesh's indexed arrays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshBuffers {
    pub positions: GpuBuffer,
    pub uvs: GpuBuffer,
    pub normals: GpuBuffer,
    pub tangents: Option<GpuBuffer>,
    pub bitangents: Option<GpuBuffer>,
    pub indices: GpuBuffer,
    pub index_count: u32,
    pub layout: VertexLayout,
}

impl MeshBuffers {
    /// Upload every attribute array and the index array.
    ///
    /// If any allocation fails, the buffers created so far are freed before
    /// the error is returned.
    pub fn upload(
        gpu: &mut impl GpuBackend,
        label: &str,
        data: &MeshData,
    ) -> Result<Self, GpuError> {
        let mut created = Vec::new();
        let result = Self::upload_tracked(gpu, label, data, &mut created);
        if result.is_err() {
            for buffer in created {
                gpu.free_buffer(buffer);
            }
        }
        result
    }

    fn upload_tracked(
        gpu: &mut impl GpuBackend,
        label: &str,
        data: &MeshData,
        created: &mut Vec<GpuBuffer>,
    ) -> Result<Self, GpuError> {
        let mut alloc = |suffix: &str,
                         usage: BufferUsage,
                         bytes: &[u8]|
         -> Result<GpuBuffer, GpuError> {
            let buffer = gpu.allocate_buffer(&format!("{label}:{suffix}"), usage, bytes)?;
            created.push(buffer);
            Ok(buffer)
        };

        let positions = alloc(
            "positions",
            BufferUsage::Vertex,
            bytemuck::cast_slice(&data.positions),
        )?;
        let uvs = alloc("uvs", BufferUsage::Vertex, bytemuck::cast_slice(&data.uvs))?;
        let normals = alloc(
            "normals",
            BufferUsage::Vertex,
            bytemuck::cast_slice(&data.normals),
        )?;
        let tangents = match &data.tangents {
            Some(t) => Some(alloc("tangents", BufferUsage::Vertex, bytemuck::cast_slice(t))?),
            None => None,
        };
        let bitangents = match &data.bitangents {
            Some(b) => Some(alloc(
                "bitangents",
                BufferUsage::Vertex,
                bytemuck::cast_slice(b),
            )?),
            None => None,
        };
        let indices = alloc(
            "indices",
            BufferUsage::Index,
            bytemuck::cast_slice(&data.indices),
        )?;

        Ok(Self {
            positions,
            uvs,
            normals,
            tangents,
            bitangents,
            indices,
            index_count: data.indices.len() as u32,
            layout: data.layout(),
        })
    }

    /// Every buffer handle, in allocation order.
    pub fn handles(&self) -> Vec<GpuBuffer> {
        let mut all = vec![self.positions, self.uvs, self.normals];
        all.extend(self.tangents);
        all.extend(self.bitangents);
        all.push(self.indices);
        all
    }

    pub(crate) fn release(&self, gpu: &mut impl GpuBackend) {
        for buffer in self.handles() {
            gpu.free_buffer(buffer);
        }
    }
}

/// A loaded mesh: CPU copy of the indexed data plus its GPU buffers.
#[derive(Debug)]
pub struct MeshAsset {
    pub path: String,
    pub data: MeshData,
    pub buffers: MeshBuffers,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::HeadlessBackend;
    use crate::obj::parse_obj;

    const CUBE: &str = "\
v -1 -1  1
v  1 -1  1
v  1  1  1
v -1  1  1
v -1 -1 -1
v  1 -1 -1
v  1  1 -1
v -1  1 -1
vt 0 0
vt 1 0
vt 1 1
vt 0 1
vn 0 0 1
vn 0 0 -1
vn 1 0 0
vn -1 0 0
vn 0 1 0
vn 0 -1 0
f 1/1/1 2/2/1 3/3/1 4/4/1
f 6/1/2 5/2/2 8/3/2 7/4/2
f 2/1/3 6/2/3 7/3/3 3/4/3
f 5/1/4 1/2/4 4/3/4 8/4/4
f 4/1/5 3/2/5 7/3/5 8/4/5
f 5/1/6 6/2/6 2/3/6 1/4/6
";

    fn assert_indices_in_bounds(data: &MeshData) {
        let n = data.vertex_count() as u32;
        assert!(data.indices.iter().all(|&i| i < n));
        assert_eq!(data.uvs.len(), data.vertex_count());
        assert_eq!(data.normals.len(), data.vertex_count());
        if let Some(t) = &data.tangents {
            assert_eq!(t.len(), data.vertex_count());
        }
    }

    #[test]
    fn cube_indexes_to_24_vertices() {
        let source = parse_obj(CUBE).unwrap();
        assert_eq!(source.corner_count(), 36);

        let data = MeshData::build(&source, VertexLayout::Standard).unwrap();
        assert_eq!(data.vertex_count(), 24);
        assert_eq!(data.index_count(), 36);
        assert!(data.vertex_count() <= source.corner_count());
        assert_indices_in_bounds(&data);
        assert_eq!(data.layout(), VertexLayout::Standard);
    }

    #[test]
    fn indexing_preserves_corner_attributes() {
        let source = parse_obj(CUBE).unwrap();
        let data = MeshData::build(&source, VertexLayout::Standard).unwrap();
        for (corner, &index) in data.indices.iter().enumerate() {
            let i = index as usize;
            assert_eq!(data.positions[i], source.positions[corner]);
            assert_eq!(data.uvs[i], source.uvs[corner]);
            assert_eq!(data.normals[i], source.normals[corner]);
        }
    }

    #[test]
    fn tangent_space_layout_keeps_arrays_parallel() {
        let source = parse_obj(CUBE).unwrap();
        let data = MeshData::build(&source, VertexLayout::TangentSpace).unwrap();
        assert_eq!(data.layout(), VertexLayout::TangentSpace);
        assert_eq!(data.vertex_count(), 24);
        assert_indices_in_bounds(&data);
        let (tangents, bitangents) = (data.tangents.unwrap(), data.bitangents.unwrap());
        for ((t, b), n) in tangents.iter().zip(&bitangents).zip(&data.normals) {
            assert!(t.dot(*n).abs() < 1e-5);
            assert!(b.dot(*n).abs() < 1e-5);
        }
    }

    #[test]
    fn negative_zero_matches_positive_zero() {
        let source = MeshSource {
            positions: vec![
                Vec3::ZERO,
                Vec3::X,
                Vec3::Y,
                Vec3::new(-0.0, 0.0, 0.0),
                Vec3::X,
                Vec3::Y,
            ],
            uvs: vec![Vec2::ZERO; 6],
            normals: vec![Vec3::Z; 6],
        };
        let data = index_geometry(&source, None);
        assert_eq!(data.vertex_count(), 3);
        assert_eq!(data.indices, vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn empty_and_ragged_sources_are_rejected() {
        assert!(matches!(
            MeshData::build(&MeshSource::default(), VertexLayout::Standard),
            Err(AssetError::EmptyMesh)
        ));
        let ragged = MeshSource {
            positions: vec![Vec3::ZERO; 3],
            uvs: vec![Vec2::ZERO; 2],
            normals: vec![Vec3::Z; 3],
        };
        assert!(matches!(
            MeshData::build(&ragged, VertexLayout::Standard),
            Err(AssetError::MismatchedAttributes { uvs: 2, .. })
        ));
    }

    #[test]
    fn leftover_corners_are_a_partial_triangle() {
        let source = MeshSource {
            positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::Z],
            uvs: vec![Vec2::ZERO; 4],
            normals: vec![Vec3::Z; 4],
        };
        let err = MeshData::build(&source, VertexLayout::Standard).unwrap_err();
        assert!(matches!(err, AssetError::PartialTriangle { corners: 4 }));
        assert!(err.to_string().contains('4'));
    }

    #[test]
    fn fan_triangulated_polygon_indexes_in_bounds() {
        let source = parse_obj(
            "\
v 0 0 0
v 1 0 0
v 2 1 0
v 1 2 0
v 0 1 0
vt 0 0
vn 0 0 1
f 1/1/1 2/1/1 3/1/1 4/1/1 5/1/1
",
        )
        .unwrap();
        assert_eq!(source.corner_count(), 9);

        for layout in [VertexLayout::Standard, VertexLayout::TangentSpace] {
            let data = MeshData::build(&source, layout).unwrap();
            assert_eq!(data.vertex_count(), 5);
            assert_eq!(data.index_count(), source.corner_count());
            assert!(data.vertex_count() <= source.corner_count());
            assert_indices_in_bounds(&data);
        }
    }

    #[test]
    fn corners_without_normals_index_in_bounds() {
        let source = parse_obj(
            "\
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vt 0 0
vt 1 1
f 1/1 2/1 3/2
f 1/1 3/2 4/1
",
        )
        .unwrap();
        assert!(source.normals.iter().all(|n| n.abs_diff_eq(Vec3::Z, 1e-6)));

        let data = MeshData::build(&source, VertexLayout::TangentSpace).unwrap();
        assert_eq!(data.vertex_count(), 4);
        assert!(data.vertex_count() <= source.corner_count());
        assert_indices_in_bounds(&data);
    }

    #[test]
    fn upload_creates_one_buffer_per_array() {
        let source = parse_obj(CUBE).unwrap();
        let mut gpu = HeadlessBackend::new();

        let plain = MeshData::build(&source, VertexLayout::Standard).unwrap();
        let buffers = MeshBuffers::upload(&mut gpu, "cube", &plain).unwrap();
        assert_eq!(buffers.handles().len(), 4);
        assert_eq!(buffers.index_count, 36);

        let tbn = MeshData::build(&source, VertexLayout::TangentSpace).unwrap();
        let buffers = MeshBuffers::upload(&mut gpu, "cube_tbn", &tbn).unwrap();
        assert_eq!(buffers.handles().len(), 6);
        assert_eq!(gpu.live_buffers(), 10);
    }

    #[test]
    fn failed_upload_frees_partial_buffers() {
        let source = parse_obj(CUBE).unwrap();
        let data = MeshData::build(&source, VertexLayout::Standard).unwrap();
        let mut gpu = HeadlessBackend::failing_after(2);

        let result = MeshBuffers::upload(&mut gpu, "cube", &data);
        assert!(matches!(result, Err(GpuError::OutOfMemory { .. })));
        assert_eq!(gpu.buffers_allocated(), 2);
        assert_eq!(gpu.buffers_freed(), 2);
        assert_eq!(gpu.live_buffers(), 0);
    }
}
