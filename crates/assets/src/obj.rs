//! Wavefront OBJ loading on top of `tobj`.
//!
//! Produces one position/UV/normal triple per triangle corner. Polygons are
//! triangulated by `tobj`; lines and points are dropped. A model without
//! texture coordinates reads UV zero, and a model without normals gets the
//! flat normal of each triangle. Materials are not loaded.

use crate::mesh::MeshSource;
use glam::{Vec2, Vec3};
use tobj::LoadError;

fn load_options() -> tobj::LoadOptions {
    tobj::LoadOptions {
        triangulate: true,
        single_index: false,
        ignore_points: true,
        ignore_lines: true,
        ..Default::default()
    }
}

/// Parse OBJ text into raw per-corner geometry, concatenating every model.
pub fn parse_obj(text: &str) -> Result<MeshSource, LoadError> {
    let mut reader = text.as_bytes();
    let (models, _materials) = tobj::load_obj_buf(&mut reader, &load_options(), |_| {
        Err(LoadError::OpenFileFailed)
    })?;

    let mut out = MeshSource::default();
    for model in &models {
        append_mesh(&mut out, &model.mesh)?;
    }
    Ok(out)
}

fn append_mesh(out: &mut MeshSource, mesh: &tobj::Mesh) -> Result<(), LoadError> {
    let corners = mesh.indices.len();
    let has_uvs = mesh.texcoord_indices.len() == corners;
    let has_normals = mesh.normal_indices.len() == corners;

    for tri in (0..corners / 3).map(|t| t * 3) {
        let mut p = [Vec3::ZERO; 3];
        for (k, position) in p.iter_mut().enumerate() {
            *position = vec3_at(&mesh.positions, mesh.indices[tri + k])
                .ok_or(LoadError::FaceVertexOutOfBounds)?;
        }
        let flat = (p[1] - p[0]).cross(p[2] - p[0]).normalize_or_zero();

        for (k, position) in p.into_iter().enumerate() {
            let corner = tri + k;
            let uv = if has_uvs {
                vec2_at(&mesh.texcoords, mesh.texcoord_indices[corner])
                    .ok_or(LoadError::FaceTexCoordOutOfBounds)?
            } else {
                Vec2::ZERO
            };
            let normal = if has_normals {
                vec3_at(&mesh.normals, mesh.normal_indices[corner])
                    .ok_or(LoadError::FaceNormalOutOfBounds)?
            } else {
                flat
            };
            out.positions.push(position);
            out.uvs.push(uv);
            out.normals.push(normal);
        }
    }
    Ok(())
}

fn vec3_at(data: &[f32], index: u32) -> Option<Vec3> {
    let start = index as usize * 3;
    data.get(start..start + 3).map(Vec3::from_slice)
}

fn vec2_at(data: &[f32], index: u32) -> Option<Vec2> {
    let start = index as usize * 2;
    data.get(start..start + 2).map(Vec2::from_slice)
}
