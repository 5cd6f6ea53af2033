//! Tangent-space computation for normal mapping.

use crate::mesh::{MeshSource, key2, key3};
use glam::{Vec2, Vec3};
use std::collections::HashMap;

/// Per-corner tangent frames, parallel to a [`MeshSource`]'s arrays.
#[derive(Debug, Clone, Default)]
pub struct TangentFrames {
    pub tangents: Vec<Vec3>,
    pub bitangents: Vec<Vec3>,
}

/// Compute a tangent and bitangent for every triangle corner.
///
/// Each triangle contributes the tangent and bitangent solved from its
/// position and UV deltas. Contributions are summed over corners that share
/// position, UV and normal, so identical vertices end up with identical
/// frames and index together. The summed vectors are then Gram-Schmidt
/// orthogonalized against the corner normal and normalized. Triangles with a
/// degenerate UV mapping contribute nothing.
pub fn compute_tangents(mesh: &MeshSource) -> TangentFrames {
    type Key = ([u32; 3], [u32; 2], [u32; 3]);
    let key = |i: usize| -> Key {
        (key3(mesh.positions[i]), key2(mesh.uvs[i]), key3(mesh.normals[i]))
    };

    let mut sums: HashMap<Key, (Vec3, Vec3)> = HashMap::new();
    for tri in 0..mesh.corner_count() / 3 {
        let [i0, i1, i2] = [tri * 3, tri * 3 + 1, tri * 3 + 2];
        let (t, b) = triangle_tangent(
            [mesh.positions[i0], mesh.positions[i1], mesh.positions[i2]],
            [mesh.uvs[i0], mesh.uvs[i1], mesh.uvs[i2]],
        );
        for i in [i0, i1, i2] {
            let entry = sums.entry(key(i)).or_insert((Vec3::ZERO, Vec3::ZERO));
            entry.0 += t;
            entry.1 += b;
        }
    }

    let mut frames = TangentFrames {
        tangents: Vec::with_capacity(mesh.corner_count()),
        bitangents: Vec::with_capacity(mesh.corner_count()),
    };
    for i in 0..mesh.corner_count() {
        let (t, b) = sums.get(&key(i)).copied().unwrap_or_default();
        let (t, b) = orthonormalize(mesh.normals[i], t, b);
        frames.tangents.push(t);
        frames.bitangents.push(b);
    }
    frames
}

fn triangle_tangent(p: [Vec3; 3], uv: [Vec2; 3]) -> (Vec3, Vec3) {
    let dp1 = p[1] - p[0];
    let dp2 = p[2] - p[0];
    let duv1 = uv[1] - uv[0];
    let duv2 = uv[2] - uv[0];
    let det = duv1.x * duv2.y - duv1.y * duv2.x;
    if det.abs() < f32::EPSILON {
        return (Vec3::ZERO, Vec3::ZERO);
    }
    let r = 1.0 / det;
    let tangent = (dp1 * duv2.y - dp2 * duv1.y) * r;
    let bitangent = (dp2 * duv1.x - dp1 * duv2.x) * r;
    (tangent, bitangent)
}

fn orthonormalize(normal: Vec3, tangent: Vec3, bitangent: Vec3) -> (Vec3, Vec3) {
    let n = normal.normalize_or_zero();
    let mut t = (tangent - n * n.dot(tangent)).normalize_or_zero();
    if t == Vec3::ZERO {
        t = n.any_orthonormal_vector();
    }
    let mut b = (bitangent - n * n.dot(bitangent) - t * t.dot(bitangent)).normalize_or_zero();
    if b == Vec3::ZERO {
        b = n.cross(t);
    }
    (t, b)
}
