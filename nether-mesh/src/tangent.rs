//! Tangent space generation
//!
//! The bake consumes tangents through [`TangentGenerator`]. Callers with a
//! standard tangent-space implementation plug it in there; [`UvGradientTangents`]
//! is a per-triangle UV gradient generator used by default.

use glam::{Vec2, Vec3};

/// Per-corner triangle list data for one frame
#[derive(Debug, Clone, Copy)]
pub struct TangentInput<'a> {
    pub positions: &'a [[f32; 3]],
    pub normals: &'a [[f32; 3]],
    pub uvs: &'a [[f32; 2]],
}

impl TangentInput<'_> {
    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.positions.len() / 3
    }
}

/// Produces one `[x, y, z, handedness]` tangent per triangle corner
pub trait TangentGenerator {
    fn generate(&self, input: &TangentInput<'_>) -> Vec<[f32; 4]>;
}

/// Tangent from UV gradients, orthogonalized against each corner normal
#[derive(Debug, Default, Clone, Copy)]
pub struct UvGradientTangents;

impl TangentGenerator for UvGradientTangents {
    fn generate(&self, input: &TangentInput<'_>) -> Vec<[f32; 4]> {
        let mut tangents = Vec::with_capacity(input.positions.len());
        for tri in 0..input.triangle_count() {
            let base = tri * 3;
            let p = [0, 1, 2].map(|k| Vec3::from(input.positions[base + k]));
            let uv = [0, 1, 2].map(|k| Vec2::from(input.uvs[base + k]));
            let gradients = uv_gradients(p, uv);

            for k in 0..3 {
                let tangent = match gradients {
                    Some((t, b)) => {
                        let n = Vec3::from(input.normals[base + k]);
                        let ortho = (t - n * n.dot(t)).normalize_or_zero();
                        if ortho == Vec3::ZERO {
                            [0.0, 0.0, 0.0, 1.0]
                        } else {
                            let w = if n.cross(t).dot(b) < 0.0 { -1.0 } else { 1.0 };
                            [ortho.x, ortho.y, ortho.z, w]
                        }
                    }
                    None => [0.0, 0.0, 0.0, 1.0],
                };
                tangents.push(tangent);
            }
        }
        tangents
    }
}

/// Unnormalized tangent and bitangent of a triangle, `None` for degenerate UVs
pub(crate) fn uv_gradients(p: [Vec3; 3], uv: [Vec2; 3]) -> Option<(Vec3, Vec3)> {
    let e1 = p[1] - p[0];
    let e2 = p[2] - p[0];
    let d1 = uv[1] - uv[0];
    let d2 = uv[2] - uv[0];

    let det = d1.x * d2.y - d2.x * d1.y;
    if det == 0.0 {
        return None;
    }
    let r = 1.0 / det;
    let tangent = (e1 * d2.y - e2 * d1.y) * r;
    let bitangent = (e2 * d1.x - e1 * d2.x) * r;
    Some((tangent, bitangent))
}

/// Face tangent for shading, flipped so that `cross(t, b)` faces the normal
pub(crate) fn face_shading_tangent(p: [Vec3; 3], uv: [Vec2; 3], normal: Vec3) -> Vec3 {
    match uv_gradients(p, uv) {
        Some((t, b)) if t.cross(b).dot(normal) > 0.0 => t,
        Some((t, _)) => -t,
        None => Vec3::ZERO,
    }
}
