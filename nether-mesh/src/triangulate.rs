//! Triangulation and per-corner attribute expansion
//!
//! Every selected face becomes one or two triangles. Quads split along the
//! 0-2 diagonal using the local corner order `{0, 1, 2, 0, 2, 3}`; every
//! attribute is duplicated per corner.

use bytemuck::{cast_slice, try_cast_slice};
use glam::{Vec2, Vec3};
use smallvec::SmallVec;

use crate::attribute::AttributeKind;
use crate::combine::CombinedMesh;
use crate::error::{BakeError, Result};
use crate::options::{ExportOptions, MAX_UV_LAYERS};
use crate::source::{Face, Polygon, SourceMesh, check_len};
use crate::stream::{AttributeSet, AttributeStream};
use crate::tangent::{TangentGenerator, TangentInput, face_shading_tangent};

const TRI_CORNERS: [usize; 3] = [0, 1, 2];
const QUAD_CORNERS: [usize; 6] = [0, 1, 2, 0, 2, 3];

/// Squared length below which a face normal is treated as degenerate
const MIN_NORMAL_LENGTH_SQUARED: f32 = 1e-35;

/// Local polygon corners of the emitted triangle corners
pub fn local_corners(polygon: &Polygon) -> &'static [usize] {
    if polygon.is_quad() {
        &QUAD_CORNERS
    } else {
        &TRI_CORNERS
    }
}

/// Unit face normal, zero for degenerate faces
///
/// Triangles use the edges `v1 - v2` and `v2 - v3`, quads the diagonals
/// `v1 - v3` and `v2 - v4`.
pub fn face_normal(corners: &[Vec3]) -> Vec3 {
    let (a, b) = match corners {
        [v1, v2, v3] => (*v1 - *v2, *v2 - *v3),
        [v1, v2, v3, v4] => (*v1 - *v3, *v2 - *v4),
        _ => return Vec3::ZERO,
    };
    let n = a.cross(b);
    let d = n.length_squared();
    if d > MIN_NORMAL_LENGTH_SQUARED {
        n / d.sqrt()
    } else {
        Vec3::ZERO
    }
}

/// Triangle list with one entry per corner in every stream
#[derive(Debug, Clone, PartialEq)]
pub struct TriangulatedMesh {
    pub frames: usize,
    /// Source vertex of every corner
    pub corner_vertices: Vec<u32>,
    pub attributes: AttributeSet,
}

impl TriangulatedMesh {
    #[inline]
    pub fn corner_count(&self) -> usize {
        self.corner_vertices.len()
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.corner_vertices.len() / 3
    }

    /// Fill the tangent stream for every frame from UV layer 0
    ///
    /// Does nothing when the mesh has no UVs.
    pub fn generate_tangents(&mut self, generator: &dyn TangentGenerator) -> Result<()> {
        let (Some(position), Some(normal), Some(uv)) = (
            self.attributes.get(AttributeKind::Position),
            self.attributes.get(AttributeKind::Normal),
            self.attributes.get(AttributeKind::TexCoord0),
        ) else {
            return Ok(());
        };

        let corners = self.corner_count();
        let mut tangent = AttributeStream::zeroed(4, self.frames, corners);
        for frame in 0..self.frames {
            let input = TangentInput {
                positions: as_vectors(position.partition(frame))?,
                normals: as_vectors(normal.partition(frame))?,
                uvs: as_vectors(uv.partition(0))?,
            };
            let generated = generator.generate(&input);
            check_len(&format!("tangents of frame {frame}"), corners, generated.len())?;
            tangent
                .partition_mut(frame)
                .copy_from_slice(cast_slice(&generated));
        }
        self.attributes.insert(AttributeKind::Tangent, tangent);
        Ok(())
    }
}

fn as_vectors<const N: usize>(values: &[f32]) -> Result<&[[f32; N]]>
where
    [f32; N]: bytemuck::Pod,
{
    try_cast_slice(values)
        .map_err(|e| BakeError::StreamLayout(format!("cannot view stream as vectors: {e}")))
}

#[derive(Debug, Clone, Copy)]
struct Corner {
    face: usize,
    local: usize,
    vertex: u32,
    /// Face normal when the face is flat shaded
    flat: Option<Vec3>,
}

pub fn triangulate(
    source: &SourceMesh,
    combined: &CombinedMesh,
    options: &ExportOptions,
) -> Result<TriangulatedMesh> {
    let offsets = source.face_corner_offsets();
    let faces: Vec<(usize, &Face)> = source.selected_faces(options.material).collect();

    let mut corners = Vec::new();
    for &(face, f) in &faces {
        let vertices = f.polygon.vertices();
        let is_flat = combined.frames == 1 && !f.smooth && !options.disable_flat;
        let flat = is_flat.then(|| {
            let points: SmallVec<[Vec3; 4]> = vertices
                .iter()
                .map(|&v| Vec3::from(combined.position(0, v as usize)))
                .collect();
            face_normal(&points)
        });
        corners.extend(local_corners(&f.polygon).iter().map(|&local| Corner {
            face,
            local,
            vertex: vertices[local],
            flat,
        }));
    }

    let count = corners.len();
    let frames = combined.frames;
    let mut attributes = AttributeSet::default();

    // positions and normals
    let split_normals = source
        .edited_normals
        .as_ref()
        .filter(|_| options.edited_normals && frames == 1)
        .map(|edited| edited.corner_normals.as_slice())
        .filter(|normals| !normals.is_empty());

    let mut position = AttributeStream::zeroed(3, frames, count);
    let mut normal = AttributeStream::zeroed(3, frames, count);
    for (c, corner) in corners.iter().enumerate() {
        let v = corner.vertex as usize;
        for frame in 0..frames {
            position
                .get_mut(frame, c)
                .copy_from_slice(&combined.position(frame, v));
            let n = match (split_normals, corner.flat) {
                (Some(split), _) => split[offsets[corner.face] + corner.local],
                (None, Some(flat)) => flat.to_array(),
                (None, None) => combined.normal(frame, v),
            };
            normal.get_mut(frame, c).copy_from_slice(&n);
        }
    }
    attributes.insert(AttributeKind::Position, position);
    attributes.insert(AttributeKind::Normal, normal);

    // uv layers
    if source.uv_layers.len() > MAX_UV_LAYERS {
        tracing::warn!(
            "mesh has {} UV layers, only the first {} are exported",
            source.uv_layers.len(),
            MAX_UV_LAYERS
        );
    }
    let uv_kinds = [AttributeKind::TexCoord0, AttributeKind::TexCoord1];
    for (layer, kind) in source.uv_layers.iter().zip(uv_kinds) {
        let mut stream = AttributeStream::zeroed(2, 1, count);
        for (c, corner) in corners.iter().enumerate() {
            stream
                .get_mut(0, c)
                .copy_from_slice(&layer.values[offsets[corner.face] + corner.local]);
        }
        attributes.insert(kind, stream);
    }

    // vertex groups
    if let Some(groups) = combined.groups.as_ref().filter(|g| g.group_count > 0) {
        let mut stream = AttributeStream::zeroed(1, groups.group_count, count);
        for group in 0..groups.group_count {
            for (c, corner) in corners.iter().enumerate() {
                stream.get_mut(group, c)[0] = groups.weight(group, corner.vertex as usize);
            }
        }
        attributes.insert(AttributeKind::Group, stream);
    }

    // color layers
    if let Some(colors) = &combined.colors {
        let elements = color_elements(source, &corners)?;
        let mut stream = AttributeStream::zeroed(3, colors.layer_count(), count);
        for layer in 0..colors.layer_count() {
            for (c, &element) in elements.iter().enumerate() {
                stream
                    .get_mut(layer, c)
                    .copy_from_slice(&colors.value(layer, element));
            }
        }
        attributes.insert(AttributeKind::Color, stream);
    }

    if options.shading_tangents && !source.uv_layers.is_empty() {
        let stream = shading_tangents(source, &faces, &offsets, &corners);
        attributes.insert(AttributeKind::ShadeTangent, stream);
    }

    tracing::debug!(
        "triangulated {} faces into {} triangles",
        faces.len(),
        count / 3
    );

    Ok(TriangulatedMesh {
        frames,
        corner_vertices: corners.iter().map(|c| c.vertex).collect(),
        attributes,
    })
}

/// Color element (loop or vertex) per corner
fn color_elements(source: &SourceMesh, corners: &[Corner]) -> Result<Vec<usize>> {
    let Some(loops) = &source.loops else {
        return Ok(corners.iter().map(|c| c.vertex as usize).collect());
    };

    corners
        .iter()
        .map(|corner| {
            let polygon = source.faces[corner.face]
                .source_polygon
                .map_or(corner.face, |p| p as usize);
            loops
                .find(polygon, corner.vertex)
                .ok_or(BakeError::LoopMismatch {
                    face: corner.face,
                    vertex: corner.vertex,
                    polygon,
                })
        })
        .collect()
}

/// Per-vertex shading tangents accumulated over the selected faces
fn shading_tangents(
    source: &SourceMesh,
    faces: &[(usize, &Face)],
    offsets: &[usize],
    corners: &[Corner],
) -> AttributeStream {
    let uv0 = &source.uv_layers[0];
    let mut accumulated = vec![Vec3::ZERO; source.vertex_count()];

    for &(face, f) in faces {
        let vertices = f.polygon.vertices();
        let offset = offsets[face];
        let points: SmallVec<[Vec3; 4]> = vertices
            .iter()
            .map(|&v| Vec3::from(source.positions[v as usize]))
            .collect();
        let normal = face_normal(&points);

        for tri in local_corners(&f.polygon).chunks_exact(3) {
            let p = [points[tri[0]], points[tri[1]], points[tri[2]]];
            let uv = [tri[0], tri[1], tri[2]].map(|k| Vec2::from(uv0.values[offset + k]));
            let tangent = face_shading_tangent(p, uv, normal);
            for &k in tri {
                accumulated[vertices[k] as usize] += tangent;
            }
        }
    }

    let mut stream = AttributeStream::zeroed(3, 1, corners.len());
    for (c, corner) in corners.iter().enumerate() {
        let v = corner.vertex as usize;
        let n = Vec3::from(source.normals[v]);
        let t = accumulated[v];
        let ortho = (t - n * t.dot(n)).normalize_or_zero();
        stream.get_mut(0, c).copy_from_slice(&ortho.to_array());
    }

    // flat faces share one tangent per triangle
    for (tri, triangle) in corners.chunks_exact(3).enumerate() {
        if triangle[0].flat.is_none() {
            continue;
        }
        let base = tri * 3;
        let sum: Vec3 = (base..base + 3)
            .map(|c| Vec3::from_slice(stream.get(0, c)))
            .sum();
        let shared = sum.normalize_or_zero().to_array();
        for c in base..base + 3 {
            stream.get_mut(0, c).copy_from_slice(&shared);
        }
    }

    stream
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combine::combine;
    use crate::source::{ColorLayer, EditedNormals, GroupWeights, LoopSpan, LoopTable, UvLayer};
    use crate::tangent::UvGradientTangents;

    fn quad() -> SourceMesh {
        SourceMesh {
            positions: vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.0, 1.0, 0.0],
                [0.0, 1.0, 0.0],
            ],
            normals: vec![[0.0, 0.6, 0.8]; 4],
            faces: vec![Face::new(Polygon::Quad([0, 1, 2, 3]))],
            ..Default::default()
        }
    }

    fn run(source: &SourceMesh, options: &ExportOptions) -> TriangulatedMesh {
        let combined = combine(source, options).unwrap();
        triangulate(source, &combined, options).unwrap()
    }

    #[test]
    fn test_quad_splits_into_two_triangles() {
        let mesh = run(&quad(), &ExportOptions::default());
        assert_eq!(mesh.corner_count(), 6);
        assert_eq!(mesh.triangle_count(), 2);
        assert_eq!(mesh.corner_vertices, vec![0, 1, 2, 0, 2, 3]);

        let position = mesh.attributes.get(AttributeKind::Position).unwrap();
        assert_eq!(position.get(0, 5), &[0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_flat_face_normal_recomputed() {
        let mesh = run(&quad(), &ExportOptions::default());
        let normal = mesh.attributes.get(AttributeKind::Normal).unwrap();
        // CCW quad in the XY plane faces +Z
        for c in 0..6 {
            assert_eq!(normal.get(0, c), &[0.0, 0.0, 1.0]);
        }
    }

    #[test]
    fn test_smooth_face_keeps_vertex_normals() {
        let mut source = quad();
        source.faces[0].smooth = true;
        let mesh = run(&source, &ExportOptions::default());
        let normal = mesh.attributes.get(AttributeKind::Normal).unwrap();
        assert_eq!(normal.get(0, 0), &[0.0, 0.6, 0.8]);

        let options = ExportOptions {
            disable_flat: true,
            ..Default::default()
        };
        let mesh = run(&quad(), &options);
        let normal = mesh.attributes.get(AttributeKind::Normal).unwrap();
        assert_eq!(normal.get(0, 3), &[0.0, 0.6, 0.8]);
    }

    #[test]
    fn test_degenerate_face_normal_is_zero() {
        let points = [Vec3::ZERO, Vec3::X, Vec3::X * 2.0];
        assert_eq!(face_normal(&points), Vec3::ZERO);
    }

    #[test]
    fn test_split_normals_take_precedence() {
        let mut source = quad();
        source.edited_normals = Some(EditedNormals {
            vertex_normals: vec![[1.0, 0.0, 0.0]; 4],
            corner_normals: vec![
                [0.0, 0.0, 1.0],
                [0.0, 1.0, 0.0],
                [1.0, 0.0, 0.0],
                [0.0, 0.0, -1.0],
            ],
        });
        let options = ExportOptions {
            edited_normals: true,
            ..Default::default()
        };
        let mesh = run(&source, &options);
        let normal = mesh.attributes.get(AttributeKind::Normal).unwrap();
        // corner 5 is local corner 3
        assert_eq!(normal.get(0, 5), &[0.0, 0.0, -1.0]);
        assert_eq!(normal.get(0, 4), &[1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_split_normals_without_vertex_normals() {
        let mut source = SourceMesh {
            positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            normals: vec![[0.0, 0.0, 1.0]; 3],
            faces: vec![Face::new(Polygon::Tri([0, 1, 2])).smooth()],
            ..Default::default()
        };
        source.edited_normals = Some(EditedNormals {
            vertex_normals: vec![],
            corner_normals: vec![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, -1.0]],
        });
        let options = ExportOptions {
            edited_normals: true,
            ..Default::default()
        };
        let mesh = run(&source, &options);
        let normal = mesh.attributes.get(AttributeKind::Normal).unwrap();
        assert_eq!(normal.get(0, 0), &[1.0, 0.0, 0.0]);
        assert_eq!(normal.get(0, 2), &[0.0, 0.0, -1.0]);

        // ignored unless requested
        let mesh = run(&source, &ExportOptions::default());
        let normal = mesh.attributes.get(AttributeKind::Normal).unwrap();
        assert_eq!(normal.get(0, 0), &[0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_uv_remapped_through_quad_pattern() {
        let mut source = quad();
        source.uv_layers.push(UvLayer {
            name: "uv".into(),
            values: vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]],
        });
        let mesh = run(&source, &ExportOptions::default());
        let uv = mesh.attributes.get(AttributeKind::TexCoord0).unwrap();
        let values: Vec<[f32; 2]> = (0..6).map(|c| [uv.get(0, c)[0], uv.get(0, c)[1]]).collect();
        assert_eq!(
            values,
            vec![
                [0.0, 0.0],
                [1.0, 0.0],
                [1.0, 1.0],
                [0.0, 0.0],
                [1.0, 1.0],
                [0.0, 1.0]
            ]
        );
        assert!(!mesh.attributes.contains(AttributeKind::TexCoord1));
    }

    #[test]
    fn test_material_selection() {
        let mut source = quad();
        source.faces.push(Face::new(Polygon::Tri([0, 1, 2])).with_material(2));
        let options = ExportOptions {
            material: Some(2),
            ..Default::default()
        };
        let mesh = run(&source, &options);
        assert_eq!(mesh.corner_vertices, vec![0, 1, 2]);
    }

    #[test]
    fn test_groups_per_corner() {
        let mut source = quad();
        source.groups = Some(GroupWeights {
            group_count: 1,
            weights: vec![vec![(0, 0.5)], vec![], vec![(0, 1.0)], vec![]],
        });
        let options = ExportOptions {
            vertex_groups: true,
            ..Default::default()
        };
        let mesh = run(&source, &options);
        let group = mesh.attributes.get(AttributeKind::Group).unwrap();
        assert_eq!(group.partition(0), &[0.5, -1.0, 1.0, 0.5, 1.0, -1.0]);
    }

    #[test]
    fn test_loop_colors_matched_per_corner() {
        let mut source = quad();
        // loops listed in a different order from the face corners
        source.loops = Some(LoopTable {
            polygons: vec![LoopSpan { start: 0, count: 4 }],
            vertices: vec![2, 3, 0, 1],
        });
        source.faces[0].source_polygon = Some(0);
        source.color_layers.push(ColorLayer {
            name: "Col".into(),
            values: vec![
                [0.2, 0.0, 0.0],
                [0.3, 0.0, 0.0],
                [0.0, 0.0, 0.0],
                [0.1, 0.0, 0.0],
            ],
            mask: 0b111,
        });
        let options = ExportOptions {
            vertex_colors: true,
            ..Default::default()
        };
        let mesh = run(&source, &options);
        let color = mesh.attributes.get(AttributeKind::Color).unwrap();
        let reds: Vec<f32> = (0..6).map(|c| color.get(0, c)[0]).collect();
        // vertex v has red 0.1 * v
        assert_eq!(reds, vec![0.0, 0.1, 0.2, 0.0, 0.2, 0.3]);
    }

    #[test]
    fn test_unmatched_loop_is_an_error() {
        let mut source = quad();
        source.loops = Some(LoopTable {
            polygons: vec![LoopSpan { start: 0, count: 4 }],
            vertices: vec![0, 1, 2, 2],
        });
        source.color_layers.push(ColorLayer {
            name: "Col".into(),
            values: vec![[1.0; 3]; 4],
            mask: 0b111,
        });
        let options = ExportOptions {
            vertex_colors: true,
            ..Default::default()
        };
        let combined = combine(&source, &options).unwrap();
        assert!(matches!(
            triangulate(&source, &combined, &options),
            Err(BakeError::LoopMismatch { vertex: 3, .. })
        ));
    }

    #[test]
    fn test_shading_tangents_follow_u_axis() {
        let mut source = quad();
        source.normals = vec![[0.0, 0.0, 1.0]; 4];
        source.uv_layers.push(UvLayer {
            name: "uv".into(),
            values: vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]],
        });
        let options = ExportOptions {
            shading_tangents: true,
            ..Default::default()
        };
        let mesh = run(&source, &options);
        let shade = mesh.attributes.get(AttributeKind::ShadeTangent).unwrap();
        for c in 0..6 {
            let t = shade.get(0, c);
            assert!((t[0] - 1.0).abs() < 1e-6, "corner {c}: {t:?}");
            assert!(t[1].abs() < 1e-6 && t[2].abs() < 1e-6);
        }
    }

    #[test]
    fn test_tangents_generated_per_frame() {
        let mut source = quad();
        source.uv_layers.push(UvLayer {
            name: "uv".into(),
            values: vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]],
        });
        let mut mesh = run(&source, &ExportOptions::default());
        mesh.generate_tangents(&UvGradientTangents).unwrap();
        let tangent = mesh.attributes.get(AttributeKind::Tangent).unwrap();
        assert_eq!(tangent.components(), 4);
        assert_eq!(tangent.vertex_count(), 6);
        assert_eq!(tangent.get(0, 0), &[1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_no_tangents_without_uvs() {
        let mut mesh = run(&quad(), &ExportOptions::default());
        mesh.generate_tangents(&UvGradientTangents).unwrap();
        assert!(!mesh.attributes.contains(AttributeKind::Tangent));
    }
}
