//! Submesh bake pipeline
//!
//! validate → bounds → combine → triangulate → tangents → shape key deltas →
//! weld → vertex cache order → quantize

use bytemuck::cast_slice;

use crate::attribute::{AttributeKind, AttributeStatus};
use crate::bounds::{BoundingVolumes, compute_bounds};
use crate::combine::combine;
use crate::error::Result;
use crate::options::ExportOptions;
use crate::packing::{
    FORMAT_COLOR, FORMAT_GROUP, FORMAT_SHADE_TANGENT, FORMAT_TANGENT, FORMAT_TEXCOORD,
    FORMAT_TEXCOORD2, quantize_snorm16, quantize_unorm16, quantize_unorm8, reduce_color_channels,
};
use crate::shape_keys::apply_deltas;
use crate::source::SourceMesh;
use crate::stream::AttributeSet;
use crate::tangent::{TangentGenerator, UvGradientTangents};
use crate::triangulate::triangulate;
use crate::vertex_cache::{average_cache_miss_ratio, optimize_indices};
use crate::weld::{ExactMerger, VertexMerger, weld};

/// Outcome of baking one submesh
#[derive(Debug, Clone, PartialEq)]
pub enum SubmeshExport {
    /// Nothing selected, or every selected vertex at one point
    Empty,
    Baked(Box<BakedSubmesh>),
}

impl SubmeshExport {
    pub fn baked(&self) -> Option<&BakedSubmesh> {
        match self {
            SubmeshExport::Empty => None,
            SubmeshExport::Baked(baked) => Some(baked),
        }
    }

    pub fn into_baked(self) -> Option<BakedSubmesh> {
        match self {
            SubmeshExport::Empty => None,
            SubmeshExport::Baked(baked) => Some(*baked),
        }
    }
}

/// One exported color layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorLayerInfo {
    pub name: String,
    /// Used channels, `CHANNEL_R | CHANNEL_G | CHANNEL_B`
    pub mask: u8,
    /// Channels stored per vertex for this layer
    pub channels: usize,
}

/// Render-ready buffers of one submesh
#[derive(Debug, Clone, PartialEq)]
pub struct BakedSubmesh {
    pub vertex_count: usize,
    pub frame_count: usize,
    pub group_count: usize,
    pub indices: Vec<u32>,
    /// Frame-major xyz
    pub position: Vec<f32>,
    /// Frame-major snorm16 xyz
    pub normal: Vec<i16>,
    /// Frame-major snorm16 xyzw
    pub tangent: Option<Vec<i16>>,
    /// One uv stream per exported layer
    pub texcoords: Vec<Vec<f32>>,
    pub shade_tangent: Option<Vec<f32>>,
    /// Group-major unorm16 weights
    pub group: Option<Vec<u16>>,
    /// Layer-major unorm8 channels
    pub color: Option<Vec<u8>>,
    pub color_layers: Vec<ColorLayerInfo>,
    /// Unused channels were dropped from `color`
    pub color_reduced: bool,
    pub status: AttributeStatus,
    pub bounds: BoundingVolumes,
    /// Average cache miss ratio of the final index order
    pub acmr: f32,
}

impl BakedSubmesh {
    #[inline]
    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Stored color channels per vertex over all layers
    pub fn color_channels(&self) -> usize {
        self.color_layers.iter().map(|layer| layer.channels).sum()
    }

    /// `FORMAT_*` flags of the present optional sections
    pub fn format(&self) -> u8 {
        let mut format = 0;
        if self.tangent.is_some() {
            format |= FORMAT_TANGENT;
        }
        if !self.texcoords.is_empty() {
            format |= FORMAT_TEXCOORD;
        }
        if self.texcoords.len() > 1 {
            format |= FORMAT_TEXCOORD2;
        }
        if self.shade_tangent.is_some() {
            format |= FORMAT_SHADE_TANGENT;
        }
        if self.group.is_some() {
            format |= FORMAT_GROUP;
        }
        if self.color.is_some() {
            format |= FORMAT_COLOR;
        }
        format
    }

    /// Named native-endian byte views of every present buffer, in section order
    pub fn buffers(&self) -> Vec<(&'static str, &[u8])> {
        let mut buffers: Vec<(&'static str, &[u8])> = vec![
            ("indices", cast_slice(&self.indices)),
            ("position", cast_slice(&self.position)),
            ("normal", cast_slice(&self.normal)),
        ];
        if let Some(tangent) = &self.tangent {
            buffers.push(("tangent", cast_slice(tangent)));
        }
        let uv_names = ["texcoord", "texcoord2"];
        for (name, uv) in uv_names.into_iter().zip(&self.texcoords) {
            buffers.push((name, cast_slice(uv)));
        }
        if let Some(shade) = &self.shade_tangent {
            buffers.push(("shade_tangs", cast_slice(shade)));
        }
        if let Some(group) = &self.group {
            buffers.push(("group", cast_slice(group)));
        }
        if let Some(color) = &self.color {
            buffers.push(("color", color.as_slice()));
        }
        buffers
    }
}

/// Bake with the built-in tangent generator and exact merger
pub fn bake_submesh(source: &SourceMesh, options: &ExportOptions) -> Result<SubmeshExport> {
    bake_submesh_with(source, options, &UvGradientTangents, &ExactMerger)
}

pub fn bake_submesh_with(
    source: &SourceMesh,
    options: &ExportOptions,
    tangents: &dyn TangentGenerator,
    merger: &dyn VertexMerger,
) -> Result<SubmeshExport> {
    source.validate()?;

    let Some(bounds) = compute_bounds(source, options.material) else {
        tracing::debug!("no faces selected for material {:?}", options.material);
        return Ok(SubmeshExport::Empty);
    };
    if bounds.aabb.is_degenerate() {
        tracing::debug!("base pose collapses to a single point");
    }

    let combined = combine(source, options)?;
    let mut mesh = triangulate(source, &combined, options)?;
    if options.tangents {
        mesh.generate_tangents(tangents)?;
    }
    if let Some(bindings) = &combined.shape_keys {
        apply_deltas(&mut mesh, bindings)?;
    }

    let welded = weld(&mesh, merger)?;
    let vertex_count = welded.vertex_count;
    let mut indices = welded.indices;
    let before = average_cache_miss_ratio(&indices, options.cache_size);
    if options.optimize_vertex_cache {
        indices = optimize_indices(
            &indices,
            vertex_count,
            options.cache_size,
            options.chunk_indices,
        )?;
    }
    let acmr = average_cache_miss_ratio(&indices, options.cache_size);
    tracing::debug!("vertex cache ACMR {:.3} -> {:.3}", before, acmr);

    for message in welded.status.describe() {
        tracing::warn!("{}", message);
    }

    let mut attributes = welded.attributes;
    let group_count = attributes
        .get(AttributeKind::Group)
        .map_or(0, |stream| stream.partitions());

    let (color, color_layers, color_reduced) = match &combined.colors {
        Some(colors) => {
            let reduce = options.optimize_vertex_colors && colors.needs_channel_reduction();
            let values = take_data(&mut attributes, AttributeKind::Color).unwrap_or_default();
            let values = if reduce {
                reduce_color_channels(&values, vertex_count, &colors.channels)
            } else {
                values
            };
            let layers = colors
                .names
                .iter()
                .zip(&colors.masks)
                .zip(&colors.channels)
                .map(|((name, &mask), used)| ColorLayerInfo {
                    name: name.clone(),
                    mask,
                    channels: if reduce {
                        used.iter().filter(|&&u| u).count()
                    } else {
                        3
                    },
                })
                .collect();
            (Some(quantize_unorm8(&values)), layers, reduce)
        }
        None => (None, Vec::new(), false),
    };

    let texcoords = [AttributeKind::TexCoord0, AttributeKind::TexCoord1]
        .into_iter()
        .map_while(|kind| take_data(&mut attributes, kind))
        .collect();

    let baked = BakedSubmesh {
        vertex_count,
        frame_count: welded.frames,
        group_count,
        indices,
        position: take_data(&mut attributes, AttributeKind::Position).unwrap_or_default(),
        normal: quantize_snorm16(
            &take_data(&mut attributes, AttributeKind::Normal).unwrap_or_default(),
        ),
        tangent: take_data(&mut attributes, AttributeKind::Tangent).map(|t| quantize_snorm16(&t)),
        texcoords,
        shade_tangent: take_data(&mut attributes, AttributeKind::ShadeTangent),
        group: take_data(&mut attributes, AttributeKind::Group).map(|g| quantize_unorm16(&g)),
        color,
        color_layers,
        color_reduced,
        status: welded.status,
        bounds,
        acmr,
    };

    tracing::debug!(
        "baked {} vertices, {} triangles, {} frame(s), format {:#04x}",
        baked.vertex_count,
        baked.triangle_count(),
        baked.frame_count,
        baked.format()
    );

    Ok(SubmeshExport::Baked(Box::new(baked)))
}

fn take_data(attributes: &mut AttributeSet, kind: AttributeKind) -> Option<Vec<f32>> {
    attributes.take(kind).map(|stream| stream.into_data())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BakeError;
    use crate::source::{
        AnimationFrame, CHANNEL_R, ColorLayer, Face, GroupWeights, Polygon, UvLayer,
        VertexAnimation,
    };

    fn quad() -> SourceMesh {
        SourceMesh {
            positions: vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.0, 1.0, 0.0],
                [0.0, 1.0, 0.0],
            ],
            normals: vec![[0.0, 0.0, 1.0]; 4],
            faces: vec![Face::new(Polygon::Quad([0, 1, 2, 3])).smooth()],
            uv_layers: vec![UvLayer {
                name: "UVMap".into(),
                values: vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]],
            }],
            ..Default::default()
        }
    }

    fn baked(source: &SourceMesh, options: &ExportOptions) -> BakedSubmesh {
        bake_submesh(source, options)
            .unwrap()
            .into_baked()
            .expect("non-empty submesh")
    }

    #[test]
    fn test_quad_bakes_to_four_vertices() {
        let b = baked(&quad(), &ExportOptions::default());
        assert_eq!(b.index_count(), 6);
        assert_eq!(b.vertex_count, 4);
        assert_eq!(b.frame_count, 1);
        assert_eq!(b.position.len(), 12);
        assert_eq!(b.normal.len(), 12);
        assert_eq!(b.tangent.as_ref().map(Vec::len), Some(16));
        assert_eq!(b.texcoords.len(), 1);
        assert_eq!(b.format(), FORMAT_TANGENT | FORMAT_TEXCOORD);
        assert!(b.status.is_ok());

        assert_eq!(b.bounds.aabb.min.to_array(), [0.0, 0.0, 0.0]);
        assert_eq!(b.bounds.aabb.max.to_array(), [1.0, 1.0, 0.0]);

        // every welded vertex carries a normal of +Z
        for n in b.normal.chunks_exact(3) {
            assert_eq!(n, &[0, 0, 32767]);
        }
    }

    #[test]
    fn test_indices_reference_matching_positions() {
        let source = quad();
        let b = baked(&source, &ExportOptions::default());
        // each triangle's corners resolve to the original quad corners
        let mut seen: Vec<[u32; 3]> = b
            .indices
            .chunks_exact(3)
            .map(|tri| {
                let mut ids = [0u32; 3];
                for (slot, &i) in ids.iter_mut().zip(tri) {
                    let p = &b.position[i as usize * 3..i as usize * 3 + 3];
                    *slot = source
                        .positions
                        .iter()
                        .position(|q| q.as_slice() == p)
                        .unwrap() as u32;
                }
                ids
            })
            .collect();
        for tri in &mut seen {
            let min = (0..3).min_by_key(|&k| tri[k]).unwrap();
            tri.rotate_left(min);
        }
        seen.sort();
        assert_eq!(seen, vec![[0, 1, 2], [0, 2, 3]]);
    }

    #[test]
    fn test_identical_frames_weld_as_whole_vectors() {
        let mut source = quad();
        let frame = AnimationFrame {
            positions: source.positions.clone(),
            normals: source.normals.clone(),
        };
        source.vertex_animation = Some(VertexAnimation {
            frames: vec![frame.clone(), frame],
        });
        let options = ExportOptions {
            vertex_animation: true,
            ..Default::default()
        };
        let b = baked(&source, &options);
        assert_eq!(b.frame_count, 2);
        assert_eq!(b.vertex_count, 4);
        assert_eq!(b.position.len(), 4 * 3 * 2);
        assert_eq!(&b.position[..12], &b.position[12..]);
    }

    #[test]
    fn test_group_index_equal_to_count_fails() {
        let mut source = quad();
        source.groups = Some(GroupWeights {
            group_count: 2,
            weights: vec![vec![(0, 1.0)], vec![(2, 0.5)], vec![], vec![]],
        });
        let options = ExportOptions {
            vertex_groups: true,
            ..Default::default()
        };
        assert!(matches!(
            bake_submesh(&source, &options),
            Err(BakeError::WrongGroupIndices { group: 2, group_count: 2, .. })
        ));
    }

    #[test]
    fn test_group_weights_quantized() {
        let mut source = quad();
        source.groups = Some(GroupWeights {
            group_count: 1,
            weights: vec![vec![(0, 1.0)], vec![(0, 0.5)], vec![(0, 1.0)], vec![]],
        });
        let options = ExportOptions {
            vertex_groups: true,
            ..Default::default()
        };
        let b = baked(&source, &options);
        assert_eq!(b.group_count, 1);
        let group = b.group.as_ref().unwrap();
        assert_eq!(group.len(), b.vertex_count);
        let mut sorted = group.clone();
        sorted.sort_unstable();
        // non-member sentinel clamps to zero
        assert_eq!(sorted, vec![0, 32768, 65535, 65535]);
        assert!(b.format() & FORMAT_GROUP != 0);
    }

    #[test]
    fn test_colors_reduced_to_used_channels() {
        let mut source = quad();
        source.color_layers = vec![ColorLayer {
            name: "Col".into(),
            values: vec![[1.0, 0.5, 0.25]; 4],
            mask: CHANNEL_R,
        }];
        let options = ExportOptions {
            vertex_colors: true,
            ..Default::default()
        };
        let b = baked(&source, &options);
        assert!(b.color_reduced);
        assert_eq!(b.color_channels(), 1);
        assert_eq!(b.color.as_deref(), Some(&[255u8; 4][..]));

        let full = baked(
            &source,
            &ExportOptions {
                vertex_colors: true,
                optimize_vertex_colors: false,
                ..Default::default()
            },
        );
        assert!(!full.color_reduced);
        assert_eq!(full.color_channels(), 3);
        assert_eq!(full.color.as_ref().map(Vec::len), Some(12));
    }

    #[test]
    fn test_empty_selection() {
        let options = ExportOptions {
            material: Some(7),
            ..Default::default()
        };
        assert_eq!(bake_submesh(&quad(), &options).unwrap(), SubmeshExport::Empty);
    }

    #[test]
    fn test_collapsed_base_pose_still_bakes() {
        let mut source = quad();
        let unit_quad = source.positions.clone();
        source.positions = vec![[0.0, 0.0, 0.0]; 4];
        source.vertex_animation = Some(VertexAnimation {
            frames: vec![
                AnimationFrame {
                    positions: vec![[0.0, 0.0, 0.0]; 4],
                    normals: vec![[0.0, 0.0, 1.0]; 4],
                },
                AnimationFrame {
                    positions: unit_quad,
                    normals: vec![[0.0, 0.0, 1.0]; 4],
                },
            ],
        });
        let options = ExportOptions {
            vertex_animation: true,
            ..Default::default()
        };

        let b = baked(&source, &options);
        assert_eq!(b.vertex_count, 4);
        assert_eq!(b.triangle_count(), 2);
        assert_eq!(b.frame_count, 2);
        assert_eq!(b.position.len(), 2 * 4 * 3);
        assert!(b.bounds.aabb.is_degenerate());
    }

    #[test]
    fn test_bake_is_deterministic() {
        let mut source = quad();
        source.faces.push(Face::new(Polygon::Tri([1, 2, 0])));
        source.uv_layers[0].values.extend([[0.5, 0.5]; 3]);
        let options = ExportOptions::default();
        assert_eq!(baked(&source, &options), baked(&source, &options));
    }

    #[test]
    fn test_buffers_in_section_order() {
        let mut source = quad();
        source.uv_layers.push(UvLayer {
            name: "Second".into(),
            values: vec![[0.0, 0.0]; 4],
        });
        let b = baked(&source, &ExportOptions::default());
        let names: Vec<&str> = b.buffers().iter().map(|(name, _)| *name).collect();
        assert_eq!(names, ["indices", "position", "normal", "tangent", "texcoord", "texcoord2"]);
        let (_, indices) = b.buffers()[0];
        assert_eq!(indices.len(), 6 * 4);
    }
}
