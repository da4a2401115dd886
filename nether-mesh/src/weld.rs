//! Vertex welding
//!
//! All present streams are interleaved into one row per corner, the rows are
//! deduplicated by a [`VertexMerger`], and typed streams are rebuilt from the
//! unique rows. Two corners merge only if every component of every frame,
//! layer and group is bit-identical.

use hashbrown::HashMap;

use crate::attribute::{AttributeKind, AttributeStatus};
use crate::error::{BakeError, Result};
use crate::stream::{AttributeSet, StridedView};
use crate::triangulate::TriangulatedMesh;

/// Unique rows and the corner -> unique row table
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutput {
    /// `M * stride` floats
    pub unique: Vec<f32>,
    /// One entry per input row
    pub remap: Vec<u32>,
}

/// Reduces N rows of `stride` floats to M <= N unique rows
pub trait VertexMerger {
    fn merge(&self, rows: &[f32], stride: usize) -> MergeOutput;
}

/// Bit-exact merge, unique rows keep first-occurrence order
#[derive(Debug, Default, Clone, Copy)]
pub struct ExactMerger;

impl VertexMerger for ExactMerger {
    fn merge(&self, rows: &[f32], stride: usize) -> MergeOutput {
        if stride == 0 {
            return MergeOutput {
                unique: Vec::new(),
                remap: Vec::new(),
            };
        }

        let bits: &[u32] = bytemuck::cast_slice(rows);
        let mut seen: HashMap<&[u32], u32> = HashMap::with_capacity(rows.len() / stride);
        let mut unique = Vec::new();
        let mut remap = Vec::with_capacity(rows.len() / stride);

        for (row, key) in rows.chunks_exact(stride).zip(bits.chunks_exact(stride)) {
            let next = seen.len() as u32;
            let id = *seen.entry(key).or_insert_with(|| {
                unique.extend_from_slice(row);
                next
            });
            remap.push(id);
        }

        MergeOutput { unique, remap }
    }
}

/// Interleaved row layout for one mesh
#[derive(Debug, Clone, PartialEq)]
pub struct WeldLayout {
    pub stride: usize,
    pub views: Vec<(AttributeKind, StridedView)>,
}

impl WeldLayout {
    /// Present kinds at consecutive offsets, in interleaving order
    pub fn for_attributes(attributes: &AttributeSet) -> Self {
        let mut offset = 0;
        let mut views = Vec::new();
        for (kind, stream) in attributes.iter() {
            views.push((
                kind,
                StridedView {
                    offset,
                    stride: 0,
                    components: stream.components(),
                    partitions: stream.partitions(),
                },
            ));
            offset += stream.width();
        }
        for (_, view) in &mut views {
            view.stride = offset;
        }
        Self {
            stride: offset,
            views,
        }
    }

    pub fn view(&self, kind: AttributeKind) -> Option<StridedView> {
        self.views
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, view)| *view)
    }
}

/// Deduplicated vertices and the triangle index buffer into them
#[derive(Debug, Clone, PartialEq)]
pub struct WeldedSubmesh {
    pub vertex_count: usize,
    pub frames: usize,
    /// One entry per pre-weld corner
    pub indices: Vec<u32>,
    pub attributes: AttributeSet,
    pub status: AttributeStatus,
}

pub fn weld(mesh: &TriangulatedMesh, merger: &dyn VertexMerger) -> Result<WeldedSubmesh> {
    let corners = mesh.corner_count();
    let layout = WeldLayout::for_attributes(&mesh.attributes);
    let mut rows = vec![0.0f32; corners * layout.stride];

    let mut status = AttributeStatus::OK;
    for &(kind, view) in &layout.views {
        if let Some(stream) = mesh.attributes.get(kind) {
            if view.store(stream, &mut rows)? {
                tracing::warn!("NaN values in {} replaced by zero", kind);
                status.insert(kind);
            }
        }
    }

    let merged = merger.merge(&rows, layout.stride);
    if merged.remap.len() != corners {
        return Err(BakeError::Merge(format!(
            "remap has {} entries for {} corners",
            merged.remap.len(),
            corners
        )));
    }
    if layout.stride == 0 || merged.unique.len() % layout.stride != 0 {
        return Err(BakeError::Merge(format!(
            "{} unique values do not form rows of {}",
            merged.unique.len(),
            layout.stride
        )));
    }
    let vertex_count = merged.unique.len() / layout.stride;
    if let Some(bad) = merged.remap.iter().find(|&&id| id as usize >= vertex_count) {
        return Err(BakeError::Merge(format!(
            "remap references row {bad} of {vertex_count}"
        )));
    }

    let mut attributes = AttributeSet::default();
    for &(kind, view) in &layout.views {
        attributes.insert(kind, view.extract(&merged.unique, vertex_count)?);
    }

    tracing::debug!(
        "welded {} corners into {} vertices (stride {})",
        corners,
        vertex_count,
        layout.stride
    );

    Ok(WeldedSubmesh {
        vertex_count,
        frames: mesh.frames,
        indices: merged.remap,
        attributes,
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::AttributeStream;

    fn triangulated(frames: usize, positions: Vec<f32>, normals: Vec<f32>) -> TriangulatedMesh {
        let corners = positions.len() / (3 * frames);
        let mut attributes = AttributeSet::default();
        attributes.insert(
            AttributeKind::Position,
            AttributeStream::from_data(3, frames, positions).unwrap(),
        );
        attributes.insert(
            AttributeKind::Normal,
            AttributeStream::from_data(3, frames, normals).unwrap(),
        );
        TriangulatedMesh {
            frames,
            corner_vertices: (0..corners as u32).collect(),
            attributes,
        }
    }

    #[test]
    fn test_exact_merger_first_occurrence_order() {
        let rows = [1.0, 2.0, 3.0, 4.0, 1.0, 2.0, 5.0, 6.0, 3.0, 4.0];
        let merged = ExactMerger.merge(&rows, 2);
        assert_eq!(merged.unique, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(merged.remap, vec![0, 1, 0, 2, 1]);
    }

    #[test]
    fn test_exact_merger_is_bitwise() {
        // 0.0 and -0.0 compare equal but are different bit patterns
        let rows = [0.0, -0.0];
        let merged = ExactMerger.merge(&rows, 1);
        assert_eq!(merged.remap, vec![0, 1]);
    }

    #[test]
    fn test_layout_offsets() {
        let mut mesh = triangulated(2, vec![0.0; 18], vec![0.0; 18]);
        mesh.attributes
            .insert(AttributeKind::TexCoord0, AttributeStream::zeroed(2, 1, 3));
        mesh.attributes
            .insert(AttributeKind::Group, AttributeStream::zeroed(1, 3, 3));
        let layout = WeldLayout::for_attributes(&mesh.attributes);
        assert_eq!(layout.stride, 6 + 6 + 2 + 3);
        assert_eq!(layout.view(AttributeKind::Normal).unwrap().offset, 6);
        assert_eq!(layout.view(AttributeKind::TexCoord0).unwrap().offset, 12);
        assert_eq!(layout.view(AttributeKind::Group).unwrap().offset, 14);
        assert!(layout.view(AttributeKind::Color).is_none());
    }

    #[test]
    fn test_weld_quad_corners() {
        // two triangles of a quad: corners 0,1,2,0,2,3
        let p = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
        ];
        let positions: Vec<f32> = p.iter().flatten().copied().collect();
        let normals = [0.0, 0.0, 1.0].repeat(6);
        let mesh = triangulated(1, positions, normals);

        let welded = weld(&mesh, &ExactMerger).unwrap();
        assert_eq!(welded.vertex_count, 4);
        assert_eq!(welded.indices, vec![0, 1, 2, 0, 2, 3]);
        assert!(welded.status.is_ok());
        let position = welded.attributes.get(AttributeKind::Position).unwrap();
        assert_eq!(position.get(0, 3), &[0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_weld_compares_all_frames() {
        // corners 0 and 1 match in frame 0 but not in frame 1
        let mut positions = vec![0.0; 9];
        positions.extend([0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        let mesh = triangulated(2, positions, vec![0.0; 18]);
        let welded = weld(&mesh, &ExactMerger).unwrap();
        assert_eq!(welded.vertex_count, 2);
        assert_eq!(welded.indices, vec![0, 1, 0]);
    }

    #[test]
    fn test_nan_flags_kind_without_aborting() {
        let mut normals = vec![0.0; 9];
        normals[4] = f32::NAN;
        let mesh = triangulated(1, vec![0.0; 9], normals);
        let welded = weld(&mesh, &ExactMerger).unwrap();
        assert!(welded.status.contains(AttributeKind::Normal));
        assert!(!welded.status.contains(AttributeKind::Position));
        // NaN became 0.0, so all corners are identical
        assert_eq!(welded.vertex_count, 1);
    }

    struct BrokenMerger;

    impl VertexMerger for BrokenMerger {
        fn merge(&self, rows: &[f32], stride: usize) -> MergeOutput {
            MergeOutput {
                unique: rows[..stride].to_vec(),
                remap: vec![0, 1, 0],
            }
        }
    }

    #[test]
    fn test_rejects_inconsistent_merge() {
        let mesh = triangulated(1, vec![0.0; 9], vec![0.0; 9]);
        assert!(matches!(
            weld(&mesh, &BrokenMerger),
            Err(BakeError::Merge(_))
        ));
    }
}
