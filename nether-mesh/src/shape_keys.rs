//! Shape key deltas
//!
//! Shape key frames arrive as absolute values. Every frame after the basis is
//! turned into a delta against its parent frame; corners outside the key's
//! vertex group get a zero delta.

use crate::attribute::AttributeKind;
use crate::combine::ShapeKeyBindings;
use crate::error::{BakeError, Result};
use crate::triangulate::TriangulatedMesh;

const DELTA_KINDS: [AttributeKind; 3] = [
    AttributeKind::Position,
    AttributeKind::Normal,
    AttributeKind::Tangent,
];

/// Replace frames `1..` of position, normal and tangent streams with deltas
pub fn apply_deltas(mesh: &mut TriangulatedMesh, bindings: &ShapeKeyBindings) -> Result<()> {
    let frames = mesh.frames;
    if bindings.relatives.len() != frames || bindings.members.len() != frames {
        return Err(BakeError::InvalidShapeKey {
            key: bindings.relatives.len().min(bindings.members.len()),
            reason: format!(
                "bindings cover {} keys, mesh has {frames} frames",
                bindings.relatives.len()
            ),
        });
    }
    if let Some((key, &relative)) = bindings
        .relatives
        .iter()
        .enumerate()
        .find(|(_, r)| **r >= frames)
    {
        return Err(BakeError::InvalidShapeKey {
            key,
            reason: format!("relative key {relative} out of {frames} keys"),
        });
    }

    let corner_vertices = &mesh.corner_vertices;
    for kind in DELTA_KINDS {
        let Some(stream) = mesh.attributes.get_mut(kind) else {
            continue;
        };
        let absolute = stream.clone();
        let corners = absolute.vertex_count();

        for frame in 1..frames {
            let relative = bindings.relatives[frame];
            let members = bindings.members[frame].as_deref();
            for corner in 0..corners {
                let vertex = corner_vertices[corner] as usize;
                let outside =
                    members.is_some_and(|m| !m.get(vertex).copied().unwrap_or(false));
                let dst = stream.get_mut(frame, corner);
                if outside {
                    dst.fill(0.0);
                    continue;
                }
                let current = absolute.get(frame, corner);
                let parent = absolute.get(relative, corner);
                for ((d, &c), &p) in dst.iter_mut().zip(current).zip(parent) {
                    *d = c - p;
                }
            }
        }
    }

    tracing::debug!("computed shape key deltas for {} frame(s)", frames.saturating_sub(1));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{AttributeSet, AttributeStream};

    fn mesh(frames: usize, positions: Vec<f32>) -> TriangulatedMesh {
        let mut attributes = AttributeSet::default();
        attributes.insert(
            AttributeKind::Position,
            AttributeStream::from_data(3, frames, positions).unwrap(),
        );
        TriangulatedMesh {
            frames,
            corner_vertices: vec![0, 1, 2],
            attributes,
        }
    }

    #[test]
    fn test_deltas_against_parent() {
        // frame 0 basis, frame 1 relative to 0, frame 2 relative to 1
        let mut positions = vec![1.0; 9];
        positions.extend(vec![3.0; 9]);
        positions.extend(vec![4.0; 9]);
        let mut m = mesh(3, positions);
        let bindings = ShapeKeyBindings {
            relatives: vec![0, 0, 1],
            members: vec![None, None, None],
        };
        apply_deltas(&mut m, &bindings).unwrap();

        let position = m.attributes.get(AttributeKind::Position).unwrap();
        assert_eq!(position.partition(0), &[1.0; 9]);
        assert_eq!(position.partition(1), &[2.0; 9]);
        // uses the absolute parent, not its delta
        assert_eq!(position.partition(2), &[1.0; 9]);
    }

    #[test]
    fn test_non_members_get_zero_delta() {
        let mut positions = vec![0.0; 9];
        positions.extend(vec![5.0; 9]);
        let mut m = mesh(2, positions);
        // corner 1 maps to vertex 1, which is outside the group
        let bindings = ShapeKeyBindings {
            relatives: vec![0, 0],
            members: vec![None, Some(vec![true, false, true])],
        };
        apply_deltas(&mut m, &bindings).unwrap();

        let position = m.attributes.get(AttributeKind::Position).unwrap();
        assert_eq!(position.get(1, 0), &[5.0; 3]);
        assert_eq!(position.get(1, 1), &[0.0; 3]);
        assert_eq!(position.get(1, 2), &[5.0; 3]);
    }

    #[test]
    fn test_tangents_included() {
        let mut m = mesh(2, vec![0.0; 18]);
        let mut tangent = vec![1.0; 12];
        tangent.extend(vec![1.5; 12]);
        m.attributes.insert(
            AttributeKind::Tangent,
            AttributeStream::from_data(4, 2, tangent).unwrap(),
        );
        let bindings = ShapeKeyBindings {
            relatives: vec![0, 0],
            members: vec![None, None],
        };
        apply_deltas(&mut m, &bindings).unwrap();
        let tangent = m.attributes.get(AttributeKind::Tangent).unwrap();
        assert_eq!(tangent.partition(1), &[0.5; 12]);
    }

    #[test]
    fn test_relative_out_of_range() {
        let mut m = mesh(2, vec![0.0; 18]);
        let bindings = ShapeKeyBindings {
            relatives: vec![0, 2],
            members: vec![None, None],
        };
        assert!(matches!(
            apply_deltas(&mut m, &bindings),
            Err(BakeError::InvalidShapeKey { key: 1, .. })
        ));
    }
}
