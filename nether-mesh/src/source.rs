//! Source mesh description
//!
//! Plain arrays as handed over by an authoring tool or read from a JSON
//! document. Face-corner data (UV layers, split normals) is laid out face by
//! face: 3 values for a triangle, 4 for a quad, in polygon vertex order.

use serde::{Deserialize, Serialize};

use crate::error::{BakeError, Result};

/// Triangle or quad, as vertex indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Polygon {
    Tri([u32; 3]),
    Quad([u32; 4]),
}

impl Polygon {
    pub fn vertices(&self) -> &[u32] {
        match self {
            Polygon::Tri(v) => v,
            Polygon::Quad(v) => v,
        }
    }

    #[inline]
    pub fn corner_count(&self) -> usize {
        self.vertices().len()
    }

    #[inline]
    pub fn is_quad(&self) -> bool {
        matches!(self, Polygon::Quad(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Face {
    pub polygon: Polygon,
    #[serde(default)]
    pub smooth: bool,
    #[serde(default)]
    pub material: u32,
    /// Polygon in the loop table this face was tessellated from
    #[serde(default)]
    pub source_polygon: Option<u32>,
}

impl Face {
    pub fn new(polygon: Polygon) -> Self {
        Self {
            polygon,
            smooth: false,
            material: 0,
            source_polygon: None,
        }
    }

    pub fn smooth(mut self) -> Self {
        self.smooth = true;
        self
    }

    pub fn with_material(mut self, material: u32) -> Self {
        self.material = material;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopSpan {
    pub start: u32,
    pub count: u32,
}

/// Polygon loops: each polygon owns a contiguous run of loop entries
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoopTable {
    pub polygons: Vec<LoopSpan>,
    /// Vertex index per loop
    pub vertices: Vec<u32>,
}

impl LoopTable {
    pub fn loop_count(&self) -> usize {
        self.vertices.len()
    }

    /// Loop entry of `polygon` that references `vertex`
    pub fn find(&self, polygon: usize, vertex: u32) -> Option<usize> {
        let span = self.polygons.get(polygon)?;
        let start = span.start as usize;
        let end = (start + span.count as usize).min(self.vertices.len());
        (start..end).find(|&l| self.vertices[l] == vertex)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UvLayer {
    #[serde(default)]
    pub name: String,
    /// Face-corner UV values
    pub values: Vec<[f32; 2]>,
}

/// Red channel bit in [`ColorLayer::mask`]
pub const CHANNEL_R: u8 = 0b100;
/// Green channel bit in [`ColorLayer::mask`]
pub const CHANNEL_G: u8 = 0b010;
/// Blue channel bit in [`ColorLayer::mask`]
pub const CHANNEL_B: u8 = 0b001;

fn all_channels() -> u8 {
    CHANNEL_R | CHANNEL_G | CHANNEL_B
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorLayer {
    #[serde(default)]
    pub name: String,
    /// RGB per loop when the mesh has a loop table, otherwise per vertex
    pub values: Vec<[f32; 3]>,
    /// Channels actually used by materials
    #[serde(default = "all_channels")]
    pub mask: u8,
}

impl ColorLayer {
    /// R, G, B usage flags
    pub fn channels(&self) -> [bool; 3] {
        [
            self.mask & CHANNEL_R != 0,
            self.mask & CHANNEL_G != 0,
            self.mask & CHANNEL_B != 0,
        ]
    }
}

/// Vertex group membership
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupWeights {
    pub group_count: usize,
    /// Per vertex `(group, weight)` entries
    pub weights: Vec<Vec<(u32, f32)>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnimationFrame {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VertexAnimation {
    pub frames: Vec<AnimationFrame>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeKey {
    #[serde(default)]
    pub name: String,
    /// Absolute positions
    pub positions: Vec<[f32; 3]>,
    /// Key this one is relative to
    #[serde(default)]
    pub relative: usize,
    /// Vertex group restricting the key's influence
    #[serde(default)]
    pub vertex_group: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShapeKeySet {
    pub keys: Vec<ShapeKey>,
    /// Key-major per-vertex normals; empty when the host did not bake them
    #[serde(default)]
    pub normals: Vec<[f32; 3]>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditedNormals {
    pub vertex_normals: Vec<[f32; 3]>,
    /// Face-corner split normals
    #[serde(default)]
    pub corner_normals: Vec<[f32; 3]>,
}

/// Everything a bake consumes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceMesh {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub faces: Vec<Face>,
    #[serde(default)]
    pub loops: Option<LoopTable>,
    #[serde(default)]
    pub uv_layers: Vec<UvLayer>,
    #[serde(default)]
    pub color_layers: Vec<ColorLayer>,
    #[serde(default)]
    pub groups: Option<GroupWeights>,
    #[serde(default)]
    pub vertex_animation: Option<VertexAnimation>,
    #[serde(default)]
    pub shape_keys: Option<ShapeKeySet>,
    #[serde(default)]
    pub edited_normals: Option<EditedNormals>,
}

impl SourceMesh {
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Total face corners over all faces (selected or not)
    pub fn face_corner_count(&self) -> usize {
        self.faces.iter().map(|f| f.polygon.corner_count()).sum()
    }

    /// Start of each face's run in face-corner arrays
    pub fn face_corner_offsets(&self) -> Vec<usize> {
        let mut offsets = Vec::with_capacity(self.faces.len());
        let mut offset = 0;
        for face in &self.faces {
            offsets.push(offset);
            offset += face.polygon.corner_count();
        }
        offsets
    }

    /// Faces passing the material selector, with their indices
    pub fn selected_faces(
        &self,
        material: Option<u32>,
    ) -> impl Iterator<Item = (usize, &Face)> + '_ {
        self.faces
            .iter()
            .enumerate()
            .filter(move |(_, face)| material.is_none_or(|m| face.material == m))
    }

    /// Check array lengths and vertex references
    pub fn validate(&self) -> Result<()> {
        let vertex_count = self.vertex_count();
        check_len("normals", vertex_count, self.normals.len())?;

        for (face, f) in self.faces.iter().enumerate() {
            if let Some(&vertex) = f
                .polygon
                .vertices()
                .iter()
                .find(|&&v| v as usize >= vertex_count)
            {
                return Err(BakeError::VertexIndex {
                    face,
                    vertex,
                    vertex_count,
                });
            }
        }

        let corners = self.face_corner_count();
        for layer in &self.uv_layers {
            check_len(&format!("uv layer '{}'", layer.name), corners, layer.values.len())?;
        }

        let color_elements = self
            .loops
            .as_ref()
            .map(LoopTable::loop_count)
            .unwrap_or(vertex_count);
        for layer in &self.color_layers {
            check_len(
                &format!("color layer '{}'", layer.name),
                color_elements,
                layer.values.len(),
            )?;
        }

        if let Some(groups) = &self.groups {
            check_len("group weights", vertex_count, groups.weights.len())?;
        }

        if let Some(edited) = &self.edited_normals {
            if !edited.vertex_normals.is_empty() {
                check_len("edited normals", vertex_count, edited.vertex_normals.len())?;
            }
            if !edited.corner_normals.is_empty() {
                check_len("split normals", corners, edited.corner_normals.len())?;
            }
        }

        Ok(())
    }
}

pub(crate) fn check_len(attribute: &str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(BakeError::AttributeLength {
            attribute: attribute.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad_mesh() -> SourceMesh {
        SourceMesh {
            positions: vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.0, 1.0, 0.0],
                [0.0, 1.0, 0.0],
            ],
            normals: vec![[0.0, 0.0, 1.0]; 4],
            faces: vec![Face::new(Polygon::Quad([0, 1, 2, 3]))],
            ..Default::default()
        }
    }

    #[test]
    fn test_polygon_json_forms() {
        let tri: Polygon = serde_json::from_str("[0, 1, 2]").unwrap();
        let quad: Polygon = serde_json::from_str("[0, 1, 2, 3]").unwrap();
        assert_eq!(tri, Polygon::Tri([0, 1, 2]));
        assert_eq!(quad, Polygon::Quad([0, 1, 2, 3]));
        assert!(serde_json::from_str::<Polygon>("[0, 1]").is_err());
    }

    #[test]
    fn test_document_defaults() {
        let json = r#"{
            "positions": [[0,0,0],[1,0,0],[0,1,0]],
            "normals": [[0,0,1],[0,0,1],[0,0,1]],
            "faces": [{"polygon": [0, 1, 2]}],
            "color_layers": [{"values": [[1,0,0],[0,1,0],[0,0,1]]}]
        }"#;
        let mesh: SourceMesh = serde_json::from_str(json).unwrap();
        assert_eq!(mesh.faces[0].material, 0);
        assert!(!mesh.faces[0].smooth);
        assert_eq!(mesh.color_layers[0].channels(), [true, true, true]);
        mesh.validate().unwrap();
    }

    #[test]
    fn test_validate_vertex_reference() {
        let mut mesh = quad_mesh();
        mesh.faces.push(Face::new(Polygon::Tri([0, 1, 7])));
        let err = mesh.validate().unwrap_err();
        assert!(matches!(
            err,
            BakeError::VertexIndex {
                face: 1,
                vertex: 7,
                ..
            }
        ));
    }

    #[test]
    fn test_validate_uv_length() {
        let mut mesh = quad_mesh();
        mesh.uv_layers.push(UvLayer {
            name: "uv".into(),
            values: vec![[0.0, 0.0]; 3],
        });
        assert!(matches!(
            mesh.validate(),
            Err(BakeError::AttributeLength {
                expected: 4,
                actual: 3,
                ..
            })
        ));
    }

    #[test]
    fn test_face_corner_offsets_and_selection() {
        let mut mesh = quad_mesh();
        mesh.positions.push([2.0, 0.0, 0.0]);
        mesh.normals.push([0.0, 0.0, 1.0]);
        mesh.faces
            .push(Face::new(Polygon::Tri([1, 4, 2])).with_material(1));
        assert_eq!(mesh.face_corner_offsets(), vec![0, 4]);
        assert_eq!(mesh.face_corner_count(), 7);

        let selected: Vec<_> = mesh.selected_faces(Some(1)).map(|(i, _)| i).collect();
        assert_eq!(selected, vec![1]);
        assert_eq!(mesh.selected_faces(None).count(), 2);
    }

    #[test]
    fn test_loop_lookup() {
        let loops = LoopTable {
            polygons: vec![LoopSpan { start: 0, count: 4 }],
            vertices: vec![3, 0, 1, 2],
        };
        assert_eq!(loops.find(0, 0), Some(1));
        assert_eq!(loops.find(0, 3), Some(0));
        assert_eq!(loops.find(0, 9), None);
        assert_eq!(loops.find(1, 0), None);
    }
}
