//! Attribute combining
//!
//! Picks the animation source for a bake and gathers per-vertex positions,
//! normals, group weights and colors into one frame-indexed bundle.
//!
//! Source priority is vertex animation > shape keys > edited normals > base
//! mesh. A requested source whose container is missing or empty falls through
//! to the next one.

use crate::error::{BakeError, Result};
use crate::options::ExportOptions;
use crate::source::{SourceMesh, check_len};

/// Group weight of a vertex that is not a member of the group
pub const NOT_A_MEMBER: f32 = -1.0;

/// Where the frames of a bake come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSource {
    Base,
    VertexAnimation,
    ShapeKeys,
    EditedNormals,
}

/// Group-major weight table, [`NOT_A_MEMBER`] where a vertex is outside a group
#[derive(Debug, Clone, PartialEq)]
pub struct GroupTable {
    pub group_count: usize,
    pub vertex_count: usize,
    pub weights: Vec<f32>,
}

impl GroupTable {
    /// Build from per-vertex entries
    ///
    /// Fails with [`BakeError::WrongGroupIndices`] if any entry names a group
    /// outside `group_count`.
    pub fn build(group_count: usize, per_vertex: &[Vec<(u32, f32)>]) -> Result<Self> {
        let vertex_count = per_vertex.len();
        let mut weights = vec![NOT_A_MEMBER; group_count * vertex_count];
        for (vertex, entries) in per_vertex.iter().enumerate() {
            for &(group, weight) in entries {
                let group = group as usize;
                if group >= group_count {
                    return Err(BakeError::WrongGroupIndices {
                        vertex,
                        group,
                        group_count,
                    });
                }
                weights[group * vertex_count + vertex] = weight;
            }
        }
        Ok(Self {
            group_count,
            vertex_count,
            weights,
        })
    }

    #[inline]
    pub fn weight(&self, group: usize, vertex: usize) -> f32 {
        self.weights[group * self.vertex_count + vertex]
    }

    #[inline]
    pub fn is_member(&self, group: usize, vertex: usize) -> bool {
        self.weight(group, vertex) != NOT_A_MEMBER
    }
}

/// Parent frames and influence masks of honored shape keys
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeKeyBindings {
    /// Parent frame per frame
    pub relatives: Vec<usize>,
    /// Per frame, per base vertex membership of the key's vertex group
    pub members: Vec<Option<Vec<bool>>>,
}

/// Color layers, zero-filled where a channel is unused
#[derive(Debug, Clone, PartialEq)]
pub struct ColorData {
    pub names: Vec<String>,
    pub masks: Vec<u8>,
    pub channels: Vec<[bool; 3]>,
    /// Layer-major RGB values
    pub values: Vec<[f32; 3]>,
    /// Values are indexed by loop instead of by vertex
    pub per_loop: bool,
    /// Elements per layer (loops or vertices)
    pub elements: usize,
}

impl ColorData {
    #[inline]
    pub fn layer_count(&self) -> usize {
        self.channels.len()
    }

    #[inline]
    pub fn value(&self, layer: usize, element: usize) -> [f32; 3] {
        self.values[layer * self.elements + element]
    }

    /// True when at least one channel of one layer is unused
    pub fn needs_channel_reduction(&self) -> bool {
        self.channels.iter().flatten().any(|used| !used)
    }
}

/// Frame-indexed per-vertex bundle
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedMesh {
    pub base_length: usize,
    pub frames: usize,
    pub source: FrameSource,
    /// Frame-major positions
    pub positions: Vec<[f32; 3]>,
    /// Frame-major normals
    pub normals: Vec<[f32; 3]>,
    pub shape_keys: Option<ShapeKeyBindings>,
    pub groups: Option<GroupTable>,
    pub colors: Option<ColorData>,
}

impl CombinedMesh {
    #[inline]
    pub fn position(&self, frame: usize, vertex: usize) -> [f32; 3] {
        self.positions[frame * self.base_length + vertex]
    }

    #[inline]
    pub fn normal(&self, frame: usize, vertex: usize) -> [f32; 3] {
        self.normals[frame * self.base_length + vertex]
    }
}

/// Positions and normals for every frame of the chosen source
struct Frames {
    source: FrameSource,
    count: usize,
    positions: Vec<[f32; 3]>,
    normals: Vec<[f32; 3]>,
    shape_keys: Option<ShapeKeyBindings>,
}

pub fn combine(source: &SourceMesh, options: &ExportOptions) -> Result<CombinedMesh> {
    let base_length = source.vertex_count();
    let frames = choose_frames(source, options)?;

    let groups = match (&source.groups, options.vertex_groups) {
        (Some(groups), true) => Some(GroupTable::build(groups.group_count, &groups.weights)?),
        _ => None,
    };

    let colors = if options.vertex_colors && !source.color_layers.is_empty() {
        Some(combine_colors(source))
    } else {
        None
    };

    tracing::debug!(
        "combined {} vertices, {} frame(s) from {:?}",
        base_length,
        frames.count,
        frames.source
    );

    Ok(CombinedMesh {
        base_length,
        frames: frames.count,
        source: frames.source,
        positions: frames.positions,
        normals: frames.normals,
        shape_keys: frames.shape_keys,
        groups,
        colors,
    })
}

fn choose_frames(source: &SourceMesh, options: &ExportOptions) -> Result<Frames> {
    if options.vertex_animation {
        if let Some(frames) = vertex_animation_frames(source)? {
            return Ok(frames);
        }
    }
    if options.shape_keys {
        if let Some(frames) = shape_key_frames(source)? {
            return Ok(frames);
        }
    }
    if options.edited_normals {
        if let Some(edited) = &source.edited_normals {
            if !edited.vertex_normals.is_empty() {
                return Ok(Frames {
                    source: FrameSource::EditedNormals,
                    count: 1,
                    positions: source.positions.clone(),
                    normals: edited.vertex_normals.clone(),
                    shape_keys: None,
                });
            }
        }
    }
    Ok(Frames {
        source: FrameSource::Base,
        count: 1,
        positions: source.positions.clone(),
        normals: source.normals.clone(),
        shape_keys: None,
    })
}

fn vertex_animation_frames(source: &SourceMesh) -> Result<Option<Frames>> {
    let Some(animation) = source.vertex_animation.as_ref() else {
        return Ok(None);
    };
    if animation.frames.is_empty() {
        return Ok(None);
    }

    let vertex_count = source.vertex_count();
    let count = animation.frames.len();
    let mut positions = Vec::with_capacity(count * vertex_count);
    let mut normals = Vec::with_capacity(count * vertex_count);
    for (i, frame) in animation.frames.iter().enumerate() {
        check_len(
            &format!("vertex animation frame {i} positions"),
            vertex_count,
            frame.positions.len(),
        )?;
        check_len(
            &format!("vertex animation frame {i} normals"),
            vertex_count,
            frame.normals.len(),
        )?;
        positions.extend_from_slice(&frame.positions);
        normals.extend_from_slice(&frame.normals);
    }

    Ok(Some(Frames {
        source: FrameSource::VertexAnimation,
        count,
        positions,
        normals,
        shape_keys: None,
    }))
}

fn shape_key_frames(source: &SourceMesh) -> Result<Option<Frames>> {
    let Some(set) = source.shape_keys.as_ref() else {
        return Ok(None);
    };
    // keys without baked normals are ignored
    if set.normals.is_empty() || set.keys.is_empty() {
        return Ok(None);
    }

    let vertex_count = source.vertex_count();
    let count = set.keys.len();
    check_len("shape key normals", count * vertex_count, set.normals.len())?;

    let group_count = source.groups.as_ref().map_or(0, |g| g.group_count);
    let table = match &source.groups {
        Some(groups) if set.keys.iter().any(|k| k.vertex_group.is_some()) => {
            Some(GroupTable::build(groups.group_count, &groups.weights)?)
        }
        _ => None,
    };

    let mut positions = Vec::with_capacity(count * vertex_count);
    let mut relatives = Vec::with_capacity(count);
    let mut members = Vec::with_capacity(count);
    for (i, key) in set.keys.iter().enumerate() {
        check_len(
            &format!("shape key '{}' positions", key.name),
            vertex_count,
            key.positions.len(),
        )?;
        if key.relative >= count {
            return Err(BakeError::InvalidShapeKey {
                key: i,
                reason: format!("relative key {} out of {} keys", key.relative, count),
            });
        }
        positions.extend_from_slice(&key.positions);
        relatives.push(key.relative);

        let mask = match key.vertex_group {
            None => None,
            Some(group) => {
                let group = group as usize;
                match &table {
                    Some(table) if group < group_count => {
                        Some((0..vertex_count).map(|v| table.is_member(group, v)).collect())
                    }
                    _ => {
                        return Err(BakeError::WrongGroupIndices {
                            vertex: 0,
                            group,
                            group_count,
                        });
                    }
                }
            }
        };
        members.push(mask);
    }

    Ok(Some(Frames {
        source: FrameSource::ShapeKeys,
        count,
        positions,
        normals: set.normals.clone(),
        shape_keys: Some(ShapeKeyBindings { relatives, members }),
    }))
}

fn combine_colors(source: &SourceMesh) -> ColorData {
    let per_loop = source.loops.is_some();
    let elements = source
        .loops
        .as_ref()
        .map_or(source.vertex_count(), |l| l.loop_count());

    let mut names = Vec::with_capacity(source.color_layers.len());
    let mut masks = Vec::with_capacity(source.color_layers.len());
    let mut channels = Vec::with_capacity(source.color_layers.len());
    let mut values = Vec::with_capacity(source.color_layers.len() * elements);
    for layer in &source.color_layers {
        let used = layer.channels();
        // unused channels are zeroed so they never keep corners apart
        values.extend(layer.values.iter().map(|rgb| {
            [
                if used[0] { rgb[0] } else { 0.0 },
                if used[1] { rgb[1] } else { 0.0 },
                if used[2] { rgb[2] } else { 0.0 },
            ]
        }));
        names.push(layer.name.clone());
        masks.push(layer.mask);
        channels.push(used);
    }

    ColorData {
        names,
        masks,
        channels,
        values,
        per_loop,
        elements,
    }
}
