//! Per-bake options

use serde::{Deserialize, Serialize};

use crate::vertex_cache::{DEFAULT_CACHE_SIZE, DEFAULT_CHUNK_INDICES};

/// Only the first two UV layers are exported
pub const MAX_UV_LAYERS: usize = 2;

/// What to export and how
///
/// Deserializes from TOML/JSON with every field optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// Restrict the bake to faces with this material index
    pub material: Option<u32>,
    /// Keep interpolated vertex normals on flat faces
    pub disable_flat: bool,
    pub vertex_animation: bool,
    pub shape_keys: bool,
    pub edited_normals: bool,
    pub vertex_groups: bool,
    pub vertex_colors: bool,
    /// Generate tangents (needs at least one UV layer)
    pub tangents: bool,
    /// Export per-vertex shading tangents (needs at least one UV layer)
    pub shading_tangents: bool,
    pub optimize_vertex_cache: bool,
    /// Simulated post-transform cache size (3..=64)
    pub cache_size: usize,
    /// Index streams longer than this are optimized in chunks
    pub chunk_indices: usize,
    /// Drop color channels no material uses
    pub optimize_vertex_colors: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            material: None,
            disable_flat: false,
            vertex_animation: false,
            shape_keys: false,
            edited_normals: false,
            vertex_groups: false,
            vertex_colors: false,
            tangents: true,
            shading_tangents: false,
            optimize_vertex_cache: true,
            cache_size: DEFAULT_CACHE_SIZE,
            chunk_indices: DEFAULT_CHUNK_INDICES,
            optimize_vertex_colors: true,
        }
    }
}
