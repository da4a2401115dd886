//! Structural bake errors
//!
//! These abort a bake. Per-attribute problems found while welding are not
//! errors; they are reported through [`crate::AttributeStatus`].

use std::io;

/// Errors that stop a submesh bake
#[derive(Debug, thiserror::Error)]
pub enum BakeError {
    /// A vertex references a group outside the declared group count
    #[error("wrong group indices: vertex {vertex} references group {group} (group count {group_count})")]
    WrongGroupIndices {
        vertex: usize,
        group: usize,
        group_count: usize,
    },

    /// A polygon references a vertex that does not exist
    #[error("face {face} references vertex {vertex} (vertex count {vertex_count})")]
    VertexIndex {
        face: usize,
        vertex: u32,
        vertex_count: usize,
    },

    /// An attribute array has the wrong number of elements
    #[error("{attribute} has {actual} elements, expected {expected}")]
    AttributeLength {
        attribute: String,
        expected: usize,
        actual: usize,
    },

    /// A shape key names a parent key that does not exist
    #[error("shape key {key}: {reason}")]
    InvalidShapeKey { key: usize, reason: String },

    /// A face corner could not be matched against its polygon's loops
    #[error("face {face}: vertex {vertex} has no loop in polygon {polygon}")]
    LoopMismatch {
        face: usize,
        vertex: u32,
        polygon: usize,
    },

    /// Index buffer is not a triangle list over the declared vertices
    #[error("invalid index buffer: {0}")]
    InvalidIndices(String),

    /// Strided view does not fit the row matrix or stream it is applied to
    #[error("stream layout mismatch: {0}")]
    StreamLayout(String),

    /// Merge primitive returned an inconsistent result
    #[error("vertex merge failed: {0}")]
    Merge(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, BakeError>;
