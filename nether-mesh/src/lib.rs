//! Submesh baking for Nethercore mesh assets
//!
//! Converts a polygonal source mesh (positions, normals, UV and color layers,
//! vertex group weights, vertex animation or shape keys) into render-ready
//! buffers:
//! - quads are triangulated and every attribute is expanded per corner
//! - attribute-identical corners are welded (bit-exact)
//! - the index buffer is reordered for post-transform cache reuse
//! - normals, tangents, weights and colors are quantized
//!
//! Bounding volumes (box, sphere, cylinder, oriented box, ellipsoid) are
//! fitted on the raw source positions alongside.
//!
//! The entry point is [`bake_submesh`]; every stage is also exposed on its own.

pub mod attribute;
pub mod bake;
pub mod bounds;
pub mod combine;
pub mod error;
pub mod formats;
pub mod options;
pub mod packing;
pub mod shape_keys;
pub mod source;
pub mod stream;
pub mod tangent;
pub mod triangulate;
pub mod vertex_cache;
pub mod weld;

pub use attribute::{AttributeKind, AttributeStatus};
pub use bake::{BakedSubmesh, ColorLayerInfo, SubmeshExport, bake_submesh, bake_submesh_with};
pub use bounds::{BoundingVolumes, compute_bounds};
pub use error::{BakeError, Result};
pub use formats::{SubmeshHeader, SubmeshMetadata, write_baked_submesh};
pub use options::ExportOptions;
pub use source::SourceMesh;
pub use tangent::{TangentGenerator, UvGradientTangents};
pub use weld::{ExactMerger, VertexMerger};
