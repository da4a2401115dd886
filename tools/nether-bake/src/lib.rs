//! nether-bake library
//!
//! Bakes JSON source meshes into `.nbsub` containers with JSON metadata
//! sidecars, either one file at a time or from a `bake.toml` manifest.

pub mod convert;
pub mod manifest;

pub use convert::{BakeOutcome, bake_file, load_options, load_source};
pub use nether_mesh::formats::SUBMESH_EXTENSION;
