//! Manifest parsing and build orchestration
//!
//! Parses bake.toml and bakes every listed mesh.

use anyhow::{Context, Result};
use nether_mesh::ExportOptions;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::convert::{BakeOutcome, bake_file};
use crate::SUBMESH_EXTENSION;

/// Root manifest structure
#[derive(Debug, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub output: OutputConfig,
    /// Shared by every mesh unless an entry selects its own material
    #[serde(default)]
    pub options: ExportOptions,
    #[serde(default)]
    pub meshes: BTreeMap<String, MeshEntry>,
}

#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("baked/")
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum MeshEntry {
    Simple(PathBuf),
    Detailed {
        path: PathBuf,
        #[serde(default)]
        material: Option<u32>,
    },
}

impl MeshEntry {
    pub fn path(&self) -> &Path {
        match self {
            MeshEntry::Simple(p) => p,
            MeshEntry::Detailed { path, .. } => path,
        }
    }

    pub fn material(&self) -> Option<u32> {
        match self {
            MeshEntry::Simple(_) => None,
            MeshEntry::Detailed { material, .. } => *material,
        }
    }
}

/// Load and parse a manifest file
pub fn load_manifest(path: &Path) -> Result<Manifest> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest: {:?}", path))?;
    let manifest: Manifest = toml::from_str(&content)
        .with_context(|| format!("Failed to parse manifest: {:?}", path))?;
    Ok(manifest)
}

/// Validate a manifest without building
pub fn validate(manifest: &Manifest) -> Result<()> {
    for (name, entry) in &manifest.meshes {
        if !entry.path().exists() {
            anyhow::bail!("Mesh '{}' source not found: {:?}", name, entry.path());
        }
    }
    Ok(())
}

/// Bake every mesh of a manifest, returning the outcome per mesh name
pub fn build_all(
    manifest: &Manifest,
    output_override: Option<&Path>,
    strict: bool,
) -> Result<Vec<(String, BakeOutcome)>> {
    let output_dir = output_override.unwrap_or(&manifest.output.dir);
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory: {:?}", output_dir))?;

    let mut outcomes = Vec::with_capacity(manifest.meshes.len());
    for (name, entry) in &manifest.meshes {
        let output = output_dir.join(format!("{}.{}", name, SUBMESH_EXTENSION));
        tracing::info!("Baking mesh: {} -> {:?}", name, output);

        let options = ExportOptions {
            material: entry.material().or(manifest.options.material),
            ..manifest.options.clone()
        };
        let outcome = bake_file(entry.path(), &output, &options, strict)
            .with_context(|| format!("Mesh '{}'", name))?;
        outcomes.push((name.clone(), outcome));
    }

    Ok(outcomes)
}
