//! Single-file conversion

use anyhow::{Context, Result};
use nether_mesh::{
    AttributeStatus, BoundingVolumes, ExportOptions, SourceMesh, SubmeshExport, SubmeshMetadata,
    bake_submesh, compute_bounds, write_baked_submesh,
};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Extension replacing the container's own
pub const METADATA_EXTENSION: &str = "nbsub.json";

/// Load a JSON source mesh
pub fn load_source(path: &Path) -> Result<SourceMesh> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read source mesh: {:?}", path))?;
    let source: SourceMesh = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse source mesh: {:?}", path))?;
    Ok(source)
}

/// Load export options from a TOML file
pub fn load_options(path: &Path) -> Result<ExportOptions> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read options: {:?}", path))?;
    let options: ExportOptions = toml::from_str(&content)
        .with_context(|| format!("Failed to parse options: {:?}", path))?;
    Ok(options)
}

/// Metadata sidecar path for a container path (`<name>.nbsub.json`)
pub fn metadata_path(container: &Path) -> PathBuf {
    container.with_extension(METADATA_EXTENSION)
}

#[derive(Debug, Clone, PartialEq)]
pub enum BakeOutcome {
    /// Nothing to export, no files written
    Empty,
    Written {
        container: PathBuf,
        metadata: PathBuf,
        vertex_count: usize,
        index_count: usize,
        status: AttributeStatus,
    },
}

/// Bake `input` into `output` and its metadata sidecar
///
/// With `strict`, attribute errors fail the bake before anything is written.
pub fn bake_file(
    input: &Path,
    output: &Path,
    options: &ExportOptions,
    strict: bool,
) -> Result<BakeOutcome> {
    let source = load_source(input)?;
    let export = bake_submesh(&source, options)
        .with_context(|| format!("Failed to bake {:?}", input))?;

    let SubmeshExport::Baked(baked) = export else {
        tracing::warn!("{:?}: no geometry for the selected faces, skipped", input);
        return Ok(BakeOutcome::Empty);
    };

    let errors = baked.status.describe();
    for message in &errors {
        tracing::warn!("{:?}: {}", input, message);
    }
    if strict && !errors.is_empty() {
        anyhow::bail!("{:?} has attribute errors: {}", input, errors.join(" "));
    }

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }

    let file = File::create(output).with_context(|| format!("Failed to create {:?}", output))?;
    let mut writer = BufWriter::new(file);
    write_baked_submesh(&mut writer, &baked)
        .with_context(|| format!("Failed to write {:?}", output))?;
    writer.flush()?;

    let metadata = metadata_path(output);
    let json = serde_json::to_string_pretty(&SubmeshMetadata::from_baked(&baked))?;
    std::fs::write(&metadata, json)
        .with_context(|| format!("Failed to write {:?}", metadata))?;

    tracing::info!(
        "  {} vertices, {} triangles, {} frame(s), ACMR {:.3}",
        baked.vertex_count,
        baked.triangle_count(),
        baked.frame_count,
        baked.acmr
    );

    Ok(BakeOutcome::Written {
        container: output.to_path_buf(),
        metadata,
        vertex_count: baked.vertex_count,
        index_count: baked.index_count(),
        status: baked.status,
    })
}

/// Bounding volumes of a source file's selection
pub fn bounds_file(input: &Path, material: Option<u32>) -> Result<Option<BoundingVolumes>> {
    let source = load_source(input)?;
    source
        .validate()
        .with_context(|| format!("Invalid source mesh {:?}", input))?;
    Ok(compute_bounds(&source, material))
}
