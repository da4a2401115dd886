//! nether-bake - Nethercore submesh bake tool
//!
//! Converts JSON source meshes to baked submesh containers (.nbsub) with a
//! JSON metadata sidecar.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nether_mesh::formats::ParsedSubmesh;
use nether_mesh::{AttributeStatus, ExportOptions};
use std::path::PathBuf;

use nether_bake::{BakeOutcome, SUBMESH_EXTENSION, convert, manifest};

#[derive(Parser)]
#[command(name = "nether-bake")]
#[command(about = "Nethercore submesh bake tool")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bake every mesh of a manifest file
    Build {
        /// Path to bake.toml manifest
        #[arg(default_value = "bake.toml")]
        manifest: PathBuf,

        /// Output directory (overrides manifest)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Fail on attribute errors instead of warning
        #[arg(long)]
        strict: bool,
    },

    /// Validate manifest without baking
    Check {
        /// Path to bake.toml manifest
        #[arg(default_value = "bake.toml")]
        manifest: PathBuf,
    },

    /// Bake a single source mesh
    Bake {
        /// Input source mesh (JSON)
        input: PathBuf,

        /// Output .nbsub file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Export options (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Only faces with this material index
        #[arg(short, long)]
        material: Option<u32>,

        /// Keep the welded index order
        #[arg(long)]
        no_cache_opt: bool,

        /// Fail on attribute errors instead of warning
        #[arg(long)]
        strict: bool,
    },

    /// Print the bounding volumes of a source mesh as JSON
    Bounds {
        /// Input source mesh (JSON)
        input: PathBuf,

        /// Only faces with this material index
        #[arg(short, long)]
        material: Option<u32>,
    },

    /// Print the header and sections of a baked container
    Inspect {
        /// Input .nbsub file
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            manifest,
            output,
            strict,
        } => {
            tracing::info!("Building meshes from {:?}", manifest);
            let config = manifest::load_manifest(&manifest)?;
            let outcomes = manifest::build_all(&config, output.as_deref(), strict)?;
            let skipped = outcomes
                .iter()
                .filter(|(_, outcome)| *outcome == BakeOutcome::Empty)
                .count();
            tracing::info!(
                "Build complete! {} baked, {} empty",
                outcomes.len() - skipped,
                skipped
            );
        }

        Commands::Check { manifest } => {
            tracing::info!("Checking manifest {:?}", manifest);
            let config = manifest::load_manifest(&manifest)?;
            manifest::validate(&config)?;
            tracing::info!("Manifest is valid!");
        }

        Commands::Bake {
            input,
            output,
            config,
            material,
            no_cache_opt,
            strict,
        } => {
            let mut options = match &config {
                Some(path) => convert::load_options(path)?,
                None => ExportOptions::default(),
            };
            if material.is_some() {
                options.material = material;
            }
            if no_cache_opt {
                options.optimize_vertex_cache = false;
            }

            let output = output.unwrap_or_else(|| input.with_extension(SUBMESH_EXTENSION));
            tracing::info!("Baking {:?} -> {:?}", input, output);
            match convert::bake_file(&input, &output, &options, strict)? {
                BakeOutcome::Empty => tracing::info!("Nothing to bake"),
                BakeOutcome::Written { .. } => tracing::info!("Done!"),
            }
        }

        Commands::Bounds { input, material } => {
            let bounds = convert::bounds_file(&input, material)?
                .with_context(|| format!("{:?} has no faces for the selection", input))?;
            println!("{}", serde_json::to_string_pretty(&bounds)?);
        }

        Commands::Inspect { input } => {
            let bytes =
                std::fs::read(&input).with_context(|| format!("Failed to read {:?}", input))?;
            let parsed = ParsedSubmesh::parse(&bytes)
                .with_context(|| format!("Invalid container {:?}", input))?;
            let header = parsed.header;

            println!("vertices:       {}", header.vertex_count);
            println!("indices:        {}", header.index_count);
            println!("frames:         {}", header.frame_count);
            println!("groups:         {}", header.group_count);
            println!("color channels: {}", header.color_channels);
            println!("format:         {:#04x}", header.format);
            for message in AttributeStatus::from_bits(header.status).describe() {
                println!("warning:        {}", message);
            }
            for (section, _) in &parsed.sections {
                println!(
                    "  {:<12} offset {:>8}  size {:>8}",
                    section.name, section.offset, section.size
                );
            }
        }
    }

    Ok(())
}
