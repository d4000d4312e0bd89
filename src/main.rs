//! tomo-curate - lists the tomograms a source manifest resolves to.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use serde_json::json;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tomogram_datasets::{DatasetRegistry, Manifest, Orientation, TracingSink};

#[derive(Debug, Parser)]
#[command(name = "tomo-curate", version, about = "Discover annotated tomograms")]
struct Cli {
    /// JSON manifest describing the search roots
    manifest: PathBuf,

    /// Also search sources marked private
    #[arg(long)]
    include_private: bool,

    /// List scans without a complete annotation set instead
    #[arg(long)]
    unannotated: bool,

    /// Print a JSON array instead of one line per scan
    #[arg(long)]
    json: bool,

    /// Write a PNG of each scan's middle axial slice into this directory
    #[arg(long, value_name = "DIR")]
    preview: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let manifest = match Manifest::load(&cli.manifest) {
        Ok(manifest) => manifest,
        Err(e) => {
            error!("Failed to read manifest {}: {}", cli.manifest.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let sink = TracingSink;
    let registry = if cli.unannotated {
        manifest.discover_unannotated(cli.include_private, &sink)
    } else {
        manifest.discover_annotated(cli.include_private, &sink)
    };
    let mut registry = match registry {
        Ok(registry) => registry,
        Err(e) => {
            error!("Discovery failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!(scans = registry.len(), "Discovery finished");
    if let Some(dir) = &cli.preview {
        if let Err(e) = write_previews(&mut registry, dir) {
            error!("Failed to create preview directory {}: {}", dir.display(), e);
            return ExitCode::FAILURE;
        }
    }

    if cli.json {
        print_json(&registry)
    } else {
        print_table(&registry);
        ExitCode::SUCCESS
    }
}

/// One PNG per scan, named after its label. Failures are logged per scan and
/// the data is dropped again after each one.
fn write_previews(registry: &mut DatasetRegistry, dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let labels: Vec<String> = registry.labels().collect();
    for label in labels {
        let Some(handle) = registry.get_mut(&label) else {
            continue;
        };
        let out = dir.join(format!("{label}.png"));
        match handle.save_preview(&out, Orientation::Axial) {
            Ok(()) => info!(scan = %label, path = %out.display(), "Wrote preview"),
            Err(e) => warn!(scan = %label, "Failed to write preview: {}", e),
        }
        handle.invalidate();
    }
    Ok(())
}

fn print_table(registry: &DatasetRegistry) {
    for (handle, is_private) in registry.iter() {
        let points: usize = handle.annotations().iter().map(|a| a.len()).sum();
        println!(
            "{}\t{}\t{}\t{}\t{}",
            handle.label(),
            if is_private { "private" } else { "public" },
            handle.annotations().len(),
            points,
            handle.location().display()
        );
    }
}

fn print_json(registry: &DatasetRegistry) -> ExitCode {
    let scans: Vec<_> = registry
        .iter()
        .map(|(handle, is_private)| {
            json!({
                "label": handle.label(),
                "path": handle.location(),
                "private": is_private,
                "annotations": handle
                    .annotations()
                    .iter()
                    .map(|a| json!({
                        "name": a.name(),
                        "points": a.len(),
                        "source": a.source().map(|s| &s.path),
                    }))
                    .collect::<Vec<_>>(),
            })
        })
        .collect();

    match serde_json::to_string_pretty(&scans) {
        Ok(text) => {
            println!("{text}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Failed to serialize output: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "tomogram_datasets=debug,tomo_curate=debug"
    } else {
        "tomogram_datasets=info,tomo_curate=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
