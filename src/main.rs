use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use env_logger::Builder;
use log::{debug, info, warn, LevelFilter};
use std::path::{Path, PathBuf};
use std::time::Instant;

mod archive;
mod classify;
mod cutoff;
mod descriptors;
mod dump;
mod engine;
mod error;
mod geometry;
mod harmonics;
mod neighbors;
mod special;
mod steinhardt;
mod symmetry;
mod training;

use classify::{aggregate_directory, write_results, PrecomputedPredictions};
use engine::{DescriptorEngine, RunManifest, RunSummary};
use structure_common::{EngineConfig, PhaseRegistry};
use training::TrainingSet;

/// Local crystal structure descriptors for molecular-dynamics dumps
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the engine configuration (TOML)
    #[arg(short, long, default_value = "structure.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compute labelled descriptor files for training from a dump of a known phase
    Prepare {
        /// Phase of every timestep in the dump (must be in the phase registry)
        phase: String,
        /// Dump file
        dump: PathBuf,
    },
    /// Compute unlabelled descriptor files for prediction
    Describe {
        /// Dump file
        dump: PathBuf,
        /// Output directory (defaults to output.predict_dir)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// List the phases of the registry
    Phases,
    /// Build the training arrays from labelled descriptor files
    Arrays {
        /// Directory of labelled descriptor files (defaults to output.train_dir)
        #[arg(short, long)]
        dir: Option<PathBuf>,
        /// Output path without extension (defaults to <results_dir>/training_arrays)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Summarize training arrays written by `arrays`
    Inspect {
        /// Archive path (format taken from output.archive_format)
        arrays: PathBuf,
    },
    /// Average per-atom predictions into the global phase fractions of each timestep
    Aggregate {
        /// Directory of `timestep_<id>.csv` prediction tables
        predictions: PathBuf,
        /// Directory of descriptor files (defaults to output.predict_dir)
        #[arg(short, long)]
        descriptors: Option<PathBuf>,
        /// Results table (defaults to <results_dir>/results.tsv)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over the default level
    let mut builder = Builder::from_default_env();
    if std::env::var_os("RUST_LOG").is_none() {
        builder.filter_level(LevelFilter::Info);
    }
    builder.init();

    info!("Starting Structure Engine...");
    let config = EngineConfig::load_or_default(&cli.config)?;
    debug!("Configuration: {:#?}", config);

    if let Some(threads) = config.run.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Failed to configure the rayon thread pool")?;
    }
    info!("Using {} Rayon threads.", rayon::current_num_threads());

    match cli.command {
        Command::Prepare { phase, dump } => {
            let registry = PhaseRegistry::load(&config.phases.registry)?;
            if registry.index_of(&phase).is_none() {
                anyhow::bail!(
                    "Phase '{}' is not in the registry '{}' (available: {})",
                    phase,
                    config.phases.registry.display(),
                    registry.names().join(", ")
                );
            }
            info!("ACTION: prepare | phase: {} | dump: {}", phase, dump.display());
            let out = config.output.train_dir.clone();
            run_descriptors(&config, &dump, &out, Some(&phase))
        }
        Command::Describe { dump, out } => {
            info!("ACTION: describe | dump: {}", dump.display());
            let out = out.unwrap_or_else(|| config.output.predict_dir.clone());
            run_descriptors(&config, &dump, &out, None)
        }
        Command::Phases => {
            let registry = PhaseRegistry::load(&config.phases.registry)?;
            for (i, name) in registry.names().iter().enumerate() {
                println!("{}\t{}", i, name);
            }
            Ok(())
        }
        Command::Arrays { dir, output } => {
            let registry = PhaseRegistry::load(&config.phases.registry)?;
            let dir = dir.unwrap_or_else(|| config.output.train_dir.clone());
            let set = TrainingSet::from_directory(&dir, &registry, config.descriptors.version)?;
            if set.is_empty() {
                warn!("No complete descriptor rows in '{}'.", dir.display());
            }
            let base = match output {
                Some(path) => path,
                None => {
                    ensure_dir(&config.output.results_dir)?;
                    config.output.results_dir.join("training_arrays")
                }
            };
            archive::write_archive(&set, &base, config.output.archive_format)?;
            Ok(())
        }
        Command::Inspect { arrays } => {
            let set: TrainingSet = archive::read_archive(&arrays, config.output.archive_format)?;
            println!(
                "table v{} | {} rows x {} descriptors",
                set.table_version,
                set.len(),
                set.width
            );
            for (name, count) in set.phases.iter().zip(set.phase_counts()) {
                println!("{}\t{}", name, count);
            }
            Ok(())
        }
        Command::Aggregate { predictions, descriptors, output } => {
            let registry = PhaseRegistry::load(&config.phases.registry)?;
            let descriptors = descriptors.unwrap_or_else(|| config.output.predict_dir.clone());
            let classifier = PrecomputedPredictions::new(predictions, registry.len());
            let results = aggregate_directory(&descriptors, &classifier)?;
            for r in &results {
                let parts: Vec<String> = registry
                    .names()
                    .iter()
                    .zip(&r.fractions)
                    .map(|(name, f)| format!("{}={:.3}", name, f))
                    .collect();
                info!("Timestep {}: {}", r.timestep, parts.join(" "));
            }
            let output = match output {
                Some(path) => path,
                None => {
                    ensure_dir(&config.output.results_dir)?;
                    config.output.results_dir.join("results.tsv")
                }
            };
            write_results(&output, &registry, &results)
        }
    }
}

/// Describes every timestep of `dump` into `out`, then writes the run
/// manifest. Fails if any timestep could not be described.
fn run_descriptors(config: &EngineConfig, dump: &Path, out: &Path, phase: Option<&str>) -> Result<()> {
    let start = Instant::now();
    let engine = DescriptorEngine::from_config(config)?;
    info!(
        "Descriptor table v{} ({} components), strategy {:?}",
        engine.params().table.version,
        engine.params().table.width(),
        engine.params().strategy
    );
    let summary = engine.run_dump(dump, out, phase)?;

    if config.output.write_manifest {
        write_manifest(config, &summary)?;
    }
    info!("Done in {:.3} seconds.", start.elapsed().as_secs_f64());

    if !summary.failed.is_empty() {
        let ids: Vec<String> = summary.failed.iter().map(|f| f.timestep.to_string()).collect();
        anyhow::bail!("{} timesteps failed: {}", summary.failed.len(), ids.join(", "));
    }
    Ok(())
}

fn write_manifest(config: &EngineConfig, summary: &RunSummary) -> Result<PathBuf> {
    let stem = summary
        .dump
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dump".to_string());
    let base = summary.output_dir.join(format!("manifest_{}", stem));
    archive::write_archive(&RunManifest { config, summary }, &base, config.output.archive_format)
}

fn ensure_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create directory '{}'", dir.display()))
}
