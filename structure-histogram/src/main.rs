use anyhow::{Context, Result};
use clap::Parser;
use dashmap::DashMap;
use env_logger::Builder;
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use log::{debug, info, warn, LevelFilter};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;
use structure_common::records::list_descriptor_files;
use structure_common::{AtomId, DescriptorFile, DescriptorTable, EngineConfig};

mod histogram;
mod plot;

use histogram::Histogram;

/// Command-line arguments for the histogram tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory of descriptor files (`timestep_<id>.txt`)
    input: PathBuf,

    /// Output directory for the PNG histograms
    #[arg(short, long, default_value = "plots")]
    output: PathBuf,

    /// Number of bins per histogram
    #[arg(long, default_value_t = 100)]
    bins: usize,

    /// Mark the perfect-crystal value of this phase (bcc or fcc)
    #[arg(long)]
    phase: Option<String>,

    /// Only use the rows of this atom
    #[arg(long)]
    atom: Option<AtomId>,

    /// Engine configuration, for the descriptor labels of a custom table
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Descriptors of perfect molybdenum crystals under the standard table.
const PERFECT_VALUES: &[(&str, [f64; 14])] = &[
    (
        "bcc",
        [7.73, 5.80, 11.30, 1.77, 8.96, 26.29, 2.70, 0.51, 5.35, 14.22, 33.66, 0.51, 1.08e-05, 0.43],
    ),
    (
        "fcc",
        [9.31, 2.30, 1.25, 7.22, 23.05, 6.59, 8.76, 6.53, -1.03, 3.45, -34.12, 0.57, 3.57e-06, 0.40],
    ),
];

fn reference_values(phase: &str, table: &DescriptorTable) -> Option<&'static [f64; 14]> {
    if *table != DescriptorTable::standard() {
        warn!("Reference values only exist for the standard descriptor table.");
        return None;
    }
    let found = PERFECT_VALUES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(phase))
        .map(|(_, values)| values);
    if found.is_none() {
        warn!("No reference values for phase '{}'.", phase);
    }
    found
}

/// Reads `files` in parallel into column index -> every value of that
/// descriptor, keeping only the rows of `atom` when given.
fn load_columns(
    files: &[PathBuf],
    width: usize,
    atom: Option<AtomId>,
    progress: &ProgressBar,
) -> Result<DashMap<usize, Vec<f64>>> {
    let columns: DashMap<usize, Vec<f64>> = DashMap::new();
    files
        .par_iter()
        .progress_with(progress.clone())
        .try_for_each(|path| -> Result<()> {
            let file = DescriptorFile::load(path)?;
            check_width(path, file.width, width)?;
            for row in file.rows.iter().filter(|r| atom.map_or(true, |id| r.atom_id == id)) {
                for (i, v) in row.values.iter().enumerate() {
                    columns.entry(i).or_default().push(*v);
                }
            }
            debug!("Loaded {}", path.display());
            Ok(())
        })?;
    Ok(columns)
}

fn check_width(path: &Path, found: usize, expected: usize) -> Result<()> {
    if found != expected {
        anyhow::bail!(
            "'{}' has {} descriptors per atom, the table has {}",
            path.display(), found, expected
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    Builder::from_default_env()
        .filter(None, LevelFilter::Info)
        .init();

    info!("Starting Descriptor Histogram...");
    info!("Input directory: {}", args.input.display());
    info!("Output directory: {}", args.output.display());

    let table = match &args.config {
        Some(path) => EngineConfig::load(path)?.descriptors,
        None => DescriptorTable::standard(),
    };
    let labels = table.labels();
    let reference = args.phase.as_deref().and_then(|p| reference_values(p, &table));

    let files = list_descriptor_files(&args.input)?;
    if files.is_empty() {
        warn!("No descriptor files in '{}'. Exiting.", args.input.display());
        return Ok(());
    }
    info!("Found {} descriptor files", files.len());

    let start_time = Instant::now();
    let progress_bar = ProgressBar::new(files.len() as u64);
    progress_bar.set_style(
        ProgressStyle::with_template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files ({percent}%) [{eta}]")?
            .progress_chars("#>-"),
    );

    let columns = load_columns(&files, table.width(), args.atom, &progress_bar)?;
    progress_bar.finish_and_clear();
    info!("Loaded descriptors in {:.2} s", start_time.elapsed().as_secs_f64());

    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("Failed to create output directory '{}'", args.output.display()))?;

    let scope = match args.atom {
        Some(id) => format!("atom #{}", id),
        None => "all atoms".to_string(),
    };
    (0..table.width()).into_par_iter().try_for_each(|i| -> Result<()> {
        let values = columns.get(&i).map(|v| v.value().clone()).unwrap_or_default();
        let histogram = match Histogram::from_values(&values, args.bins) {
            Some(h) => h,
            None => {
                warn!("{}: no finite values, skipping.", labels[i]);
                return Ok(());
            }
        };
        if histogram.skipped > 0 {
            info!("{}: {} undefined values left out", labels[i], histogram.skipped);
        }
        let path = args.output.join(format!("histogram-f{}.png", i + 1));
        let title = match &args.phase {
            Some(phase) => format!("{} for {} ({})", labels[i], phase, scope),
            None => format!("{} ({})", labels[i], scope),
        };
        plot::render_histogram(&path, &histogram, &title, &labels[i], reference.map(|r| r[i]))
            .with_context(|| format!("Failed to render '{}'", path.display()))?;
        info!("Saved {}", path.display());
        Ok(())
    })?;

    info!("Histograms finished in {:.2} s.", start_time.elapsed().as_secs_f64());
    Ok(())
}
