use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info, trace, warn};
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};
use structure_common::{DescriptorFile, DescriptorParams, EngineConfig, NeighborStrategy, Timestep};

use crate::descriptors::{AtomDescriptors, DescriptorCalculator};
use crate::dump::DumpReader;
use crate::error::GeometryError;
use crate::neighbors::PbcMode;

/// Descriptors of one timestep, ready to be written.
#[derive(Debug)]
pub struct TimestepResult {
    pub file: DescriptorFile,
    pub mode: PbcMode,
    pub undefined_atoms: usize,
    /// Atoms whose evaluation took longer than the advisory budget.
    pub over_budget: u32,
    pub elapsed: Duration,
}

/// Bookkeeping of one written timestep.
#[derive(Debug, Clone, Serialize)]
pub struct TimestepSummary {
    pub timestep: u64,
    pub atoms: usize,
    pub undefined_atoms: usize,
    pub mode: PbcMode,
    pub file: PathBuf,
    pub elapsed_ms: f64,
}

/// A timestep that could not be described and was not written.
#[derive(Debug, Clone, Serialize)]
pub struct FailedTimestep {
    pub timestep: u64,
    pub reason: String,
}

/// Summary of one pass over a dump file.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub dump: PathBuf,
    pub output_dir: PathBuf,
    pub phase: Option<String>,
    pub table_version: u32,
    pub width: usize,
    pub strategy: NeighborStrategy,
    pub timesteps: Vec<TimestepSummary>,
    pub failed: Vec<FailedTimestep>,
    pub atoms_total: usize,
    pub undefined_atoms_total: usize,
    pub over_budget_atoms: u64,
    pub elapsed_secs: f64,
}

/// Run manifest: the configuration used plus what came out of it.
#[derive(Debug, Serialize)]
pub struct RunManifest<'a> {
    pub config: &'a EngineConfig,
    pub summary: &'a RunSummary,
}

/// Computes descriptor files from dump files.
pub struct DescriptorEngine {
    calculator: DescriptorCalculator,
    atom_budget: Option<Duration>,
}

impl DescriptorEngine {
    pub fn new(params: DescriptorParams, atom_budget: Option<Duration>) -> Result<Self> {
        let calculator = DescriptorCalculator::new(params).context("Invalid descriptor parameters")?;
        Ok(Self { calculator, atom_budget })
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        Self::new(config.descriptor_params(), config.run.atom_budget_ms.map(Duration::from_millis))
    }

    pub fn params(&self) -> &DescriptorParams {
        self.calculator.params()
    }

    /// Descriptors of every atom of one timestep, ordered by atom id.
    ///
    /// Atoms are evaluated in parallel against the shared, read-only snapshot.
    pub fn process_timestep(&self, timestep: &Timestep, phase: Option<&str>) -> Result<TimestepResult> {
        let start = Instant::now();
        let pool = self
            .calculator
            .neighbor_pool(timestep)
            .with_context(|| format!("Timestep {}: cannot prepare neighbors", timestep.id))?;

        let over_budget = AtomicU32::new(0);
        let mut atoms: Vec<AtomDescriptors> = (0..timestep.atoms.len())
            .into_par_iter()
            .map(|index| -> Result<AtomDescriptors, GeometryError> {
                let atom_start = Instant::now();
                let descriptors = self.calculator.compute(&pool, index)?;
                let took = atom_start.elapsed();
                if let Some(budget) = self.atom_budget {
                    if took > budget {
                        over_budget.fetch_add(1, Ordering::Relaxed);
                    }
                }
                trace!("Atom {} described in {:.3} ms", descriptors.atom_id, took.as_secs_f64() * 1000.0);
                Ok(descriptors)
            })
            .collect::<Result<Vec<_>, GeometryError>>()
            .with_context(|| format!("Timestep {}: geometry error", timestep.id))?;
        atoms.sort_by_key(|a| a.atom_id);

        let undefined_atoms = atoms.iter().filter(|a| !a.is_complete()).count();
        if undefined_atoms > 0 {
            warn!(
                "Timestep {}: {} of {} atoms have an empty Steinhardt shell; their order parameters are NaN.",
                timestep.id, undefined_atoms, atoms.len()
            );
        }
        let over_budget = over_budget.into_inner();
        if over_budget > 0 {
            warn!(
                "Timestep {}: {} atoms exceeded the per-atom budget of {:?}.",
                timestep.id, over_budget, self.atom_budget.unwrap_or_default()
            );
        }

        let file = DescriptorFile {
            timestep: timestep.id,
            table_version: Some(self.calculator.params().table.version),
            phase: phase.map(str::to_string),
            width: self.calculator.width(),
            rows: atoms.into_iter().map(AtomDescriptors::into_row).collect(),
        };
        Ok(TimestepResult { file, mode: pool.mode(), undefined_atoms, over_budget, elapsed: start.elapsed() })
    }

    /// Streams `dump`, writing one descriptor file per timestep into
    /// `out_dir`.
    ///
    /// A malformed dump aborts the run. A timestep that fails (box too small
    /// for the cutoff, coincident atoms) is reported, left unwritten and the
    /// run moves on.
    pub fn run_dump(&self, dump: &Path, out_dir: &Path, phase: Option<&str>) -> Result<RunSummary> {
        std::fs::create_dir_all(out_dir)
            .with_context(|| format!("Failed to create output directory '{}'", out_dir.display()))?;
        let reader = DumpReader::open(dump)
            .with_context(|| format!("Failed to open dump file '{}'", dump.display()))?;

        let start = Instant::now();
        let mut summary = RunSummary {
            dump: dump.to_path_buf(),
            output_dir: out_dir.to_path_buf(),
            phase: phase.map(str::to_string),
            table_version: self.params().table.version,
            width: self.calculator.width(),
            strategy: self.params().strategy,
            timesteps: Vec::new(),
            failed: Vec::new(),
            atoms_total: 0,
            undefined_atoms_total: 0,
            over_budget_atoms: 0,
            elapsed_secs: 0.0,
        };

        let progress = ProgressBar::new_spinner();
        progress.set_style(
            ProgressStyle::with_template("{spinner:.cyan} [{elapsed_precise}] {pos} timesteps {msg}")?,
        );

        for parsed in reader {
            let timestep = parsed.with_context(|| format!("Malformed dump file '{}'", dump.display()))?;
            progress.set_message(format!("timestep {} ({} atoms)", timestep.id, timestep.atom_count()));

            let result = match self.process_timestep(&timestep, phase) {
                Ok(r) => r,
                Err(e) => {
                    error!("{:#}", e);
                    summary.failed.push(FailedTimestep { timestep: timestep.id, reason: format!("{:#}", e) });
                    progress.inc(1);
                    continue;
                }
            };
            let path = result.file.save_in(out_dir)?;
            info!(
                "Timestep {} | Atoms: {} | Undefined: {} | {:?} | {:.2} ms",
                timestep.id,
                timestep.atom_count(),
                result.undefined_atoms,
                result.mode,
                result.elapsed.as_secs_f64() * 1000.0
            );
            debug!("Wrote {}", path.display());

            summary.atoms_total += timestep.atom_count();
            summary.undefined_atoms_total += result.undefined_atoms;
            summary.over_budget_atoms += result.over_budget as u64;
            summary.timesteps.push(TimestepSummary {
                timestep: timestep.id,
                atoms: timestep.atom_count(),
                undefined_atoms: result.undefined_atoms,
                mode: result.mode,
                file: path,
                elapsed_ms: result.elapsed.as_secs_f64() * 1000.0,
            });
            progress.inc(1);
        }
        progress.finish_and_clear();

        summary.elapsed_secs = start.elapsed().as_secs_f64();
        info!(
            "Processed {} timesteps ({} atoms) from '{}' in {:.3} s; {} failed.",
            summary.timesteps.len(),
            summary.atoms_total,
            dump.display(),
            summary.elapsed_secs,
            summary.failed.len()
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::io::Write;
    use structure_common::FileStatus;

    /// Simple cubic lattice of `n^3` atoms with spacing `a`, as dump text.
    fn cubic_dump(timestep: u64, n: usize, a: f64, extra: &[(u64, [f64; 3])]) -> String {
        let mut rows = Vec::new();
        let mut id = 1;
        for i in 0..n {
            for j in 0..n {
                for k in 0..n {
                    rows.push(format!("{} 1 {} {} {}", id, i as f64 * a, j as f64 * a, k as f64 * a));
                    id += 1;
                }
            }
        }
        for (id, p) in extra {
            rows.push(format!("{} 1 {} {} {}", id, p[0], p[1], p[2]));
        }
        let l = n as f64 * a;
        format!(
            "ITEM: TIMESTEP\n{}\nITEM: NUMBER OF ATOMS\n{}\nITEM: BOX BOUNDS pp pp pp\n0 {}\n0 {}\n0 {}\nITEM: ATOMS id type x y z\n{}\n",
            timestep,
            rows.len(),
            l, l, l,
            rows.join("\n")
        )
    }

    fn parse(text: &str) -> Timestep {
        DumpReader::new(text.as_bytes()).next().unwrap().unwrap()
    }

    #[test]
    fn simple_cubic_crystal_is_uniform() {
        let engine = DescriptorEngine::new(DescriptorParams::default(), None).unwrap();
        let ts = parse(&cubic_dump(10, 6, 3.0, &[]));
        let result = engine.process_timestep(&ts, Some("sc")).unwrap();
        assert_eq!(result.mode, PbcMode::MinimumImage);
        assert_eq!(result.undefined_atoms, 0);
        assert_eq!(result.file.rows.len(), 216);
        assert_eq!(result.file.phase.as_deref(), Some("sc"));

        let first = &result.file.rows[0].values;
        assert_abs_diff_eq!(first[11], 0.3536, epsilon = 1e-4);
        for row in &result.file.rows {
            for (a, b) in row.values.iter().zip(first) {
                assert_abs_diff_eq!(*a, *b, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn rows_are_ordered_by_atom_id() {
        let engine = DescriptorEngine::new(DescriptorParams::default(), None).unwrap();
        let text = cubic_dump(0, 5, 3.0, &[]);
        // reverse the atom rows
        let (head, body) = text.split_at(text.find("ITEM: ATOMS").unwrap());
        let mut lines: Vec<&str> = body.lines().collect();
        let header = lines.remove(0);
        lines.reverse();
        let reversed = format!("{}{}\n{}\n", head, header, lines.join("\n"));

        let result = engine.process_timestep(&parse(&reversed), None).unwrap();
        let ids: Vec<u64> = result.file.rows.iter().map(|r| r.atom_id).collect();
        assert_eq!(ids, (1..=125).collect::<Vec<u64>>());
    }

    #[test]
    fn coincident_atoms_fail_the_timestep() {
        let engine = DescriptorEngine::new(DescriptorParams::default(), None).unwrap();
        let ts = parse(&cubic_dump(0, 5, 3.0, &[(1000, [3.0, 3.0, 3.0])]));
        assert!(engine.process_timestep(&ts, None).is_err());
    }

    #[test]
    fn run_writes_files_and_skips_failed_timesteps() {
        let dir = tempfile::tempdir().unwrap();
        let dump_path = dir.path().join("run.dump");
        let mut dump = std::fs::File::create(&dump_path).unwrap();
        // second block: spacing 5 leaves every Steinhardt shell empty
        write!(dump, "{}", cubic_dump(0, 5, 3.0, &[])).unwrap();
        write!(dump, "{}", cubic_dump(100, 4, 5.0, &[])).unwrap();
        write!(dump, "{}", cubic_dump(200, 5, 3.0, &[(900, [0.0, 0.0, 0.0])])).unwrap();
        drop(dump);

        let out = dir.path().join("out");
        let engine = DescriptorEngine::new(DescriptorParams::default(), None).unwrap();
        let summary = engine.run_dump(&dump_path, &out, Some("sc")).unwrap();

        assert_eq!(summary.timesteps.len(), 2);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].timestep, 200);
        assert_eq!(summary.atoms_total, 125 + 64);
        assert_eq!(summary.undefined_atoms_total, 64);

        let complete = DescriptorFile::load(&out.join("timestep_0.txt")).unwrap();
        assert_eq!(complete.status(), FileStatus::Complete);
        assert_eq!(complete.phase.as_deref(), Some("sc"));

        let partial = DescriptorFile::load(&out.join("timestep_100.txt")).unwrap();
        assert_eq!(partial.status(), FileStatus::Partial { undefined_atoms: 64 });
        assert!(!out.join("timestep_200.txt").exists());
    }

    #[test]
    fn box_too_small_for_cutoff_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let dump_path = dir.path().join("shrink.dump");
        let mut dump = std::fs::File::create(&dump_path).unwrap();
        // middle block: 6 A box against the 6.4 A symmetry cutoff
        write!(dump, "{}", cubic_dump(0, 5, 3.0, &[])).unwrap();
        write!(dump, "{}", cubic_dump(300, 2, 3.0, &[])).unwrap();
        write!(dump, "{}", cubic_dump(400, 5, 3.0, &[])).unwrap();
        drop(dump);

        let out = dir.path().join("out");
        let engine = DescriptorEngine::new(DescriptorParams::default(), None).unwrap();
        let summary = engine.run_dump(&dump_path, &out, None).unwrap();

        let written: Vec<u64> = summary.timesteps.iter().map(|t| t.timestep).collect();
        assert_eq!(written, vec![0, 400]);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].timestep, 300);
        assert!(summary.failed[0].reason.contains("27-image replication is invalid"));
        assert!(!out.join("timestep_300.txt").exists());
        assert_eq!(DescriptorFile::load(&out.join("timestep_400.txt")).unwrap().table_version, Some(1));
    }
}
