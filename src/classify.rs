//! Glue between descriptor files and the external phase classifier.
//!
//! The classifier maps a `[atoms x width]` descriptor matrix to a
//! `[atoms x phases]` table of probabilities. The global structure of a
//! timestep is the column mean of that table.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};
use structure_common::records::list_descriptor_files;
use structure_common::{DescriptorFile, PhaseRegistry};

/// Per-atom phase classifier.
pub trait Classifier {
    fn num_phases(&self) -> usize;

    /// One row of phase probabilities per input row.
    fn predict(&self, timestep: u64, inputs: &[Vec<f64>]) -> Result<Vec<Vec<f64>>>;
}

/// Predictions computed elsewhere and stored as `timestep_<id>.csv`, one
/// header row naming the phases, then one row per atom in descriptor file
/// order.
#[derive(Debug, Clone)]
pub struct PrecomputedPredictions {
    dir: PathBuf,
    num_phases: usize,
}

impl PrecomputedPredictions {
    pub fn new<P: Into<PathBuf>>(dir: P, num_phases: usize) -> Self {
        Self { dir: dir.into(), num_phases }
    }

    pub fn path_for(&self, timestep: u64) -> PathBuf {
        self.dir.join(format!("timestep_{}.csv", timestep))
    }
}

impl Classifier for PrecomputedPredictions {
    fn num_phases(&self) -> usize {
        self.num_phases
    }

    fn predict(&self, timestep: u64, inputs: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        let path = self.path_for(timestep);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(&path)
            .with_context(|| format!("Failed to open prediction table '{}'", path.display()))?;

        let mut rows = Vec::with_capacity(inputs.len());
        for (i, record) in reader.records().enumerate() {
            let record = record.with_context(|| format!("'{}': malformed row {}", path.display(), i + 1))?;
            let row = record
                .iter()
                .map(|f| f.parse::<f64>().with_context(|| format!("'{}': invalid probability '{}'", path.display(), f)))
                .collect::<Result<Vec<f64>>>()?;
            if row.len() != self.num_phases {
                anyhow::bail!(
                    "'{}': row {} has {} columns, expected {} phases",
                    path.display(), i + 1, row.len(), self.num_phases
                );
            }
            let total: f64 = row.iter().sum();
            if (total - 1.0).abs() > 1e-3 {
                debug!("'{}': row {} sums to {:.4}", path.display(), i + 1, total);
            }
            rows.push(row);
        }
        if rows.len() != inputs.len() {
            anyhow::bail!(
                "'{}' has {} prediction rows for {} atoms",
                path.display(), rows.len(), inputs.len()
            );
        }
        Ok(rows)
    }
}

/// Global structure vector `Q`: the mean of the per-atom probabilities of
/// each phase.
pub fn global_structure(predictions: &[Vec<f64>], num_phases: usize) -> Result<Vec<f64>> {
    if predictions.is_empty() {
        anyhow::bail!("cannot average an empty prediction table");
    }
    let mut sums = vec![0.0; num_phases];
    for (i, row) in predictions.iter().enumerate() {
        if row.len() != num_phases {
            anyhow::bail!("prediction row {} has {} columns, expected {}", i, row.len(), num_phases);
        }
        for (s, p) in sums.iter_mut().zip(row) {
            *s += p;
        }
    }
    let n = predictions.len() as f64;
    Ok(sums.into_iter().map(|s| s / n).collect())
}

/// Phase fractions of one timestep.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobalStructure {
    pub timestep: u64,
    pub fractions: Vec<f64>,
}

/// Classifies every descriptor file of `dir` and averages each timestep.
pub fn aggregate_directory<C: Classifier>(dir: &Path, classifier: &C) -> Result<Vec<GlobalStructure>> {
    let files = list_descriptor_files(dir)?;
    if files.is_empty() {
        anyhow::bail!("No descriptor files in '{}'", dir.display());
    }
    info!("Aggregating {} descriptor files from '{}'", files.len(), dir.display());

    let mut results = Vec::with_capacity(files.len());
    for path in &files {
        let file = DescriptorFile::load(path)?;
        if file.undefined_atoms() > 0 {
            warn!(
                "Timestep {}: {} atoms carry undefined descriptors; the classifier sees NaN for them.",
                file.timestep,
                file.undefined_atoms()
            );
        }
        let inputs = file.matrix();
        let predictions = classifier
            .predict(file.timestep, &inputs)
            .with_context(|| format!("Classification of timestep {} failed", file.timestep))?;
        let fractions = global_structure(&predictions, classifier.num_phases())?;
        debug!("Timestep {}: Q = {:?}", file.timestep, fractions);
        results.push(GlobalStructure { timestep: file.timestep, fractions });
    }
    results.sort_by_key(|r| r.timestep);
    Ok(results)
}

/// Writes the tab-separated results table: `timestep`, then one column per
/// phase in registry order.
pub fn write_results(path: &Path, registry: &PhaseRegistry, results: &[GlobalStructure]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path)
        .with_context(|| format!("Failed to create results table '{}'", path.display()))?;

    let mut header = vec!["timestep".to_string()];
    header.extend(registry.names().iter().cloned());
    writer.write_record(&header)?;
    for result in results {
        if result.fractions.len() != registry.len() {
            anyhow::bail!(
                "timestep {} has {} phase fractions, the registry lists {}",
                result.timestep, result.fractions.len(), registry.len()
            );
        }
        let mut record = vec![result.timestep.to_string()];
        record.extend(result.fractions.iter().map(|f| f.to_string()));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    info!("Results saved to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::fs;
    use structure_common::DescriptorRow;

    fn descriptor_file(timestep: u64, atoms: usize) -> DescriptorFile {
        DescriptorFile {
            timestep,
            table_version: Some(1),
            phase: None,
            width: 2,
            rows: (0..atoms)
                .map(|i| DescriptorRow { atom_id: i as u64 + 1, values: vec![i as f64, 0.5] })
                .collect(),
        }
    }

    #[test]
    fn global_structure_is_column_mean() {
        let predictions = vec![vec![1.0, 0.0, 0.0], vec![0.5, 0.5, 0.0], vec![0.0, 0.25, 0.75]];
        let q = global_structure(&predictions, 3).unwrap();
        assert_abs_diff_eq!(q[0], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(q[1], 0.25, epsilon = 1e-12);
        assert_abs_diff_eq!(q[2], 0.25, epsilon = 1e-12);
        assert_abs_diff_eq!(q.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn global_structure_rejects_ragged_tables() {
        assert!(global_structure(&[], 2).is_err());
        assert!(global_structure(&[vec![1.0, 0.0], vec![1.0]], 2).is_err());
    }

    #[test]
    fn directory_is_aggregated_into_results_table() {
        let dir = tempfile::tempdir().unwrap();
        let descriptors = dir.path().join("descriptors");
        let predictions = dir.path().join("predictions");
        fs::create_dir_all(&descriptors).unwrap();
        fs::create_dir_all(&predictions).unwrap();

        descriptor_file(500, 2).save_in(&descriptors).unwrap();
        descriptor_file(100, 4).save_in(&descriptors).unwrap();
        fs::write(predictions.join("timestep_500.csv"), "fcc,bcc\n1.0,0.0\n0.5,0.5\n").unwrap();
        fs::write(
            predictions.join("timestep_100.csv"),
            "fcc,bcc\n0.0,1.0\n0.0,1.0\n1.0,0.0\n0.0,1.0\n",
        )
        .unwrap();

        let registry = PhaseRegistry::parse("fcc\nbcc\n").unwrap();
        let classifier = PrecomputedPredictions::new(&predictions, registry.len());
        let results = aggregate_directory(&descriptors, &classifier).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].timestep, 100);
        assert_abs_diff_eq!(results[0].fractions[0], 0.25, epsilon = 1e-12);
        assert_abs_diff_eq!(results[1].fractions[0], 0.75, epsilon = 1e-12);

        let table = dir.path().join("results.tsv");
        write_results(&table, &registry, &results).unwrap();
        let text = fs::read_to_string(&table).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "timestep\tfcc\tbcc");
        assert_eq!(lines[1], "100\t0.25\t0.75");
        assert_eq!(lines[2], "500\t0.75\t0.25");
    }

    #[test]
    fn prediction_row_count_must_match() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("timestep_1.csv"), "fcc,bcc\n0.5,0.5\n").unwrap();
        let classifier = PrecomputedPredictions::new(dir.path(), 2);
        let inputs = vec![vec![0.0; 14]; 3];
        assert!(classifier.predict(1, &inputs).is_err());
        assert_eq!(classifier.predict(1, &inputs[..1]).unwrap(), vec![vec![0.5, 0.5]]);
    }
}
