use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;
use structure_common::records::list_descriptor_files;
use structure_common::{DescriptorFile, PhaseRegistry};

/// Labelled descriptor matrix handed to the external trainer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSet {
    pub table_version: u32,
    pub width: usize,
    pub phases: Vec<String>,
    /// `[rows x width]` descriptors.
    pub inputs: Vec<Vec<f64>>,
    /// `[rows x phases]` one-hot labels.
    pub outputs: Vec<Vec<f64>>,
}

impl TrainingSet {
    /// Collects every descriptor file of `dir`. Each file must name its phase
    /// and, when it records one, the same table version; rows with undefined
    /// components are left out.
    pub fn from_directory(dir: &Path, registry: &PhaseRegistry, table_version: u32) -> Result<Self> {
        let files = list_descriptor_files(dir)?;
        if files.is_empty() {
            anyhow::bail!("No descriptor files in '{}'", dir.display());
        }

        let mut set = TrainingSet {
            table_version,
            width: 0,
            phases: registry.names().to_vec(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        };
        let mut skipped = 0usize;
        for (i, path) in files.iter().enumerate() {
            debug!("{}/{} ... processing file: {}", i + 1, files.len(), path.display());
            let file = DescriptorFile::load(path)?;
            let phase = file
                .phase
                .as_deref()
                .with_context(|| format!("'{}' has no '# phase' header", path.display()))?;
            let label = registry
                .one_hot(phase)
                .with_context(|| format!("'{}' cannot be labelled", path.display()))?;

            match file.table_version {
                Some(v) if v != table_version => anyhow::bail!(
                    "'{}' was computed with descriptor table v{}, the configuration has v{}",
                    path.display(), v, table_version
                ),
                Some(_) => {}
                None => warn!("'{}' does not record its table version; assuming v{}.", path.display(), table_version),
            }

            if set.width == 0 {
                set.width = file.width;
            } else if set.width != file.width {
                anyhow::bail!(
                    "'{}' has {} descriptors per atom, earlier files have {}",
                    path.display(), file.width, set.width
                );
            }

            for row in file.rows {
                if !row.is_complete() {
                    skipped += 1;
                    continue;
                }
                set.inputs.push(row.values);
                set.outputs.push(label.clone());
            }
        }
        if skipped > 0 {
            warn!("Left out {} atoms with undefined descriptors.", skipped);
        }
        info!(
            "Training set: {} rows x {} descriptors, {} phases, from {} files",
            set.len(), set.width, set.phases.len(), files.len()
        );
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Number of rows labelled with each phase, in registry order.
    pub fn phase_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.phases.len()];
        for label in &self.outputs {
            if let Some(i) = label.iter().position(|&v| v == 1.0) {
                counts[i] += 1;
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use structure_common::DescriptorRow;

    fn file(timestep: u64, phase: Option<&str>, rows: Vec<Vec<f64>>) -> DescriptorFile {
        DescriptorFile {
            timestep,
            table_version: Some(1),
            phase: phase.map(str::to_string),
            width: 3,
            rows: rows
                .into_iter()
                .enumerate()
                .map(|(i, values)| DescriptorRow { atom_id: i as u64 + 1, values })
                .collect(),
        }
    }

    #[test]
    fn labels_follow_file_phase() {
        let dir = tempfile::tempdir().unwrap();
        file(0, Some("bcc"), vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, f64::NAN]])
            .save_in(dir.path())
            .unwrap();
        file(10, Some("fcc"), vec![vec![7.0, 8.0, 9.0]]).save_in(dir.path()).unwrap();

        let registry = PhaseRegistry::parse("fcc\nbcc\nhcp\n").unwrap();
        let set = TrainingSet::from_directory(dir.path(), &registry, 1).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.width, 3);
        assert_eq!(set.inputs, vec![vec![1.0, 2.0, 3.0], vec![7.0, 8.0, 9.0]]);
        assert_eq!(set.outputs, vec![vec![0.0, 1.0, 0.0], vec![1.0, 0.0, 0.0]]);
        assert_eq!(set.phase_counts(), vec![1, 1, 0]);
    }

    #[test]
    fn unlabelled_or_unknown_phase_is_an_error() {
        let registry = PhaseRegistry::parse("fcc\n").unwrap();

        let dir = tempfile::tempdir().unwrap();
        file(0, None, vec![vec![1.0, 2.0, 3.0]]).save_in(dir.path()).unwrap();
        assert!(TrainingSet::from_directory(dir.path(), &registry, 1).is_err());

        let dir = tempfile::tempdir().unwrap();
        file(0, Some("liquid"), vec![vec![1.0, 2.0, 3.0]]).save_in(dir.path()).unwrap();
        assert!(TrainingSet::from_directory(dir.path(), &registry, 1).is_err());
    }

    #[test]
    fn files_from_another_table_version_are_rejected() {
        let registry = PhaseRegistry::parse("fcc\n").unwrap();
        let dir = tempfile::tempdir().unwrap();
        file(0, Some("fcc"), vec![vec![1.0, 2.0, 3.0]]).save_in(dir.path()).unwrap();

        let err = TrainingSet::from_directory(dir.path(), &registry, 2).unwrap_err();
        assert!(err.to_string().contains("table v1"));

        let mut unversioned = file(10, Some("fcc"), vec![vec![4.0, 5.0, 6.0]]);
        unversioned.table_version = None;
        unversioned.save_in(dir.path()).unwrap();
        let set = TrainingSet::from_directory(dir.path(), &registry, 1).unwrap();
        assert_eq!(set.len(), 2);
    }
}
