use serde::{Deserialize, Serialize};
use anyhow::Result;
use crate::params::{Cutoff, DescriptorParams, DescriptorTable, NeighborStrategy, STEINHARDT_CUTOFF, SYMMETRY_CUTOFF};
use std::path::{Path, PathBuf};

// Cutoff radii of both descriptor families
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct CutoffConfig {
    #[serde(default = "default_symmetry_cutoff")]
    pub symmetry: Cutoff,
    #[serde(default = "default_steinhardt_cutoff")]
    pub steinhardt: Cutoff,
}

fn default_symmetry_cutoff() -> Cutoff {
    SYMMETRY_CUTOFF
}

fn default_steinhardt_cutoff() -> Cutoff {
    STEINHARDT_CUTOFF
}

impl Default for CutoffConfig {
    fn default() -> Self {
        CutoffConfig {
            symmetry: default_symmetry_cutoff(),
            steinhardt: default_steinhardt_cutoff(),
        }
    }
}

// Periodic image handling
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct NeighborConfig {
    #[serde(default)]
    pub strategy: NeighborStrategy,
    #[serde(default = "default_cell_list")]
    pub cell_list: bool,
}

fn default_cell_list() -> bool {
    true
}

impl Default for NeighborConfig {
    fn default() -> Self {
        NeighborConfig {
            strategy: NeighborStrategy::Auto,
            cell_list: default_cell_list(),
        }
    }
}

// Worker pool settings
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct RunConfig {
    /// Number of rayon worker threads (None = rayon default).
    #[serde(default)]
    pub threads: Option<usize>,
    /// Advisory wall-clock budget per atom, in milliseconds.
    #[serde(default)]
    pub atom_budget_ms: Option<u64>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFormat {
    Json,
    Bincode,
    MessagePack,
}

impl ArchiveFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ArchiveFormat::Json => "json",
            ArchiveFormat::Bincode => "bin",
            ArchiveFormat::MessagePack => "msgpack",
        }
    }
}

// Output locations and formats
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct OutputConfig {
    /// Descriptor files labelled with a phase, for training.
    #[serde(default = "default_train_dir")]
    pub train_dir: PathBuf,
    /// Unlabelled descriptor files, for prediction.
    #[serde(default = "default_predict_dir")]
    pub predict_dir: PathBuf,
    /// Results tables and training arrays.
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
    #[serde(default = "default_archive_format")]
    pub archive_format: ArchiveFormat,
    #[serde(default = "default_write_manifest")]
    pub write_manifest: bool,
}

fn default_train_dir() -> PathBuf {
    PathBuf::from("dir_to_train")
}

fn default_predict_dir() -> PathBuf {
    PathBuf::from("dir_to_predict")
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}

fn default_archive_format() -> ArchiveFormat {
    ArchiveFormat::Json
}

fn default_write_manifest() -> bool {
    true
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            train_dir: default_train_dir(),
            predict_dir: default_predict_dir(),
            results_dir: default_results_dir(),
            archive_format: default_archive_format(),
            write_manifest: default_write_manifest(),
        }
    }
}

// Phase registry location
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct PhaseConfig {
    #[serde(default = "default_registry")]
    pub registry: PathBuf,
}

fn default_registry() -> PathBuf {
    PathBuf::from("phases.txt")
}

impl Default for PhaseConfig {
    fn default() -> Self {
        PhaseConfig { registry: default_registry() }
    }
}

// Main engine configuration structure, loaded from a TOML file.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub cutoffs: CutoffConfig,
    #[serde(default)]
    pub descriptors: DescriptorTable,
    #[serde(default)]
    pub neighbors: NeighborConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub phases: PhaseConfig,
}

impl EngineConfig {
    /// Loads the engine configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let config_str = std::fs::read_to_string(path_ref)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path_ref.display(), e))?;
        let config = Self::from_toml_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Invalid config '{}': {}", path_ref.display(), e))?;
        Ok(config)
    }

    /// Like `load`, but a missing file yields the default configuration.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        if path_ref.exists() {
            Self::load(path_ref)
        } else {
            log::warn!("Config file '{}' not found, using defaults.", path_ref.display());
            Ok(Self::default())
        }
    }

    /// Parses and validates a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(text)
            .map_err(|e| anyhow::anyhow!("Failed to parse TOML: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the values that do not depend on a particular snapshot.
    /// Cutoff-versus-box checks happen per timestep.
    pub fn validate(&self) -> Result<()> {
        for (name, cutoff) in [("symmetry", &self.cutoffs.symmetry), ("steinhardt", &self.cutoffs.steinhardt)] {
            if !cutoff.is_valid() {
                anyhow::bail!(
                    "cutoffs.{} must satisfy 0 <= r_min < r_max (got r_min={}, r_max={}).",
                    name, cutoff.r_min, cutoff.r_max
                );
            }
        }
        if self.descriptors.is_empty() {
            anyhow::bail!("descriptors table must contain at least one function.");
        }
        if self.descriptors.g2.iter().any(|p| !(p.eta > 0.0) || !p.r_s.is_finite()) {
            anyhow::bail!("descriptors.g2 entries need a finite r_s and a positive eta.");
        }
        if self.descriptors.g3_kappa.iter().any(|k| !k.is_finite()) {
            anyhow::bail!("descriptors.g3_kappa entries must be finite.");
        }
        if self.descriptors.steinhardt_l.iter().any(|&l| l == 0) {
            anyhow::bail!("descriptors.steinhardt_l entries must be positive.");
        }
        if self.run.threads == Some(0) {
            anyhow::bail!("run.threads must be greater than 0.");
        }
        Ok(())
    }

    /// Converts the configuration into the parameters used by the calculator.
    pub fn descriptor_params(&self) -> DescriptorParams {
        DescriptorParams {
            symmetry_cutoff: self.cutoffs.symmetry,
            steinhardt_cutoff: self.cutoffs.steinhardt,
            table: self.descriptors.clone(),
            strategy: self.neighbors.strategy,
            use_cell_list: self.neighbors.cell_list,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::STANDARD_WIDTH;

    #[test]
    fn empty_file_gives_standard_setup() {
        let config = EngineConfig::from_toml_str("").unwrap();
        let params = config.descriptor_params();
        assert_eq!(params.symmetry_cutoff, SYMMETRY_CUTOFF);
        assert_eq!(params.steinhardt_cutoff, STEINHARDT_CUTOFF);
        assert_eq!(params.table.width(), STANDARD_WIDTH);
        assert_eq!(params.strategy, NeighborStrategy::Auto);
        assert_eq!(config.output.archive_format, ArchiveFormat::Json);
    }

    #[test]
    fn sections_override_defaults() {
        let text = r#"
            [cutoffs.steinhardt]
            r_min = 3.0
            r_max = 3.3

            [neighbors]
            strategy = "replicated"
            cell_list = false

            [run]
            threads = 4
            atom_budget_ms = 50

            [output]
            archive_format = "messagepack"
        "#;
        let config = EngineConfig::from_toml_str(text).unwrap();
        assert_eq!(config.cutoffs.steinhardt, Cutoff::new(3.0, 3.3));
        assert_eq!(config.cutoffs.symmetry, SYMMETRY_CUTOFF);
        assert_eq!(config.neighbors.strategy, NeighborStrategy::Replicated);
        assert!(!config.neighbors.cell_list);
        assert_eq!(config.run.threads, Some(4));
        assert_eq!(config.run.atom_budget_ms, Some(50));
        assert_eq!(config.output.archive_format, ArchiveFormat::MessagePack);
    }

    #[test]
    fn custom_table_is_read_in_order() {
        let text = r#"
            [descriptors]
            version = 2
            g2 = [{ r_s = 1.0, eta = 4.0 }]
            g3_kappa = [2.0]
            steinhardt_l = [4, 6]
        "#;
        let config = EngineConfig::from_toml_str(text).unwrap();
        assert_eq!(config.descriptors.version, 2);
        assert_eq!(config.descriptors.width(), 4);
        assert_eq!(config.descriptors.steinhardt_l, vec![4, 6]);
    }

    #[test]
    fn inverted_cutoff_is_rejected() {
        let text = r#"
            [cutoffs.symmetry]
            r_min = 6.4
            r_max = 6.2
        "#;
        let err = EngineConfig::from_toml_str(text).unwrap_err();
        assert!(err.to_string().contains("cutoffs.symmetry"));
    }

    #[test]
    fn zero_threads_is_rejected() {
        assert!(EngineConfig::from_toml_str("[run]\nthreads = 0\n").is_err());
    }

    #[test]
    fn load_or_default_tolerates_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = EngineConfig::load_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.descriptors, DescriptorTable::standard());
    }
}
