//! Per-timestep descriptor files.
//!
//! ```text
//! # timestep 500
//! # table v1
//! # phase fcc
//! # id f1 f2 ... f14
//! 1 0.0123 ... 0.5745
//! # status complete
//! ```
//!
//! The `# table` line names the descriptor table version the values were
//! computed with. The `# phase` line is only present in training files. Undefined components
//! are written as `NaN`; the `# status` footer says whether any atom carries
//! one.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use crate::snapshot::AtomId;

/// Descriptor vector of one atom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptorRow {
    pub atom_id: AtomId,
    pub values: Vec<f64>,
}

impl DescriptorRow {
    /// No component is undefined.
    pub fn is_complete(&self) -> bool {
        self.values.iter().all(|v| !v.is_nan())
    }
}

/// Completion marker written after the rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileStatus {
    Complete,
    Partial { undefined_atoms: usize },
}

/// Contents of one descriptor file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptorFile {
    pub timestep: u64,
    /// Descriptor table version; `None` for files without a `# table` line.
    pub table_version: Option<u32>,
    pub phase: Option<String>,
    pub width: usize,
    pub rows: Vec<DescriptorRow>,
}

impl DescriptorFile {
    pub fn undefined_atoms(&self) -> usize {
        self.rows.iter().filter(|r| !r.is_complete()).count()
    }

    pub fn status(&self) -> FileStatus {
        match self.undefined_atoms() {
            0 => FileStatus::Complete,
            n => FileStatus::Partial { undefined_atoms: n },
        }
    }

    /// Descriptor matrix `[rows x width]` in file order.
    pub fn matrix(&self) -> Vec<Vec<f64>> {
        self.rows.iter().map(|r| r.values.clone()).collect()
    }

    pub fn write_to<W: Write>(&self, mut out: W) -> Result<()> {
        writeln!(out, "# timestep {}", self.timestep)?;
        if let Some(version) = self.table_version {
            writeln!(out, "# table v{}", version)?;
        }
        if let Some(phase) = &self.phase {
            writeln!(out, "# phase {}", phase)?;
        }
        write!(out, "# id")?;
        for i in 1..=self.width {
            write!(out, " f{}", i)?;
        }
        writeln!(out)?;

        for row in &self.rows {
            if row.values.len() != self.width {
                anyhow::bail!(
                    "atom {} has {} descriptors, file width is {}",
                    row.atom_id, row.values.len(), self.width
                );
            }
            write!(out, "{}", row.atom_id)?;
            for v in &row.values {
                write!(out, " {}", v)?;
            }
            writeln!(out)?;
        }

        match self.status() {
            FileStatus::Complete => writeln!(out, "# status complete")?,
            FileStatus::Partial { undefined_atoms } => {
                writeln!(out, "# status partial undefined_atoms={}", undefined_atoms)?
            }
        }
        out.flush()?;
        Ok(())
    }

    /// Writes `timestep_<id>.txt` into `dir` and returns its path.
    pub fn save_in(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(file_name(self.timestep));
        let file = File::create(&path)
            .with_context(|| format!("Failed to create descriptor file '{}'", path.display()))?;
        self.write_to(BufWriter::new(file))
            .with_context(|| format!("Failed to write descriptor file '{}'", path.display()))?;
        Ok(path)
    }

    pub fn read_from<R: BufRead>(input: R) -> Result<(Self, Option<FileStatus>)> {
        let mut timestep = None;
        let mut table_version = None;
        let mut phase = None;
        let mut width = None;
        let mut status = None;
        let mut rows = Vec::new();

        for (line_idx, line) in input.lines().enumerate() {
            let line = line?;
            let line_no = line_idx + 1;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            if let Some(comment) = trimmed.strip_prefix('#') {
                let mut words = comment.split_whitespace();
                match words.next() {
                    Some("timestep") => {
                        let value = words.next().context("'# timestep' without a value")?;
                        timestep = Some(value.parse::<u64>()
                            .with_context(|| format!("line {}: invalid timestep '{}'", line_no, value))?);
                    }
                    Some("table") => {
                        let value = words.next().context("'# table' without a version")?;
                        let version = value
                            .strip_prefix('v')
                            .and_then(|v| v.parse::<u32>().ok())
                            .with_context(|| format!("line {}: invalid table version '{}'", line_no, value))?;
                        table_version = Some(version);
                    }
                    Some("phase") => {
                        phase = words.next().map(str::to_string);
                    }
                    Some("id") => {
                        width = Some(words.count());
                    }
                    Some("status") => {
                        status = Some(parse_status(words.next(), words.next())
                            .with_context(|| format!("line {}: malformed status footer", line_no))?);
                    }
                    _ => {}
                }
                continue;
            }

            let width = width.with_context(|| format!("line {}: row before the '# id' header", line_no))?;
            let mut fields = trimmed.split_whitespace();
            let id_field = fields.next().unwrap_or_default();
            let atom_id = id_field.parse::<AtomId>()
                .with_context(|| format!("line {}: invalid atom id '{}'", line_no, id_field))?;
            let values = fields
                .map(|f| f.parse::<f64>().with_context(|| format!("line {}: invalid value '{}'", line_no, f)))
                .collect::<Result<Vec<_>>>()?;
            if values.len() != width {
                anyhow::bail!("line {}: expected {} descriptors, found {}", line_no, width, values.len());
            }
            rows.push(DescriptorRow { atom_id, values });
        }

        let file = DescriptorFile {
            timestep: timestep.context("missing '# timestep' header")?,
            table_version,
            phase,
            width: width.context("missing '# id' header")?,
            rows,
        };
        Ok((file, status))
    }

    /// Reads a descriptor file written by `save_in`.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open descriptor file '{}'", path.display()))?;
        let (parsed, status) = Self::read_from(BufReader::new(file))
            .with_context(|| format!("Failed to parse descriptor file '{}'", path.display()))?;
        match status {
            Some(s) if s != parsed.status() => {
                log::warn!(
                    "'{}': status footer {:?} does not match its rows ({:?}).",
                    path.display(), s, parsed.status()
                );
            }
            None => log::warn!("'{}' has no status footer; it may be truncated.", path.display()),
            _ => {}
        }
        Ok(parsed)
    }
}

fn parse_status(kind: Option<&str>, detail: Option<&str>) -> Result<FileStatus> {
    match kind {
        Some("complete") => Ok(FileStatus::Complete),
        Some("partial") => {
            let count = detail
                .and_then(|d| d.strip_prefix("undefined_atoms="))
                .context("expected undefined_atoms=<n>")?;
            Ok(FileStatus::Partial { undefined_atoms: count.parse()? })
        }
        other => anyhow::bail!("unknown status {:?}", other),
    }
}

/// File name of the descriptor file of a timestep.
pub fn file_name(timestep: u64) -> String {
    format!("timestep_{}.txt", timestep)
}

/// Descriptor files (`*.txt`) of a directory, sorted by name.
pub fn list_descriptor_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory '{}'", dir.display()))?
    {
        let path = entry?.path();
        if path.is_file() && path.extension().map_or(false, |e| e == "txt") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
