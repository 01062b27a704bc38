use anyhow::{Context, Result};
use std::path::Path;

/// Ordered list of crystal phases the classifier distinguishes.
/// The position of a phase is its column in label and prediction vectors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseRegistry {
    names: Vec<String>,
}

impl PhaseRegistry {
    /// Reads a registry file: one phase per line, `#` comments and blank
    /// lines skipped.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let text = std::fs::read_to_string(path_ref)
            .with_context(|| format!("Failed to read phase registry '{}'", path_ref.display()))?;
        Self::parse(&text)
            .with_context(|| format!("Invalid phase registry '{}'", path_ref.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut names: Vec<String> = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if line.split_whitespace().count() != 1 {
                anyhow::bail!("line {}: phase name must be a single word, got '{}'", idx + 1, line);
            }
            if names.iter().any(|n| n == line) {
                anyhow::bail!("line {}: phase '{}' listed twice", idx + 1, line);
            }
            names.push(line.to_string());
        }
        if names.is_empty() {
            anyhow::bail!("no phases listed");
        }
        Ok(Self { names })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn index_of(&self, phase: &str) -> Option<usize> {
        self.names.iter().position(|n| n == phase)
    }

    /// Label vector with a 1 at the position of `phase`.
    pub fn one_hot(&self, phase: &str) -> Result<Vec<f64>> {
        let idx = self.index_of(phase).with_context(|| {
            format!("'{}' is not a known phase (available: {})", phase, self.names.join(", "))
        })?;
        let mut v = vec![0.0; self.names.len()];
        v[idx] = 1.0;
        Ok(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let registry = PhaseRegistry::parse("# phases\nfcc\n\nbcc\n  hcp  \n# liquid\n").unwrap();
        assert_eq!(registry.names(), ["fcc", "bcc", "hcp"]);
        assert_eq!(registry.index_of("hcp"), Some(2));
        assert_eq!(registry.index_of("liquid"), None);
    }

    #[test]
    fn one_hot_marks_phase_column() {
        let registry = PhaseRegistry::parse("fcc\nbcc\n").unwrap();
        assert_eq!(registry.one_hot("bcc").unwrap(), vec![0.0, 1.0]);
        assert!(registry.one_hot("sc").is_err());
    }

    #[test]
    fn malformed_registries_are_rejected() {
        assert!(PhaseRegistry::parse("fcc bcc\n").is_err());
        assert!(PhaseRegistry::parse("fcc\nfcc\n").is_err());
        assert!(PhaseRegistry::parse("# nothing\n").is_err());
    }
}
