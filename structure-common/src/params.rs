use serde::{Deserialize, Serialize};

/// Radial cutoff pair of the smooth switching function: weight 1 up to
/// `r_min`, decaying to 0 at `r_max`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cutoff {
    pub r_min: f64,
    pub r_max: f64,
}

impl Cutoff {
    pub const fn new(r_min: f64, r_max: f64) -> Self {
        Self { r_min, r_max }
    }

    /// `0 <= r_min < r_max`, both finite.
    pub fn is_valid(&self) -> bool {
        self.r_min.is_finite() && self.r_max.is_finite() && 0.0 <= self.r_min && self.r_min < self.r_max
    }
}

/// Cutoff of the radial symmetry functions (G2, G3).
pub const SYMMETRY_CUTOFF: Cutoff = Cutoff::new(6.2, 6.4);
/// Cutoff of the Steinhardt bond-order parameters.
pub const STEINHARDT_CUTOFF: Cutoff = Cutoff::new(3.8, 4.0);

/// One radial G2 term: a Gaussian shell at `r_s` (Angstrom) with width `eta`
/// (Angstrom^-2).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct G2Params {
    pub r_s: f64,
    pub eta: f64,
}

/// Fixed parameter table of the descriptor vector.
///
/// The order of the entries is the order of the descriptor components, which
/// is what a trained classifier was fitted against. Any change to the table
/// must bump `version`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptorTable {
    pub version: u32,
    pub g2: Vec<G2Params>,
    /// Spatial frequencies of the G3 terms (Angstrom^-1).
    pub g3_kappa: Vec<f64>,
    /// Degrees `l` of the Steinhardt parameters.
    pub steinhardt_l: Vec<u32>,
}

pub const STANDARD_TABLE_VERSION: u32 = 1;
/// Width of the standard table: 8 G2 + 3 G3 + 3 Steinhardt.
pub const STANDARD_WIDTH: usize = 14;

impl DescriptorTable {
    /// The 14-component table used by the structure classifier.
    pub fn standard() -> Self {
        let g2 = [2.8, 3.2, 4.4, 4.8, 5.0, 5.3, 5.7, 6.0]
            .iter()
            .map(|&r_s| G2Params { r_s, eta: 20.0 })
            .collect();
        Self {
            version: STANDARD_TABLE_VERSION,
            g2,
            g3_kappa: vec![3.5, 4.5, 7.0],
            steinhardt_l: vec![6, 7, 8],
        }
    }

    /// Number of components of the descriptor vector.
    pub fn width(&self) -> usize {
        self.g2.len() + self.g3_kappa.len() + self.steinhardt_l.len()
    }

    /// Column names `f1 .. fN` used in descriptor file headers.
    pub fn column_names(&self) -> Vec<String> {
        (1..=self.width()).map(|i| format!("f{}", i)).collect()
    }

    /// Human-readable label of each component, e.g. `G2(r_s=2.8, eta=20)`.
    pub fn labels(&self) -> Vec<String> {
        let g2 = self.g2.iter().map(|p| format!("G2(r_s={}, eta={})", p.r_s, p.eta));
        let g3 = self.g3_kappa.iter().map(|k| format!("G3(kappa={})", k));
        let q = self.steinhardt_l.iter().map(|l| format!("q{}", l));
        g2.chain(g3).chain(q).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0
    }
}

impl Default for DescriptorTable {
    fn default() -> Self {
        Self::standard()
    }
}

/// How periodic images are found.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NeighborStrategy {
    /// Minimum-image correction per pair. Needs `r_max < box / 2`.
    MinimumImage,
    /// Explicit 27-image replication. Needs `r_max < box`.
    Replicated,
    /// Minimum image when valid, replication otherwise.
    Auto,
}

impl Default for NeighborStrategy {
    fn default() -> Self {
        NeighborStrategy::Auto
    }
}

/// Runtime parameters of the descriptor calculator, derived from the
/// configuration once and then shared read-only by all workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescriptorParams {
    pub symmetry_cutoff: Cutoff,
    pub steinhardt_cutoff: Cutoff,
    pub table: DescriptorTable,
    pub strategy: NeighborStrategy,
    /// Bin atoms into a periodic cell list for minimum-image searches.
    pub use_cell_list: bool,
}

impl DescriptorParams {
    /// Largest `r_max` of both regimes; the neighbor search radius.
    pub fn search_radius(&self) -> f64 {
        self.symmetry_cutoff.r_max.max(self.steinhardt_cutoff.r_max)
    }
}

impl Default for DescriptorParams {
    fn default() -> Self {
        Self {
            symmetry_cutoff: SYMMETRY_CUTOFF,
            steinhardt_cutoff: STEINHARDT_CUTOFF,
            table: DescriptorTable::standard(),
            strategy: NeighborStrategy::Auto,
            use_cell_list: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_table_has_fourteen_components() {
        let table = DescriptorTable::standard();
        assert_eq!(table.width(), STANDARD_WIDTH);
        assert_eq!(table.g2.len(), 8);
        assert!(table.g2.iter().all(|p| p.eta == 20.0));
        assert_eq!(table.column_names().first().map(String::as_str), Some("f1"));
        assert_eq!(table.column_names().last().map(String::as_str), Some("f14"));
    }

    #[test]
    fn labels_follow_component_order() {
        let labels = DescriptorTable::standard().labels();
        assert_eq!(labels.len(), STANDARD_WIDTH);
        assert_eq!(labels[0], "G2(r_s=2.8, eta=20)");
        assert_eq!(labels[8], "G3(kappa=3.5)");
        assert_eq!(labels[13], "q8");
    }

    #[test]
    fn search_radius_covers_both_regimes() {
        let params = DescriptorParams::default();
        assert_eq!(params.search_radius(), 6.4);
    }

    #[test]
    fn inverted_cutoff_is_invalid() {
        assert!(Cutoff::new(1.0, 1.5).is_valid());
        assert!(!Cutoff::new(1.5, 1.0).is_valid());
        assert!(!Cutoff::new(1.0, 1.0).is_valid());
        assert!(!Cutoff::new(-1.0, 1.0).is_valid());
    }
}
