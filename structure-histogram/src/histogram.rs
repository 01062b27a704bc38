/// Fixed-width histogram over the finite values of one descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    pub lo: f64,
    pub hi: f64,
    pub counts: Vec<u64>,
    /// Values that were NaN or infinite and not binned.
    pub skipped: usize,
}

impl Histogram {
    /// Bins `values` into `bins` equal bins spanning their range. The last
    /// bin is closed on the right.
    pub fn from_values(values: &[f64], bins: usize) -> Option<Self> {
        let bins = bins.max(1);
        let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        let skipped = values.len() - finite.len();
        let lo = finite.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if finite.is_empty() {
            return None;
        }
        // a constant column still gets a visible bar
        let (lo, hi) = if hi > lo { (lo, hi) } else { (lo - 0.5, hi + 0.5) };

        let width = (hi - lo) / bins as f64;
        let mut counts = vec![0u64; bins];
        for v in finite {
            let idx = ((v - lo) / width).floor() as usize;
            counts[idx.min(bins - 1)] += 1;
        }
        Some(Self { lo, hi, counts, skipped })
    }

    pub fn bin_width(&self) -> f64 {
        (self.hi - self.lo) / self.counts.len() as f64
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Probability density of each bin; integrates to 1.
    pub fn density(&self) -> Vec<f64> {
        let norm = self.total() as f64 * self.bin_width();
        self.counts.iter().map(|&c| c as f64 / norm).collect()
    }

    /// `(left, right, density)` of every bin.
    pub fn bars(&self) -> Vec<(f64, f64, f64)> {
        let w = self.bin_width();
        self.density()
            .into_iter()
            .enumerate()
            .map(|(i, d)| (self.lo + i as f64 * w, self.lo + (i + 1) as f64 * w, d))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn values_land_in_expected_bins() {
        let h = Histogram::from_values(&[0.0, 0.1, 0.5, 0.99, 1.0], 2).unwrap();
        assert_eq!(h.counts, vec![2, 3]);
        assert_eq!(h.skipped, 0);
    }

    #[test]
    fn density_integrates_to_one() {
        let values: Vec<f64> = (0..1000).map(|i| (i as f64 * 0.37).sin()).collect();
        let h = Histogram::from_values(&values, 50).unwrap();
        let area: f64 = h.density().iter().map(|d| d * h.bin_width()).sum();
        assert_abs_diff_eq!(area, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn undefined_values_are_skipped() {
        let h = Histogram::from_values(&[f64::NAN, 2.0, 2.0], 10).unwrap();
        assert_eq!(h.skipped, 1);
        assert_eq!(h.total(), 2);
        assert!(h.lo < 2.0 && h.hi > 2.0);
        assert!(Histogram::from_values(&[f64::NAN], 10).is_none());
    }
}
