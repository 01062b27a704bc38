use std::f64::consts::PI;
use structure_common::Cutoff;

/// Smooth cosine switching function.
///
/// 1 up to `r_min`, `0.5 + 0.5 cos(pi (r - r_min) / (r_max - r_min))` on
/// `(r_min, r_max]`, 0 beyond. Value and slope are continuous at both ends.
#[inline(always)]
pub fn smooth_cutoff(r: f64, cutoff: &Cutoff) -> f64 {
    if r <= cutoff.r_min {
        1.0
    } else if r <= cutoff.r_max {
        0.5 + 0.5 * (PI * (r - cutoff.r_min) / (cutoff.r_max - cutoff.r_min)).cos()
    } else {
        0.0
    }
}
