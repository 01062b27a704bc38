//! Radial symmetry functions over a neighbor shell.

use structure_common::{Cutoff, G2Params};
use crate::cutoff::smooth_cutoff;
use crate::neighbors::Neighbor;

/// `G2 = sum_B f_c(r) exp(-eta (r - r_s)^2)`.
pub fn g2(neighbors: &[Neighbor], cutoff: &Cutoff, params: &G2Params) -> f64 {
    neighbors
        .iter()
        .map(|n| {
            let dr = n.distance - params.r_s;
            smooth_cutoff(n.distance, cutoff) * (-params.eta * dr * dr).exp()
        })
        .sum()
}

/// `G3 = sum_B f_c(r) cos(kappa r)`.
pub fn g3(neighbors: &[Neighbor], cutoff: &Cutoff, kappa: f64) -> f64 {
    neighbors
        .iter()
        .map(|n| smooth_cutoff(n.distance, cutoff) * (kappa * n.distance).cos())
        .sum()
}
