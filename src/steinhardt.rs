//! Steinhardt bond-orientational order parameters.

use std::f64::consts::PI;
use structure_common::Cutoff;
use crate::cutoff::smooth_cutoff;
use crate::error::DescriptorError;
use crate::geometry::to_spherical;
use crate::harmonics::real_harmonics_row;
use crate::neighbors::Neighbor;

/// Cutoff-weighted average of the real harmonics over a neighbor shell,
/// `Q_lm` for `m = -l ..= l`.
pub fn bond_orientation_average(
    neighbors: &[Neighbor],
    cutoff: &Cutoff,
    l: u32,
) -> Result<Vec<f64>, DescriptorError> {
    let width = 2 * l as usize + 1;
    let mut sums = vec![0.0; width];
    let mut weight = 0.0;
    for n in neighbors {
        let w = smooth_cutoff(n.distance, cutoff);
        if w == 0.0 {
            continue;
        }
        let s = to_spherical(n.displacement)?;
        for (slot, y) in sums.iter_mut().zip(real_harmonics_row(l, &s)) {
            *slot += w * y;
        }
        weight += w;
    }
    if weight == 0.0 {
        return Err(DescriptorError::EmptyNeighborhood { l });
    }
    for q in &mut sums {
        *q /= weight;
    }
    Ok(sums)
}

/// `q_l = sqrt(4 pi / (2l + 1) sum_m Q_lm^2)`.
pub fn bond_order_parameter(neighbors: &[Neighbor], cutoff: &Cutoff, l: u32) -> Result<f64, DescriptorError> {
    let q_lm = bond_orientation_average(neighbors, cutoff, l)?;
    let norm: f64 = q_lm.iter().map(|q| q * q).sum();
    Ok((4.0 * PI / (2 * l + 1) as f64 * norm).sqrt())
}
