use std::f64::consts::SQRT_2;
use crate::geometry::Spherical;
use crate::special::spherical_harmonic;

/// Real spherical harmonic of a bond direction.
///
/// * `m < 0`: `(-1)^m sqrt(2) Im Y_l^{|m|}`
/// * `m = 0`: `Re Y_l^0`
/// * `m > 0`: `(-1)^m sqrt(2) Re Y_l^m`
#[inline]
pub fn real_harmonic_at(l: u32, m: i32, s: &Spherical) -> f64 {
    let y = spherical_harmonic(l, m.abs(), s.theta, s.phi);
    let sign = if m % 2 == 0 { 1.0 } else { -1.0 };
    match m {
        m if m < 0 => sign * SQRT_2 * y.im,
        0 => y.re,
        _ => sign * SQRT_2 * y.re,
    }
}

/// All `2l + 1` real harmonics of degree `l`, ordered `m = -l ..= l`.
pub fn real_harmonics_row(l: u32, s: &Spherical) -> Vec<f64> {
    let l_i = l as i32;
    (-l_i..=l_i).map(|m| real_harmonic_at(l, m, s)).collect()
}
