//! Complex spherical harmonics.
//!
//! `Y_l^m(theta, phi) = N_l^m P_l^m(cos theta) e^{i m phi}` with orthonormal
//! normalisation and the Condon-Shortley phase, i.e. the convention of
//! `scipy.special.sph_harm` and `boost::math::spherical_harmonic`.

use num_complex::Complex64;
use std::f64::consts::PI;

/// Normalised associated Legendre function `N_l^m P_l^m(x)` for
/// `0 <= m <= l`, `|x| <= 1`, by upward recurrence in `l`.
pub fn normalized_legendre(l: u32, m: u32, x: f64) -> f64 {
    debug_assert!(m <= l);
    let (l, m) = (l as f64, m as f64);

    // P_m^m
    let mut pmm = 1.0;
    if m > 0.0 {
        let omx2 = (1.0 - x) * (1.0 + x);
        let mut fact = 1.0;
        let mut i = 1.0;
        while i <= m {
            pmm *= omx2 * fact / (fact + 1.0);
            fact += 2.0;
            i += 1.0;
        }
    }
    pmm = ((2.0 * m + 1.0) * pmm / (4.0 * PI)).sqrt();
    if (m as u32) % 2 == 1 {
        pmm = -pmm;
    }
    if l == m {
        return pmm;
    }

    // P_{m+1}^m
    let mut pmmp1 = x * (2.0 * m + 3.0).sqrt() * pmm;
    if l == m + 1.0 {
        return pmmp1;
    }

    let mut old_fact = (2.0 * m + 3.0).sqrt();
    let mut ll = m + 2.0;
    let mut pll = 0.0;
    while ll <= l {
        let fact = ((4.0 * ll * ll - 1.0) / (ll * ll - m * m)).sqrt();
        pll = (x * pmmp1 - pmm / old_fact) * fact;
        old_fact = fact;
        pmm = pmmp1;
        pmmp1 = pll;
        ll += 1.0;
    }
    pll
}

/// `Y_l^m(theta, phi)` for any `-l <= m <= l`.
///
/// `theta` is the polar angle, `phi` the azimuth.
pub fn spherical_harmonic(l: u32, m: i32, theta: f64, phi: f64) -> Complex64 {
    let abs_m = m.unsigned_abs();
    debug_assert!(abs_m <= l);
    let plm = normalized_legendre(l, abs_m, theta.cos());
    let positive = Complex64::from_polar(plm, abs_m as f64 * phi);
    if m >= 0 {
        positive
    } else if abs_m % 2 == 0 {
        positive.conj()
    } else {
        -positive.conj()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn low_orders_match_closed_forms() {
        let (theta, phi) = (0.7_f64, 1.9_f64);
        let (s, c) = (theta.sin(), theta.cos());

        let y00 = spherical_harmonic(0, 0, theta, phi);
        assert_abs_diff_eq!(y00.re, 0.5 / PI.sqrt(), epsilon = 1e-14);

        let y10 = spherical_harmonic(1, 0, theta, phi);
        assert_abs_diff_eq!(y10.re, (3.0 / (4.0 * PI)).sqrt() * c, epsilon = 1e-14);
        assert_abs_diff_eq!(y10.im, 0.0, epsilon = 1e-14);

        let y11 = spherical_harmonic(1, 1, theta, phi);
        let k = -(3.0 / (8.0 * PI)).sqrt() * s;
        assert_abs_diff_eq!(y11.re, k * phi.cos(), epsilon = 1e-14);
        assert_abs_diff_eq!(y11.im, k * phi.sin(), epsilon = 1e-14);

        let y2m2 = spherical_harmonic(2, -2, theta, phi);
        let k = 0.25 * (15.0 / (2.0 * PI)).sqrt() * s * s;
        assert_abs_diff_eq!(y2m2.re, k * (2.0 * phi).cos(), epsilon = 1e-14);
        assert_abs_diff_eq!(y2m2.im, -k * (2.0 * phi).sin(), epsilon = 1e-14);

        let y30 = spherical_harmonic(3, 0, theta, phi);
        let expected = 0.25 * (7.0 / PI).sqrt() * (5.0 * c * c * c - 3.0 * c);
        assert_abs_diff_eq!(y30.re, expected, epsilon = 1e-14);
    }

    #[test]
    fn negative_orders_use_conjugate_symmetry() {
        let (theta, phi) = (2.1, -0.4);
        for l in 0..=8u32 {
            for m in 1..=l as i32 {
                let pos = spherical_harmonic(l, m, theta, phi);
                let neg = spherical_harmonic(l, -m, theta, phi);
                let sign = if m % 2 == 0 { 1.0 } else { -1.0 };
                assert_abs_diff_eq!(neg.re, sign * pos.re, epsilon = 1e-13);
                assert_abs_diff_eq!(neg.im, -sign * pos.im, epsilon = 1e-13);
            }
        }
    }

    #[test]
    fn addition_theorem_holds() {
        // sum_m |Y_l^m|^2 = (2l + 1) / (4 pi) for every direction
        for &(theta, phi) in &[(0.0, 0.0), (0.3, 1.0), (1.5707, -2.0), (3.0, 0.5)] {
            for l in 0..=8u32 {
                let total: f64 = (-(l as i32)..=l as i32)
                    .map(|m| spherical_harmonic(l, m, theta, phi).norm_sqr())
                    .sum();
                assert_abs_diff_eq!(total, (2 * l + 1) as f64 / (4.0 * PI), epsilon = 1e-12);
            }
        }
    }
}
