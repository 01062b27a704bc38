use structure_common::{PeriodicBox, Vec3};
use crate::error::GeometryError;

/// Displacement `b - a` reduced to its shortest periodic image.
///
/// Only the nearest image is returned, so this is exact only while the
/// cutoff in use stays below half of every box edge.
#[inline(always)]
pub fn minimum_image_displacement(a: Vec3, b: Vec3, periodic_box: &PeriodicBox) -> Vec3 {
    b.sub(a).zip_map(periodic_box.lengths, |d, l| d - l * (d / l).round())
}

#[inline(always)]
pub fn distance(d: Vec3) -> f64 {
    d.length()
}

/// Spherical coordinates of a bond vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spherical {
    pub r: f64,
    /// Azimuth in `(-pi, pi]`.
    pub phi: f64,
    /// Polar angle from +z in `[0, pi]`.
    pub theta: f64,
}

/// Converts a bond vector to `(r, phi, theta)`.
/// A zero vector has no direction and is an error.
pub fn to_spherical(d: Vec3) -> Result<Spherical, GeometryError> {
    let r = distance(d);
    if r == 0.0 {
        return Err(GeometryError::ZeroLength);
    }
    let phi = d.y.atan2(d.x);
    // clamp guards acos against |z/r| drifting past 1 by rounding
    let theta = (d.z / r).clamp(-1.0, 1.0).acos();
    Ok(Spherical { r, phi, theta })
}
