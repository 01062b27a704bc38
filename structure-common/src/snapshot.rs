use serde::{Deserialize, Serialize};
use crate::vecmath::Vec3;

/// Atom identifier as written in the dump file. Unique within one timestep.
pub type AtomId = u64;

/// A single atom of a timestep snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    pub id: AtomId,
    /// Cartesian position in length units (Angstrom for the usual dumps).
    pub position: Vec3,
}

/// Orthogonal periodic simulation box.
///
/// Only the edge lengths take part in periodic wrap-around; the lower corner is
/// kept so fractional (`xs ys zs`) coordinates can be mapped back to Cartesian
/// ones.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeriodicBox {
    pub lo: Vec3,
    pub lengths: Vec3,
}

impl PeriodicBox {
    /// Box with the lower corner at the origin.
    pub fn new(lengths: Vec3) -> Self {
        Self { lo: Vec3::zero(), lengths }
    }

    pub fn cubic(length: f64) -> Self {
        Self::new(Vec3::splat(length))
    }

    /// Box spanning `lo..hi` on each axis, as given by `ITEM: BOX BOUNDS`.
    pub fn from_bounds(lo: Vec3, hi: Vec3) -> Self {
        Self { lo, lengths: hi.sub(lo) }
    }

    /// Shortest edge length.
    pub fn min_edge(&self) -> f64 {
        self.lengths.min_element()
    }

    /// All three periods are finite and strictly positive.
    pub fn is_valid(&self) -> bool {
        [self.lengths.x, self.lengths.y, self.lengths.z]
            .iter()
            .all(|l| l.is_finite() && *l > 0.0)
    }

    /// Converts scaled coordinates (0..1 across the box) to Cartesian ones.
    pub fn fractional_to_cartesian(&self, fractional: Vec3) -> Vec3 {
        self.lo.add(fractional.mul(self.lengths))
    }

    /// Maps a position into `[lo, lo + length)` on every axis.
    pub fn wrap(&self, position: Vec3) -> Vec3 {
        let rel = position.sub(self.lo);
        let wrapped = rel.zip_map(self.lengths, |d, l| {
            let w = d - l * (d / l).floor();
            // floor() can leave w == l for tiny negative d
            if w >= l { w - l } else { w }
        });
        self.lo.add(wrapped)
    }
}

/// One parsed block of a dump file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timestep {
    pub id: u64,
    pub periodic_box: PeriodicBox,
    pub atoms: Vec<Atom>,
}

impl Timestep {
    pub fn new(id: u64, periodic_box: PeriodicBox) -> Self {
        Self { id, periodic_box, atoms: Vec::new() }
    }

    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }
}
