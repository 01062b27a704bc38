use structure_common::{NeighborStrategy, PeriodicBox, Timestep, Vec3};
use crate::error::{ConfigError, GeometryError};
use crate::geometry::{distance, minimum_image_displacement};

/// A neighbor of the central atom: either a real atom or one of its periodic
/// images.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Index of the source atom in `Timestep::atoms`.
    pub source: usize,
    /// Image offset in box lengths; zero for minimum-image neighbors.
    pub offset: [i8; 3],
    /// Bond vector from the central atom to the neighbor.
    pub displacement: Vec3,
    pub distance: f64,
}

/// The image convention chosen for one timestep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PbcMode {
    MinimumImage,
    Replicated,
}

/// Picks the image convention for a box and search radius, checking the
/// precondition of the chosen one.
pub fn resolve_mode(
    requested: NeighborStrategy,
    periodic_box: &PeriodicBox,
    r_max: f64,
) -> Result<PbcMode, ConfigError> {
    if !periodic_box.is_valid() {
        let l = periodic_box.lengths;
        return Err(ConfigError::InvalidBox { x: l.x, y: l.y, z: l.z });
    }
    let edge = periodic_box.min_edge();
    let minimum_image_ok = r_max < 0.5 * edge;
    let replication_ok = r_max < edge;
    match requested {
        NeighborStrategy::MinimumImage if minimum_image_ok => Ok(PbcMode::MinimumImage),
        NeighborStrategy::MinimumImage => Err(ConfigError::CutoffExceedsHalfBox { r_max, edge }),
        NeighborStrategy::Replicated if replication_ok => Ok(PbcMode::Replicated),
        NeighborStrategy::Replicated => Err(ConfigError::CutoffExceedsBox { r_max, edge }),
        NeighborStrategy::Auto if minimum_image_ok => Ok(PbcMode::MinimumImage),
        NeighborStrategy::Auto if replication_ok => {
            log::warn!(
                "Cutoff {} exceeds half the box edge {}; falling back to 27-image replication.",
                r_max, edge
            );
            Ok(PbcMode::Replicated)
        }
        NeighborStrategy::Auto => Err(ConfigError::CutoffExceedsBox { r_max, edge }),
    }
}

/// A periodic copy of a real atom.
#[derive(Debug, Clone, Copy)]
struct Image {
    source: usize,
    offset: [i8; 3],
    position: Vec3,
}

/// Periodic cell list over the wrapped atom positions.
///
/// Cells are at least `cell_edge` long on every axis and there are at least
/// three per axis, so the 27 cells around an atom hold every atom within
/// `cell_edge` exactly once. Per axis there are at most `max(3, ceil(cbrt N))`
/// cells, so a sparse box costs memory in atoms rather than in volume.
#[derive(Debug)]
struct CellGrid {
    dims: [usize; 3],
    cell_edge: f64,
    cell_starts: Vec<usize>,
    cell_counts: Vec<usize>,
    cell_atom_indices: Vec<usize>,
    atom_cells: Vec<[usize; 3]>,
}

impl CellGrid {
    fn build(timestep: &Timestep, r_max: f64) -> Option<Self> {
        let lengths = timestep.periodic_box.lengths.to_array();
        let max_per_axis = ((timestep.atoms.len() as f64).cbrt().ceil() as usize).max(3);
        let mut dims = [0usize; 3];
        for axis in 0..3 {
            dims[axis] = ((lengths[axis] / r_max).floor() as usize).min(max_per_axis);
            if dims[axis] < 3 {
                return None;
            }
        }
        let num_cells = dims[0] * dims[1] * dims[2];

        // Assign each atom to a cell from its wrapped fractional position.
        let atom_cells: Vec<[usize; 3]> = timestep
            .atoms
            .iter()
            .map(|atom| {
                let rel = timestep.periodic_box.wrap(atom.position).sub(timestep.periodic_box.lo).to_array();
                let mut c = [0usize; 3];
                for axis in 0..3 {
                    let idx = (rel[axis] / lengths[axis] * dims[axis] as f64).floor() as usize;
                    c[axis] = idx.min(dims[axis] - 1);
                }
                c
            })
            .collect();

        // Counting sort of atoms by cell.
        let mut cell_counts = vec![0usize; num_cells];
        for c in &atom_cells {
            cell_counts[flat(dims, *c)] += 1;
        }
        let mut cell_starts = vec![0usize; num_cells];
        let mut total = 0;
        for (start, count) in cell_starts.iter_mut().zip(&cell_counts) {
            *start = total;
            total += count;
        }
        let mut write_offsets = cell_starts.clone();
        let mut cell_atom_indices = vec![0usize; atom_cells.len()];
        for (atom_idx, c) in atom_cells.iter().enumerate() {
            let cell = flat(dims, *c);
            cell_atom_indices[write_offsets[cell]] = atom_idx;
            write_offsets[cell] += 1;
        }

        let cell_edge = (0..3)
            .map(|axis| lengths[axis] / dims[axis] as f64)
            .fold(f64::INFINITY, f64::min);

        Some(Self { dims, cell_edge, cell_starts, cell_counts, cell_atom_indices, atom_cells })
    }

    /// Calls `f` with every atom index in the 27 cells around `atom_idx`.
    fn for_each_candidate<F: FnMut(usize) -> Result<(), GeometryError>>(
        &self,
        atom_idx: usize,
        mut f: F,
    ) -> Result<(), GeometryError> {
        let center = self.atom_cells[atom_idx];
        for dz in -1i64..=1 {
            for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    let c = [
                        wrap_index(center[0], dx, self.dims[0]),
                        wrap_index(center[1], dy, self.dims[1]),
                        wrap_index(center[2], dz, self.dims[2]),
                    ];
                    let cell = flat(self.dims, c);
                    let start = self.cell_starts[cell];
                    let end = start + self.cell_counts[cell];
                    for &candidate in &self.cell_atom_indices[start..end] {
                        f(candidate)?;
                    }
                }
            }
        }
        Ok(())
    }
}

#[inline(always)]
fn flat(dims: [usize; 3], c: [usize; 3]) -> usize {
    (c[2] * dims[1] + c[1]) * dims[0] + c[0]
}

#[inline(always)]
fn wrap_index(i: usize, delta: i64, n: usize) -> usize {
    (i as i64 + delta).rem_euclid(n as i64) as usize
}

/// Neighbor lookup over one immutable timestep snapshot.
///
/// Built once per timestep and shared read-only by all workers; each query
/// allocates its own result.
#[derive(Debug)]
pub struct NeighborPool<'a> {
    timestep: &'a Timestep,
    mode: PbcMode,
    grid: Option<CellGrid>,
    images: Vec<Image>,
}

impl<'a> NeighborPool<'a> {
    /// Prepares neighbor lookup for radii up to `r_max`.
    pub fn build(
        timestep: &'a Timestep,
        strategy: NeighborStrategy,
        r_max: f64,
        use_cell_list: bool,
    ) -> Result<Self, ConfigError> {
        let mode = resolve_mode(strategy, &timestep.periodic_box, r_max)?;
        let mut pool = Self { timestep, mode, grid: None, images: Vec::new() };
        match mode {
            PbcMode::MinimumImage => {
                if use_cell_list {
                    pool.grid = CellGrid::build(timestep, r_max);
                }
                log::debug!(
                    "Timestep {}: minimum image, {}",
                    timestep.id,
                    match &pool.grid {
                        Some(g) => format!("cell list {}x{}x{}", g.dims[0], g.dims[1], g.dims[2]),
                        None => "all-pairs scan".to_string(),
                    }
                );
            }
            PbcMode::Replicated => {
                pool.images = replicate(timestep);
                log::debug!("Timestep {}: replicated {} images", timestep.id, pool.images.len());
            }
        }
        Ok(pool)
    }

    pub fn mode(&self) -> PbcMode {
        self.mode
    }

    pub fn timestep(&self) -> &'a Timestep {
        self.timestep
    }

    /// Calls `f` for every neighbor of atom `index` closer than `r_max`.
    /// The atom itself (zero offset) is never reported; its periodic images
    /// are, when they fall inside `r_max`.
    pub fn for_each_neighbor<F: FnMut(Neighbor)>(
        &self,
        index: usize,
        r_max: f64,
        mut f: F,
    ) -> Result<(), GeometryError> {
        let atoms = &self.timestep.atoms;
        let center = atoms[index].position;
        let periodic_box = &self.timestep.periodic_box;

        let mut visit = |source: usize, offset: [i8; 3], displacement: Vec3| -> Result<(), GeometryError> {
            let r = distance(displacement);
            if r >= r_max {
                return Ok(());
            }
            if r == 0.0 {
                return Err(GeometryError::CoincidentAtoms { a: atoms[index].id, b: atoms[source].id });
            }
            f(Neighbor { source, offset, displacement, distance: r });
            Ok(())
        };

        match self.mode {
            PbcMode::MinimumImage => {
                let mut pair = |other: usize| {
                    if other == index {
                        return Ok(());
                    }
                    let d = minimum_image_displacement(center, atoms[other].position, periodic_box);
                    visit(other, [0; 3], d)
                };
                match &self.grid {
                    Some(grid) if r_max <= grid.cell_edge => grid.for_each_candidate(index, pair),
                    _ => (0..atoms.len()).try_for_each(|other| pair(other)),
                }
            }
            PbcMode::Replicated => {
                // Images were built from wrapped positions.
                let center = periodic_box.wrap(center);
                for image in &self.images {
                    if image.source == index && image.offset == [0; 3] {
                        continue;
                    }
                    visit(image.source, image.offset, image.position.sub(center))?;
                }
                Ok(())
            }
        }
    }

    /// Neighbors of atom `index` closer than `r_max`.
    pub fn neighbors(&self, index: usize, r_max: f64) -> Result<Vec<Neighbor>, GeometryError> {
        let mut out = Vec::new();
        self.for_each_neighbor(index, r_max, |n| out.push(n))?;
        Ok(out)
    }
}

/// Every atom plus its 26 periodic copies, from wrapped positions.
fn replicate(timestep: &Timestep) -> Vec<Image> {
    let periodic_box = &timestep.periodic_box;
    let lengths = periodic_box.lengths;
    let mut images = Vec::with_capacity(timestep.atoms.len() * 27);
    for (source, atom) in timestep.atoms.iter().enumerate() {
        let base = periodic_box.wrap(atom.position);
        for ox in -1i8..=1 {
            for oy in -1i8..=1 {
                for oz in -1i8..=1 {
                    let shift = Vec3::new(ox as f64, oy as f64, oz as f64).mul(lengths);
                    images.push(Image { source, offset: [ox, oy, oz], position: base.add(shift) });
                }
            }
        }
    }
    images
}
