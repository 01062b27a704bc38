use serde::Serialize;
use structure_common::{AtomId, DescriptorParams, DescriptorRow, Timestep};
use crate::error::{ConfigError, DescriptorError, GeometryError};
use crate::neighbors::{Neighbor, NeighborPool};
use crate::steinhardt::bond_order_parameter;
use crate::symmetry::{g2, g3};

/// Descriptor vector of one atom.
///
/// Components whose Steinhardt shell was empty hold `NaN` and their degree is
/// listed in `undefined`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AtomDescriptors {
    pub atom_id: AtomId,
    pub values: Vec<f64>,
    pub undefined: Vec<u32>,
}

impl AtomDescriptors {
    pub fn is_complete(&self) -> bool {
        self.undefined.is_empty()
    }

    pub fn into_row(self) -> DescriptorRow {
        DescriptorRow { atom_id: self.atom_id, values: self.values }
    }
}

/// Evaluates the descriptor table for single atoms.
///
/// Holds only the immutable parameters; each evaluation is a pure function
/// of the neighbor shell.
#[derive(Debug, Clone)]
pub struct DescriptorCalculator {
    params: DescriptorParams,
}

impl DescriptorCalculator {
    pub fn new(params: DescriptorParams) -> Result<Self, ConfigError> {
        for (name, cutoff) in [("symmetry", params.symmetry_cutoff), ("steinhardt", params.steinhardt_cutoff)] {
            if !cutoff.is_valid() {
                return Err(ConfigError::InvalidCutoff { name, r_min: cutoff.r_min, r_max: cutoff.r_max });
            }
        }
        if params.table.is_empty() {
            return Err(ConfigError::EmptyTable);
        }
        Ok(Self { params })
    }

    pub fn params(&self) -> &DescriptorParams {
        &self.params
    }

    pub fn width(&self) -> usize {
        self.params.table.width()
    }

    /// Neighbor lookup for one timestep at the larger of both cutoffs.
    pub fn neighbor_pool<'a>(&self, timestep: &'a Timestep) -> Result<NeighborPool<'a>, ConfigError> {
        NeighborPool::build(
            timestep,
            self.params.strategy,
            self.params.search_radius(),
            self.params.use_cell_list,
        )
    }

    /// Descriptor vector of atom `index` of the pool's timestep.
    pub fn compute(&self, pool: &NeighborPool, index: usize) -> Result<AtomDescriptors, GeometryError> {
        let atom_id = pool.timestep().atoms[index].id;
        let neighbors = pool.neighbors(index, self.params.search_radius())?;
        self.describe_shell(atom_id, &neighbors)
    }

    /// Descriptor vector from an explicit neighbor shell.
    ///
    /// The shell may extend past either cutoff; each family only sees the
    /// neighbors inside its own `r_max`.
    pub fn describe_shell(&self, atom_id: AtomId, neighbors: &[Neighbor]) -> Result<AtomDescriptors, GeometryError> {
        let table = &self.params.table;
        let g_cut = &self.params.symmetry_cutoff;
        let q_cut = &self.params.steinhardt_cutoff;

        let g_shell: Vec<Neighbor> = neighbors.iter().filter(|n| n.distance < g_cut.r_max).copied().collect();
        let q_shell: Vec<Neighbor> = neighbors.iter().filter(|n| n.distance < q_cut.r_max).copied().collect();

        let mut values = Vec::with_capacity(table.width());
        let mut undefined = Vec::new();
        values.extend(table.g2.iter().map(|p| g2(&g_shell, g_cut, p)));
        values.extend(table.g3_kappa.iter().map(|&kappa| g3(&g_shell, g_cut, kappa)));
        for &l in &table.steinhardt_l {
            match bond_order_parameter(&q_shell, q_cut, l) {
                Ok(q) => values.push(q),
                Err(DescriptorError::EmptyNeighborhood { l }) => {
                    values.push(f64::NAN);
                    undefined.push(l);
                }
                Err(DescriptorError::Geometry(e)) => return Err(e),
            }
        }
        Ok(AtomDescriptors { atom_id, values, undefined })
    }
}
