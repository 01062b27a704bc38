//! Error taxonomy of the descriptor engine.

use structure_common::AtomId;
use thiserror::Error;

/// Malformed dump file. Aborts processing of that file.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("line {line}: expected {expected}, found '{found}'")]
    Unexpected { line: usize, expected: &'static str, found: String },

    #[error("line {line}: invalid {what} '{value}'")]
    InvalidNumber { line: usize, what: &'static str, value: String },

    #[error("line {line}: atom row has {found} fields, the ATOMS header names {expected}")]
    FieldCount { line: usize, expected: usize, found: usize },

    #[error("line {line}: ATOMS header has no '{column}' column")]
    MissingColumn { line: usize, column: &'static str },

    #[error("line {line}: timestep {timestep} has atom rows but no box bounds")]
    MissingBox { line: usize, timestep: u64 },

    #[error("line {line}: atom id {id} appears twice in timestep {timestep}")]
    DuplicateAtom { line: usize, timestep: u64, id: AtomId },

    #[error("unexpected end of file while reading {0}")]
    Truncated(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Geometric data-integrity failure. Always fatal for the timestep.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("direction of a zero-length vector is undefined")]
    ZeroLength,

    #[error("atoms {a} and {b} occupy the same position")]
    CoincidentAtoms { a: AtomId, b: AtomId },
}

/// Parameters that cannot be used with a given snapshot.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("box periods must be positive, got ({x}, {y}, {z})")]
    InvalidBox { x: f64, y: f64, z: f64 },

    #[error("cutoff r_max = {r_max} is not below half the shortest box edge ({edge}); minimum image is invalid")]
    CutoffExceedsHalfBox { r_max: f64, edge: f64 },

    #[error("cutoff r_max = {r_max} is not below the shortest box edge ({edge}); 27-image replication is invalid")]
    CutoffExceedsBox { r_max: f64, edge: f64 },

    #[error("{name} cutoff must satisfy 0 <= r_min < r_max (got {r_min}, {r_max})")]
    InvalidCutoff { name: &'static str, r_min: f64, r_max: f64 },

    #[error("descriptor table is empty")]
    EmptyTable,
}

/// Failure of a single descriptor component.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DescriptorError {
    /// The Steinhardt normalisation has no weight: no neighbor inside the
    /// cutoff shell.
    #[error("no neighbors inside the Steinhardt cutoff shell (l = {l})")]
    EmptyNeighborhood { l: u32 },

    #[error(transparent)]
    Geometry(#[from] GeometryError),
}
