pub mod config;
pub mod params;
pub mod phases;
pub mod records;
pub mod snapshot;
pub mod vecmath;

// Re-export key types for easier use by dependent crates
pub use config::{ArchiveFormat, CutoffConfig, EngineConfig, NeighborConfig, OutputConfig, PhaseConfig, RunConfig};
pub use params::{Cutoff, DescriptorParams, DescriptorTable, G2Params, NeighborStrategy};
pub use phases::PhaseRegistry;
pub use records::{DescriptorFile, DescriptorRow, FileStatus};
pub use snapshot::{Atom, AtomId, PeriodicBox, Timestep};
pub use vecmath::Vec3;
