pub mod config;
pub mod error;
pub mod topology;

pub use config::{Algorithm, RunConfig};
pub use error::ConfigError;
pub use topology::{GroupPlacement, MatrixKind, ProcessTopology, RingLinks, TopologyReport};

/// Rank of a process in the whole pool. Fixed for the run.
pub type ProcessId = u32;

/// Index of a replication group within one matrix kind.
pub type GroupId = u32;
