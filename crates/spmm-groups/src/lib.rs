//! `spmm-groups` — Replication groups for distributed sparse × dense
//! multiplication.
//!
//! Every process belongs to one dense group and one sparse group. Sparse
//! groups form a directed ring; each group's leader is the only member that
//! talks across the ring.
//!
//! ```text
//!   ┌──────┐      ┌──────┐      ┌──────┐
//!   │  g0  │ ───▶ │  g1  │ ───▶ │  g2  │ ───┐
//!   └──────┘      └──────┘      └──────┘    │
//!      ▲                                    │
//!      └────────────────────────────────────┘
//!
//!   g ───▶ g+1 : whole of g bridged to the leader of g+1, under g's tag
//! ```
//!
//! [`DenseMatrixReplicationGroup::of_process`] and
//! [`SparseMatrixReplicationGroup::of_process`] are collective: every process
//! of the pool calls them, in the same order. Each result owns its channels
//! until [`free_comms`](SparseMatrixReplicationGroup::free_comms).

pub mod channel;
pub mod dense;
pub mod error;
pub mod establish;
pub mod partition;
pub mod ring;
pub mod sparse;

// ── Public re-exports ────────────────────────────────────────────────────────

pub use channel::Channel;
pub use dense::DenseMatrixReplicationGroup;
pub use error::{GroupError, Result};
pub use establish::{bridge_order, BridgeStep};
pub use ring::shift_to_successor;
pub use sparse::SparseMatrixReplicationGroup;

use spmm_fabric::Process;
use spmm_types::{ProcessTopology, RunConfig};

/// Reject configurations that do not describe the pool `process` lives in.
pub(crate) fn check_pool(process: &Process, config: &RunConfig) -> Result<()> {
    config.validate()?;
    if process.pool_size() != config.num_processes {
        return Err(GroupError::PoolSizeMismatch {
            pool: process.pool_size(),
            configured: config.num_processes,
        });
    }
    Ok(())
}

/// Serializable summary of one process's groups.
pub fn describe(dense: &DenseMatrixReplicationGroup, sparse: &SparseMatrixReplicationGroup) -> ProcessTopology {
    ProcessTopology {
        process_id: sparse.process_id(),
        dense: dense.placement(),
        sparse: sparse.placement(),
        ring: sparse.ring_links(),
        in_leaders_channel: !dense.leaders_channel().is_absent(),
    }
}
