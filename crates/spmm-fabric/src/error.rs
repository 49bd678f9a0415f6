use spmm_types::ProcessId;

use crate::ContextId;

/// Crate-local error type for `spmm-fabric` operations.
///
/// Every variant except `Serialization` leaves the pool in a state that
/// cannot be recovered; callers are expected to abort the run.
#[derive(Debug, thiserror::Error)]
pub enum FabricError {
    #[error("rendezvous mismatch in {op}: {detail}")]
    RendezvousMismatch { op: &'static str, detail: String },

    #[error("{op} aborted: a peer left the rendezvous with an error")]
    Aborted { op: &'static str },

    #[error("process {process_id} does not own channel {context}")]
    NotOwned { context: ContextId, process_id: ProcessId },

    #[error("rank {rank} is not part of a group of {size}")]
    UnknownRank { rank: u32, size: u32 },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("process task failed: {0}")]
    Join(String),
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, FabricError>;
