use spmm_fabric::FabricError;
use spmm_types::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum GroupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("fabric error: {0}")]
    Fabric(#[from] FabricError),

    #[error("pool has {pool} processes but the configuration expects {configured}")]
    PoolSizeMismatch { pool: u32, configured: u32 },

    #[error("process {process_id} is not a member of {channel}")]
    NotAMember { process_id: u32, channel: &'static str },

    #[error("missing channel: {0}")]
    MissingChannel(&'static str),
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, GroupError>;
