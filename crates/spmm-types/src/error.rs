// Configuration errors. Raised before any collective call is issued so that a
// bad run fails fast instead of forming overlapping groups.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("process pool must contain at least one process")]
    EmptyPool,

    #[error("replication group size must be at least 1")]
    ZeroGroupSize,

    #[error("{num_processes} processes cannot be split into groups of {replication_group_size}")]
    UnevenPool {
        num_processes: u32,
        replication_group_size: u32,
    },

    #[error(
        "{num_replication_groups} groups of {replication_group_size} do not cover {num_processes} processes"
    )]
    GroupCountMismatch {
        num_processes: u32,
        num_replication_groups: u32,
        replication_group_size: u32,
    },

    #[error(
        "InnerABC needs the group count ({num_replication_groups}) to be a multiple of the group size ({replication_group_size})"
    )]
    UnevenShifts {
        num_replication_groups: u32,
        replication_group_size: u32,
    },

    #[error("process {process_id} is outside the pool of {num_processes}")]
    ProcessOutOfRange { process_id: u32, num_processes: u32 },

    #[error("group {group_id} is outside the {num_groups} replication groups")]
    GroupOutOfRange { group_id: u32, num_groups: u32 },

    #[error("unknown algorithm variant: {0}")]
    UnknownAlgorithm(String),
}
