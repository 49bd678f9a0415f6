// Run configuration shared by the group partitioner, the channel establisher
// and the node binary. Validated once at startup, immutable afterwards.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::ProcessId;

// ── Algorithm ────────────────────────────────────────────────────────────────

/// Data distribution strategy for the distributed sparse × dense multiply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    /// Sparse matrix replicated in contiguous blocks, dense matrix never
    /// replicated.
    ColumnA,
    /// Both matrices replicated; sparse groups follow a shifted layout so
    /// every dense layer touches a unique block.
    InnerABC,
}

impl Algorithm {
    /// Strategy selected by the `-i` flag of the node binary.
    pub fn from_inner_flag(use_inner: bool) -> Self {
        if use_inner {
            Self::InnerABC
        } else {
            Self::ColumnA
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ColumnA  => write!(f, "ColumnA"),
            Self::InnerABC => write!(f, "InnerABC"),
        }
    }
}

impl FromStr for Algorithm {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "columna" | "column-a" | "a" => Ok(Self::ColumnA),
            "innerabc" | "inner-abc" | "inner" => Ok(Self::InnerABC),
            _ => Err(ConfigError::UnknownAlgorithm(s.to_string())),
        }
    }
}

// ── RunConfig ────────────────────────────────────────────────────────────────

/// Shape of the process pool and the replication layout.
///
/// Invariant: `num_replication_groups * replication_group_size == num_processes`.
/// Under [`Algorithm::InnerABC`] the group count must also be a multiple of the
/// group size. Both are checked by the constructors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    pub num_processes: u32,
    pub num_replication_groups: u32,
    pub replication_group_size: u32,
    pub algorithm: Algorithm,
}

impl RunConfig {
    /// Derive the group count from the pool size and validate.
    pub fn new(
        num_processes: u32,
        replication_group_size: u32,
        algorithm: Algorithm,
    ) -> Result<Self, ConfigError> {
        if replication_group_size == 0 {
            return Err(ConfigError::ZeroGroupSize);
        }
        Self::from_parts(
            num_processes,
            num_processes / replication_group_size,
            replication_group_size,
            algorithm,
        )
    }

    /// Build from all four fields, checking the product invariant.
    pub fn from_parts(
        num_processes: u32,
        num_replication_groups: u32,
        replication_group_size: u32,
        algorithm: Algorithm,
    ) -> Result<Self, ConfigError> {
        let cfg = Self {
            num_processes,
            num_replication_groups,
            replication_group_size,
            algorithm,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_processes == 0 {
            return Err(ConfigError::EmptyPool);
        }
        if self.replication_group_size == 0 {
            return Err(ConfigError::ZeroGroupSize);
        }
        if self.num_processes % self.replication_group_size != 0 {
            return Err(ConfigError::UnevenPool {
                num_processes: self.num_processes,
                replication_group_size: self.replication_group_size,
            });
        }
        let covered = u64::from(self.num_replication_groups) * u64::from(self.replication_group_size);
        if covered != u64::from(self.num_processes) {
            return Err(ConfigError::GroupCountMismatch {
                num_processes: self.num_processes,
                num_replication_groups: self.num_replication_groups,
                replication_group_size: self.replication_group_size,
            });
        }
        if self.algorithm == Algorithm::InnerABC
            && self.num_replication_groups % self.replication_group_size != 0
        {
            return Err(ConfigError::UnevenShifts {
                num_replication_groups: self.num_replication_groups,
                replication_group_size: self.replication_group_size,
            });
        }
        Ok(())
    }

    /// Reject process ids that are not part of the pool.
    pub fn check_process(&self, process_id: ProcessId) -> Result<(), ConfigError> {
        if process_id >= self.num_processes {
            return Err(ConfigError::ProcessOutOfRange {
                process_id,
                num_processes: self.num_processes,
            });
        }
        Ok(())
    }

    /// Pipeline rotations needed for one multiplication under InnerABC.
    pub fn num_shifts(&self) -> u32 {
        self.num_replication_groups / self.replication_group_size
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
