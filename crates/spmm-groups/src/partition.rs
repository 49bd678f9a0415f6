//! Group partitioner: pure mapping from a process id to its replication
//! groups. No I/O, no collectives.
//!
//! Layouts for P = 18, c = 3 (6 groups per matrix kind):
//!
//! ```text
//! contiguous blocks (ColumnA sparse, InnerABC dense)
//!   g0 [0 1 2]  g1 [3 4 5]  g2 [6 7 8]  g3 [9 10 11]  g4 [12 13 14]  g5 [15 16 17]
//!
//! shifted (InnerABC sparse), numShifts = 6 / 3 = 2
//!   g0 [0 6 12]  g1 [3 9 15]  g2 [1 7 13]  g3 [4 10 16]  g4 [2 8 14]  g5 [5 11 17]
//! ```
//!
//! Under ColumnA the dense matrix is not replicated: every process is its
//! own group.

use spmm_types::{Algorithm, ConfigError, GroupId, MatrixKind, ProcessId, RunConfig};

// ── Assignment ───────────────────────────────────────────────────────────────

/// A process's place in one replication group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
    pub local_group_id: GroupId,
    pub size: u32,
    pub leader: ProcessId,
    pub rank_in_group: u32,
    /// Rendezvous tag for bridges owned by this group.
    pub global_tag: u32,
}

/// One ring-adjacent sparse group, seen from its neighbour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Neighbour {
    pub group_id: GroupId,
    pub leader: ProcessId,
    pub global_tag: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingNeighbours {
    pub pred: Neighbour,
    pub succ: Neighbour,
}

// ── Ring arithmetic ──────────────────────────────────────────────────────────

pub fn predecessor(group_id: GroupId, num_groups: u32) -> GroupId {
    (group_id + num_groups - 1) % num_groups
}

pub fn successor(group_id: GroupId, num_groups: u32) -> GroupId {
    (group_id + 1) % num_groups
}

/// Rendezvous tag of group `group_id` of `kind`.
///
/// Dense group ids never reach `num_processes`, so sparse tags are offset by
/// it: tags are unique within a kind and never shared across kinds.
pub fn global_tag(kind: MatrixKind, group_id: GroupId, config: &RunConfig) -> u32 {
    match kind {
        MatrixKind::Dense  => group_id,
        MatrixKind::Sparse => config.num_processes + group_id,
    }
}

// ── Contiguous blocks ────────────────────────────────────────────────────────

fn block_group_of(config: &RunConfig, process_id: ProcessId) -> GroupId {
    process_id / config.replication_group_size
}

fn block_leader(config: &RunConfig, group_id: GroupId) -> ProcessId {
    group_id * config.replication_group_size
}

fn block_assignment(config: &RunConfig, process_id: ProcessId, kind: MatrixKind) -> Assignment {
    let group = block_group_of(config, process_id);
    Assignment {
        local_group_id: group,
        size: config.replication_group_size,
        leader: block_leader(config, group),
        rank_in_group: process_id % config.replication_group_size,
        global_tag: global_tag(kind, group, config),
    }
}

// ── Shifted layout (InnerABC sparse) ─────────────────────────────────────────

fn shifted_group_of(config: &RunConfig, process_id: ProcessId) -> GroupId {
    let num_shifts = config.num_shifts();
    let dense_layer = process_id % config.replication_group_size;
    let dense_group = process_id / config.replication_group_size;
    dense_layer * num_shifts + dense_group % num_shifts
}

/// Leaders are the first `num_replication_groups` ranks, one per remainder
/// class; group `g` holds the class of its leader.
fn shifted_leader(config: &RunConfig, group_id: GroupId) -> ProcessId {
    let num_shifts = config.num_shifts();
    group_id / num_shifts + (group_id % num_shifts) * config.replication_group_size
}

fn shifted_assignment(config: &RunConfig, process_id: ProcessId) -> Assignment {
    let group = shifted_group_of(config, process_id);
    Assignment {
        local_group_id: group,
        size: config.replication_group_size,
        leader: process_id % config.num_replication_groups,
        rank_in_group: process_id / config.num_replication_groups,
        global_tag: global_tag(MatrixKind::Sparse, group, config),
    }
}

fn check_group(group_id: GroupId, num_groups: u32) -> Result<(), ConfigError> {
    if group_id >= num_groups {
        return Err(ConfigError::GroupOutOfRange { group_id, num_groups });
    }
    Ok(())
}

fn dense_of(config: &RunConfig, process_id: ProcessId) -> Assignment {
    match config.algorithm {
        Algorithm::ColumnA => Assignment {
            local_group_id: process_id,
            size: 1,
            leader: process_id,
            rank_in_group: 0,
            global_tag: global_tag(MatrixKind::Dense, process_id, config),
        },
        Algorithm::InnerABC => block_assignment(config, process_id, MatrixKind::Dense),
    }
}

fn sparse_of(config: &RunConfig, process_id: ProcessId) -> Assignment {
    match config.algorithm {
        Algorithm::ColumnA  => block_assignment(config, process_id, MatrixKind::Sparse),
        Algorithm::InnerABC => shifted_assignment(config, process_id),
    }
}

fn leader_of(config: &RunConfig, group_id: GroupId) -> ProcessId {
    match config.algorithm {
        Algorithm::ColumnA  => block_leader(config, group_id),
        Algorithm::InnerABC => shifted_leader(config, group_id),
    }
}

// ── Public entry points ──────────────────────────────────────────────────────
//
// The formulas above assume a valid configuration; every entry point checks
// it first.

/// Dense-side group of `process_id`.
pub fn dense_assignment(config: &RunConfig, process_id: ProcessId) -> Result<Assignment, ConfigError> {
    config.validate()?;
    config.check_process(process_id)?;
    Ok(dense_of(config, process_id))
}

/// Sparse-side group of `process_id`.
pub fn sparse_assignment(config: &RunConfig, process_id: ProcessId) -> Result<Assignment, ConfigError> {
    config.validate()?;
    config.check_process(process_id)?;
    Ok(sparse_of(config, process_id))
}

/// Leader of sparse group `group_id`.
pub fn sparse_leader(config: &RunConfig, group_id: GroupId) -> Result<ProcessId, ConfigError> {
    config.validate()?;
    check_group(group_id, config.num_replication_groups)?;
    Ok(leader_of(config, group_id))
}

/// Ring neighbours of sparse group `group_id`.
pub fn ring_neighbours(config: &RunConfig, group_id: GroupId) -> Result<RingNeighbours, ConfigError> {
    config.validate()?;
    let n = config.num_replication_groups;
    check_group(group_id, n)?;
    let neighbour = |g: GroupId| Neighbour {
        group_id: g,
        leader: leader_of(config, g),
        global_tag: global_tag(MatrixKind::Sparse, g, config),
    };
    Ok(RingNeighbours {
        pred: neighbour(predecessor(group_id, n)),
        succ: neighbour(successor(group_id, n)),
    })
}

/// Members of dense group `group_id`, in rank order.
pub fn dense_members(config: &RunConfig, group_id: GroupId) -> Result<Vec<ProcessId>, ConfigError> {
    config.validate()?;
    check_group(group_id, num_dense_groups(config))?;
    Ok((0..config.num_processes)
        .filter(|&p| dense_of(config, p).local_group_id == group_id)
        .collect())
}

/// Members of sparse group `group_id`, in rank order.
pub fn sparse_members(config: &RunConfig, group_id: GroupId) -> Result<Vec<ProcessId>, ConfigError> {
    config.validate()?;
    check_group(group_id, config.num_replication_groups)?;
    Ok((0..config.num_processes)
        .filter(|&p| sparse_of(config, p).local_group_id == group_id)
        .collect())
}

/// Number of dense groups: one per process under ColumnA.
pub fn num_dense_groups(config: &RunConfig) -> u32 {
    match config.algorithm {
        Algorithm::ColumnA  => config.num_processes,
        Algorithm::InnerABC => config.num_replication_groups,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
