// Serializable view of the groups a process belongs to.
//
// Produced by spmm-groups once the channels exist, aggregated by spmm-node.

use serde::{Deserialize, Serialize};

use crate::config::Algorithm;
use crate::{GroupId, ProcessId};

// ── Matrix Kind ──────────────────────────────────────────────────────────────

/// Which operand a replication group holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatrixKind {
    Dense,
    Sparse,
}

// ── Group Placement ──────────────────────────────────────────────────────────

/// Where a process sits inside one replication group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupPlacement {
    pub kind: MatrixKind,
    pub local_group_id: GroupId,
    pub size: u32,
    pub leader: ProcessId,
    pub rank_in_group: u32,
}

// ── Ring Links ───────────────────────────────────────────────────────────────

/// Ring neighbours of a sparse replication group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingLinks {
    pub pred_group_id: GroupId,
    pub pred_leader: ProcessId,
    pub succ_group_id: GroupId,
    pub succ_leader: ProcessId,
    /// `true` when the ring has a single group and both links are the
    /// process's own solo channel.
    pub self_loop: bool,
}

// ── Process Topology ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessTopology {
    pub process_id: ProcessId,
    pub dense: GroupPlacement,
    pub sparse: GroupPlacement,
    pub ring: RingLinks,
    /// Whether this process holds a handle on the dense leaders channel.
    pub in_leaders_channel: bool,
}

// ── Topology Report ──────────────────────────────────────────────────────────

/// Every process's topology for one run, ordered by process id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyReport {
    pub run_id: String,
    pub algorithm: Algorithm,
    pub num_processes: u32,
    pub num_replication_groups: u32,
    pub replication_group_size: u32,
    pub processes: Vec<ProcessTopology>,
    pub created_at: String,
}

impl TopologyReport {
    /// Member lists of every group of `kind`, indexed by local group id.
    pub fn members(&self, kind: MatrixKind) -> Vec<Vec<ProcessId>> {
        let mut groups: Vec<Vec<ProcessId>> = Vec::new();
        for p in &self.processes {
            let placement = match kind {
                MatrixKind::Dense  => &p.dense,
                MatrixKind::Sparse => &p.sparse,
            };
            let idx = placement.local_group_id as usize;
            if groups.len() <= idx {
                groups.resize_with(idx + 1, Vec::new);
            }
            groups[idx].push(p.process_id);
        }
        for g in &mut groups {
            g.sort_unstable();
        }
        groups
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn placement(kind: MatrixKind, group: u32, leader: u32) -> GroupPlacement {
        GroupPlacement {
            kind,
            local_group_id: group,
            size: 2,
            leader,
            rank_in_group: 0,
        }
    }

    fn process(pid: u32, dense: u32, sparse: u32) -> ProcessTopology {
        ProcessTopology {
            process_id: pid,
            dense: placement(MatrixKind::Dense, dense, dense * 2),
            sparse: placement(MatrixKind::Sparse, sparse, sparse),
            ring: RingLinks {
                pred_group_id: 0,
                pred_leader: 0,
                succ_group_id: 1,
                succ_leader: 1,
                self_loop: false,
            },
            in_leaders_channel: pid % 2 == 0,
        }
    }

    #[test]
    fn process_topology_serde() {
        let topo = process(3, 1, 1);
        let json = serde_json::to_string(&topo).unwrap();
        let round: ProcessTopology = serde_json::from_str(&json).unwrap();
        assert_eq!(round, topo);
        assert!(json.contains("\"kind\":\"Sparse\""));
    }

    #[test]
    fn report_groups_members_by_kind() {
        let report = TopologyReport {
            run_id: "run-1".into(),
            algorithm: Algorithm::InnerABC,
            num_processes: 4,
            num_replication_groups: 2,
            replication_group_size: 2,
            processes: vec![process(0, 0, 0), process(1, 0, 1), process(2, 1, 0), process(3, 1, 1)],
            created_at: "2025-01-01T00:00:00Z".into(),
        };
        assert_eq!(report.members(MatrixKind::Dense), vec![vec![0, 1], vec![2, 3]]);
        assert_eq!(report.members(MatrixKind::Sparse), vec![vec![0, 2], vec![1, 3]]);
    }
}
