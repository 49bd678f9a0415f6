use tracing::debug;

use spmm_fabric::Process;
use spmm_types::{GroupId, GroupPlacement, MatrixKind, ProcessId, RingLinks, RunConfig};

use crate::channel::{self, Channel};
use crate::error::Result;
use crate::establish;
use crate::partition::{self, Assignment, RingNeighbours};

// ── Sparse Matrix Replication Group ──────────────────────────────────────────

/// The sparse-matrix group of one process: one node of the ring of sparse
/// groups.
///
/// Every member holds the successor bridge. Only the leader holds the
/// predecessor bridge. With a single group both are the solo channel.
#[derive(Debug)]
pub struct SparseMatrixReplicationGroup {
    process_id: ProcessId,
    num_groups: u32,
    assignment: Assignment,
    neighbours: RingNeighbours,
    local: Channel,
    pred: Channel,
    succ: Channel,
}

impl SparseMatrixReplicationGroup {
    /// Build the sparse group of `process` and its ring bridges. Collective
    /// over the whole pool.
    pub async fn of_process(process: &Process, config: &RunConfig) -> Result<Self> {
        crate::check_pool(process, config)?;
        let assignment = partition::sparse_assignment(config, process.id())?;
        let neighbours = partition::ring_neighbours(config, assignment.local_group_id)?;

        let local = establish::partition_local(process, &assignment).await?;
        let ring = establish::establish_ring(
            process,
            &local,
            &assignment,
            &neighbours,
            config.num_replication_groups,
        )
        .await?;

        debug!(
            process_id = process.id(),
            group = assignment.local_group_id,
            leader = assignment.leader,
            pred = neighbours.pred.group_id,
            succ = neighbours.succ.group_id,
            algorithm = %config.algorithm,
            "sparse replication group formed"
        );
        Ok(Self {
            process_id: process.id(),
            num_groups: config.num_replication_groups,
            assignment,
            neighbours,
            local: Channel::Group(local),
            pred: ring.pred,
            succ: ring.succ,
        })
    }

    pub fn process_id(&self) -> ProcessId {
        self.process_id
    }

    pub fn local_group_id(&self) -> GroupId {
        self.assignment.local_group_id
    }

    pub fn size(&self) -> u32 {
        self.assignment.size
    }

    pub fn leader_process_id(&self) -> ProcessId {
        self.assignment.leader
    }

    pub fn is_leader(&self) -> bool {
        self.process_id == self.assignment.leader
    }

    pub fn rank_in_group(&self) -> u32 {
        self.assignment.rank_in_group
    }

    pub fn global_tag(&self) -> u32 {
        self.assignment.global_tag
    }

    pub fn num_groups(&self) -> u32 {
        self.num_groups
    }

    /// `true` when the ring is a single group.
    pub fn is_self_loop(&self) -> bool {
        self.num_groups == 1
    }

    pub fn pred_group_id(&self) -> GroupId {
        self.neighbours.pred.group_id
    }

    pub fn succ_group_id(&self) -> GroupId {
        self.neighbours.succ.group_id
    }

    pub fn pred_leader_process_id(&self) -> ProcessId {
        self.neighbours.pred.leader
    }

    /// Routing address for sends to the successor group.
    pub fn succ_leader_process_id(&self) -> ProcessId {
        self.neighbours.succ.leader
    }

    pub fn local_channel(&self) -> &Channel {
        &self.local
    }

    /// [`Channel::Absent`] for non-leaders of a real ring.
    pub fn pred_channel(&self) -> &Channel {
        &self.pred
    }

    pub fn succ_channel(&self) -> &Channel {
        &self.succ
    }

    pub fn placement(&self) -> GroupPlacement {
        GroupPlacement {
            kind: MatrixKind::Sparse,
            local_group_id: self.local_group_id(),
            size: self.size(),
            leader: self.leader_process_id(),
            rank_in_group: self.rank_in_group(),
        }
    }

    pub fn ring_links(&self) -> RingLinks {
        RingLinks {
            pred_group_id: self.pred_group_id(),
            pred_leader: self.pred_leader_process_id(),
            succ_group_id: self.succ_group_id(),
            succ_leader: self.succ_leader_process_id(),
            self_loop: self.is_self_loop(),
        }
    }

    /// Release the local channel and both bridges. Call once, after the last
    /// use of the group; later calls do nothing.
    pub fn free_comms(&mut self) -> Result<()> {
        channel::release_all([&mut self.local, &mut self.pred, &mut self.succ])?;
        debug!(process_id = self.process_id, "sparse channels released");
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
