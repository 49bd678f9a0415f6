use tracing::debug;

use spmm_fabric::Process;
use spmm_types::{Algorithm, GroupId, GroupPlacement, MatrixKind, ProcessId, RunConfig};

use crate::channel::{self, Channel};
use crate::error::Result;
use crate::establish;
use crate::partition::{self, Assignment};

// ── Dense Matrix Replication Group ───────────────────────────────────────────

/// The dense-matrix group of one process.
///
/// Under ColumnA the dense matrix is not replicated: the group is the
/// process itself and the leaders channel is the whole pool. Under InnerABC
/// groups are contiguous blocks and the leaders channel holds one leader per
/// group; other processes have no leaders channel.
#[derive(Debug)]
pub struct DenseMatrixReplicationGroup {
    process_id: ProcessId,
    assignment: Assignment,
    local: Channel,
    leaders: Channel,
}

impl DenseMatrixReplicationGroup {
    /// Build the dense group of `process`. Collective over the whole pool.
    pub async fn of_process(process: &Process, config: &RunConfig) -> Result<Self> {
        crate::check_pool(process, config)?;
        let assignment = partition::dense_assignment(config, process.id())?;

        let group = match config.algorithm {
            Algorithm::ColumnA  => Self::unreplicated(process, assignment),
            Algorithm::InnerABC => Self::replicated(process, assignment).await?,
        };
        debug!(
            process_id = group.process_id,
            group = group.local_group_id(),
            leader = group.leader_process_id(),
            algorithm = %config.algorithm,
            "dense replication group formed"
        );
        Ok(group)
    }

    fn unreplicated(process: &Process, assignment: Assignment) -> Self {
        Self {
            process_id: process.id(),
            assignment,
            local: Channel::Solo(process.solo().clone()),
            leaders: Channel::Pool(process.world().clone()),
        }
    }

    async fn replicated(process: &Process, assignment: Assignment) -> Result<Self> {
        let local = establish::partition_local(process, &assignment).await?;
        let is_leader = process.id() == assignment.leader;
        let leaders = establish::gather_leaders(process, is_leader, assignment.local_group_id).await?;
        Ok(Self {
            process_id: process.id(),
            assignment,
            local: Channel::Group(local),
            leaders,
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

    pub fn local_channel(&self) -> &Channel {
        &self.local
    }

    /// [`Channel::Absent`] for non-leaders under InnerABC.
    pub fn leaders_channel(&self) -> &Channel {
        &self.leaders
    }

    pub fn placement(&self) -> GroupPlacement {
        GroupPlacement {
            kind: MatrixKind::Dense,
            local_group_id: self.local_group_id(),
            size: self.size(),
            leader: self.leader_process_id(),
            rank_in_group: self.rank_in_group(),
        }
    }

    /// Release the channels this group created. Call once, after the last
    /// use of the group; later calls do nothing.
    pub fn free_comms(&mut self) -> Result<()> {
        channel::release_all([&mut self.local, &mut self.leaders])?;
        debug!(process_id = self.process_id, "dense channels released");
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
