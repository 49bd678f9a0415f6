//! Channel establisher: the collective calls that turn a partition into
//! channels.
//!
//! Bridge creation is a blocking two-sided rendezvous between leaders. If
//! every sparse group bridged to its successor first, each leader would wait
//! on a successor that is itself waiting on its own successor, all the way
//! round the ring. Groups therefore alternate by parity:
//!
//! ```text
//!            even g                         odd g
//!   1. whole group ──▶ succ leader    1. leader ◀── pred group
//!   2. leader ◀── pred group          2. whole group ──▶ succ leader
//! ```
//!
//! The successor bridge of group `g` and the predecessor bridge of `g + 1`
//! are the same channel, matched under group `g`'s tag.

use tracing::debug;

use spmm_fabric::{Communicator, Process};
use spmm_types::GroupId;

use crate::channel::Channel;
use crate::error::{GroupError, Result};
use crate::partition::{Assignment, RingNeighbours};

/// Colour of the leaders in the dense leaders partition.
const LEADERS_COLOR: u32 = 0;

/// Rank of the leader inside its own solo channel.
const SOLO_LEADER_RANK: u32 = 0;

// ── Bridge order ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeStep {
    /// The whole local group bridges to the successor leader.
    Successor,
    /// The leader alone bridges to the predecessor group.
    Predecessor,
}

/// Order in which group `local_group_id` creates its two ring bridges.
pub fn bridge_order(local_group_id: GroupId) -> [BridgeStep; 2] {
    if local_group_id % 2 == 0 {
        [BridgeStep::Successor, BridgeStep::Predecessor]
    } else {
        [BridgeStep::Predecessor, BridgeStep::Successor]
    }
}

// ── Partitions ───────────────────────────────────────────────────────────────

/// Split the pool into the groups of one matrix kind, ordered by process id.
pub(crate) async fn partition_local(process: &Process, assignment: &Assignment) -> Result<Communicator> {
    process
        .world()
        .split(Some(assignment.local_group_id), process.id())
        .await?
        .ok_or(GroupError::MissingChannel("local group"))
}

/// One-shot gather of the dense group leaders, ordered by group id.
pub(crate) async fn gather_leaders(process: &Process, is_leader: bool, local_group_id: GroupId) -> Result<Channel> {
    let color = is_leader.then_some(LEADERS_COLOR);
    let leaders = process.world().split(color, local_group_id).await?;
    debug!(process_id = process.id(), is_leader, "leaders channel formed");
    Ok(leaders.map_or(Channel::Absent, Channel::Group))
}

// ── Ring bridges ─────────────────────────────────────────────────────────────

#[derive(Debug)]
pub(crate) struct RingBridges {
    pub(crate) pred: Channel,
    pub(crate) succ: Channel,
}

pub(crate) async fn establish_ring(
    process: &Process,
    local: &Communicator,
    assignment: &Assignment,
    neighbours: &RingNeighbours,
    num_groups: u32,
) -> Result<RingBridges> {
    let order = bridge_order(assignment.local_group_id);
    establish_ring_in_order(process, local, assignment, neighbours, num_groups, order).await
}

pub(crate) async fn establish_ring_in_order(
    process: &Process,
    local: &Communicator,
    assignment: &Assignment,
    neighbours: &RingNeighbours,
    num_groups: u32,
    order: [BridgeStep; 2],
) -> Result<RingBridges> {
    if num_groups == 1 {
        return Ok(RingBridges {
            pred: Channel::Solo(process.solo().clone()),
            succ: Channel::Solo(process.solo().clone()),
        });
    }

    let local_leader = local.rank_of(assignment.leader).ok_or(GroupError::NotAMember {
        process_id: assignment.leader,
        channel: "local group",
    })?;
    let is_leader = process.id() == assignment.leader;

    let mut bridges = RingBridges {
        pred: Channel::Absent,
        succ: Channel::Absent,
    };
    for step in order {
        match step {
            BridgeStep::Successor => {
                debug!(
                    process_id = process.id(),
                    group = assignment.local_group_id,
                    succ_leader = neighbours.succ.leader,
                    tag = assignment.global_tag,
                    "bridging to successor"
                );
                let bridge = local
                    .bridge(local_leader, process.world(), neighbours.succ.leader, assignment.global_tag)
                    .await?;
                bridges.succ = Channel::Bridge(bridge);
            }
            BridgeStep::Predecessor if is_leader => {
                debug!(
                    process_id = process.id(),
                    group = assignment.local_group_id,
                    pred_leader = neighbours.pred.leader,
                    tag = neighbours.pred.global_tag,
                    "bridging to predecessor"
                );
                let bridge = process
                    .solo()
                    .bridge(SOLO_LEADER_RANK, process.world(), neighbours.pred.leader, neighbours.pred.global_tag)
                    .await?;
                bridges.pred = Channel::Bridge(bridge);
            }
            BridgeStep::Predecessor => {}
        }
    }
    Ok(bridges)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use spmm_fabric::{run_pool, Fabric};
    use spmm_types::{Algorithm, RunConfig};

    use super::*;
    use crate::channel;
    use crate::partition;

    const GUARD: Duration = Duration::from_secs(10);

    async fn build_ring(process: Process, config: RunConfig, order: Option<[BridgeStep; 2]>) -> Result<Vec<u32>> {
        let assignment = partition::sparse_assignment(&config, process.id())?;
        let local = partition_local(&process, &assignment).await?;
        let neighbours = partition::ring_neighbours(&config, assignment.local_group_id)?;
        let order = order.unwrap_or_else(|| bridge_order(assignment.local_group_id));
        let mut ring = establish_ring_in_order(
            &process,
            &local,
            &assignment,
            &neighbours,
            config.num_replication_groups,
            order,
        )
        .await?;

        let succ_remote = ring.succ.bridge().map(|b| b.remote_members().to_vec()).unwrap_or_default();
        let mut local = Channel::Group(local);
        channel::release_all([&mut ring.pred, &mut ring.succ, &mut local])?;
        Ok(succ_remote)
    }

    #[test]
    fn parity_alternates() {
        assert_eq!(bridge_order(0), [BridgeStep::Successor, BridgeStep::Predecessor]);
        assert_eq!(bridge_order(1), [BridgeStep::Predecessor, BridgeStep::Successor]);
        assert_eq!(bridge_order(4), bridge_order(0));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn parity_order_completes_on_odd_and_even_rings() {
        for (p, c, algorithm) in [
            (9, 3, Algorithm::ColumnA),
            (8, 2, Algorithm::ColumnA),
            (2, 1, Algorithm::ColumnA),
            (18, 3, Algorithm::InnerABC),
            (8, 2, Algorithm::InnerABC),
        ] {
            let config = RunConfig::new(p, c, algorithm).unwrap();
            let fabric = Fabric::new(p);
            let got = tokio::time::timeout(
                GUARD,
                run_pool(fabric.clone(), move |process| build_ring(process, config, None)),
            )
            .await
            .unwrap_or_else(|_| panic!("ring of {p}/{c} {algorithm} hung"))
            .unwrap();

            for (pid, remote) in got.into_iter().enumerate() {
                let assignment = partition::sparse_assignment(&config, pid as u32).unwrap();
                let succ = partition::ring_neighbours(&config, assignment.local_group_id).unwrap().succ;
                assert_eq!(remote.unwrap(), vec![succ.leader]);
            }
            assert_eq!(fabric.live_channels(), 0, "{p}/{c} {algorithm} leaked channels");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn successor_first_everywhere_hangs() {
        let config = RunConfig::new(9, 3, Algorithm::ColumnA).unwrap();
        let naive = Some([BridgeStep::Successor, BridgeStep::Predecessor]);
        let outcome = tokio::time::timeout(
            Duration::from_millis(300),
            run_pool(Fabric::new(9), move |process| build_ring(process, config, naive)),
        )
        .await;
        assert!(outcome.is_err(), "every leader waits on its successor");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn single_group_ring_is_solo() {
        let config = RunConfig::new(3, 3, Algorithm::ColumnA).unwrap();
        let fabric = Fabric::new(3);
        let got = run_pool(fabric.clone(), move |process| async move {
            let assignment = partition::sparse_assignment(&config, process.id())?;
            let local = partition_local(&process, &assignment).await?;
            let neighbours = partition::ring_neighbours(&config, 0)?;
            let ring = establish_ring(&process, &local, &assignment, &neighbours, 1).await?;
            local.release()?;
            Ok::<_, GroupError>(matches!((ring.pred, ring.succ), (Channel::Solo(_), Channel::Solo(_))))
        })
        .await
        .unwrap();

        assert!(got.into_iter().all(|r| r.unwrap()));
        assert_eq!(fabric.live_channels(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn only_leaders_join_leaders_channel() {
        let fabric = Fabric::new(6);
        let got = run_pool(fabric.clone(), |process| async move {
            let group = process.id() / 2;
            let is_leader = process.id() % 2 == 0;
            let mut leaders = gather_leaders(&process, is_leader, group).await?;
            let members = leaders.communicator().map(|c| c.members().to_vec());
            leaders.release()?;
            Ok::<_, GroupError>(members)
        })
        .await
        .unwrap();

        let got: Vec<_> = got.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(got[0], Some(vec![0, 2, 4]));
        assert_eq!(got[4], Some(vec![0, 2, 4]));
        assert_eq!(got[1], None);
        assert_eq!(fabric.live_channels(), 0);
    }
}
