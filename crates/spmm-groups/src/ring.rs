//! Payload rotation along the ring of sparse groups.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use spmm_fabric::InterCommunicator;
use spmm_types::ProcessId;

use crate::establish::{bridge_order, BridgeStep};
use crate::error::{GroupError, Result};
use crate::sparse::SparseMatrixReplicationGroup;

/// Message tag for ring shifts.
pub const SHIFT_TAG: u32 = 1;

fn remote_rank(bridge: &InterCommunicator, leader: ProcessId, channel: &'static str) -> Result<u32> {
    bridge
        .remote_rank_of(leader)
        .ok_or(GroupError::NotAMember { process_id: leader, channel })
}

/// Pass `payload` from this group's leader to the successor leader and
/// return what the predecessor leader passed in.
///
/// Only leaders exchange data; other members get `None`. Sends are
/// synchronous, so leaders follow the same parity order as bridge creation.
/// A single-group ring hands the payload straight back.
pub async fn shift_to_successor<T>(group: &SparseMatrixReplicationGroup, payload: &T) -> Result<Option<T>>
where
    T: Serialize + DeserializeOwned + Clone,
{
    if !group.is_leader() {
        return Ok(None);
    }
    if group.is_self_loop() {
        return Ok(Some(payload.clone()));
    }

    let succ = group
        .succ_channel()
        .bridge()
        .ok_or(GroupError::MissingChannel("successor bridge"))?;
    let pred = group
        .pred_channel()
        .bridge()
        .ok_or(GroupError::MissingChannel("predecessor bridge"))?;
    let succ_rank = remote_rank(succ, group.succ_leader_process_id(), "successor bridge")?;
    let pred_rank = remote_rank(pred, group.pred_leader_process_id(), "predecessor bridge")?;

    let received = match bridge_order(group.local_group_id())[0] {
        BridgeStep::Successor => {
            succ.send(succ_rank, SHIFT_TAG, payload).await?;
            pred.recv(pred_rank, SHIFT_TAG).await?
        }
        BridgeStep::Predecessor => {
            let received = pred.recv(pred_rank, SHIFT_TAG).await?;
            succ.send(succ_rank, SHIFT_TAG, payload).await?;
            received
        }
    };
    debug!(
        process_id = group.process_id(),
        from = group.pred_leader_process_id(),
        to = group.succ_leader_process_id(),
        "ring shift complete"
    );
    Ok(Some(received))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use spmm_fabric::{run_pool, Fabric};
    use spmm_types::{Algorithm, RunConfig};

    use super::*;

    const GUARD: Duration = Duration::from_secs(10);

    async fn shift_group_ids(config: RunConfig) -> Vec<Option<u32>> {
        let fabric = Fabric::new(config.num_processes);
        let got = tokio::time::timeout(
            GUARD,
            run_pool(fabric.clone(), move |process| async move {
                let mut group = SparseMatrixReplicationGroup::of_process(&process, &config).await?;
                let received = shift_to_successor(&group, &group.local_group_id()).await?;
                group.free_comms()?;
                Ok::<_, GroupError>(received)
            }),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(fabric.live_channels(), 0);
        got.into_iter().map(|r| r.unwrap()).collect()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn leaders_receive_from_predecessor() {
        // Odd ring: 3 groups.
        let got = shift_group_ids(RunConfig::new(9, 3, Algorithm::ColumnA).unwrap()).await;
        assert_eq!(got[0], Some(2));
        assert_eq!(got[3], Some(0));
        assert_eq!(got[6], Some(1));
        assert_eq!(got[4], None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn shift_on_shifted_layout() {
        let config = RunConfig::new(18, 3, Algorithm::InnerABC).unwrap();
        let got = shift_group_ids(config).await;
        // Leaders of groups 0..6 are 0, 3, 1, 4, 2, 5.
        assert_eq!(got[0], Some(5));
        assert_eq!(got[3], Some(0));
        assert_eq!(got[1], Some(1));
        assert_eq!(got[5], Some(4));
        assert!(got[6..].iter().all(Option::is_none));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn self_loop_returns_payload() {
        let got = shift_group_ids(RunConfig::new(2, 2, Algorithm::ColumnA).unwrap()).await;
        assert_eq!(got, vec![Some(0), None]);
    }
}
