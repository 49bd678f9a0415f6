//! Inter-communicators: channels between two disjoint groups.
//!
//! Created by [`Communicator::bridge`](crate::Communicator::bridge). Each side
//! addresses the other by rank in the remote group. Point-to-point exchange
//! is synchronous: `send` returns only once the matching `recv` has taken
//! the payload.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use spmm_types::ProcessId;

use crate::codec;
use crate::error::{FabricError, Result};
use crate::{ContextId, Fabric};

// ── Rendezvous payloads ──────────────────────────────────────────────────────

/// Leaders meet on the unordered leader pair plus a tag, scoped to the
/// communicator the remote leader was named in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct BridgeKey {
    scope: ContextId,
    low: ProcessId,
    high: ProcessId,
    tag: u32,
}

impl BridgeKey {
    pub(crate) fn new(scope: ContextId, a: ProcessId, b: ProcessId, tag: u32) -> Self {
        Self {
            scope,
            low: a.min(b),
            high: a.max(b),
            tag,
        }
    }
}

#[derive(Debug)]
pub(crate) struct BridgeOffer {
    pub(crate) leader: ProcessId,
    pub(crate) group: Arc<[ProcessId]>,
}

#[derive(Debug, Clone)]
pub(crate) struct BridgeAccept {
    pub(crate) context: ContextId,
    pub(crate) remote: Arc<[ProcessId]>,
}

pub(crate) fn resolve_bridge(
    fabric: &Fabric,
    key: &BridgeKey,
    offers: Vec<BridgeOffer>,
) -> Result<Vec<BridgeAccept>> {
    let [a, b] = <[BridgeOffer; 2]>::try_from(offers).map_err(|offers| FabricError::RendezvousMismatch {
        op: "bridge",
        detail: format!("{key:?}: expected two leaders, got {}", offers.len()),
    })?;

    let leaders = (a.leader.min(b.leader), a.leader.max(b.leader));
    if a.leader == b.leader || leaders != (key.low, key.high) {
        return Err(FabricError::RendezvousMismatch {
            op: "bridge",
            detail: format!("{key:?}: leaders {} and {} do not name each other", a.leader, b.leader),
        });
    }

    let local: HashSet<ProcessId> = a.group.iter().copied().collect();
    if b.group.iter().any(|p| local.contains(p)) {
        return Err(FabricError::RendezvousMismatch {
            op: "bridge",
            detail: format!("{key:?}: bridged groups overlap"),
        });
    }

    let context = fabric.register(a.group.iter().chain(b.group.iter()).copied());
    Ok(vec![
        BridgeAccept { context, remote: b.group },
        BridgeAccept { context, remote: a.group },
    ])
}

/// Hand the leader's accepted bridge to every member of the local group.
pub(crate) fn resolve_fanout(
    contributions: Vec<Option<BridgeAccept>>,
    n: usize,
) -> Result<Vec<BridgeAccept>> {
    let mut accepted = contributions.into_iter().flatten();
    match (accepted.next(), accepted.next()) {
        (Some(accept), None) => Ok(vec![accept; n]),
        _ => Err(FabricError::RendezvousMismatch {
            op: "bridge fan-out",
            detail: "members disagree on the local leader".into(),
        }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct MessageKey {
    context: ContextId,
    src: ProcessId,
    dst: ProcessId,
    tag: u32,
}

#[derive(Debug)]
pub(crate) enum Envelope {
    Send(Vec<u8>),
    Recv,
}

fn resolve_message(envelopes: Vec<Envelope>) -> Result<Vec<Option<Vec<u8>>>> {
    let mismatch = || FabricError::RendezvousMismatch {
        op: "message",
        detail: "expected exactly one sender and one receiver".into(),
    };

    let n = envelopes.len();
    let mut payload = None;
    let mut receiver = None;
    for (idx, e) in envelopes.into_iter().enumerate() {
        match e {
            Envelope::Send(bytes) if payload.is_none() => payload = Some(bytes),
            Envelope::Recv if receiver.is_none() => receiver = Some(idx),
            _ => return Err(mismatch()),
        }
    }
    let (Some(bytes), Some(receiver)) = (payload, receiver) else {
        return Err(mismatch());
    };

    let mut results = vec![None; n];
    results[receiver] = Some(bytes);
    Ok(results)
}

// ── InterCommunicator ────────────────────────────────────────────────────────

/// One process's handle on a bridge between its group and a remote group.
#[derive(Clone)]
pub struct InterCommunicator {
    fabric: Arc<Fabric>,
    context: ContextId,
    local_rank: u32,
    local: Arc<[ProcessId]>,
    remote: Arc<[ProcessId]>,
}

impl fmt::Debug for InterCommunicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterCommunicator")
            .field("context", &self.context)
            .field("local_rank", &self.local_rank)
            .field("local", &self.local)
            .field("remote", &self.remote)
            .finish()
    }
}

impl InterCommunicator {
    pub(crate) fn new(
        fabric: Arc<Fabric>,
        context: ContextId,
        local_rank: u32,
        local: Arc<[ProcessId]>,
        remote: Arc<[ProcessId]>,
    ) -> Self {
        Self {
            fabric,
            context,
            local_rank,
            local,
            remote,
        }
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn local_rank(&self) -> u32 {
        self.local_rank
    }

    pub fn local_members(&self) -> &[ProcessId] {
        &self.local
    }

    pub fn remote_members(&self) -> &[ProcessId] {
        &self.remote
    }

    pub fn remote_size(&self) -> u32 {
        self.remote.len() as u32
    }

    pub fn process_id(&self) -> ProcessId {
        self.local[self.local_rank as usize]
    }

    /// Rank of `process_id` in the remote group, if it is a member.
    pub fn remote_rank_of(&self, process_id: ProcessId) -> Option<u32> {
        self.remote.iter().position(|&p| p == process_id).map(|r| r as u32)
    }

    fn remote_process(&self, remote_rank: u32) -> Result<ProcessId> {
        self.remote
            .get(remote_rank as usize)
            .copied()
            .ok_or(FabricError::UnknownRank { rank: remote_rank, size: self.remote_size() })
    }

    /// Send `payload` to the remote member at `remote_rank`. Blocks until
    /// the receiver takes it.
    pub async fn send<T: Serialize>(&self, remote_rank: u32, tag: u32, payload: &T) -> Result<()> {
        let dst = self.remote_process(remote_rank)?;
        let bytes = codec::encode_payload(payload)?;
        let key = MessageKey {
            context: self.context,
            src: self.process_id(),
            dst,
            tag,
        };
        debug!(context = self.context, src = key.src, dst, tag, bytes = bytes.len(), "send");
        self.fabric
            .messages
            .arrive(key, 2, Envelope::Send(bytes), resolve_message)
            .await?;
        Ok(())
    }

    /// Receive a payload from the remote member at `remote_rank`. Blocks
    /// until the sender arrives.
    pub async fn recv<T: DeserializeOwned>(&self, remote_rank: u32, tag: u32) -> Result<T> {
        let src = self.remote_process(remote_rank)?;
        let key = MessageKey {
            context: self.context,
            src,
            dst: self.process_id(),
            tag,
        };
        let bytes = self
            .fabric
            .messages
            .arrive(key, 2, Envelope::Recv, resolve_message)
            .await?
            .ok_or(FabricError::RendezvousMismatch {
                op: "message",
                detail: "receiver was handed no payload".into(),
            })?;
        debug!(context = self.context, src, dst = key.dst, tag, bytes = bytes.len(), "recv");
        codec::decode_payload(&bytes)
    }

    /// Give up this process's hold on the bridge.
    pub fn release(self) -> Result<()> {
        self.fabric.release(self.context, self.process_id())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::pool::run_pool;

    const GUARD: Duration = Duration::from_secs(10);

    #[test]
    fn bridge_key_is_symmetric() {
        assert_eq!(BridgeKey::new(0, 3, 6, 1), BridgeKey::new(0, 6, 3, 1));
        assert_ne!(BridgeKey::new(0, 3, 6, 1), BridgeKey::new(0, 3, 6, 2));
    }

    #[test]
    fn overlapping_groups_rejected() {
        let fabric = Fabric::new(4);
        let key = BridgeKey::new(0, 0, 1, 0);
        let offers = vec![
            BridgeOffer { leader: 0, group: Arc::from([0, 1]) },
            BridgeOffer { leader: 1, group: Arc::from([1]) },
        ];
        let err = resolve_bridge(&fabric, &key, offers).unwrap_err();
        assert!(err.to_string().contains("overlap"));
        assert_eq!(fabric.live_channels(), 0);
    }

    #[test]
    fn two_senders_rejected() {
        let err = resolve_message(vec![Envelope::Send(vec![1]), Envelope::Send(vec![2])]).unwrap_err();
        assert!(matches!(err, FabricError::RendezvousMismatch { op: "message", .. }));
    }

    /// Processes 0-1 form group A, 2-3 group B; leaders 0 and 2 bridge.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn group_bridge_and_message() {
        let fabric = Fabric::new(4);
        let got = tokio::time::timeout(
            GUARD,
            run_pool(fabric.clone(), |p| async move {
                let side = p.id() / 2;
                let local = p.world().split(Some(side), p.id()).await?.unwrap();
                let remote_leader = if side == 0 { 2 } else { 0 };
                let bridge = local.bridge(0, p.world(), remote_leader, 7).await?;
                let remote = bridge.remote_members().to_vec();

                let received = match p.id() {
                    0 => {
                        bridge.send(0, 1, &String::from("block-a")).await?;
                        None
                    }
                    2 => Some(bridge.recv::<String>(0, 1).await?),
                    _ => None,
                };

                bridge.release()?;
                local.release()?;
                Ok::<_, FabricError>((remote, received))
            }),
        )
        .await
        .unwrap()
        .unwrap();

        let got: Vec<_> = got.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(got[0].0, vec![2, 3]);
        assert_eq!(got[1].0, vec![2, 3]);
        assert_eq!(got[3].0, vec![0, 1]);
        assert_eq!(got[2].1.as_deref(), Some("block-a"));
        assert_eq!(fabric.live_channels(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn solo_leaders_bridge_with_distinct_tags() {
        // Two bridges between the same pair of leaders only stay apart by tag.
        let fabric = Fabric::new(2);
        let got = tokio::time::timeout(
            GUARD,
            run_pool(fabric.clone(), |p| async move {
                let other = 1 - p.id();
                let a = p.solo().bridge(0, p.world(), other, 10).await?;
                let b = p.solo().bridge(0, p.world(), other, 11).await?;
                let distinct = a.context() != b.context();
                a.release()?;
                b.release()?;
                Ok::<_, FabricError>(distinct)
            }),
        )
        .await
        .unwrap()
        .unwrap();

        assert!(got.into_iter().all(|r| r.unwrap()));
        assert_eq!(fabric.live_channels(), 0);
    }
}
