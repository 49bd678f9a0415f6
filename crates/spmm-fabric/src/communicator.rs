//! Intra-group communicators.
//!
//! A [`Communicator`] is one process's handle on a group: the context id,
//! the caller's rank and the ordered member list. Collective calls on the
//! same communicator are matched across members by issue order, so every
//! member must issue them in the same sequence.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::debug;

use spmm_types::ProcessId;

use crate::bridge::{self, BridgeKey, BridgeOffer, InterCommunicator};
use crate::error::{FabricError, Result};
use crate::{ContextId, Fabric, WORLD_CONTEXT};

// ── Rendezvous payloads ──────────────────────────────────────────────────────

/// Matches the n-th collective call on one context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct CollectiveKey {
    pub(crate) context: ContextId,
    pub(crate) seq: u64,
}

#[derive(Debug)]
pub(crate) struct SplitEntry {
    parent_rank: u32,
    process_id: ProcessId,
    color: Option<u32>,
    key: u32,
}

/// A member's view of a freshly created group.
#[derive(Debug, Clone)]
pub(crate) struct GroupView {
    context: ContextId,
    rank: u32,
    members: Arc<[ProcessId]>,
}

// ── Communicator ─────────────────────────────────────────────────────────────

struct Shared {
    fabric: Arc<Fabric>,
    context: ContextId,
    rank: u32,
    members: Arc<[ProcessId]>,
    seq: AtomicU64,
}

/// One process's handle on an intra-group channel.
///
/// Clones share the collective sequence counter, so they are the same
/// handle as far as call matching is concerned.
#[derive(Clone)]
pub struct Communicator {
    shared: Arc<Shared>,
}

impl fmt::Debug for Communicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Communicator")
            .field("context", &self.shared.context)
            .field("rank", &self.shared.rank)
            .field("members", &self.shared.members)
            .finish()
    }
}

impl Communicator {
    pub(crate) fn new(fabric: Arc<Fabric>, context: ContextId, rank: u32, members: Arc<[ProcessId]>) -> Self {
        Self {
            shared: Arc::new(Shared {
                fabric,
                context,
                rank,
                members,
                seq: AtomicU64::new(0),
            }),
        }
    }

    pub(crate) fn world(fabric: Arc<Fabric>, process_id: ProcessId) -> Self {
        let members: Arc<[ProcessId]> = (0..fabric.size()).collect();
        Self::new(fabric, WORLD_CONTEXT, process_id, members)
    }

    pub(crate) fn solo(fabric: Arc<Fabric>, process_id: ProcessId) -> Self {
        Self::new(fabric, Fabric::solo_context(process_id), 0, Arc::from([process_id]))
    }

    pub(crate) fn fabric(&self) -> &Arc<Fabric> {
        &self.shared.fabric
    }

    pub fn context(&self) -> ContextId {
        self.shared.context
    }

    /// Rank of the calling process within this group.
    pub fn rank(&self) -> u32 {
        self.shared.rank
    }

    pub fn size(&self) -> u32 {
        self.shared.members.len() as u32
    }

    /// Pool-wide process ids of the members, indexed by rank.
    pub fn members(&self) -> &[ProcessId] {
        &self.shared.members
    }

    /// Pool-wide id of the calling process.
    pub fn process_id(&self) -> ProcessId {
        self.shared.members[self.shared.rank as usize]
    }

    /// Pool-wide id of the member at `rank`.
    pub fn process_at(&self, rank: u32) -> Result<ProcessId> {
        self.shared
            .members
            .get(rank as usize)
            .copied()
            .ok_or(FabricError::UnknownRank { rank, size: self.size() })
    }

    /// Rank of `process_id` in this group, if it is a member.
    pub fn rank_of(&self, process_id: ProcessId) -> Option<u32> {
        self.shared
            .members
            .iter()
            .position(|&p| p == process_id)
            .map(|r| r as u32)
    }

    fn next_collective(&self) -> CollectiveKey {
        CollectiveKey {
            context: self.shared.context,
            seq: self.shared.seq.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Partition this group by `color`, ordering each part by `key` and then
    /// by current rank. Callers passing `None` take part in the rendezvous
    /// but receive no channel.
    ///
    /// Collective: blocks until every member has called `split`.
    pub async fn split(&self, color: Option<u32>, key: u32) -> Result<Option<Communicator>> {
        let collective = self.next_collective();
        let entry = SplitEntry {
            parent_rank: self.rank(),
            process_id: self.process_id(),
            color,
            key,
        };
        debug!(
            context = collective.context,
            seq = collective.seq,
            process_id = entry.process_id,
            ?color,
            key,
            "split"
        );

        let fabric = self.fabric().clone();
        let view = self
            .fabric()
            .splits
            .arrive(collective, self.members().len(), entry, |entries| {
                resolve_split(&fabric, entries)
            })
            .await?;

        Ok(view.map(|v| Communicator::new(self.fabric().clone(), v.context, v.rank, v.members)))
    }

    /// Collective: blocks until every member has called `barrier`.
    pub async fn barrier(&self) -> Result<()> {
        let collective = self.next_collective();
        let n = self.members().len();
        self.fabric()
            .barriers
            .arrive(collective, n, (), |_| Ok(vec![(); n]))
            .await
    }

    /// Connect this group to a disjoint remote group.
    ///
    /// Every member calls with the same `local_leader` (a rank in `self`). The
    /// local leader meets the remote leader (`remote_leader`, a rank in
    /// `peer`) under `tag`; the remote leader must name the local leader and
    /// the same tag. Concurrent bridges between the same two leaders need
    /// distinct tags.
    ///
    /// Collective over `self`, plus a two-sided rendezvous between leaders.
    pub async fn bridge(
        &self,
        local_leader: u32,
        peer: &Communicator,
        remote_leader: u32,
        tag: u32,
    ) -> Result<InterCommunicator> {
        let collective = self.next_collective();
        self.process_at(local_leader)?;

        let accepted = if self.rank() == local_leader {
            let me = self.process_id();
            let remote = peer.process_at(remote_leader)?;
            let key = BridgeKey::new(peer.context(), me, remote, tag);
            debug!(process_id = me, remote_leader = remote, tag, "bridge: leader waiting for peer");

            let fabric = self.fabric().clone();
            let offer = BridgeOffer {
                leader: me,
                group: self.shared.members.clone(),
            };
            let accept = self
                .fabric()
                .bridges
                .arrive(key, 2, offer, move |offers| bridge::resolve_bridge(&fabric, &key, offers))
                .await?;
            debug!(process_id = me, context = accept.context, "bridge: leaders matched");
            Some(accept)
        } else {
            None
        };

        let n = self.members().len();
        let accept = self
            .fabric()
            .fanouts
            .arrive(collective, n, accepted, |contributions| {
                bridge::resolve_fanout(contributions, n)
            })
            .await?;

        Ok(InterCommunicator::new(
            self.fabric().clone(),
            accept.context,
            self.rank(),
            self.shared.members.clone(),
            accept.remote,
        ))
    }

    /// Give up this process's hold on the channel.
    ///
    /// Fails with [`FabricError::NotOwned`] for the world and solo channels
    /// and for a channel this process already released.
    pub fn release(self) -> Result<()> {
        self.fabric().release(self.context(), self.process_id())
    }
}

fn resolve_split(fabric: &Fabric, entries: Vec<SplitEntry>) -> Result<Vec<Option<GroupView>>> {
    let distinct: HashSet<u32> = entries.iter().map(|e| e.parent_rank).collect();
    if distinct.len() != entries.len() {
        return Err(FabricError::RendezvousMismatch {
            op: "split",
            detail: "a rank joined the same split twice".into(),
        });
    }

    // color → [(key, parent_rank, arrival index)]
    let mut parts: BTreeMap<u32, Vec<(u32, u32, usize)>> = BTreeMap::new();
    for (idx, e) in entries.iter().enumerate() {
        if let Some(color) = e.color {
            parts.entry(color).or_default().push((e.key, e.parent_rank, idx));
        }
    }

    let mut views: Vec<Option<GroupView>> = vec![None; entries.len()];
    for (_, mut part) in parts {
        part.sort_unstable();
        let members: Arc<[ProcessId]> = part.iter().map(|&(_, _, idx)| entries[idx].process_id).collect();
        let context = fabric.register(members.iter().copied());
        for (rank, &(_, _, idx)) in part.iter().enumerate() {
            views[idx] = Some(GroupView {
                context,
                rank: rank as u32,
                members: members.clone(),
            });
        }
    }
    Ok(views)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
