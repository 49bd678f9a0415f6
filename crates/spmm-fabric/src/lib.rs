//! `spmm-fabric` — In-process message-passing substrate.
//!
//! Models a fixed-size pool of processes that coordinate only through
//! blocking, two-sided rendezvous operations: partitioning a communicator by
//! colour, bridging two disjoint groups through their leaders, and
//! synchronous point-to-point payload exchange across a bridge.
//!
//! ```text
//!   world (context 0)          split(color, key)          bridge(leader, world, remote, tag)
//! ┌───────────────────┐      ┌──────┐ ┌──────┐          ┌──────┐         ┌──────┐
//! │ 0 1 2 3 4 5 6 7 8 │ ───▶ │0 1 2 │ │3 4 5 │ ...  ──▶ │0 1 2 │ ◀─────▶ │  3   │
//! └───────────────────┘      └──────┘ └──────┘          └──────┘  tag t  └──────┘
//! ```
//!
//! Each process runs as one `tokio` task (see [`run_pool`]). Every channel
//! created by a collective call is registered with the [`Fabric`] and must be
//! released by each member; the world and solo channels are never
//! registered and cannot be released.

pub mod bridge;
pub mod codec;
pub mod communicator;
pub mod error;
pub mod pool;

mod rendezvous;

// ── Public re-exports ────────────────────────────────────────────────────────

pub use bridge::InterCommunicator;
pub use codec::{decode_payload, encode_payload};
pub use communicator::Communicator;
pub use error::{FabricError, Result};
pub use pool::{run_pool, Process};

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use spmm_types::ProcessId;

use crate::bridge::{BridgeAccept, BridgeKey, BridgeOffer, Envelope, MessageKey};
use crate::communicator::{CollectiveKey, GroupView, SplitEntry};
use crate::rendezvous::Rendezvous;

/// Identifier of a communication context. Unique for the lifetime of a
/// [`Fabric`].
pub type ContextId = u64;

/// Context of the whole-pool channel.
pub const WORLD_CONTEXT: ContextId = 0;

// ── Fabric ───────────────────────────────────────────────────────────────────

/// Shared rendezvous board for one process pool.
pub struct Fabric {
    size: u32,
    next_context: AtomicU64,
    aborted: AtomicBool,
    /// `context → processes still holding a handle`
    live: Mutex<HashMap<ContextId, HashSet<ProcessId>>>,

    pub(crate) splits: Rendezvous<CollectiveKey, SplitEntry, Option<GroupView>>,
    pub(crate) barriers: Rendezvous<CollectiveKey, (), ()>,
    pub(crate) bridges: Rendezvous<BridgeKey, BridgeOffer, BridgeAccept>,
    pub(crate) fanouts: Rendezvous<CollectiveKey, Option<BridgeAccept>, BridgeAccept>,
    pub(crate) messages: Rendezvous<MessageKey, Envelope, Option<Vec<u8>>>,
}

impl Fabric {
    /// Create the board for a pool of `size` processes.
    pub fn new(size: u32) -> Arc<Self> {
        Arc::new(Self {
            size,
            // 0 is the world, 1..=size are the solo channels.
            next_context: AtomicU64::new(u64::from(size) + 1),
            aborted: AtomicBool::new(false),
            live: Mutex::new(HashMap::new()),
            splits: Rendezvous::new("split"),
            barriers: Rendezvous::new("barrier"),
            bridges: Rendezvous::new("bridge"),
            fanouts: Rendezvous::new("bridge fan-out"),
            messages: Rendezvous::new("message"),
        })
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Number of registered channels that at least one process still holds.
    pub fn live_channels(&self) -> usize {
        self.live.lock().len()
    }

    /// Number of registered channels `process_id` has not released.
    pub fn held_by(&self, process_id: ProcessId) -> usize {
        self.live
            .lock()
            .values()
            .filter(|holders| holders.contains(&process_id))
            .count()
    }

    /// Tear down every pending and future collective call.
    ///
    /// Processes blocked in a rendezvous, or arriving at one later, fail with
    /// [`FabricError::Aborted`]. Irreversible.
    pub fn abort(&self) {
        if self.aborted.swap(true, Ordering::SeqCst) {
            return;
        }
        warn!(processes = self.size, "aborting process pool");
        self.splits.close();
        self.barriers.close();
        self.bridges.close();
        self.fanouts.close();
        self.messages.close();
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Context of the solo channel of `process_id`.
    pub(crate) fn solo_context(process_id: ProcessId) -> ContextId {
        1 + u64::from(process_id)
    }

    /// Allocate a context and record every member as a holder.
    pub(crate) fn register(&self, members: impl IntoIterator<Item = ProcessId>) -> ContextId {
        let context = self.next_context.fetch_add(1, Ordering::Relaxed);
        let holders: HashSet<ProcessId> = members.into_iter().collect();
        debug!(context, holders = holders.len(), "channel registered");
        self.live.lock().insert(context, holders);
        context
    }

    /// Drop `process_id`'s hold on `context`; the context disappears once the
    /// last holder releases it.
    pub(crate) fn release(&self, context: ContextId, process_id: ProcessId) -> Result<()> {
        let mut live = self.live.lock();
        let holders = live
            .get_mut(&context)
            .filter(|holders| holders.contains(&process_id))
            .ok_or(FabricError::NotOwned { context, process_id })?;
        holders.remove(&process_id);
        if holders.is_empty() {
            live.remove(&context);
            debug!(context, "channel fully released");
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
