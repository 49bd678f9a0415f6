//! Process pool bootstrap.
//!
//! Every process is a `tokio` task holding its own [`Process`] handle. The
//! handle exposes the two channels that exist before any collective call:
//! the whole-pool channel and the process's own solo channel.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tracing::{error, info};

use spmm_types::ProcessId;

use crate::communicator::Communicator;
use crate::error::{FabricError, Result};
use crate::Fabric;

/// Identity and ambient channels of one process in the pool.
#[derive(Debug, Clone)]
pub struct Process {
    id: ProcessId,
    world: Communicator,
    solo: Communicator,
}

impl Process {
    pub fn id(&self) -> ProcessId {
        self.id
    }

    pub fn pool_size(&self) -> u32 {
        self.world.size()
    }

    /// Channel spanning the whole pool. Never released.
    pub fn world(&self) -> &Communicator {
        &self.world
    }

    /// Channel containing only this process. Never released.
    pub fn solo(&self) -> &Communicator {
        &self.solo
    }

    pub fn fabric(&self) -> &Arc<Fabric> {
        self.world.fabric()
    }
}

impl Fabric {
    /// Handle for the process with pool rank `id`.
    pub fn process(self: &Arc<Self>, id: ProcessId) -> Result<Process> {
        if id >= self.size() {
            return Err(FabricError::UnknownRank { rank: id, size: self.size() });
        }
        Ok(Process {
            id,
            world: Communicator::world(self.clone(), id),
            solo: Communicator::solo(self.clone(), id),
        })
    }
}

/// Run `body` once per process, each on its own task, and collect the
/// results in process order.
///
/// The first process to return an error aborts the fabric, so peers blocked
/// in a collective call fail with [`FabricError::Aborted`] instead of
/// waiting forever. A panicking process aborts the fabric as well and fails
/// the whole pool with [`FabricError::Join`].
pub async fn run_pool<F, Fut, T, E>(fabric: Arc<Fabric>, body: F) -> Result<Vec<std::result::Result<T, E>>>
where
    F: Fn(Process) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: fmt::Display + Send + 'static,
{
    let size = fabric.size();
    info!(processes = size, "starting process pool");

    let body = Arc::new(body);
    let mut tasks = Vec::with_capacity(size as usize);
    for id in 0..size {
        let process = fabric.process(id)?;
        let body = body.clone();
        let fabric = fabric.clone();
        tasks.push(tokio::spawn(async move {
            let outcome = body(process).await;
            if let Err(e) = &outcome {
                if !fabric.is_aborted() {
                    error!(process_id = id, error = %e, "process failed");
                }
                fabric.abort();
            }
            outcome
        }));
    }

    futures::future::try_join_all(tasks).await.map_err(|e| {
        fabric.abort();
        FabricError::Join(e.to_string())
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
