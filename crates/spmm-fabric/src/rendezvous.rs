//! Blocking N-party rendezvous, the primitive behind every collective call.
//!
//! Each participant deposits a value under a shared key and waits. The last
//! arrival runs the resolver over all values (in arrival order) and hands
//! one result back to each participant. There is no timeout: a participant
//! that never arrives stalls the others forever.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::{FabricError, Result};

struct Arrival<T, R> {
    id: u64,
    value: T,
    tx: oneshot::Sender<R>,
}

struct Slot<T, R> {
    expected: usize,
    arrivals: Vec<Arrival<T, R>>,
}

struct Board<K, T, R> {
    closed: bool,
    slots: HashMap<K, Slot<T, R>>,
}

pub(crate) struct Rendezvous<K, T, R> {
    op: &'static str,
    next_id: AtomicU64,
    board: Mutex<Board<K, T, R>>,
}

/// Withdraws a participant whose future is dropped before the rendezvous
/// completes, so cancelled waits leave no slot behind.
struct Pending<'a, K: Eq + Hash, T, R> {
    rendezvous: &'a Rendezvous<K, T, R>,
    key: K,
    id: u64,
    armed: bool,
}

impl<K: Eq + Hash, T, R> Drop for Pending<'_, K, T, R> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut board = self.rendezvous.board.lock();
        if let Some(slot) = board.slots.get_mut(&self.key) {
            slot.arrivals.retain(|a| a.id != self.id);
            if slot.arrivals.is_empty() {
                board.slots.remove(&self.key);
            }
        }
    }
}

impl<K, T, R> Rendezvous<K, T, R>
where
    K: Eq + Hash + Clone + Debug,
{
    pub(crate) fn new(op: &'static str) -> Self {
        Self {
            op,
            next_id: AtomicU64::new(0),
            board: Mutex::new(Board {
                closed: false,
                slots: HashMap::new(),
            }),
        }
    }

    /// Join the rendezvous for `key`, expecting `expected` participants.
    ///
    /// If `resolve` fails, or returns fewer results than participants, the
    /// unanswered participants observe [`FabricError::Aborted`]. Dropping the
    /// returned future before it completes withdraws the caller.
    pub(crate) async fn arrive<F>(&self, key: K, expected: usize, value: T, resolve: F) -> Result<R>
    where
        F: FnOnce(Vec<T>) -> Result<Vec<R>>,
    {
        let (tx, rx) = oneshot::channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let complete = {
            let mut board = self.board.lock();
            if board.closed {
                return Err(FabricError::Aborted { op: self.op });
            }
            let slot = board.slots.entry(key.clone()).or_insert_with(|| Slot {
                expected,
                arrivals: Vec::with_capacity(expected),
            });
            if slot.expected != expected {
                let detail = format!(
                    "{key:?}: expected {} participants, caller expects {expected}",
                    slot.expected
                );
                // Dropping the slot releases everyone already waiting.
                board.slots.remove(&key);
                return Err(FabricError::RendezvousMismatch { op: self.op, detail });
            }
            slot.arrivals.push(Arrival { id, value, tx });
            if slot.arrivals.len() == expected {
                board.slots.remove(&key)
            } else {
                None
            }
        };

        if let Some(slot) = complete {
            let (values, senders): (Vec<T>, Vec<oneshot::Sender<R>>) =
                slot.arrivals.into_iter().map(|a| (a.value, a.tx)).unzip();
            let results = resolve(values)?;
            for (sender, result) in senders.into_iter().zip(results) {
                // A receiver can only be gone if its task was cancelled.
                let _ = sender.send(result);
            }
        }

        let mut pending = Pending {
            rendezvous: self,
            key,
            id,
            armed: true,
        };
        let outcome = rx.await.map_err(|_| FabricError::Aborted { op: self.op });
        pending.armed = false;
        outcome
    }

    /// Fail every waiting participant with [`FabricError::Aborted`] and
    /// refuse new ones.
    pub(crate) fn close(&self) {
        let mut board = self.board.lock();
        board.closed = true;
        board.slots.clear();
    }

    #[cfg(test)]
    pub(crate) fn pending(&self) -> usize {
        self.board.lock().slots.len()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    fn sum_all(values: Vec<u32>) -> Result<Vec<u32>> {
        let total: u32 = values.iter().sum();
        Ok(vec![total; values.len()])
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn all_participants_see_resolved_value() {
        let rv: Arc<Rendezvous<u8, u32, u32>> = Arc::new(Rendezvous::new("sum"));
        let mut handles = Vec::new();
        for v in 1..=4u32 {
            let rv = rv.clone();
            handles.push(tokio::spawn(async move { rv.arrive(7, 4, v, sum_all).await }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap().unwrap(), 10);
        }
        assert_eq!(rv.pending(), 0);
    }

    #[tokio::test]
    async fn incomplete_rendezvous_blocks() {
        let rv: Rendezvous<u8, u32, u32> = Rendezvous::new("sum");
        let waited = tokio::time::timeout(Duration::from_millis(50), rv.arrive(1, 2, 5, sum_all)).await;
        assert!(waited.is_err(), "single participant must not complete a 2-party rendezvous");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn expected_count_mismatch_aborts_waiters() {
        let rv: Arc<Rendezvous<u8, u32, u32>> = Arc::new(Rendezvous::new("sum"));
        let waiter = {
            let rv = rv.clone();
            tokio::spawn(async move { rv.arrive(3, 3, 1, sum_all).await })
        };
        // Give the waiter time to register.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let err = rv.arrive(3, 2, 1, sum_all).await.unwrap_err();
        assert!(matches!(err, FabricError::RendezvousMismatch { op: "sum", .. }));
        let aborted = waiter.await.unwrap().unwrap_err();
        assert!(matches!(aborted, FabricError::Aborted { op: "sum" }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failed_resolution_aborts_everyone() {
        let rv: Arc<Rendezvous<u8, u32, u32>> = Arc::new(Rendezvous::new("reject"));
        let reject = |_: Vec<u32>| -> Result<Vec<u32>> {
            Err(FabricError::RendezvousMismatch { op: "reject", detail: "no".into() })
        };
        let waiter = {
            let rv = rv.clone();
            tokio::spawn(async move { rv.arrive(0, 2, 1, reject).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rv.arrive(0, 2, 2, reject).await.is_err());
        assert!(matches!(waiter.await.unwrap(), Err(FabricError::Aborted { .. })));
    }

    #[tokio::test]
    async fn cancelled_wait_leaves_no_slot() {
        let rv: Rendezvous<u8, u32, u32> = Rendezvous::new("sum");
        let waited = tokio::time::timeout(Duration::from_millis(20), rv.arrive(9, 3, 1, sum_all)).await;
        assert!(waited.is_err());
        assert_eq!(rv.pending(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn close_fails_waiters_and_latecomers() {
        let rv: Arc<Rendezvous<u8, u32, u32>> = Arc::new(Rendezvous::new("sum"));
        let waiter = {
            let rv = rv.clone();
            tokio::spawn(async move { rv.arrive(5, 2, 1, sum_all).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        rv.close();
        assert!(matches!(waiter.await.unwrap(), Err(FabricError::Aborted { op: "sum" })));
        assert!(matches!(rv.arrive(6, 1, 1, sum_all).await, Err(FabricError::Aborted { .. })));
        assert_eq!(rv.pending(), 0);
    }
}
