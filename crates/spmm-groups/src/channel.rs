//! Channel handles held by a replication group, and their release.
//!
//! The whole-pool channel and the solo channel exist before any group is
//! formed and belong to the process, not to a group. They are tagged as
//! such, so releasing a group never touches them.

use spmm_fabric::{Communicator, FabricError, InterCommunicator};

/// A channel slot of a replication group.
///
/// Not `Clone`: an owned slot stands for exactly one hold on the channel.
#[derive(Debug)]
pub enum Channel {
    /// The whole-pool channel. Not owned.
    Pool(Communicator),
    /// The process's own singleton channel. Not owned.
    Solo(Communicator),
    /// This process takes no part in the channel.
    Absent,
    /// Intra-group channel created by a partition.
    Group(Communicator),
    /// Bridge to a disjoint group.
    Bridge(InterCommunicator),
}

impl Channel {
    /// Whether releasing this slot frees a fabric resource.
    pub fn is_owned(&self) -> bool {
        matches!(self, Self::Group(_) | Self::Bridge(_))
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Intra-group view, for every variant except bridges.
    pub fn communicator(&self) -> Option<&Communicator> {
        match self {
            Self::Pool(c) | Self::Solo(c) | Self::Group(c) => Some(c),
            Self::Absent | Self::Bridge(_) => None,
        }
    }

    pub fn bridge(&self) -> Option<&InterCommunicator> {
        match self {
            Self::Bridge(b) => Some(b),
            _ => None,
        }
    }

    /// Release an owned channel and leave the slot [`Channel::Absent`].
    ///
    /// Sentinels and empty slots are left as they are, so a second call is
    /// a no-op.
    pub fn release(&mut self) -> Result<(), FabricError> {
        match std::mem::replace(self, Self::Absent) {
            Self::Group(c) => c.release(),
            Self::Bridge(b) => b.release(),
            sentinel => {
                *self = sentinel;
                Ok(())
            }
        }
    }
}

/// Release every slot, reporting the first failure after trying them all.
pub(crate) fn release_all<'a>(
    channels: impl IntoIterator<Item = &'a mut Channel>,
) -> Result<(), FabricError> {
    let mut first_err = None;
    for channel in channels {
        if let Err(e) = channel.release() {
            first_err.get_or_insert(e);
        }
    }
    first_err.map_or(Ok(()), Err)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use spmm_fabric::{run_pool, Fabric};

    use super::*;

    #[test]
    fn sentinels_survive_release() {
        let fabric = Fabric::new(2);
        let p = fabric.process(1).unwrap();
        let mut pool = Channel::Pool(p.world().clone());
        let mut solo = Channel::Solo(p.solo().clone());
        let mut absent = Channel::Absent;

        release_all([&mut pool, &mut solo, &mut absent]).unwrap();
        assert!(matches!(pool, Channel::Pool(_)));
        assert!(matches!(solo, Channel::Solo(_)));
        assert!(absent.is_absent());
        assert!(!pool.is_owned());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn owned_channel_released_once() {
        let fabric = Fabric::new(2);
        let got = run_pool(fabric.clone(), |p| async move {
            let comm = p.world().split(Some(0), p.id()).await?.unwrap();
            let mut slot = Channel::Group(comm);
            assert!(slot.is_owned());
            slot.release()?;
            assert!(slot.is_absent());
            // Second release finds nothing to free.
            slot.release()?;
            Ok::<_, FabricError>(())
        })
        .await
        .unwrap();

        assert!(got.iter().all(|r| r.is_ok()));
        assert_eq!(fabric.live_channels(), 0);
    }

    // Resolves to the inherent const only when `T: Clone`.
    #[allow(dead_code)]
    struct CloneCheck<T>(std::marker::PhantomData<T>);

    trait NotClone {
        const IS_CLONE: bool = false;
    }

    impl<T> NotClone for CloneCheck<T> {}

    impl<T: Clone> CloneCheck<T> {
        const IS_CLONE: bool = true;
    }

    #[test]
    fn slots_cannot_be_duplicated() {
        assert!(CloneCheck::<Communicator>::IS_CLONE);
        assert!(!CloneCheck::<Channel>::IS_CLONE);
    }
}
