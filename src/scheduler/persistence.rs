//! Durable mirror of the distribution state
//!
//! Concrete backends live in [`crate::storage`].

use super::error::SchedulerResult;
use super::state::DistributionState;

/// Durable key/value slot holding at most one [`DistributionState`]
///
/// Writes are best-effort from the scheduler's point of view: a failed
/// `save` is logged and the run continues in memory.
pub trait PersistenceAdapter: Send {
    /// Overwrite the stored state
    fn save(&self, state: &DistributionState) -> SchedulerResult<()>;

    /// Read the stored state, if any
    ///
    /// Unparseable data is reported as an error; the scheduler treats it as
    /// "nothing saved".
    fn load(&self) -> SchedulerResult<Option<DistributionState>>;

    /// Remove the stored state
    fn clear(&self) -> SchedulerResult<()>;
}

impl<P: PersistenceAdapter + ?Sized> PersistenceAdapter for Box<P> {
    fn save(&self, state: &DistributionState) -> SchedulerResult<()> {
        (**self).save(state)
    }

    fn load(&self) -> SchedulerResult<Option<DistributionState>> {
        (**self).load()
    }

    fn clear(&self) -> SchedulerResult<()> {
        (**self).clear()
    }
}
