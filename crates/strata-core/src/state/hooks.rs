//! Predictive hooks notified after each successful update.

use super::entry::{StateDiff, StateEntry, StateSnapshot};

/// Everything a hook sees about one committed update.
///
/// `before` and `after` are whole-store snapshots taken around the write, so
/// `diffs` may also contain writes to other keys that raced with it.
#[derive(Debug, Clone)]
pub struct StateChange<V> {
    pub key: String,
    pub entry: StateEntry<V>,
    pub before: StateSnapshot<V>,
    pub after: StateSnapshot<V>,
    pub diffs: Vec<StateDiff<V>>,
}

/// Observer of committed updates, e.g. a latent-state predictor.
///
/// Called synchronously on the writer's thread after the write is visible.
/// Implementations must not write back into the same store from this call.
pub trait StateChangeHook<V>: Send + Sync {
    fn on_state_change(&self, change: &StateChange<V>);
}
