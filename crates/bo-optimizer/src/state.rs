//! Handles shared between the coordinator and outside readers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use bo_types::{Configuration, ObjectiveDirection, Observation};

/// Cooperative cancellation flag, checked between batches.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub(crate) fn clear(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}

/// Append-only observation history.
///
/// Only the optimizer appends, and it does so under the write lock once per
/// batch; clones of the handle may read at any time.
#[derive(Debug, Clone, Default)]
pub struct ObservationLog {
    inner: Arc<RwLock<Vec<Observation>>>,
}

impl ObservationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Copy of every observation recorded so far, in append order.
    pub fn snapshot(&self) -> Vec<Observation> {
        self.inner.read().clone()
    }

    /// Best successful observation under `direction`; the earliest wins ties.
    pub fn best(&self, direction: ObjectiveDirection) -> Option<Observation> {
        let guard = self.inner.read();
        let mut best: Option<&Observation> = None;
        for obs in guard.iter() {
            let Some(value) = obs.objective else { continue };
            let better = match best.and_then(|b| b.objective) {
                None => true,
                Some(incumbent) => direction.improves(value, incumbent),
            };
            if better {
                best = Some(obs);
            }
        }
        best.cloned()
    }

    /// Encoded vectors and oriented objectives of the successful observations.
    pub(crate) fn training_data(&self, direction: ObjectiveDirection) -> (Vec<Vec<f64>>, Vec<f64>) {
        self.inner
            .read()
            .iter()
            .filter_map(|obs| obs.objective.map(|v| (obs.vector.clone(), direction.orient(v))))
            .unzip()
    }

    /// Configurations of the last `n` successful observations, newest first.
    pub(crate) fn recent_successes(&self, n: usize) -> Vec<Configuration> {
        self.inner
            .read()
            .iter()
            .rev()
            .filter(|obs| obs.is_completed())
            .take(n)
            .map(|obs| obs.config.clone())
            .collect()
    }

    pub(crate) fn extend(&self, batch: impl IntoIterator<Item = Observation>) {
        self.inner.write().extend(batch);
    }

    pub(crate) fn clear(&self) {
        self.inner.write().clear();
    }
}
