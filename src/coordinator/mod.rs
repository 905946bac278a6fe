//! Shared transform center used to steer the zoom.
//!
//! Workers cannot share memory, so the center lives in a coordination service with a single
//! conditional-update rule: a candidate replaces the current state only when it moves further
//! left (`x` smaller) *and* further up (`y` larger). The rule only ever improves the state and
//! can be safely re-applied, so concurrent proposals may race freely.

/// Blocking HTTP client for a remote coordinator.
pub mod client;
/// HTTP coordinator service (`GET /`, `POST /`).
pub mod server;

use parking_lot::Mutex;

use crate::foundation::error::ReelResult;

/// The centering point every worker reads before rendering.
#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformState {
    pub transform_x: f64,
    pub transform_y: f64,
}

impl TransformState {
    pub fn new(transform_x: f64, transform_y: f64) -> Self {
        Self {
            transform_x,
            transform_y,
        }
    }

    /// Return `true` when `self` qualifies as a replacement for `current`.
    ///
    /// NaN never qualifies because every comparison with it is false.
    pub fn improves_on(&self, current: &TransformState) -> bool {
        self.transform_x < current.transform_x && self.transform_y > current.transform_y
    }
}

/// Owner of the singleton [`TransformState`].
#[derive(Debug, Default)]
pub struct TransformStore {
    current: TransformState,
}

impl TransformStore {
    pub fn new(initial: TransformState) -> Self {
        Self { current: initial }
    }

    pub fn current(&self) -> TransformState {
        self.current
    }

    /// Apply `candidate` if it improves on the current state; return the resulting state.
    pub fn apply(&mut self, candidate: TransformState) -> TransformState {
        if candidate.improves_on(&self.current) {
            self.current = candidate;
        }
        self.current
    }
}

/// Consumed interface of the coordination service.
///
/// Calls are synchronous and block only the calling worker.
pub trait TransformCoordinator: Send + Sync {
    /// Read the current transform.
    fn fetch(&self) -> ReelResult<TransformState>;
    /// Propose a candidate; returns the (possibly unchanged) current state.
    fn propose(&self, candidate: TransformState) -> ReelResult<TransformState>;
}

/// In-process coordinator for thread workers and tests.
#[derive(Debug, Default)]
pub struct LocalCoordinator {
    store: Mutex<TransformStore>,
}

impl LocalCoordinator {
    pub fn new(initial: TransformState) -> Self {
        Self {
            store: Mutex::new(TransformStore::new(initial)),
        }
    }

    pub fn current(&self) -> TransformState {
        self.store.lock().current()
    }
}

impl TransformCoordinator for LocalCoordinator {
    fn fetch(&self) -> ReelResult<TransformState> {
        Ok(self.store.lock().current())
    }

    fn propose(&self, candidate: TransformState) -> ReelResult<TransformState> {
        Ok(self.store.lock().apply(candidate))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/coordinator/store.rs"]
mod tests;
