//! Subscribe / snapshot contract

use jobtrack_core::Subscription;
use std::sync::Arc;

/// Callback invoked when a view's snapshot may have changed
pub type ChangeCallback = Arc<dyn Fn() + Send + Sync>;

/// A value presentation code can read and be told about
///
/// `subscribe` never calls back with data: listeners re-read
/// [`snapshot`](Observable::snapshot), which is cheap when nothing changed.
pub trait Observable {
    /// What `snapshot` hands out
    type Snapshot;

    /// Register `on_change`; dropping the returned handle unsubscribes
    fn subscribe(&self, on_change: ChangeCallback) -> Subscription;

    /// Current value
    fn snapshot(&self) -> Self::Snapshot;

    /// [`subscribe`](Observable::subscribe) with a plain closure
    fn on_change<F>(&self, f: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
        Self: Sized,
    {
        self.subscribe(Arc::new(f))
    }
}
