//! Observable views over the store and the orchestrator
//!
//! Snapshots are cached and handed out as `Arc`s: two snapshots taken with
//! no relevant change in between are the same allocation, so consumers can
//! compare by pointer.

use crate::observable::{ChangeCallback, Observable};
use jobtrack_core::{Subscription, Task, TaskId, TaskStore};
use jobtrack_poller::PollingOrchestrator;
use parking_lot::Mutex;
use std::sync::Arc;

/// Return the cached `Arc` when `fresh` equals it, otherwise cache `fresh`
fn reuse_or_replace<T: PartialEq>(cache: &Mutex<Arc<T>>, fresh: T) -> Arc<T> {
    let mut cached = cache.lock();
    if **cached != fresh {
        *cached = Arc::new(fresh);
    }
    Arc::clone(&cached)
}

/// Every task, oldest first
#[derive(Debug)]
pub struct TaskListView {
    store: Option<Arc<TaskStore>>,
    /// Store version the cached list was read at
    cache: Mutex<(Option<u64>, Arc<Vec<Task>>)>,
}

impl TaskListView {
    pub(crate) fn new(store: Option<Arc<TaskStore>>) -> Self {
        Self {
            store,
            cache: Mutex::new((None, Arc::new(Vec::new()))),
        }
    }
}

impl Observable for TaskListView {
    type Snapshot = Arc<Vec<Task>>;

    fn subscribe(&self, on_change: ChangeCallback) -> Subscription {
        match &self.store {
            Some(store) => store.subscribe(move |_| on_change()),
            None => Subscription::inert(),
        }
    }

    fn snapshot(&self) -> Arc<Vec<Task>> {
        let mut cache = self.cache.lock();
        let Some(store) = &self.store else {
            return Arc::clone(&cache.1);
        };

        let version = store.version();
        if cache.0 != Some(version) {
            // A mutation landing between the two reads only makes the list
            // newer than its tag, which forces one extra refresh later.
            *cache = (Some(version), Arc::new(store.list()));
        }
        Arc::clone(&cache.1)
    }
}

/// One task by id
///
/// Listeners fire only for changes to this id.
#[derive(Debug)]
pub struct TaskView {
    store: Option<Arc<TaskStore>>,
    id: TaskId,
    cache: Mutex<Arc<Option<Task>>>,
}

impl TaskView {
    pub(crate) fn new(store: Option<Arc<TaskStore>>, id: TaskId) -> Self {
        Self {
            store,
            id,
            cache: Mutex::new(Arc::new(None)),
        }
    }

    /// Task this view follows
    #[must_use]
    pub fn id(&self) -> &TaskId {
        &self.id
    }
}

impl Observable for TaskView {
    type Snapshot = Arc<Option<Task>>;

    fn subscribe(&self, on_change: ChangeCallback) -> Subscription {
        let Some(store) = &self.store else {
            return Subscription::inert();
        };
        let id = self.id.clone();
        store.subscribe(move |event| {
            if event.affects(id.as_str()) {
                on_change();
            }
        })
    }

    fn snapshot(&self) -> Arc<Option<Task>> {
        let fresh = self.store.as_ref().and_then(|s| s.get(&self.id));
        reuse_or_replace(&self.cache, fresh)
    }
}

/// Ids currently being polled, sorted
#[derive(Debug)]
pub struct PollingSetView {
    orchestrator: Option<PollingOrchestrator>,
    cache: Mutex<Arc<Vec<TaskId>>>,
}

impl PollingSetView {
    pub(crate) fn new(orchestrator: Option<PollingOrchestrator>) -> Self {
        Self {
            orchestrator,
            cache: Mutex::new(Arc::new(Vec::new())),
        }
    }
}

impl Observable for PollingSetView {
    type Snapshot = Arc<Vec<TaskId>>;

    fn subscribe(&self, on_change: ChangeCallback) -> Subscription {
        match &self.orchestrator {
            Some(orchestrator) => orchestrator.subscribe_sessions(move |_| on_change()),
            None => Subscription::inert(),
        }
    }

    fn snapshot(&self) -> Arc<Vec<TaskId>> {
        let fresh = self
            .orchestrator
            .as_ref()
            .map(PollingOrchestrator::active_ids)
            .unwrap_or_default();
        reuse_or_replace(&self.cache, fresh)
    }
}

/// Whether one id is being polled
///
/// Listeners fire only when this id's session starts or stops.
#[derive(Debug)]
pub struct PollingFlagView {
    orchestrator: Option<PollingOrchestrator>,
    id: TaskId,
}

impl PollingFlagView {
    pub(crate) fn new(orchestrator: Option<PollingOrchestrator>, id: TaskId) -> Self {
        Self { orchestrator, id }
    }

    /// Task this view follows
    #[must_use]
    pub fn id(&self) -> &TaskId {
        &self.id
    }
}

impl Observable for PollingFlagView {
    type Snapshot = bool;

    fn subscribe(&self, on_change: ChangeCallback) -> Subscription {
        let Some(orchestrator) = &self.orchestrator else {
            return Subscription::inert();
        };
        let id = self.id.clone();
        orchestrator.subscribe_sessions(move |event| {
            if *event.task_id() == id {
                on_change();
            }
        })
    }

    fn snapshot(&self) -> bool {
        self.orchestrator
            .as_ref()
            .is_some_and(|o| o.is_polling(&self.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobtrack_core::{NewTask, TaskPatch, TaskStatus, TaskType};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, ChangeCallback) {
        let count = Arc::new(AtomicUsize::new(0));
        let hits = Arc::clone(&count);
        (
            count,
            Arc::new(move || {
                hits.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    #[test]
    fn list_snapshot_is_stable_until_store_changes() {
        let store = Arc::new(TaskStore::in_memory());
        let view = TaskListView::new(Some(Arc::clone(&store)));

        let empty = view.snapshot();
        assert!(Arc::ptr_eq(&empty, &view.snapshot()));

        store.add(NewTask::new("t1", TaskType::Analysis));
        let one = view.snapshot();
        assert!(!Arc::ptr_eq(&empty, &one));
        assert_eq!(one.len(), 1);
        assert!(Arc::ptr_eq(&one, &view.snapshot()));
    }

    #[test]
    fn task_view_ignores_other_ids() {
        let store = Arc::new(TaskStore::in_memory());
        store.add(NewTask::new("x", TaskType::Analysis));
        store.add(NewTask::new("y", TaskType::Analysis));

        let view = TaskView::new(Some(Arc::clone(&store)), "x".into());
        let (hits, on_change) = counter();
        let _sub = view.subscribe(on_change);
        let before = view.snapshot();

        store.update("y", &TaskPatch::status(TaskStatus::Processing));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(Arc::ptr_eq(&before, &view.snapshot()));

        store.update("x", &TaskPatch::status(TaskStatus::Processing));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        let after = view.snapshot();
        assert_eq!(Option::as_ref(&after).map(|t| t.status), Some(TaskStatus::Processing));
    }

    #[test]
    fn dropping_subscription_silences_view() {
        let store = Arc::new(TaskStore::in_memory());
        let view = TaskListView::new(Some(Arc::clone(&store)));
        let (hits, on_change) = counter();

        let sub = view.subscribe(on_change);
        store.add(NewTask::new("a", TaskType::Analysis));
        drop(sub);
        store.add(NewTask::new("b", TaskType::Analysis));

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn detached_views_return_defaults() {
        let (hits, on_change) = counter();

        let list = TaskListView::new(None);
        let _s1 = list.subscribe(Arc::clone(&on_change));
        assert!(list.snapshot().is_empty());
        assert!(Arc::ptr_eq(&list.snapshot(), &list.snapshot()));

        assert!(TaskView::new(None, "t".into()).snapshot().is_none());
        assert!(PollingSetView::new(None).snapshot().is_empty());
        assert!(!PollingFlagView::new(None, "t".into()).snapshot());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
