//! Task registry
//!
//! Concurrency-safe table of live task records plus the id allocator.
//! Lookups hand out `Arc` clones so no map shard stays locked while an
//! action runs; actions are free to schedule or cancel tasks themselves.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::task::{TaskId, TaskRecord};

/// Table of schedulable tasks
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: DashMap<TaskId, Arc<TaskRecord>>,
    last_id: AtomicU64,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh id. Ids start at 1 and are never reused.
    pub fn allocate(&self) -> TaskId {
        TaskId::from_raw(self.last_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Insert a record under its own id. Fails if the id is taken.
    pub fn insert(&self, record: Arc<TaskRecord>) -> bool {
        match self.tasks.entry(record.id()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(record);
                true
            }
        }
    }

    pub fn lookup(&self, id: TaskId) -> Option<Arc<TaskRecord>> {
        self.tasks.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Remove and return a record. Of several racing callers at most one
    /// gets `Some`.
    pub fn remove(&self, id: TaskId) -> Option<Arc<TaskRecord>> {
        self.tasks.remove(&id).map(|(_, record)| record)
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.tasks.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Ids of all live tasks, ascending
    pub fn ids(&self) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> = self.tasks.iter().map(|entry| *entry.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Remove every record
    pub fn drain(&self) -> Vec<Arc<TaskRecord>> {
        self.ids().into_iter().filter_map(|id| self.remove(id)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;
    use std::time::Duration;

    use tokio::runtime::Handle;

    use crate::scheduler::timer::Timer;

    fn record(id: TaskId) -> Arc<TaskRecord> {
        Arc::new(TaskRecord::new(
            id,
            format!("task-{}", id),
            Arc::new(|| -> anyhow::Result<()> { Ok(()) }),
            Duration::ZERO,
            Duration::from_secs(1),
            Timer::new(&Handle::current(), Arc::new(|_: u64| {})),
        ))
    }

    #[test]
    fn test_allocate_starts_at_one() {
        let registry = TaskRegistry::new();
        assert_eq!(registry.allocate(), TaskId::from_raw(1));
        assert_eq!(registry.allocate(), TaskId::from_raw(2));
        assert_eq!(registry.allocate(), TaskId::from_raw(3));
    }

    #[test]
    fn test_concurrent_allocation_is_unique() {
        let registry = Arc::new(TaskRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    let ids: Vec<TaskId> = (0..500).map(|_| registry.allocate()).collect();
                    // Each thread sees its own ids strictly increasing
                    assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
                    ids
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(id.is_valid());
                assert!(seen.insert(id), "duplicate id {}", id);
            }
        }
        assert_eq!(seen.len(), 4000);
    }

    #[tokio::test]
    async fn test_insert_lookup_remove() {
        let registry = TaskRegistry::new();
        let id = registry.allocate();

        assert!(registry.insert(record(id)));
        assert!(registry.contains(id));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup(id).unwrap().name(), format!("task-{}", id));

        let removed = registry.remove(id).unwrap();
        assert_eq!(removed.id(), id);
        assert!(registry.lookup(id).is_none());
        assert!(registry.remove(id).is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_insert_rejected() {
        let registry = TaskRegistry::new();
        let id = registry.allocate();

        assert!(registry.insert(record(id)));
        assert!(!registry.insert(record(id)));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_racing_removes_observe_record_once() {
        let registry = Arc::new(TaskRegistry::new());

        for _ in 0..50 {
            let id = registry.allocate();
            registry.insert(record(id));

            let winners: usize = (0..4)
                .map(|_| {
                    let registry = Arc::clone(&registry);
                    thread::spawn(move || registry.remove(id).is_some())
                })
                .collect::<Vec<_>>()
                .into_iter()
                .map(|handle| handle.join().unwrap() as usize)
                .sum();

            assert_eq!(winners, 1);
        }
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_drain_and_ids() {
        let registry = TaskRegistry::new();
        let ids: Vec<TaskId> = (0..5).map(|_| registry.allocate()).collect();
        for id in ids.iter().rev() {
            registry.insert(record(*id));
        }

        assert_eq!(registry.ids(), ids);

        let drained = registry.drain();
        assert_eq!(drained.len(), 5);
        assert!(registry.is_empty());
    }
}
