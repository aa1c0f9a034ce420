//! InMemoryFleet - in-process workers と、その手持ちタスクの台帳
//!
//! Each worker owns a `WorkerLedger` and moves task ids between the three
//! live categories as it claims, waits on, and runs them. The fleet answers
//! `WorkerInspector` queries by reading every ledger.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::domain::{CoreError, QueueCategory, TaskId, WorkerName};
use crate::ports::{WorkerInspector, WorkerTasks};

#[derive(Debug, Default)]
struct Slots {
    active: Vec<TaskId>,
    scheduled: Vec<TaskId>,
    reserved: Vec<TaskId>,
}

impl Slots {
    fn remove(&mut self, task_id: TaskId) {
        self.active.retain(|id| *id != task_id);
        self.scheduled.retain(|id| *id != task_id);
        self.reserved.retain(|id| *id != task_id);
    }

    fn list(&self, category: QueueCategory) -> &Vec<TaskId> {
        match category {
            QueueCategory::Active => &self.active,
            QueueCategory::Scheduled => &self.scheduled,
            QueueCategory::Reserved => &self.reserved,
        }
    }
}

/// What one worker is holding right now. A task id is in at most one
/// category at a time.
#[derive(Debug, Default)]
pub struct WorkerLedger {
    slots: Mutex<Slots>,
}

impl WorkerLedger {
    fn with<R>(&self, f: impl FnOnce(&mut Slots) -> R) -> R {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut slots)
    }

    pub fn schedule(&self, task_id: TaskId) {
        self.with(|s| {
            s.remove(task_id);
            s.scheduled.push(task_id);
        });
    }

    pub fn reserve(&self, task_id: TaskId) {
        self.with(|s| {
            s.remove(task_id);
            s.reserved.push(task_id);
        });
    }

    pub fn activate(&self, task_id: TaskId) {
        self.with(|s| {
            s.remove(task_id);
            s.active.push(task_id);
        });
    }

    pub fn release(&self, task_id: TaskId) {
        self.with(|s| s.remove(task_id));
    }

    pub fn snapshot(&self, category: QueueCategory) -> Vec<TaskId> {
        self.with(|s| s.list(category).clone())
    }
}

#[derive(Default)]
pub struct InMemoryFleet {
    workers: RwLock<BTreeMap<WorkerName, Arc<WorkerLedger>>>,
}

impl InMemoryFleet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a worker. Joining twice under the same name returns the
    /// existing ledger.
    pub fn join(&self, name: &WorkerName) -> Arc<WorkerLedger> {
        let mut workers = self.workers.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(workers.entry(name.clone()).or_default())
    }

    pub fn leave(&self, name: &WorkerName) {
        self.workers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
    }

    pub fn workers(&self) -> Vec<WorkerName> {
        self.workers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl WorkerInspector for InMemoryFleet {
    async fn inspect(&self, category: QueueCategory) -> Result<WorkerTasks, CoreError> {
        let workers = self.workers.read().unwrap_or_else(PoisonError::into_inner);
        Ok(workers
            .iter()
            .map(|(name, ledger)| (name.clone(), ledger.snapshot(category)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    fn id() -> TaskId {
        TaskId::from_ulid(Ulid::new())
    }

    #[test]
    fn task_moves_between_categories() {
        let ledger = WorkerLedger::default();
        let task_id = id();

        ledger.schedule(task_id);
        assert_eq!(ledger.snapshot(QueueCategory::Scheduled), vec![task_id]);

        ledger.reserve(task_id);
        assert!(ledger.snapshot(QueueCategory::Scheduled).is_empty());
        assert_eq!(ledger.snapshot(QueueCategory::Reserved), vec![task_id]);

        ledger.activate(task_id);
        assert!(ledger.snapshot(QueueCategory::Reserved).is_empty());
        assert_eq!(ledger.snapshot(QueueCategory::Active), vec![task_id]);

        ledger.release(task_id);
        for category in QueueCategory::ALL {
            assert!(ledger.snapshot(category).is_empty());
        }
    }

    #[tokio::test]
    async fn inspect_reports_idle_workers_with_empty_lists() {
        let fleet = InMemoryFleet::new();
        let busy = fleet.join(&WorkerName::new("w1"));
        fleet.join(&WorkerName::new("w2"));
        let task_id = id();
        busy.activate(task_id);

        let active = fleet.inspect(QueueCategory::Active).await.unwrap();

        assert_eq!(active.len(), 2);
        assert_eq!(active[&WorkerName::new("w1")], vec![task_id]);
        assert!(active[&WorkerName::new("w2")].is_empty());
    }

    #[tokio::test]
    async fn leave_removes_the_worker() {
        let fleet = InMemoryFleet::new();
        let name = WorkerName::new("w1");
        fleet.join(&name).reserve(id());

        fleet.leave(&name);

        assert!(fleet.workers().is_empty());
        assert!(fleet.inspect(QueueCategory::Reserved).await.unwrap().is_empty());
    }

    #[test]
    fn join_twice_shares_the_ledger() {
        let fleet = InMemoryFleet::new();
        let name = WorkerName::new("w1");
        let a = fleet.join(&name);
        let b = fleet.join(&name);
        assert!(Arc::ptr_eq(&a, &b));
    }
}
