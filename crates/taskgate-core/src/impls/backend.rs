//! Backend - store / broker / fleet / clock のひとまとめ

use std::sync::Arc;

use crate::ports::{Broker, Clock, TaskStore, WorkerInspector};

use super::{InMemoryBroker, InMemoryFleet, InMemoryTaskStore, TaskStoreConfig};

/// The external systems the dispatch layer talks to.
///
/// Workers register in `fleet` and report their held tasks through it, so
/// the fleet is concrete. Store and broker can be swapped.
#[derive(Clone)]
pub struct Backend {
    pub store: Arc<dyn TaskStore>,
    pub broker: Arc<dyn Broker>,
    pub fleet: Arc<InMemoryFleet>,
    pub clock: Arc<dyn Clock>,
}

impl Backend {
    pub fn new(
        store: Arc<dyn TaskStore>,
        broker: Arc<dyn Broker>,
        fleet: Arc<InMemoryFleet>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            broker,
            fleet,
            clock,
        }
    }

    pub fn in_memory(clock: Arc<dyn Clock>, config: TaskStoreConfig) -> Self {
        Self {
            store: Arc::new(InMemoryTaskStore::new(Arc::clone(&clock), config)),
            broker: Arc::new(InMemoryBroker::new()),
            fleet: Arc::new(InMemoryFleet::new()),
            clock,
        }
    }

    pub fn inspector(&self) -> Arc<dyn WorkerInspector> {
        self.fleet.clone()
    }
}
