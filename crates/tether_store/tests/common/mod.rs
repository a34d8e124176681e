//! Shared helpers for chain integration tests.

use std::sync::{Arc, Condvar, Mutex};

use bytes::Bytes;
use tether_store::{
    ChainEvent, ChainListener, CommitError, MemoryEngine, Partition, RowEngine, RowKey, RowPath,
    RowValue, TxnId, WriteRequest,
};

pub fn path(key: RowKey) -> RowPath {
    RowPath {
        partition: Partition::Config,
        key,
    }
}

pub fn row(ids: &[u64]) -> RowValue {
    let mut value = RowValue::new();
    for id in ids {
        value.insert(*id, Bytes::from(format!("payload-{id}")));
    }
    value
}

pub fn noop_listener() -> ChainListener {
    Box::new(|_| {})
}

/// Captures chain events for later assertions.
#[derive(Default)]
pub struct EventLog {
    events: Mutex<Vec<ChainEvent>>,
}

impl EventLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn listener(log: &Arc<Self>) -> ChainListener {
        let log = Arc::clone(log);
        Box::new(move |event| log.events.lock().unwrap().push(event))
    }

    pub fn events(&self) -> Vec<ChainEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn broken(&self) -> Option<(TxnId, CommitError)> {
        self.events().into_iter().find_map(|event| match event {
            ChainEvent::Broken { txn, cause } => Some((txn, cause)),
            ChainEvent::Closed => None,
        })
    }

    pub fn closed_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, ChainEvent::Closed))
            .count()
    }
}

/// Engine wrapper that holds every apply until the gate opens, for driving
/// the chain into a "submitted but unresolved" state.
pub struct GateEngine {
    inner: MemoryEngine,
    open: Mutex<bool>,
    opened: Condvar,
}

impl GateEngine {
    pub fn new() -> Self {
        Self {
            inner: MemoryEngine::new(1 << 20),
            open: Mutex::new(false),
            opened: Condvar::new(),
        }
    }

    pub fn release(&self) {
        let mut open = self.open.lock().unwrap();
        *open = true;
        self.opened.notify_all();
    }
}

impl RowEngine for GateEngine {
    fn apply(&self, writes: &[WriteRequest]) -> Result<(), CommitError> {
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.opened.wait(open).unwrap();
        }
        drop(open);
        self.inner.apply(writes)
    }

    fn read(&self, path: &RowPath) -> Option<RowValue> {
        self.inner.read(path)
    }

    fn row_count(&self, partition: Partition) -> usize {
        self.inner.row_count(partition)
    }
}
