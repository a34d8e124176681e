//! Shared helpers for workload integration tests.

use std::sync::Mutex;

use tether_store::{CommitError, MemoryEngine, Partition, RowEngine, RowPath, RowValue, WriteRequest};

/// Engine wrapper that records the order rows are applied in.
pub struct RecordingEngine {
    inner: MemoryEngine,
    log: Mutex<Vec<RowPath>>,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self {
            inner: MemoryEngine::new(1 << 20),
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn applied_paths(&self) -> Vec<RowPath> {
        self.log.lock().unwrap().clone()
    }
}

impl RowEngine for RecordingEngine {
    fn apply(&self, writes: &[WriteRequest]) -> Result<(), CommitError> {
        self.inner.apply(writes)?;
        let mut log = self.log.lock().unwrap();
        log.extend(writes.iter().map(|write| write.path));
        Ok(())
    }

    fn read(&self, path: &RowPath) -> Option<RowValue> {
        self.inner.read(path)
    }

    fn row_count(&self, partition: Partition) -> usize {
        self.inner.row_count(partition)
    }
}
