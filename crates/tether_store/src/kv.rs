//! Row model and the storage-engine seam.
//!
//! The store addresses rows by `RowPath` and keeps each row as a small
//! ordered map of item id to payload, so a merge can overlay individual
//! items instead of clobbering the whole row.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::RwLock;

use bytes::Bytes;

use crate::error::CommitError;

/// Target partition a write lands in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Partition {
    Config,
    Operational,
}

impl Partition {
    pub fn as_str(self) -> &'static str {
        match self {
            Partition::Config => "config",
            Partition::Operational => "operational",
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable record key.
pub type RowKey = u64;

/// Deterministic address of a row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RowPath {
    pub partition: Partition,
    pub key: RowKey,
}

impl fmt::Display for RowPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.partition, self.key)
    }
}

/// Row payload: item id mapped to payload bytes, ordered by id.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RowValue {
    items: BTreeMap<u64, Bytes>,
}

impl RowValue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: u64, payload: Bytes) {
        self.items.insert(id, payload);
    }

    pub fn get(&self, id: u64) -> Option<&Bytes> {
        self.items.get(&id)
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Total payload bytes across all items.
    pub fn byte_size(&self) -> usize {
        self.items.values().map(Bytes::len).sum()
    }

    /// Overlays `other` onto this row: items with equal ids are replaced,
    /// the rest are kept.
    pub fn merge_from(&mut self, other: RowValue) {
        self.items.extend(other.items);
    }

    pub fn items(&self) -> impl Iterator<Item = (u64, &Bytes)> {
        self.items.iter().map(|(id, payload)| (*id, payload))
    }
}

/// Replace or merge semantics applied per write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOp {
    /// The stored row becomes exactly the written value.
    Replace,
    /// The written items are merged into the stored row.
    Merge,
}

impl WriteOp {
    pub fn as_str(self) -> &'static str {
        match self {
            WriteOp::Replace => "replace",
            WriteOp::Merge => "merge",
        }
    }
}

/// One write accumulated in a transaction.
#[derive(Clone, Debug)]
pub struct WriteRequest {
    pub op: WriteOp,
    pub path: RowPath,
    pub value: RowValue,
}

/// Storage engine seam: applies committed transactions and serves reads.
pub trait RowEngine: Send + Sync + 'static {
    /// Applies one committed transaction's writes, in order. A failed
    /// transaction must leave no partial state behind.
    fn apply(&self, writes: &[WriteRequest]) -> Result<(), CommitError>;

    fn read(&self, path: &RowPath) -> Option<RowValue>;

    fn row_count(&self, partition: Partition) -> usize;
}

/// In-memory reference engine.
pub struct MemoryEngine {
    max_row_bytes: usize,
    rows: RwLock<HashMap<RowPath, RowValue>>,
}

impl MemoryEngine {
    pub fn new(max_row_bytes: usize) -> Self {
        Self {
            max_row_bytes,
            rows: RwLock::new(HashMap::new()),
        }
    }
}

impl RowEngine for MemoryEngine {
    fn apply(&self, writes: &[WriteRequest]) -> Result<(), CommitError> {
        // Validate every write before touching the map so a rejected
        // transaction leaves no partial state.
        for write in writes {
            let size = write.value.byte_size();
            if size > self.max_row_bytes {
                return Err(CommitError::RowTooLarge {
                    path: write.path,
                    size,
                    limit: self.max_row_bytes,
                });
            }
        }

        let mut rows = match self.rows.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for write in writes {
            match write.op {
                WriteOp::Replace => {
                    rows.insert(write.path, write.value.clone());
                }
                WriteOp::Merge => {
                    rows.entry(write.path)
                        .or_default()
                        .merge_from(write.value.clone());
                }
            }
        }
        Ok(())
    }

    fn read(&self, path: &RowPath) -> Option<RowValue> {
        let rows = match self.rows.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        rows.get(path).cloned()
    }

    fn row_count(&self, partition: Partition) -> usize {
        let rows = match self.rows.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        rows.keys().filter(|path| path.partition == partition).count()
    }
}
