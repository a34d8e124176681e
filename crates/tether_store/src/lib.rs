//! Transactional row store with ordered transaction chains.
//!
//! A `ChainStore` hands out `TransactionChain`s; transactions created from a
//! chain commit strictly in the order they were submitted, and a chain cannot
//! be closed while any submitted transaction is unresolved. Commit outcomes
//! are delivered asynchronously through `CommitHandle`s, and chain-level
//! lifecycle events (broken / closed) through a chain-scoped listener.

mod chain;
mod error;
mod fault;
mod kv;

pub use chain::{
    ChainEvent, ChainListener, ChainStore, CommitHandle, FailurePolicy, StoreConfig,
    TransactionChain, TxnId, WriteTransaction,
};
pub use error::{ChainError, CommitError, StoreError};
pub use fault::CommitFaultPlan;
pub use kv::{MemoryEngine, Partition, RowEngine, RowKey, RowPath, RowValue, WriteOp, WriteRequest};
