//! Typed errors for the chain protocol.
//!
//! `CommitError` is `Clone` because one broken-chain cause fans out to every
//! later waiter on the chain and to the chain listener.

use thiserror::Error;

use crate::chain::TxnId;
use crate::kv::RowPath;

/// Failure of one transaction's commit.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CommitError {
    #[error("row {path} is {size} bytes, over the {limit} byte limit")]
    RowTooLarge {
        path: RowPath,
        size: usize,
        limit: usize,
    },

    #[error("injected commit fault for {txn}")]
    Injected { txn: TxnId },

    #[error("{txn} rejected, chain broken by {broken_by}: {cause}")]
    ChainBroken {
        txn: TxnId,
        broken_by: TxnId,
        cause: String,
    },

    /// The committer went away before resolving the transaction.
    #[error("chain committer is gone")]
    ChainGone,
}

/// Failure of a chain-level operation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("chain broken by {txn}: {cause}")]
    Broken { txn: TxnId, cause: String },

    #[error("chain still has {outstanding} unresolved transactions")]
    Unresolved { outstanding: usize },

    #[error("chain is closed")]
    Closed,
}

/// Failure to create a chain from the store.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("open chain limit reached ({limit})")]
    ChainLimit { limit: usize },

    #[error("store is shut down")]
    Unavailable,
}
