//! Ordered transaction chains over a row engine.
//!
//! Each chain owns a committer task that applies submitted transactions
//! strictly in submission order, so commit order equals submission order
//! even though completions are observed asynchronously. Submission never
//! blocks; the outcome arrives through a `CommitHandle`. `close` refuses to
//! run while any submitted transaction is unresolved, and a chain whose
//! commit failed is broken for good: later transactions on it are rejected
//! and no new ones can be opened.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::{ChainError, CommitError, StoreError};
use crate::fault::CommitFaultPlan;
use crate::kv::{MemoryEngine, RowEngine, RowPath, RowValue, WriteOp, WriteRequest};

/// Identity of one transaction on one chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TxnId {
    pub chain: u64,
    pub seq: u64,
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chain-{}/txn-{}", self.chain, self.seq)
    }
}

/// Chain lifecycle notification delivered to the chain's listener.
#[derive(Clone, Debug)]
pub enum ChainEvent {
    /// The chain became unusable; `txn` is the transaction whose commit
    /// failure broke it.
    Broken { txn: TxnId, cause: CommitError },
    /// The chain was closed cleanly after a full drain.
    Closed,
}

/// Chain-scoped callback. Invoked from the committer task (`Broken`) or from
/// `close` (`Closed`), possibly concurrently with the submitting loop.
pub type ChainListener = Box<dyn Fn(ChainEvent) + Send + Sync>;

/// How a commit failure affects the rest of its chain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// The first failed commit breaks the chain; every later transaction on
    /// it resolves with `CommitError::ChainBroken`.
    #[default]
    BreakChain,
    /// A failed commit is rejected on its own; the chain stays usable.
    Isolated,
}

/// Store-wide configuration.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub max_open_chains: usize,
    /// Per-row payload byte limit enforced by the in-memory engine.
    pub max_row_bytes: usize,
    pub faults: CommitFaultPlan,
    pub failure_policy: FailurePolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_open_chains: 64,
            max_row_bytes: 1 << 20,
            faults: CommitFaultPlan::None,
            failure_policy: FailurePolicy::BreakChain,
        }
    }
}

struct BrokenState {
    txn: TxnId,
    cause: CommitError,
}

struct ChainShared {
    id: u64,
    outstanding: AtomicUsize,
    broken: Mutex<Option<BrokenState>>,
    listener: ChainListener,
}

impl ChainShared {
    fn broken_lock(&self) -> MutexGuard<'_, Option<BrokenState>> {
        match self.broken.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn broken_info(&self) -> Option<(TxnId, String)> {
        self.broken_lock()
            .as_ref()
            .map(|state| (state.txn, state.cause.to_string()))
    }
}

struct Submission {
    txn: TxnId,
    writes: Vec<WriteRequest>,
    done: oneshot::Sender<Result<(), CommitError>>,
}

/// Owns the engine and hands out transaction chains.
pub struct ChainStore {
    engine: Arc<dyn RowEngine>,
    config: StoreConfig,
    open_chains: Arc<AtomicUsize>,
    next_chain_id: AtomicU64,
    shut_down: AtomicBool,
}

impl ChainStore {
    pub fn in_memory(config: StoreConfig) -> Self {
        let engine = Arc::new(MemoryEngine::new(config.max_row_bytes));
        Self::with_engine(engine, config)
    }

    pub fn with_engine(engine: Arc<dyn RowEngine>, config: StoreConfig) -> Self {
        Self {
            engine,
            config,
            open_chains: Arc::new(AtomicUsize::new(0)),
            next_chain_id: AtomicU64::new(1),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn engine(&self) -> Arc<dyn RowEngine> {
        Arc::clone(&self.engine)
    }

    /// Marks the store unavailable for new chains. Chains already open keep
    /// draining.
    pub fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
    }

    /// Creates a new transaction chain and spawns its committer task.
    /// Must be called from within a Tokio runtime.
    pub fn create_chain(&self, listener: ChainListener) -> Result<TransactionChain, StoreError> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable);
        }
        let limit = self.config.max_open_chains;
        if self.open_chains.fetch_add(1, Ordering::SeqCst) >= limit {
            self.open_chains.fetch_sub(1, Ordering::SeqCst);
            return Err(StoreError::ChainLimit { limit });
        }

        let id = self.next_chain_id.fetch_add(1, Ordering::SeqCst);
        let shared = Arc::new(ChainShared {
            id,
            outstanding: AtomicUsize::new(0),
            broken: Mutex::new(None),
            listener,
        });
        let (submit_tx, submit_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_committer(
            submit_rx,
            Arc::clone(&shared),
            Arc::clone(&self.engine),
            self.config.faults.clone(),
            self.config.failure_policy,
        ));

        Ok(TransactionChain {
            shared,
            submit_tx,
            next_seq: AtomicU64::new(1),
            open_chains: Arc::clone(&self.open_chains),
            closed: AtomicBool::new(false),
            released: AtomicBool::new(false),
        })
    }
}

/// Committer loop: applies submissions in order and resolves their handles.
async fn run_committer(
    mut submit_rx: mpsc::UnboundedReceiver<Submission>,
    shared: Arc<ChainShared>,
    engine: Arc<dyn RowEngine>,
    faults: CommitFaultPlan,
    policy: FailurePolicy,
) {
    while let Some(Submission { txn, writes, done }) = submit_rx.recv().await {
        let result = commit_one(txn, &writes, &shared, engine.as_ref(), &faults, policy);
        // The outstanding count drops before the handle resolves, so a
        // waiter that drained the chain observes it closable.
        shared.outstanding.fetch_sub(1, Ordering::SeqCst);
        let _ = done.send(result);
    }
}

fn commit_one(
    txn: TxnId,
    writes: &[WriteRequest],
    shared: &ChainShared,
    engine: &dyn RowEngine,
    faults: &CommitFaultPlan,
    policy: FailurePolicy,
) -> Result<(), CommitError> {
    if let Some((broken_by, cause)) = shared.broken_info() {
        return Err(CommitError::ChainBroken {
            txn,
            broken_by,
            cause,
        });
    }

    let outcome = if faults.should_fail(txn.seq) {
        Err(CommitError::Injected { txn })
    } else {
        engine.apply(writes)
    };

    if let Err(err) = &outcome {
        if policy == FailurePolicy::BreakChain {
            let mut broken = shared.broken_lock();
            if broken.is_none() {
                *broken = Some(BrokenState {
                    txn,
                    cause: err.clone(),
                });
                drop(broken);
                debug!(txn = %txn, "chain broken");
                (shared.listener)(ChainEvent::Broken {
                    txn,
                    cause: err.clone(),
                });
            }
        }
    }
    outcome
}

/// An ordered sequence of transactions created from the store. Exclusively
/// owned by one writer run.
pub struct TransactionChain {
    shared: Arc<ChainShared>,
    submit_tx: mpsc::UnboundedSender<Submission>,
    next_seq: AtomicU64,
    open_chains: Arc<AtomicUsize>,
    closed: AtomicBool,
    released: AtomicBool,
}

impl TransactionChain {
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Number of submitted transactions not yet resolved.
    pub fn outstanding(&self) -> usize {
        self.shared.outstanding.load(Ordering::SeqCst)
    }

    /// Opens the next transaction on this chain.
    pub fn new_transaction(&self) -> Result<WriteTransaction, ChainError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ChainError::Closed);
        }
        if let Some((txn, cause)) = self.shared.broken_info() {
            return Err(ChainError::Broken { txn, cause });
        }
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        Ok(WriteTransaction {
            id: TxnId {
                chain: self.shared.id,
                seq,
            },
            writes: Vec::new(),
            shared: Arc::clone(&self.shared),
            submit_tx: self.submit_tx.clone(),
        })
    }

    /// Closes the chain. Fails while any submitted transaction is
    /// unresolved, and on a broken chain. Closing twice is a no-op.
    pub fn close(&self) -> Result<(), ChainError> {
        if let Some((txn, cause)) = self.shared.broken_info() {
            return Err(ChainError::Broken { txn, cause });
        }
        let outstanding = self.shared.outstanding.load(Ordering::SeqCst);
        if outstanding > 0 {
            return Err(ChainError::Unresolved { outstanding });
        }
        if !self.closed.swap(true, Ordering::SeqCst) {
            (self.shared.listener)(ChainEvent::Closed);
            self.release_slot();
        }
        Ok(())
    }

    fn release_slot(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.open_chains.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for TransactionChain {
    fn drop(&mut self) {
        self.release_slot();
    }
}

/// An open accumulation of writes against one chain.
pub struct WriteTransaction {
    id: TxnId,
    writes: Vec<WriteRequest>,
    shared: Arc<ChainShared>,
    submit_tx: mpsc::UnboundedSender<Submission>,
}

impl std::fmt::Debug for WriteTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteTransaction")
            .field("id", &self.id)
            .field("writes", &self.writes.len())
            .finish_non_exhaustive()
    }
}

impl WriteTransaction {
    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn write_count(&self) -> usize {
        self.writes.len()
    }

    /// Accumulates one write locally; nothing is applied until submit.
    pub fn write(&mut self, op: WriteOp, path: RowPath, value: RowValue) {
        self.writes.push(WriteRequest { op, path, value });
    }

    /// Submits for commit without blocking. The handle resolves when the
    /// committer has applied (or rejected) this transaction; an empty
    /// transaction commits as a no-op.
    pub fn submit(self) -> CommitHandle {
        let (done_tx, done_rx) = oneshot::channel();
        self.shared.outstanding.fetch_add(1, Ordering::SeqCst);
        let txn = self.id;
        let submission = Submission {
            txn,
            writes: self.writes,
            done: done_tx,
        };
        if let Err(mpsc::error::SendError(submission)) = self.submit_tx.send(submission) {
            // Committer is gone; resolve the handle here.
            self.shared.outstanding.fetch_sub(1, Ordering::SeqCst);
            let _ = submission.done.send(Err(CommitError::ChainGone));
        }
        CommitHandle { txn, done: done_rx }
    }

    /// Submits and waits inline; the blocking path for a run's final
    /// transaction.
    pub async fn submit_and_wait(self) -> Result<(), CommitError> {
        self.submit().wait().await
    }
}

/// Pending commit outcome of a submitted transaction.
pub struct CommitHandle {
    txn: TxnId,
    done: oneshot::Receiver<Result<(), CommitError>>,
}

impl CommitHandle {
    pub fn txn(&self) -> TxnId {
        self.txn
    }

    /// Resolves once the committer reaches this transaction. Completion
    /// order across chains is unspecified; within one chain it matches
    /// submission order.
    pub async fn wait(self) -> Result<(), CommitError> {
        match self.done.await {
            Ok(result) => result,
            Err(_) => Err(CommitError::ChainGone),
        }
    }
}
