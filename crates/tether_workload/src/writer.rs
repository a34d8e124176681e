//! The chained batch writer.
//!
//! Walks a record sequence, grouping writes into transactions of
//! `writes_per_tx` writes each. Full batches are submitted without blocking
//! and a spawned continuation folds each outcome into the run's counters, so
//! commit latency overlaps with building the next batch. The final
//! transaction is submitted even when it is empty and awaited inline, which
//! drains the chain before it is closed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use tether_store::{
    ChainEvent, ChainListener, ChainStore, Partition, RowPath, WriteOp, WriteTransaction,
};

use crate::counters::{TxnCounters, WriteSummary};
use crate::dataset::Record;

/// Configuration for one writer run.
#[derive(Clone, Copy, Debug)]
pub struct WriterConfig {
    pub operation: WriteOp,
    pub partition: Partition,
    /// Writes per transaction; must be at least 1.
    pub writes_per_tx: u64,
}

/// Drives one bulk-write run over one chain.
///
/// The counters live for the writer's lifetime, so summaries from repeated
/// `execute` calls on the same writer accumulate.
pub struct ChainedWriter {
    store: Arc<ChainStore>,
    config: WriterConfig,
    counters: Arc<TxnCounters>,
}

impl ChainedWriter {
    pub fn new(store: Arc<ChainStore>, config: WriterConfig) -> Self {
        Self {
            store,
            config,
            counters: Arc::new(TxnCounters::new()),
        }
    }

    /// Live counters for this run, shared with the commit continuations.
    pub fn counters(&self) -> Arc<TxnCounters> {
        Arc::clone(&self.counters)
    }

    /// Writes the record sequence in batches, pipelining commits, then
    /// drains and closes the chain and returns the final counts.
    ///
    /// A broken chain does not abort the run: already-submitted transactions
    /// still resolve into the counters, remaining records are dropped, and
    /// the close diagnostic is logged rather than raised.
    pub async fn execute(&self, records: &[Record]) -> anyhow::Result<WriteSummary> {
        anyhow::ensure!(
            self.config.writes_per_tx >= 1,
            "writes_per_tx must be at least 1"
        );

        let chain_broke = Arc::new(AtomicBool::new(false));
        let listener: ChainListener = {
            let chain_broke = Arc::clone(&chain_broke);
            Box::new(move |event| match event {
                ChainEvent::Broken { txn, cause } => {
                    chain_broke.store(true, Ordering::SeqCst);
                    error!(txn = %txn, error = %cause, "transaction chain broken");
                }
                ChainEvent::Closed => debug!("transaction chain closed"),
            })
        };
        let chain = self
            .store
            .create_chain(listener)
            .context("create transaction chain")?;

        let mut in_flight: Vec<JoinHandle<()>> = Vec::new();
        let mut tx = Some(
            chain
                .new_transaction()
                .context("open initial transaction")?,
        );
        let mut write_cnt = 0u64;

        for record in records {
            let mut open_tx = match tx.take() {
                Some(open_tx) => open_tx,
                // The chain broke mid-run; drop the remaining records.
                None => break,
            };
            open_tx.write(
                self.config.operation,
                RowPath {
                    partition: self.config.partition,
                    key: record.key,
                },
                record.value.clone(),
            );
            write_cnt += 1;

            if write_cnt == self.config.writes_per_tx {
                self.dispatch(open_tx, &mut in_flight);
                write_cnt = 0;
                match chain.new_transaction() {
                    Ok(next) => tx = Some(next),
                    Err(err) => {
                        warn!(error = %err, "chain unusable, dropping remaining records");
                        tx = None;
                    }
                }
            } else {
                tx = Some(open_tx);
            }
        }

        // Submit the outstanding transaction even when it is empty and wait
        // for it inline: the chain must be drained before it can close.
        if let Some(final_tx) = tx.take() {
            self.counters.note_submitted();
            let txn = final_tx.id();
            match final_tx.submit_and_wait().await {
                Ok(()) => self.counters.note_ok(),
                Err(err) => {
                    warn!(txn = %txn, error = %err, "final transaction failed");
                    self.counters.note_error();
                }
            }
        }

        // Continuations have no ordering relative to the final wait; settle
        // them all so the returned counts are final.
        for task in in_flight {
            if task.await.is_err() {
                warn!("commit continuation panicked");
            }
        }

        if let Err(err) = chain.close() {
            error!(error = %err, "transaction chain close failed");
        }
        if chain_broke.load(Ordering::SeqCst) {
            warn!("run finished on a broken chain; counts reflect resolved transactions only");
        }

        let summary = self.counters.snapshot();
        debug!(
            submitted = summary.submitted,
            ok = summary.ok,
            error = summary.error,
            "writer run finished"
        );
        Ok(summary)
    }

    /// Submits a full batch without blocking and spawns its continuation.
    fn dispatch(&self, tx: WriteTransaction, in_flight: &mut Vec<JoinHandle<()>>) {
        self.counters.note_submitted();
        let txn = tx.id();
        let handle = tx.submit();
        let counters = Arc::clone(&self.counters);
        in_flight.push(tokio::spawn(async move {
            match handle.wait().await {
                Ok(()) => counters.note_ok(),
                Err(err) => {
                    warn!(txn = %txn, error = %err, "transaction failed");
                    counters.note_error();
                }
            }
        }));
    }
}
