//! Chain lifecycle tests: close invariants, broken chains, and store
//! admission.
//!
//! Covered here:
//! - Closing a chain with an unresolved transaction is a distinct error and
//!   never silently succeeds; after the drain, close succeeds and the
//!   listener sees exactly one Closed event.
//! - The first commit failure breaks the chain: one Broken event, later
//!   transactions rejected with the breaking transaction's identity, no new
//!   transactions, close refused.
//! - The isolated failure policy keeps the chain usable across rejections.
//! - Chain admission: open-chain limit and store shutdown.

mod common;

use std::sync::Arc;

use common::{noop_listener, path, row, EventLog, GateEngine};
use tether_store::{
    ChainError, ChainStore, CommitError, CommitFaultPlan, FailurePolicy, RowEngine, StoreConfig,
    StoreError, WriteOp,
};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn close_with_unresolved_transaction_is_reported() {
    let engine = Arc::new(GateEngine::new());
    let events = EventLog::new();
    let store = ChainStore::with_engine(engine.clone(), StoreConfig::default());
    let chain = store.create_chain(EventLog::listener(&events)).unwrap();

    let mut tx = chain.new_transaction().unwrap();
    tx.write(WriteOp::Replace, path(1), row(&[1]));
    let handle = tx.submit();

    // The commit is parked behind the gate, so the chain must refuse to
    // close.
    assert_eq!(
        chain.close(),
        Err(ChainError::Unresolved { outstanding: 1 })
    );
    assert_eq!(events.closed_count(), 0);

    engine.release();
    handle.wait().await.unwrap();

    chain.close().unwrap();
    assert_eq!(events.closed_count(), 1);
    // Closing again stays a no-op.
    chain.close().unwrap();
    assert_eq!(events.closed_count(), 1);
}

#[tokio::test]
async fn first_failure_breaks_the_chain_for_later_transactions() {
    let events = EventLog::new();
    let config = StoreConfig {
        faults: CommitFaultPlan::FailSeqs(vec![2]),
        ..StoreConfig::default()
    };
    let store = ChainStore::in_memory(config);
    let chain = store.create_chain(EventLog::listener(&events)).unwrap();

    // Open all three before submitting anything so seq assignment cannot
    // race the committer.
    let mut txs = Vec::new();
    for key in 0..3u64 {
        let mut tx = chain.new_transaction().unwrap();
        tx.write(WriteOp::Replace, path(key), row(&[key]));
        txs.push(tx);
    }
    let breaking = txs[1].id();
    let handles: Vec<_> = txs.into_iter().map(|tx| tx.submit()).collect();

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.wait().await);
    }
    assert!(outcomes[0].is_ok());
    assert_eq!(outcomes[1], Err(CommitError::Injected { txn: breaking }));
    match &outcomes[2] {
        Err(CommitError::ChainBroken { broken_by, .. }) => assert_eq!(*broken_by, breaking),
        other => panic!("expected ChainBroken, got {other:?}"),
    }

    // The third transaction's writes never reached the engine.
    assert!(store.engine().read(&path(2)).is_none());

    let (broken_txn, cause) = events.broken().expect("listener should see Broken");
    assert_eq!(broken_txn, breaking);
    assert_eq!(cause, CommitError::Injected { txn: breaking });

    match chain.new_transaction() {
        Err(ChainError::Broken { txn, .. }) => assert_eq!(txn, breaking),
        other => panic!("expected Broken, got {other:?}"),
    }
    match chain.close() {
        Err(ChainError::Broken { txn, .. }) => assert_eq!(txn, breaking),
        other => panic!("expected Broken, got {other:?}"),
    }
    assert_eq!(events.closed_count(), 0);
}

#[tokio::test]
async fn isolated_policy_keeps_the_chain_usable_across_rejections() {
    let events = EventLog::new();
    let config = StoreConfig {
        faults: CommitFaultPlan::FailSeqs(vec![1]),
        failure_policy: FailurePolicy::Isolated,
        ..StoreConfig::default()
    };
    let store = ChainStore::in_memory(config);
    let chain = store.create_chain(EventLog::listener(&events)).unwrap();

    let mut tx = chain.new_transaction().unwrap();
    let first = tx.id();
    tx.write(WriteOp::Replace, path(1), row(&[1]));
    assert_eq!(
        tx.submit_and_wait().await,
        Err(CommitError::Injected { txn: first })
    );

    let mut tx = chain.new_transaction().unwrap();
    tx.write(WriteOp::Replace, path(2), row(&[2]));
    tx.submit_and_wait().await.unwrap();

    assert!(store.engine().read(&path(1)).is_none());
    assert!(store.engine().read(&path(2)).is_some());

    chain.close().unwrap();
    assert!(events.broken().is_none());
    assert_eq!(events.closed_count(), 1);
}

#[tokio::test]
async fn open_chain_limit_is_enforced_until_a_chain_is_released() {
    let config = StoreConfig {
        max_open_chains: 1,
        ..StoreConfig::default()
    };
    let store = ChainStore::in_memory(config);

    let first = store.create_chain(noop_listener()).unwrap();
    assert_eq!(
        store.create_chain(noop_listener()).err(),
        Some(StoreError::ChainLimit { limit: 1 })
    );

    // Closing releases the slot.
    first.close().unwrap();
    let second = store.create_chain(noop_listener()).unwrap();

    // Dropping an unclosed chain releases it too.
    drop(second);
    store.create_chain(noop_listener()).unwrap();
}

#[tokio::test]
async fn shutdown_makes_chain_creation_unavailable() {
    let store = ChainStore::in_memory(StoreConfig::default());
    let chain = store.create_chain(noop_listener()).unwrap();

    store.shutdown();
    assert_eq!(
        store.create_chain(noop_listener()).err(),
        Some(StoreError::Unavailable)
    );

    // A chain that was already open still drains and closes.
    let tx = chain.new_transaction().unwrap();
    tx.submit_and_wait().await.unwrap();
    chain.close().unwrap();
}
