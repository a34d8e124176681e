//! Thread-safe transaction outcome counters.
//!
//! One `TxnCounters` value is owned by a writer run and shared by `Arc` with
//! its commit continuations, which may resolve concurrently with the
//! accumulation loop and with each other. `submitted` is bumped at dispatch
//! time, `ok`/`error` at resolution, so `ok + error <= submitted` holds at
//! all times and becomes an equality once the run has drained.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Final (submitted, ok, error) counts for one writer run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteSummary {
    pub submitted: u64,
    pub ok: u64,
    pub error: u64,
}

impl WriteSummary {
    pub fn merged(self, other: WriteSummary) -> WriteSummary {
        WriteSummary {
            submitted: self.submitted + other.submitted,
            ok: self.ok + other.ok,
            error: self.error + other.error,
        }
    }
}

/// Counters shared between the accumulation loop and completion tasks.
#[derive(Debug, Default)]
pub struct TxnCounters {
    submitted: AtomicU64,
    ok: AtomicU64,
    error: AtomicU64,
}

impl TxnCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn note_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_ok(&self) {
        self.ok.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_error(&self) {
        self.error.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> WriteSummary {
        WriteSummary {
            submitted: self.submitted.load(Ordering::Relaxed),
            ok: self.ok.load(Ordering::Relaxed),
            error: self.error.load(Ordering::Relaxed),
        }
    }
}
