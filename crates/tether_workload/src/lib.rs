//! Bulk-write workload driver for tether transaction chains.
//!
//! Builds a deterministic record set, feeds it through a chained batch
//! writer that groups writes into fixed-size transactions, pipelines their
//! commits, and aggregates (submitted, ok, error) outcomes while draining
//! the chain before it is closed.

pub mod counters;
pub mod dataset;
pub mod writer;
