//! Workload driver binary for exercising tether transaction chains.
//!
//! Runs one or more chained batch writers against a shared in-memory store
//! and reports aggregated (submitted, ok, error) counts as a JSON summary.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use tether_store::{ChainStore, CommitFaultPlan, Partition, StoreConfig, WriteOp};
use tether_workload::counters::WriteSummary;
use tether_workload::dataset::{build_records, DatasetSpec};
use tether_workload::writer::{ChainedWriter, WriterConfig};

/// CLI entry point wrapper.
#[derive(Parser, Debug)]
#[command(name = "tether-workload")]
struct Args {
    #[command(subcommand)]
    cmd: Command,
}

/// Top-level CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    Run(RunArgs),
}

/// CLI options for running the workload.
#[derive(Parser, Debug, Clone)]
struct RunArgs {
    /// Number of records to write per writer.
    #[arg(long, default_value_t = 10_000)]
    records: u64,

    /// Items carried by each record.
    #[arg(long, default_value_t = 8)]
    items_per_record: u64,

    /// Payload bytes per item.
    #[arg(long, default_value_t = 64)]
    payload_bytes: usize,

    /// Writes per transaction (the batch size).
    #[arg(long, default_value_t = 100)]
    writes_per_tx: u64,

    /// Write semantics applied per record.
    #[arg(long, value_enum, default_value_t = OperationArg::Replace)]
    operation: OperationArg,

    /// Target partition; `both` alternates writers across the two.
    #[arg(long, value_enum, default_value_t = PartitionArg::Config)]
    partition: PartitionArg,

    /// Number of concurrent writers; each writer owns one chain.
    #[arg(long, default_value_t = 1)]
    writers: usize,

    /// Random seed for record payloads (0 picks a random seed).
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Inject a commit failure on every nth transaction per chain (0 disables).
    #[arg(long, default_value_t = 0)]
    fail_every: u64,

    /// Write the JSON run summary to this path as well as stdout.
    #[arg(long)]
    out: Option<PathBuf>,
}

/// Write semantics selector.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum OperationArg {
    Replace,
    Merge,
}

impl From<OperationArg> for WriteOp {
    fn from(arg: OperationArg) -> Self {
        match arg {
            OperationArg::Replace => WriteOp::Replace,
            OperationArg::Merge => WriteOp::Merge,
        }
    }
}

impl std::fmt::Display for OperationArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(WriteOp::from(*self).as_str())
    }
}

/// Target partition selector.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum PartitionArg {
    Config,
    Operational,
    Both,
}

impl PartitionArg {
    fn as_str(self) -> &'static str {
        match self {
            PartitionArg::Config => "config",
            PartitionArg::Operational => "operational",
            PartitionArg::Both => "both",
        }
    }

    /// `both` alternates writers across the two partitions.
    fn for_writer(self, index: usize) -> Partition {
        match self {
            PartitionArg::Config => Partition::Config,
            PartitionArg::Operational => Partition::Operational,
            PartitionArg::Both => {
                if index % 2 == 0 {
                    Partition::Config
                } else {
                    Partition::Operational
                }
            }
        }
    }
}

impl std::fmt::Display for PartitionArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run parameters embedded in the summary for reproducibility.
#[derive(Serialize, Deserialize, Debug, Clone)]
struct RunMeta {
    records: u64,
    items_per_record: u64,
    payload_bytes: usize,
    writes_per_tx: u64,
    operation: String,
    partition: String,
    writers: usize,
    seed: u64,
    fail_every: u64,
}

/// Full run summary serialized to stdout and `--out`.
#[derive(Serialize, Deserialize, Debug, Clone)]
struct RunSummary {
    meta: RunMeta,
    per_writer: Vec<WriteSummary>,
    totals: WriteSummary,
    elapsed_ms: u64,
    writes_per_sec: f64,
}

#[tokio::main]
/// Parse CLI args, initialize logging, and dispatch to the subcommand.
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    match args.cmd {
        Command::Run(args) => run(args).await,
    }
}

/// Run the workload and emit the JSON summary.
async fn run(args: RunArgs) -> anyhow::Result<()> {
    anyhow::ensure!(args.writers > 0, "--writers must be > 0");
    anyhow::ensure!(args.writes_per_tx >= 1, "--writes-per-tx must be >= 1");

    // Use a random seed when the user provides zero.
    let seed = if args.seed == 0 {
        rand::thread_rng().gen()
    } else {
        args.seed
    };

    let store_config = StoreConfig {
        max_open_chains: args.writers,
        faults: if args.fail_every == 0 {
            CommitFaultPlan::None
        } else {
            CommitFaultPlan::FailEvery { n: args.fail_every }
        },
        ..StoreConfig::default()
    };
    let store = Arc::new(ChainStore::in_memory(store_config));

    let records = Arc::new(build_records(&DatasetSpec {
        records: args.records,
        items_per_record: args.items_per_record,
        payload_bytes: args.payload_bytes,
        seed,
    }));

    let start = Instant::now();
    let mut tasks = Vec::with_capacity(args.writers);
    for index in 0..args.writers {
        let store = Arc::clone(&store);
        let records = Arc::clone(&records);
        let config = WriterConfig {
            operation: args.operation.into(),
            partition: args.partition.for_writer(index),
            writes_per_tx: args.writes_per_tx,
        };
        tasks.push(tokio::spawn(async move {
            ChainedWriter::new(store, config).execute(&records).await
        }));
    }

    let mut per_writer = Vec::with_capacity(tasks.len());
    let mut totals = WriteSummary::default();
    for task in tasks {
        let summary = task.await.context("writer task panicked")??;
        totals = totals.merged(summary);
        per_writer.push(summary);
    }
    let elapsed = start.elapsed();

    let total_writes = args.records * args.writers as u64;
    let writes_per_sec = if elapsed.as_secs_f64() > 0.0 {
        total_writes as f64 / elapsed.as_secs_f64()
    } else {
        0.0
    };

    let summary = RunSummary {
        meta: RunMeta {
            records: args.records,
            items_per_record: args.items_per_record,
            payload_bytes: args.payload_bytes,
            writes_per_tx: args.writes_per_tx,
            operation: WriteOp::from(args.operation).as_str().to_string(),
            partition: args.partition.as_str().to_string(),
            writers: args.writers,
            seed,
            fail_every: args.fail_every,
        },
        per_writer,
        totals,
        elapsed_ms: elapsed.as_millis() as u64,
        writes_per_sec,
    };

    let data = serde_json::to_string_pretty(&summary).context("serialize run summary")?;
    println!("{data}");
    if let Some(path) = &args.out {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create dir {}", parent.display()))?;
        }
        std::fs::write(path, &data).with_context(|| format!("write {}", path.display()))?;
        tracing::info!(path = %path.display(), "wrote run summary");
    }
    Ok(())
}
