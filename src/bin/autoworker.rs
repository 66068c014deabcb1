//! autoworker CLI: soak-test a partition registry and inspect configuration.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use autoworker::PartitionRegistry;
use autoworker::config::DispatchConfig;
use autoworker::telemetry::{TelemetryConfig, init_telemetry};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

#[derive(Parser)]
#[command(name = "autoworker", about = "Per-key serialized work dispatcher")]
struct Cli {
    /// TOML config file with a [dispatch] table (defaults to environment)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Push items through a registry and check per-partition ordering
    Soak {
        /// Number of distinct partition keys
        #[arg(long, default_value_t = 8)]
        partitions: usize,
        /// Total items, spread round-robin over the partitions
        #[arg(long, default_value_t = 1000)]
        items: usize,
        /// Simulated processing time per item
        #[arg(long, default_value_t = 0)]
        delay_ms: u64,
        /// Fail every Nth item (0 = never)
        #[arg(long, default_value_t = 0)]
        fail_every: usize,
    },
    /// Print the effective configuration
    Config,
}

#[derive(Debug, Serialize)]
struct SoakSummary {
    partitions: usize,
    items: usize,
    succeeded: usize,
    failed: usize,
    ordering_violations: usize,
    partitions_remaining: usize,
    elapsed_ms: u128,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => DispatchConfig::from_toml_file(path)?,
        None => DispatchConfig::from_env()?,
    };

    match cli.command {
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Command::Soak {
            partitions,
            items,
            delay_ms,
            fail_every,
        } => {
            let _guard = init_telemetry(TelemetryConfig::from(&config))?;
            let summary = soak(&config, partitions, items, delay_ms, fail_every).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            if summary.ordering_violations > 0 {
                anyhow::bail!("{} ordering violations", summary.ordering_violations);
            }
            Ok(())
        }
    }
}

async fn soak(
    config: &DispatchConfig,
    partitions: usize,
    items: usize,
    delay_ms: u64,
    fail_every: usize,
) -> anyhow::Result<SoakSummary> {
    anyhow::ensure!(partitions > 0, "--partitions must be at least 1");

    // Last sequence number seen per partition; ordering holds iff each new
    // one is larger.
    let last_seen: Arc<Mutex<HashMap<String, usize>>> = Arc::default();
    let violations = Arc::new(Mutex::new(0usize));

    let registry = {
        let last_seen = Arc::clone(&last_seen);
        let violations = Arc::clone(&violations);
        PartitionRegistry::from_config(
            move |key: String, seq: usize| {
                let last_seen = Arc::clone(&last_seen);
                let violations = Arc::clone(&violations);
                async move {
                    if delay_ms > 0 {
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    }
                    {
                        let mut seen = last_seen
                            .lock()
                            .map_err(|_| anyhow::anyhow!("ordering ledger poisoned"))?;
                        let previous = seen.insert(key.clone(), seq);
                        if previous.is_some_and(|prev| prev >= seq) {
                            *violations
                                .lock()
                                .map_err(|_| anyhow::anyhow!("violation counter poisoned"))? += 1;
                        }
                    }
                    if fail_every > 0 && (seq + 1) % fail_every == 0 {
                        anyhow::bail!("item {seq} on {key} failed by request");
                    }
                    Ok::<_, anyhow::Error>(seq)
                }
            },
            config,
        )
    };

    info!(partitions, items, delay_ms, fail_every, "soak started");
    let start = Instant::now();

    let completions: Vec<_> = (0..items)
        .map(|seq| registry.submit_and_await(format!("partition-{}", seq % partitions), seq))
        .collect();

    let mut succeeded = 0;
    let mut failed = 0;
    for completion in completions {
        if completion.await.is_success() {
            succeeded += 1;
        } else {
            failed += 1;
        }
    }
    let elapsed_ms = start.elapsed().as_millis();

    let ordering_violations = *violations
        .lock()
        .map_err(|_| anyhow::anyhow!("violation counter poisoned"))?;

    // Give the last loops a moment to run their idle sweep.
    tokio::time::sleep(Duration::from_millis(50)).await;

    info!(succeeded, failed, ordering_violations, elapsed_ms, "soak finished");

    Ok(SoakSummary {
        partitions,
        items,
        succeeded,
        failed,
        ordering_violations,
        partitions_remaining: registry.partition_count(),
        elapsed_ms,
    })
}
