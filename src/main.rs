//! Replcheck - Replication Consistency Checker
//!
//! CLI shell around the verification core: parses arguments, loads the
//! targets file, runs the requested check and maps the report to an exit
//! code.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use replcheck::client::{Credentials, RespClient};
use replcheck::latency::{LatencyOptions, PropagationTester};
use replcheck::topology::Topology;
use replcheck::verify::{ReplicationVerifier, VerifyOptions};

/// Replcheck - Replication Consistency Checker
#[derive(Parser)]
#[command(name = "replcheck")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON file describing the target cluster nodes
    #[arg(short = 'f', long = "file")]
    targets_file: PathBuf,

    /// Auth password for the cluster nodes
    #[arg(short, long)]
    auth: Option<String>,

    /// Timeout in seconds (per node for offset checks, overall for pubsub)
    #[arg(short, long, default_value_t = 5)]
    timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that every replica's replication id and offset match the primary
    Offset,

    /// Publish a probe message on the primary and time its arrival at each replica
    Pubsub,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level);

    tracing::info!(file = %cli.targets_file.display(), "Loading targets file");
    let topology = Topology::from_file(&cli.targets_file)
        .with_context(|| format!("failed to load targets from {}", cli.targets_file.display()))?;

    let credentials = match cli.auth {
        Some(password) => Credentials::password(password),
        None => Credentials::none(),
    };
    let timeout = Duration::from_secs(cli.timeout);

    match cli.command {
        Commands::Offset => run_offset(&topology, credentials, timeout).await,
        Commands::Pubsub => run_pubsub(&topology, credentials, timeout).await,
    }
}

fn init_logging(level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Run the replication offset check and fail on any inconsistency
async fn run_offset(
    topology: &Topology,
    credentials: Credentials,
    per_node_timeout: Duration,
) -> anyhow::Result<()> {
    let client = RespClient::new(per_node_timeout);
    let verifier = ReplicationVerifier::new(
        client,
        VerifyOptions {
            credentials,
            per_node_timeout,
        },
    );

    let report = verifier
        .verify(topology)
        .await
        .context("replication verification aborted")?;

    if report.passed() {
        tracing::info!(
            replicas = report.replicas.len(),
            primary = %report.primary,
            "All replicas are consistent with the primary"
        );
        return Ok(());
    }

    for (node, outcome) in report.failures() {
        tracing::error!(replica = %node, outcome = %outcome, "Replica check failed");
    }
    anyhow::bail!(
        "replication verification failed for {} of {} replicas",
        report.failures().count(),
        report.replicas.len()
    );
}

/// Run the propagation latency experiment; timeouts are reported, not fatal
async fn run_pubsub(
    topology: &Topology,
    credentials: Credentials,
    deadline: Duration,
) -> anyhow::Result<()> {
    let client = RespClient::new(deadline);
    let tester = PropagationTester::new(
        client,
        LatencyOptions {
            credentials,
            deadline,
        },
    );

    let report = tester
        .measure(topology)
        .await
        .context("propagation experiment aborted")?;

    for (node, observation) in &report.observations {
        tracing::info!(
            replica = %node,
            elapsed = ?observation.elapsed,
            outcome = ?observation.outcome,
            "Propagation observation"
        );
    }
    if !report.all_received() {
        tracing::warn!(
            timed_out = report.timed_out().count(),
            "Some replicas did not receive the probe before the deadline"
        );
    }
    Ok(())
}
