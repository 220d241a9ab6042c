//! docdb-reconciler: converge one DocumentDB cluster or instance to a manifest.
//!
//! Reads a JSON manifest, runs the selected operation against the control
//! plane and prints the outcome as JSON on stdout. Logs go to stderr.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::AsyncReadExt;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use docdb_reconciler::clients::HttpControlPlane;
use docdb_reconciler::{
    ClusterReconciler, InstanceReconciler, Manifest, Operation, Outcome, ReconcileError,
    TagPolicy, Timings,
};

/// DocumentDB reconciler
#[derive(Parser, Debug)]
#[command(name = "docdb-reconciler", version, about)]
struct Args {
    /// Control-plane endpoint (e.g., http://localhost:8080)
    #[arg(long, env = "DOCDB_ENDPOINT", default_value = "http://localhost:8080")]
    endpoint: String,

    /// Timeout for a single control-plane request in seconds
    #[arg(long, default_value = "30")]
    request_timeout: u64,

    /// Manifest file, or - for stdin
    #[arg(short, long, default_value = "-")]
    manifest: PathBuf,

    /// Poll interval in seconds while waiting
    #[arg(long, default_value = "5")]
    poll_interval: u64,

    /// Tag policy for existing clusters
    #[arg(long, default_value_t = TagPolicy::CLUSTER_DEFAULT)]
    cluster_tag_policy: TagPolicy,

    /// Tag policy for existing instances
    #[arg(long, default_value_t = TagPolicy::INSTANCE_DEFAULT)]
    instance_tag_policy: TagPolicy,

    /// Report delete-time errors other than not-found as failures
    #[arg(long)]
    strict_delete: bool,
}

async fn read_manifest(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut input = String::new();
        tokio::io::stdin()
            .read_to_string(&mut input)
            .await
            .context("Failed to read manifest from stdin")?;
        return Ok(input);
    }
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read manifest {}", path.display()))
}

fn report(outcome: &Outcome) -> Result<ExitCode> {
    println!("{}", serde_json::to_string_pretty(outcome)?);

    Ok(if outcome.kind().is_failure() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docdb_reconciler=info,reqwest=warn,hyper=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let input = read_manifest(&args.manifest).await?;
    let parsed = Manifest::from_json(&input).and_then(|m| m.into_operation(args.strict_delete));
    let operation = match parsed {
        Ok(operation) => operation,
        Err(e) => {
            error!("Invalid manifest: {}", e);
            return report(&Outcome::from(ReconcileError::from(e)));
        }
    };

    info!("Control plane endpoint: {}", args.endpoint);
    let client = HttpControlPlane::new(&args.endpoint, Duration::from_secs(args.request_timeout))
        .context("Failed to build control-plane client")?;

    let timings = Timings {
        poll_interval: Duration::from_secs(args.poll_interval),
        ..Timings::default()
    };

    let outcome = match operation {
        Operation::Cluster(op) => {
            ClusterReconciler::new(client)
                .with_timings(timings)
                .with_tag_policy(args.cluster_tag_policy)
                .execute(&op)
                .await
        }
        Operation::Instance(op) => {
            InstanceReconciler::new(client)
                .with_timings(timings)
                .with_tag_policy(args.instance_tag_policy)
                .execute(&op)
                .await
        }
    };

    report(&outcome)
}
