//! Command-line interface for running and inspecting deployments.

use clap::{Parser, Subcommand};
use eyre::{bail, eyre, Result, WrapErr};
use ignition_engine::artifacts::DirectoryArtifactResolver;
use ignition_engine::config::DeployConfig;
use ignition_engine::journal::{FileJournal, Journal};
use ignition_engine::provider::{DevNetwork, HttpProvider, JsonRpcClient, Provider};
use ignition_engine::resolve::DeploymentParameters;
use ignition_engine::state::DeploymentState;
use ignition_engine::status::{list_transactions, status};
use ignition_engine::{wipe, Deployer, DeploymentResult};
use ignition_graph::FutureGraph;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ignition")]
#[command(about = "Resumable smart-contract deployments", long_about = None)]
struct Args {
    /// JSON-RPC endpoint. Without it, an in-process development network is used.
    #[arg(long, global = true)]
    rpc_url: Option<String>,
    /// Directory holding one subdirectory per deployment.
    #[arg(long, default_value = "deployments", global = true)]
    deployments_dir: PathBuf,
    /// Deployment to operate on. Defaults to `chain-<chain id>`.
    #[arg(long, global = true)]
    deployment_id: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute a deployment graph, resuming any earlier run.
    Deploy {
        /// Future graph as JSON.
        graph: PathBuf,
        /// Module parameters as JSON (module id -> name -> value).
        #[arg(long)]
        parameters: Option<PathBuf>,
        /// Run configuration as JSON.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Directory searched for compiled contract artifacts.
        #[arg(long, default_value = "artifacts")]
        artifacts: PathBuf,
    },
    /// Show futures by status and the addresses of deployed contracts.
    Status {
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// List every transaction the deployment sent.
    Transactions {
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Forget the recorded state of a future so that it executes again.
    Wipe { future_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    let provider: Arc<dyn Provider> = match &args.rpc_url {
        Some(url) => Arc::new(HttpProvider::new(url.as_str())?),
        None => {
            warn!("no --rpc-url given, using an in-process development network");
            Arc::new(DevNetwork::new(20, 0))
        }
    };
    let deployment_dir = deployment_dir(&args, &provider).await?;
    let journal: Arc<dyn Journal> = Arc::new(
        FileJournal::open_dir(&deployment_dir)
            .wrap_err_with(|| format!("opening {}", deployment_dir.display()))?,
    );

    match args.command {
        Command::Deploy {
            graph,
            parameters,
            config,
            artifacts,
        } => {
            let graph: FutureGraph = read_json(&graph)?;
            let parameters: DeploymentParameters = match parameters {
                Some(path) => read_json(&path)?,
                None => DeploymentParameters::new(),
            };
            let config: DeployConfig = match config {
                Some(path) => read_json(&path)?,
                None => DeployConfig::default(),
            };

            let deployer = Deployer::new(
                provider,
                journal,
                Arc::new(DirectoryArtifactResolver::new(artifacts)),
                config,
            );
            let cancel = deployer.cancellation_token();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupted, stopping after in-flight requests");
                    cancel.cancel();
                }
            });

            let result = deployer.deploy(Arc::new(graph), parameters).await?;
            report(&result);
            if !result.is_success() {
                bail!("deployment did not complete");
            }
        }
        Command::Status { json } => {
            let state = DeploymentState::load(journal.as_ref())?;
            let status = status(&state);
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!("Deployment {}", deployment_dir.display());
                for (future_id, address) in &status.contracts {
                    println!("  {future_id:40} {address}");
                }
                println!(
                    "{} successful, {} started, {} failed, {} timed out",
                    status.successful.len(),
                    status.started.len(),
                    status.failed.len(),
                    status.timed_out.len()
                );
                for failed in &status.failed {
                    match &failed.reason {
                        Some(reason) => println!("  FAILED  {}: {reason}", failed.future_id),
                        None => println!("  FAILED  {}", failed.future_id),
                    }
                }
                for future_id in &status.timed_out {
                    println!("  TIMEOUT {future_id}");
                }
            }
        }
        Command::Transactions { json } => {
            let state = DeploymentState::load(journal.as_ref())?;
            let transactions = list_transactions(&state);
            if json {
                println!("{}", serde_json::to_string_pretty(&transactions)?);
            } else {
                for tx in &transactions {
                    println!(
                        "{:40} {:?} nonce {} {} {:?}",
                        tx.future_id,
                        tx.status,
                        tx.nonce.map_or_else(|| "-".to_string(), |n| n.to_string()),
                        tx.hash,
                        tx.future_type
                    );
                }
            }
        }
        Command::Wipe { future_id } => {
            wipe(journal, &future_id)?;
            info!(%future_id, "future wiped; it will execute again on the next deploy");
        }
    }
    Ok(())
}

async fn deployment_dir(args: &Args, provider: &Arc<dyn Provider>) -> Result<PathBuf> {
    let id = match &args.deployment_id {
        Some(id) => id.clone(),
        None => {
            let chain_id = JsonRpcClient::new(provider.clone())
                .chain_id()
                .await
                .wrap_err("querying chain id")?;
            format!("chain-{chain_id}")
        }
    };
    if id.is_empty() || id.contains(['/', '\\']) {
        return Err(eyre!("invalid deployment id {id:?}"));
    }
    Ok(args.deployments_dir.join(id))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content =
        std::fs::read_to_string(path).wrap_err_with(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).wrap_err_with(|| format!("parsing {}", path.display()))
}

fn report(result: &DeploymentResult) {
    match result {
        DeploymentResult::Success => println!("Deployment complete"),
        DeploymentResult::ValidationFailed(errors) => {
            println!("Validation failed:");
            for err in errors {
                println!("  {err}");
            }
        }
        DeploymentResult::ReconciliationFailed(failures) => {
            println!("The deployment changed since the last run:");
            for failure in failures {
                println!("  {failure}");
            }
        }
        DeploymentResult::PreviousRunFailed(futures) => {
            println!("An earlier run left these futures failed; wipe them to retry:");
            for future_id in futures {
                println!("  {future_id}");
            }
        }
        DeploymentResult::ExecutionFailed {
            failed,
            timed_out,
            held,
        } => {
            for failure in failed {
                println!("  FAILED  {}: {}", failure.future_id, failure.reason);
            }
            for future_id in timed_out {
                println!("  TIMEOUT {future_id}");
            }
            if !held.is_empty() {
                println!("  {} futures not executed", held.len());
            }
        }
        DeploymentResult::Cancelled => {
            println!("Deployment cancelled; run again to resume")
        }
    }
}
