//! shipyard deploys smart contracts from a declarative catalog, at most once per network.

mod cli;
mod report;

use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::{Context, Result};
use clap::Parser;

use cli::{Cli, Command, DeployArgs, ExportArgs, NetworkArgs};
use shipyard_deploy::{
    ArtifactStore, DeployError, DeploymentExecutor, ErrorClass, MANIFEST_FILENAME, Manifest,
    NetworkContextBuilder, Orchestrator, RunOptions,
};

/// Configuration error or stored-record conflict: fix the catalog or use `--force`.
const EXIT_CONFIGURATION: u8 = 2;
/// Transient network failure: re-running is safe.
const EXIT_NETWORK: u8 = 3;
/// The artifact store needs manual reconciliation.
const EXIT_PERSISTENCE: u8 = 4;
/// Interrupted by Ctrl-C.
const EXIT_INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::from(error_exit_code(&err))
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let Cli {
        config, command, ..
    } = cli;

    match command {
        Command::Deploy(args) => deploy(&config, args).await,
        Command::List(args) => list(&config, &args).map(|()| ExitCode::SUCCESS),
        Command::Export(args) => export(&config, &args).map(|()| ExitCode::SUCCESS),
        Command::Init(args) => init(&config, args.force).map(|()| ExitCode::SUCCESS),
    }
}

async fn deploy(config: &Path, args: DeployArgs) -> Result<ExitCode> {
    let manifest = Manifest::load_from_file(config)?;
    let network = &args.network.network;

    let (context, submitter) = NetworkContextBuilder::from_manifest(&manifest, network)?
        .build()
        .await?;

    let orchestrator = Orchestrator::new(
        ArtifactStore::new(manifest.deployments_dir()),
        DeploymentExecutor::new(submitter, manifest.artifacts_dir()),
    );
    let options = RunOptions {
        tags: args.tags(),
        force: args.force,
    };

    let report = tokio::select! {
        report = orchestrator.run(&manifest.contracts, &context, &options) => report?,
        () = interrupted() => {
            tracing::warn!(
                network = %network,
                "Interrupted: stored records are kept, the deployment in flight has no record \
                 and will be retried on the next run"
            );
            return Ok(ExitCode::from(EXIT_INTERRUPTED));
        }
    };

    println!("{}", report::report_table(&report));

    if report.is_success() {
        return Ok(ExitCode::SUCCESS);
    }
    Ok(report
        .error_class()
        .map(|class| ExitCode::from(class_exit_code(class)))
        .unwrap_or(ExitCode::FAILURE))
}

fn list(config: &Path, args: &NetworkArgs) -> Result<()> {
    let manifest = Manifest::load_from_file(config)?;
    manifest.network(&args.network)?;

    let store = ArtifactStore::new(manifest.deployments_dir());
    let records = store.list(&args.network)?;
    if records.is_empty() {
        tracing::info!(network = %args.network, "No deployments recorded");
        return Ok(());
    }

    println!("{}", report::records_table(&records));
    Ok(())
}

/// Write `{ network, chainId, contracts: { Name: { address, abi } } }`.
fn export(config: &Path, args: &ExportArgs) -> Result<()> {
    let manifest = Manifest::load_from_file(config)?;
    let network = &args.network.network;
    let network_config = manifest.network(network)?;

    let store = ArtifactStore::new(manifest.deployments_dir());
    let records = store.list(network)?;

    let chain_id = records
        .first()
        .map(|record| record.chain_id)
        .or(network_config.chain_id);
    let contracts: serde_json::Map<String, serde_json::Value> = records
        .iter()
        .map(|record| {
            (
                record.contract_name.clone(),
                serde_json::json!({ "address": record.address, "abi": record.abi }),
            )
        })
        .collect();

    let export = serde_json::json!({
        "network": network,
        "chainId": chain_id,
        "contracts": contracts,
    });
    let content =
        serde_json::to_string_pretty(&export).context("Failed to serialize deployments")?;
    std::fs::write(&args.out, content)
        .with_context(|| format!("Failed to write {}", args.out.display()))?;

    tracing::info!(
        network = %network,
        contracts = records.len(),
        out = %args.out.display(),
        "Deployments exported"
    );
    Ok(())
}

fn init(config: &Path, force: bool) -> Result<()> {
    let path: PathBuf = if config.is_dir() {
        config.join(MANIFEST_FILENAME)
    } else {
        config.to_path_buf()
    };

    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists, use --force to overwrite it",
            path.display()
        );
    }

    Manifest::example().save_to_file(&path)
}

/// Resolves on Ctrl-C.
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(err = %e, "Failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
}

fn class_exit_code(class: ErrorClass) -> u8 {
    match class {
        ErrorClass::Configuration | ErrorClass::Conflict => EXIT_CONFIGURATION,
        ErrorClass::Network => EXIT_NETWORK,
        ErrorClass::Persistence => EXIT_PERSISTENCE,
    }
}

fn error_exit_code(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<DeployError>()
        .map(|err| class_exit_code(err.class()))
        .unwrap_or(1)
}
