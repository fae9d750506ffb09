use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use shipyard_deploy::MANIFEST_FILENAME;
use tracing::level_filters::LevelFilter;

#[derive(Debug, Parser)]
#[command(name = "shipyard")]
#[command(
    author,
    version,
    about = "Deploy smart contracts from a declarative catalog, once per network"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(
        short,
        long,
        global = true,
        env = "SHIPYARD_VERBOSITY",
        default_value_t = LevelFilter::INFO
    )]
    pub verbosity: LevelFilter,

    /// Path to the manifest, or to the directory containing `Shipyard.toml`.
    #[arg(
        short,
        long,
        global = true,
        alias = "conf",
        env = "SHIPYARD_CONFIG",
        default_value = MANIFEST_FILENAME
    )]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Deploy the selected contracts that have no record on the network yet.
    Deploy(DeployArgs),
    /// List the deployment records stored for a network.
    List(NetworkArgs),
    /// Export addresses and ABIs of a network's deployments for client code generation.
    Export(ExportArgs),
    /// Write a starter manifest.
    Init(InitArgs),
}

#[derive(Debug, Clone, Args)]
pub struct NetworkArgs {
    /// The network to operate on, as named in the manifest.
    #[arg(short, long, env = "SHIPYARD_NETWORK")]
    pub network: String,
}

#[derive(Debug, Clone, Args)]
pub struct DeployArgs {
    #[command(flatten)]
    pub network: NetworkArgs,

    /// Comma-separated tags to deploy. Dependencies of tagged contracts are always
    /// deployed too. If not provided, the whole catalog is deployed.
    #[arg(short, long, env = "SHIPYARD_TAGS", value_delimiter = ',')]
    pub tags: Vec<String>,

    /// Supersede the stored records of the selected contracts and redeploy them.
    #[arg(long, env = "SHIPYARD_FORCE", default_value_t = false)]
    pub force: bool,
}

impl DeployArgs {
    /// Requested tags, trimmed, without empty entries.
    pub fn tags(&self) -> Vec<String> {
        self.tags
            .iter()
            .map(|tag| tag.trim())
            .filter(|tag| !tag.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone, Args)]
pub struct ExportArgs {
    #[command(flatten)]
    pub network: NetworkArgs,

    /// The file to write.
    #[arg(short, long)]
    pub out: PathBuf,
}

#[derive(Debug, Clone, Args)]
pub struct InitArgs {
    /// Overwrite an existing manifest.
    #[arg(long, default_value_t = false)]
    pub force: bool,
}
