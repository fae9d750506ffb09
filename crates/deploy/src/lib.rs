//! shipyard-deploy - Declarative smart contract deployment.
//!
//! This crate selects deployments from a catalog by tag, orders them by dependency,
//! deploys each contract at most once per network and records the outcome in an
//! on-disk artifact store, so that re-running an unchanged catalog is a no-op.

mod error;
pub use error::{DeployError, ErrorClass};

mod catalog;
pub use catalog::{Catalog, ConstructorArg, DEFAULT_SIGNER_ROLE, DeploymentSpec};

mod manifest;
pub use manifest::{MANIFEST_FILENAME, Manifest, NetworkConfig, SETTINGS_ENV_PREFIX, Settings};

mod context;
pub use context::{DEFAULT_CONFIRMATION_TIMEOUT, DEFAULT_CONFIRMATIONS, NetworkContext};

mod accounts;
pub use accounts::{AccountBinding, AccountResolver, NamedAccount};

mod args_hash;
pub use args_hash::{ResolvedArgs, sha256_hex};

pub mod artifact;
pub use artifact::CompiledArtifact;

mod store;
pub use store::{ArtifactStore, CHAIN_ID_FILENAME, DeploymentRecord, SUPERSEDED_DIRNAME};

pub mod rpc;

pub mod submitter;
pub use submitter::{
    Confirmation, ConfirmationError, CreationTransaction, RpcSubmitter, TransactionSubmitter,
};

mod executor;
pub use executor::{DeploymentExecutor, TOOL_VERSION};

mod selector;
pub use selector::select;

mod orchestrator;
pub use orchestrator::{DeploymentReport, Orchestrator, RunOptions, SpecOutcome, SpecState};

mod builder;
pub use builder::NetworkContextBuilder;
