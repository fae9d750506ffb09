//! Error taxonomy for deployment orchestration.

use std::time::Duration;

use alloy_core::primitives::TxHash;
use thiserror::Error;

/// Broad class of a [`DeployError`], used to decide whether a run can be retried.
///
/// Variants are ordered by severity so that the most severe class of a report can be
/// found with [`Iterator::max`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ErrorClass {
    /// Transient network failure. Retrying the whole run is safe.
    Network,
    /// The artifact store already holds a differing record. Requires `--force`.
    Conflict,
    /// The catalog or manifest is invalid. Must be fixed by the caller.
    Configuration,
    /// The artifact store cannot be trusted or written. Aborts the run.
    Persistence,
}

/// Errors raised while selecting, deploying and recording contracts.
#[derive(Debug, Clone, Error)]
pub enum DeployError {
    #[error("role `{role}` has no account configured on network `{network}`")]
    UnknownRole { role: String, network: String },

    #[error("dependency cycle detected: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    #[error("deployment `{spec}` depends on unknown deployment `{dependency}`")]
    UnknownDependency { spec: String, dependency: String },

    #[error("deployment `{0}` is declared more than once")]
    DuplicateSpec(String),

    #[error("deployment `{spec}` references `{reference}` which is not listed in depends_on")]
    UndeclaredReference { spec: String, reference: String },

    #[error("invalid constructor arguments for `{spec}`: {reason}")]
    InvalidArgument { spec: String, reason: String },

    #[error("invalid compiled artifact for `{contract}`: {reason}")]
    Artifact { contract: String, reason: String },

    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("network `{0}` is not defined in the manifest")]
    UnknownNetwork(String),

    #[error("network `{network}` reports chain id {actual}, expected {expected}")]
    ChainIdMismatch {
        network: String,
        expected: u64,
        actual: u64,
    },

    #[error(
        "a different record for `{contract}` already exists on `{network}` \
         (stored args hash {stored}, requested {requested}); rerun with --force to redeploy"
    )]
    Conflict {
        network: String,
        contract: String,
        stored: String,
        requested: String,
    },

    #[error("creation transaction for `{contract}` was rejected: {reason}")]
    Submission { contract: String, reason: String },

    #[error("transaction {tx_hash} for `{contract}` was not confirmed within {timeout:?}")]
    ConfirmationTimeout {
        contract: String,
        tx_hash: TxHash,
        timeout: Duration,
    },

    #[error("transaction {tx_hash} for `{contract}` reverted in block {block_number}")]
    Reverted {
        contract: String,
        tx_hash: TxHash,
        block_number: u64,
    },

    #[error("network request failed: {0}")]
    Network(String),

    #[error("artifact store failure: {0}")]
    Persistence(String),

    #[error("deployments for `{network}` need manual reconciliation: {reason}")]
    Reconciliation { network: String, reason: String },
}

impl DeployError {
    /// Returns the class this error belongs to.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::UnknownRole { .. }
            | Self::Cycle(_)
            | Self::UnknownDependency { .. }
            | Self::DuplicateSpec(_)
            | Self::UndeclaredReference { .. }
            | Self::InvalidArgument { .. }
            | Self::Artifact { .. }
            | Self::InvalidManifest(_)
            | Self::UnknownNetwork(_)
            | Self::ChainIdMismatch { .. } => ErrorClass::Configuration,
            Self::Conflict { .. } => ErrorClass::Conflict,
            Self::Submission { .. }
            | Self::ConfirmationTimeout { .. }
            | Self::Reverted { .. }
            | Self::Network(_) => ErrorClass::Network,
            Self::Persistence(_) | Self::Reconciliation { .. } => ErrorClass::Persistence,
        }
    }

    /// Wrap a low-level store failure, keeping its whole context chain.
    pub fn persistence(err: anyhow::Error) -> Self {
        Self::Persistence(format!("{err:#}"))
    }

    /// Wrap a low-level RPC failure, keeping its whole context chain.
    pub fn network(err: anyhow::Error) -> Self {
        Self::Network(format!("{err:#}"))
    }
}
