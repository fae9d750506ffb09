//! Deployment executor.

use std::path::{Path, PathBuf};

use crate::{
    DeployError, DeploymentRecord, NamedAccount, NetworkContext, ResolvedArgs,
    artifact::CompiledArtifact,
    submitter::{ConfirmationError, CreationTransaction, TransactionSubmitter},
};

/// Version stamped into every record this executor creates.
pub const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Submits contract-creation transactions and waits for their confirmation.
///
/// The executor never writes to the artifact store: a record only becomes durable once
/// the orchestrator stores it.
#[derive(Debug)]
pub struct DeploymentExecutor<S> {
    submitter: S,
    artifacts_dir: PathBuf,
}

impl<S: TransactionSubmitter> DeploymentExecutor<S> {
    pub fn new(submitter: S, artifacts_dir: impl Into<PathBuf>) -> Self {
        Self {
            submitter,
            artifacts_dir: artifacts_dir.into(),
        }
    }

    pub fn submitter(&self) -> &S {
        &self.submitter
    }

    pub fn artifacts_dir(&self) -> &Path {
        &self.artifacts_dir
    }

    /// Load the compiled artifact backing `contract`.
    pub fn load_artifact(&self, contract: &str) -> Result<CompiledArtifact, DeployError> {
        CompiledArtifact::load(&self.artifacts_dir, contract)
    }

    /// Deploy `spec_name` from `artifact` with `args`, signed by `signer`.
    ///
    /// The creation transaction is broadcast exactly once. The wait for
    /// `network.confirmations` confirmations is bounded by `network.confirmation_timeout`.
    pub async fn execute(
        &self,
        spec_name: &str,
        artifact: &CompiledArtifact,
        args: &ResolvedArgs,
        signer: &NamedAccount,
        network: &NetworkContext,
    ) -> Result<DeploymentRecord, DeployError> {
        let data = artifact.creation_code(spec_name, args)?;
        let tx = CreationTransaction {
            from: signer.address,
            data,
            gas: network.gas_limit,
        };

        let tx_hash = self
            .submitter
            .submit(&tx)
            .await
            .map_err(|e| DeployError::Submission {
                contract: spec_name.to_string(),
                reason: format!("{e:#}"),
            })?;

        tracing::info!(
            contract = %spec_name,
            tx_hash = %tx_hash,
            signer = %signer.address,
            role = %signer.role,
            "Creation transaction submitted, waiting for confirmation..."
        );

        let confirmation = tokio::time::timeout(
            network.confirmation_timeout,
            self.submitter
                .wait_for_confirmation(tx_hash, network.confirmations),
        )
        .await
        .map_err(|_| DeployError::ConfirmationTimeout {
            contract: spec_name.to_string(),
            tx_hash,
            timeout: network.confirmation_timeout,
        })?
        .map_err(|e| match e {
            ConfirmationError::Reverted { block_number } => DeployError::Reverted {
                contract: spec_name.to_string(),
                tx_hash,
                block_number,
            },
            ConfirmationError::Rpc(reason) => DeployError::Network(reason),
        })?;

        tracing::info!(
            contract = %spec_name,
            address = %confirmation.contract_address,
            block_number = confirmation.block_number,
            "Deployment confirmed"
        );

        Ok(DeploymentRecord {
            contract_name: spec_name.to_string(),
            network: network.name.clone(),
            chain_id: network.chain_id,
            address: confirmation.contract_address,
            transaction_hash: tx_hash,
            args_hash: args.compute_hash(),
            args: args.to_vec(),
            abi: artifact.abi_json.clone(),
            bytecode_hash: artifact.bytecode_hash(),
            block_number: confirmation.block_number,
            deployer: signer.address,
            deployed_at: unix_now(),
            tool_version: TOOL_VERSION.to_string(),
        })
    }
}

fn unix_now() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default()
}
