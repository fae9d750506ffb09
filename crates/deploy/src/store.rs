//! Durable storage of deployment records.
//!
//! Records live under `<root>/<network>/<ContractName>.json`, the layout used by
//! hardhat-deploy, so existing tooling can read them. Every write goes through a
//! temporary file that is synced and renamed into place: a record is either complete
//! or absent.

use std::{
    fs::{File, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use alloy_core::primitives::{Address, TxHash};
use anyhow::Context;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::DeployError;

/// File holding the chain id a network directory belongs to.
pub const CHAIN_ID_FILENAME: &str = ".chainId";
/// Lock file serializing writers of a network directory.
const LOCK_FILENAME: &str = ".lock";
/// Directory receiving records replaced by a forced redeploy.
pub const SUPERSEDED_DIRNAME: &str = ".superseded";
/// Args hash characters kept in archived record names.
const ARCHIVE_TAG_LEN: usize = 16;

/// Persisted outcome of a successful deployment.
///
/// Created once, never mutated. A forced redeploy supersedes it with a new record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    pub contract_name: String,
    pub network: String,
    pub chain_id: u64,
    pub address: Address,
    pub transaction_hash: TxHash,
    /// SHA-256 of the canonical constructor argument encoding.
    pub args_hash: String,
    /// Resolved constructor arguments.
    pub args: Vec<Value>,
    /// Contract interface (ABI) of the deployed artifact.
    pub abi: Value,
    /// SHA-256 of the creation bytecode without constructor arguments.
    pub bytecode_hash: String,
    pub block_number: u64,
    pub deployer: Address,
    /// Unix timestamp of the confirmation.
    pub deployed_at: u64,
    /// Version of shipyard that created this record.
    pub tool_version: String,
}

impl DeploymentRecord {
    /// The exact bytes persisted for this record.
    pub fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        let mut bytes =
            serde_json::to_vec_pretty(self).context("Failed to serialize deployment record")?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}

/// Filesystem-backed artifact store.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn network_dir(&self, network: &str) -> PathBuf {
        self.root.join(network)
    }

    fn record_path(&self, network: &str, contract: &str) -> PathBuf {
        self.network_dir(network).join(format!("{contract}.json"))
    }

    /// Fetch the record stored for `contract` on `network`.
    pub fn get(
        &self,
        network: &str,
        contract: &str,
    ) -> Result<Option<DeploymentRecord>, DeployError> {
        let path = self.record_path(network, contract);
        read_record(&path).map_err(DeployError::persistence)
    }

    /// Store a new record.
    ///
    /// Storing a record byte-identical to the existing one is a no-op. Storing any other
    /// record over an existing one fails with [`DeployError::Conflict`]: records are only
    /// replaced through [`ArtifactStore::remove`].
    pub fn put(
        &self,
        network: &str,
        contract: &str,
        record: &DeploymentRecord,
    ) -> Result<(), DeployError> {
        if record.network != network || record.contract_name != contract {
            return Err(DeployError::Persistence(format!(
                "record for `{}` on `{}` cannot be stored as `{contract}` on `{network}`",
                record.contract_name, record.network
            )));
        }

        let _lock = self.lock(network)?;
        let path = self.record_path(network, contract);
        let bytes = record.to_bytes().map_err(DeployError::persistence)?;

        match std::fs::read(&path) {
            Ok(existing) if existing == bytes => {
                tracing::debug!(
                    contract = %contract,
                    network = %network,
                    "Identical record already stored"
                );
                return Ok(());
            }
            Ok(existing) => {
                let stored = serde_json::from_slice::<DeploymentRecord>(&existing)
                    .map(|existing| existing.args_hash)
                    .unwrap_or_else(|_| "<unreadable>".to_string());
                return Err(DeployError::Conflict {
                    network: network.to_string(),
                    contract: contract.to_string(),
                    stored,
                    requested: record.args_hash.clone(),
                });
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(DeployError::Persistence(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )));
            }
        }

        write_atomic(&path, &bytes).map_err(DeployError::persistence)?;
        tracing::debug!(path = %path.display(), "Deployment record written");
        Ok(())
    }

    /// Invalidate the record for `contract` on `network`.
    ///
    /// The record is moved to the network's `.superseded/` directory rather than deleted.
    /// Returns the archive path, or `None` if there was nothing to remove.
    pub fn remove(&self, network: &str, contract: &str) -> Result<Option<PathBuf>, DeployError> {
        let _lock = self.lock(network)?;
        let path = self.record_path(network, contract);
        if !path.exists() {
            return Ok(None);
        }

        let suffix = match read_record(&path) {
            Ok(Some(record)) => {
                format!("{}.{}", archive_tag(&record.args_hash), record.deployed_at)
            }
            _ => format!("unreadable.{}", chrono::Utc::now().timestamp()),
        };

        let superseded_dir = self.network_dir(network).join(SUPERSEDED_DIRNAME);
        std::fs::create_dir_all(&superseded_dir)
            .with_context(|| format!("Failed to create {}", superseded_dir.display()))
            .map_err(DeployError::persistence)?;

        let archived = superseded_dir.join(format!("{contract}.{suffix}.json"));
        std::fs::rename(&path, &archived)
            .with_context(|| format!("Failed to move {} to {}", path.display(), archived.display()))
            .map_err(DeployError::persistence)?;

        Ok(Some(archived))
    }

    /// All records stored for `network`, sorted by contract name.
    pub fn list(&self, network: &str) -> Result<Vec<DeploymentRecord>, DeployError> {
        let dir = self.network_dir(network);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(DeployError::Persistence(format!(
                    "Failed to read {}: {e}",
                    dir.display()
                )));
            }
        };

        let mut records = Vec::new();
        for entry in entries {
            let path = entry
                .with_context(|| format!("Failed to list {}", dir.display()))
                .map_err(DeployError::persistence)?
                .path();

            let is_record = path.extension().is_some_and(|ext| ext == "json")
                && path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| !name.starts_with('.'));
            if !is_record {
                continue;
            }

            if let Some(record) = read_record(&path).map_err(DeployError::persistence)? {
                records.push(record);
            }
        }

        records.sort_by(|a, b| a.contract_name.cmp(&b.contract_name));
        Ok(records)
    }

    /// Bind the network directory to `chain_id`.
    ///
    /// The first call records the chain id; later calls fail with
    /// [`DeployError::Reconciliation`] if the directory belongs to another chain.
    pub fn ensure_chain_id(&self, network: &str, chain_id: u64) -> Result<(), DeployError> {
        let _lock = self.lock(network)?;
        let path = self.network_dir(network).join(CHAIN_ID_FILENAME);

        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let stored: u64 = content.trim().parse().map_err(|_| {
                    DeployError::Persistence(format!("Malformed chain id file {}", path.display()))
                })?;
                if stored != chain_id {
                    return Err(DeployError::Reconciliation {
                        network: network.to_string(),
                        reason: format!(
                            "stored deployments belong to chain {stored} \
                             but the node reports chain {chain_id}"
                        ),
                    });
                }
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                write_atomic(&path, chain_id.to_string().as_bytes())
                    .map_err(DeployError::persistence)
            }
            Err(e) => Err(DeployError::Persistence(format!(
                "Failed to read {}: {e}",
                path.display()
            ))),
        }
    }

    /// Exclusive lock on the network directory, released on drop.
    fn lock(&self, network: &str) -> Result<StoreLock, DeployError> {
        let dir = self.network_dir(network);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))
            .map_err(DeployError::persistence)?;

        let path = dir.join(LOCK_FILENAME);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .with_context(|| format!("Failed to open {}", path.display()))
            .map_err(DeployError::persistence)?;
        file.lock_exclusive()
            .with_context(|| format!("Failed to lock {}", path.display()))
            .map_err(DeployError::persistence)?;

        Ok(StoreLock(file))
    }
}

struct StoreLock(File);

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.0) {
            tracing::warn!(err = %e, "Failed to release artifact store lock");
        }
    }
}

/// Leading hex digits of a stored args hash, safe to embed in a file name.
fn archive_tag(args_hash: &str) -> String {
    let tag: String = args_hash
        .chars()
        .filter(char::is_ascii_hexdigit)
        .take(ARCHIVE_TAG_LEN)
        .collect();
    if tag.is_empty() { "unknown".to_string() } else { tag }
}

fn read_record(path: &Path) -> anyhow::Result<Option<DeploymentRecord>> {
    let content = match std::fs::read(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
    };

    let record = serde_json::from_slice(&content)
        .with_context(|| format!("Failed to parse deployment record {}", path.display()))?;
    Ok(Some(record))
}

/// Write `bytes` to `path` through a synced temporary file and a rename.
fn write_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let dir = path.parent().context("Record path must have a parent directory")?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .context("Record path must have a file name")?;
    let tmp_path = dir.join(format!(".{file_name}.tmp-{}", std::process::id()));

    let result = (|| {
        let mut file = File::create(&tmp_path)
            .with_context(|| format!("Failed to create {}", tmp_path.display()))?;
        file.write_all(bytes)
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        file.sync_all()
            .with_context(|| format!("Failed to sync {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("Failed to move record into {}", path.display()))
    })();

    if result.is_err() {
        let _ = std::fs::remove_file(&tmp_path);
    }
    result
}
