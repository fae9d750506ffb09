use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::{Deserialize, Serialize};

use crate::{AccountBinding, Catalog, DeployError, DeploymentSpec, catalog::validate_name};

/// The default name for the shipyard manifest file.
pub const MANIFEST_FILENAME: &str = "Shipyard.toml";

/// Prefix of the environment variables overriding `[settings]`.
pub const SETTINGS_ENV_PREFIX: &str = "SHIPYARD_SETTINGS_";

/// Workspace-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Root of the artifact store, relative to the manifest.
    #[serde(default = "Settings::default_deployments_dir")]
    pub deployments_dir: PathBuf,
    /// Directory holding compiled artifacts (`<Contract>.json`), relative to the manifest.
    #[serde(default = "Settings::default_artifacts_dir")]
    pub artifacts_dir: PathBuf,
}

impl Settings {
    fn default_deployments_dir() -> PathBuf {
        PathBuf::from("deployments")
    }

    fn default_artifacts_dir() -> PathBuf {
        PathBuf::from("artifacts")
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            deployments_dir: Self::default_deployments_dir(),
            artifacts_dir: Self::default_artifacts_dir(),
        }
    }
}

/// Configuration of one target network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkConfig {
    /// JSON-RPC endpoint of the node.
    pub rpc_url: String,
    /// Expected chain id. Checked against the node when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    /// Confirmations required for a deployment to be recorded.
    #[serde(default = "NetworkConfig::default_confirmations")]
    pub confirmations: u64,
    /// Upper bound on the confirmation wait, in seconds.
    #[serde(default = "NetworkConfig::default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,
    /// Interval between receipt polls, in milliseconds.
    #[serde(default = "NetworkConfig::default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Gas limit for creation transactions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<u64>,
    /// Check that recorded addresses still hold code before skipping them.
    #[serde(default = "NetworkConfig::default_verify_existing")]
    pub verify_existing: bool,
    /// Role bindings overriding the top-level `[accounts]` on this network.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub accounts: BTreeMap<String, AccountBinding>,
}

impl NetworkConfig {
    fn default_confirmations() -> u64 {
        crate::context::DEFAULT_CONFIRMATIONS
    }

    fn default_confirmation_timeout_secs() -> u64 {
        crate::context::DEFAULT_CONFIRMATION_TIMEOUT.as_secs()
    }

    fn default_poll_interval_ms() -> u64 {
        1000
    }

    fn default_verify_existing() -> bool {
        true
    }

    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            chain_id: None,
            confirmations: Self::default_confirmations(),
            confirmation_timeout_secs: Self::default_confirmation_timeout_secs(),
            poll_interval_ms: Self::default_poll_interval_ms(),
            gas_limit: None,
            verify_existing: Self::default_verify_existing(),
            accounts: BTreeMap::new(),
        }
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// The shipyard manifest: settings, account bindings, networks and the deployment catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub settings: Settings,
    /// Role bindings shared by every network.
    #[serde(default)]
    pub accounts: BTreeMap<String, AccountBinding>,
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkConfig>,
    #[serde(default)]
    pub contracts: Catalog,

    /// Directory relative paths are resolved against.
    #[serde(skip)]
    pub root: PathBuf,
}

impl Manifest {
    /// Starter manifest: a single ERC20 token deployed by the `deployer` role on a local node.
    pub fn example() -> Self {
        let token = DeploymentSpec::new("ERC20Token")
            .arg("MyToken")
            .arg("MTK")
            .tag("ERC20Token");

        Self {
            settings: Settings::default(),
            accounts: BTreeMap::from([("deployer".to_string(), AccountBinding::Index(0))]),
            networks: BTreeMap::from([(
                "localhost".to_string(),
                NetworkConfig::new("http://127.0.0.1:8545"),
            )]),
            contracts: Catalog::new(vec![token]).expect("example catalog is valid"),
            root: PathBuf::from("."),
        }
    }

    /// Load the manifest from a file, or from `Shipyard.toml` inside a directory.
    ///
    /// `[settings]` keys can be overridden with `SHIPYARD_SETTINGS_<KEY>` environment
    /// variables.
    pub fn load_from_file(path: &Path) -> Result<Self, DeployError> {
        if !path.exists() {
            return Err(DeployError::InvalidManifest(format!(
                "manifest file or directory not found: {}",
                path.display()
            )));
        }

        let manifest_path = if path.is_dir() {
            path.join(MANIFEST_FILENAME)
        } else {
            path.to_path_buf()
        };

        let mut manifest: Self = Figment::new()
            .merge(Toml::file(&manifest_path))
            .merge(
                Env::prefixed(SETTINGS_ENV_PREFIX)
                    .map(|key| format!("settings.{}", key.as_str()).into()),
            )
            .extract()
            .map_err(|e| DeployError::InvalidManifest(e.to_string()))?;

        for network in manifest.networks.keys() {
            validate_name("network", network)?;
        }

        manifest.root = manifest_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        tracing::info!(
            path = %manifest_path.display(),
            networks = manifest.networks.len(),
            contracts = manifest.contracts.len(),
            "Manifest loaded"
        );
        Ok(manifest)
    }

    /// Save the manifest to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> anyhow::Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize manifest to TOML")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write manifest to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Manifest saved");
        Ok(())
    }

    /// Look up a network by name.
    pub fn network(&self, name: &str) -> Result<&NetworkConfig, DeployError> {
        self.networks
            .get(name)
            .ok_or_else(|| DeployError::UnknownNetwork(name.to_string()))
    }

    /// Role bindings for a network: the shared `[accounts]` overridden by the network's own.
    pub fn account_bindings(
        &self,
        network: &str,
    ) -> Result<BTreeMap<String, AccountBinding>, DeployError> {
        let mut bindings = self.accounts.clone();
        bindings.extend(self.network(network)?.accounts.clone());
        Ok(bindings)
    }

    pub fn deployments_dir(&self) -> PathBuf {
        self.root.join(&self.settings.deployments_dir)
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.root.join(&self.settings.artifacts_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConstructorArg;
    use tempdir::TempDir;

    const MANIFEST: &str = r#"
        [settings]
        deployments_dir = "out/deployments"

        [accounts]
        deployer = 0
        owner = 1

        [networks.localhost]
        rpc_url = "http://127.0.0.1:8545"
        chain_id = 31337

        [networks.sepolia]
        rpc_url = "https://ethereum-sepolia-rpc.publicnode.com"
        confirmations = 3
        confirmation_timeout_secs = 600

        [networks.sepolia.accounts]
        owner = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8"

        [[contracts]]
        name = "Token"
        args = ["MyToken", "MTK"]
        tags = ["erc20"]

        [[contracts]]
        name = "Vault"
        args = [{ deployment = "Token" }]
        depends_on = ["Token"]
    "#;

    fn write_manifest(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join(MANIFEST_FILENAME);
        std::fs::write(&path, content).expect("Failed to write manifest");
        path
    }

    #[test]
    fn test_load_manifest() {
        let temp_dir = TempDir::new("shipyard-test").expect("Failed to create temp dir");
        let path = write_manifest(&temp_dir, MANIFEST);

        let manifest = Manifest::load_from_file(&path).expect("Failed to load manifest");

        assert_eq!(manifest.contracts.len(), 2);
        assert_eq!(manifest.root, temp_dir.path());
        assert_eq!(
            manifest.deployments_dir(),
            temp_dir.path().join("out/deployments")
        );
        assert_eq!(manifest.artifacts_dir(), temp_dir.path().join("artifacts"));

        let localhost = manifest.network("localhost").unwrap();
        assert_eq!(localhost.chain_id, Some(31337));
        assert_eq!(localhost.confirmations, 1);
        assert_eq!(localhost.confirmation_timeout(), Duration::from_secs(120));
        assert!(localhost.verify_existing);

        let sepolia = manifest.network("sepolia").unwrap();
        assert_eq!(sepolia.confirmations, 3);

        let vault = manifest.contracts.get("Vault").unwrap();
        assert_eq!(
            vault.constructor_args,
            vec![ConstructorArg::Deployment {
                deployment: "Token".into()
            }]
        );
    }

    #[test]
    fn test_load_from_directory() {
        let temp_dir = TempDir::new("shipyard-test").expect("Failed to create temp dir");
        write_manifest(&temp_dir, MANIFEST);

        let manifest = Manifest::load_from_file(temp_dir.path()).expect("Failed to load manifest");
        assert_eq!(manifest.networks.len(), 2);
    }

    #[test]
    fn test_network_account_overrides() {
        let temp_dir = TempDir::new("shipyard-test").expect("Failed to create temp dir");
        let path = write_manifest(&temp_dir, MANIFEST);
        let manifest = Manifest::load_from_file(&path).unwrap();

        let localhost = manifest.account_bindings("localhost").unwrap();
        assert_eq!(localhost["owner"], AccountBinding::Index(1));

        let sepolia = manifest.account_bindings("sepolia").unwrap();
        assert_eq!(sepolia["deployer"], AccountBinding::Index(0));
        assert!(matches!(sepolia["owner"], AccountBinding::Address(_)));
    }

    #[test]
    fn test_unknown_network() {
        let manifest = Manifest::example();
        assert!(matches!(
            manifest.network("mainnet"),
            Err(DeployError::UnknownNetwork(name)) if name == "mainnet"
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new("shipyard-test").expect("Failed to create temp dir");
        let result = Manifest::load_from_file(&temp_dir.path().join("nonexistent.toml"));
        assert!(matches!(result, Err(DeployError::InvalidManifest(_))));
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let temp_dir = TempDir::new("shipyard-test").expect("Failed to create temp dir");
        let path = write_manifest(
            &temp_dir,
            r#"
            [networks.localhost]
            rpc_url = "http://127.0.0.1:8545"
            gas_price = 1
            "#,
        );

        let result = Manifest::load_from_file(&path);
        assert!(matches!(result, Err(DeployError::InvalidManifest(_))));
    }

    #[test]
    fn test_network_name_escaping_store_rejected() {
        let temp_dir = TempDir::new("shipyard-test").expect("Failed to create temp dir");
        let path = write_manifest(
            &temp_dir,
            r#"
            [networks."../outside"]
            rpc_url = "http://127.0.0.1:8545"
            "#,
        );

        let result = Manifest::load_from_file(&path);
        assert!(
            matches!(result, Err(DeployError::InvalidManifest(ref msg)) if msg.contains("network")),
            "got {result:?}"
        );
    }

    #[test]
    fn test_invalid_catalog_rejected() {
        let temp_dir = TempDir::new("shipyard-test").expect("Failed to create temp dir");
        let path = write_manifest(
            &temp_dir,
            r#"
            [[contracts]]
            name = "Vault"
            depends_on = ["Token"]
            "#,
        );

        assert!(Manifest::load_from_file(&path).is_err());
    }

    #[test]
    fn test_example_save_and_load() {
        let temp_dir = TempDir::new("shipyard-test").expect("Failed to create temp dir");
        let path = temp_dir.path().join(MANIFEST_FILENAME);

        let example = Manifest::example();
        example.save_to_file(&path).expect("Failed to save manifest");

        let loaded = Manifest::load_from_file(&path).expect("Failed to load manifest");
        assert_eq!(loaded.contracts, example.contracts);
        assert_eq!(loaded.networks, example.networks);
        assert_eq!(loaded.accounts, example.accounts);

        let token = loaded.contracts.get("ERC20Token").unwrap();
        assert_eq!(token.signer_role, "deployer");
        assert!(token.tags.contains("ERC20Token"));
    }
}
