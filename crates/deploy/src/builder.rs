//! Builder module for creating a [`NetworkContext`].
//!
//! This module provides the [`NetworkContextBuilder`] struct, which turns a network
//! section of the manifest into the explicit context of a run by querying the node
//! once for its chain id and, when needed, the accounts it manages.

use std::collections::BTreeMap;

use url::Url;

use crate::{
    AccountBinding, DeployError, Manifest, NetworkConfig, NetworkContext, rpc,
    submitter::RpcSubmitter,
};

/// Builder for creating a [`NetworkContext`] and the [`RpcSubmitter`] of its node.
///
/// # Example
///
/// ```no_run
/// use shipyard_deploy::{Manifest, NetworkContextBuilder};
///
/// # async fn example() -> anyhow::Result<()> {
/// let manifest = Manifest::example();
/// let (context, submitter) = NetworkContextBuilder::from_manifest(&manifest, "localhost")?
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct NetworkContextBuilder {
    /// The network name.
    name: String,
    /// The network section of the manifest.
    config: NetworkConfig,
    /// Role bindings in effect on the network.
    accounts: BTreeMap<String, AccountBinding>,
}

impl NetworkContextBuilder {
    /// Create a new [`NetworkContextBuilder`] with the network's own role bindings.
    pub fn new(name: impl Into<String>, config: NetworkConfig) -> Self {
        let accounts = config.accounts.clone();
        Self {
            name: name.into(),
            config,
            accounts,
        }
    }

    /// Create a builder for `network`, with the manifest's shared role bindings
    /// overridden by the network's own.
    pub fn from_manifest(manifest: &Manifest, network: &str) -> Result<Self, DeployError> {
        let config = manifest.network(network)?.clone();
        let accounts = manifest.account_bindings(network)?;
        Ok(Self::new(network, config).accounts(accounts))
    }

    /// Replace the role bindings.
    pub fn accounts(mut self, accounts: BTreeMap<String, AccountBinding>) -> Self {
        self.accounts = accounts;
        self
    }

    /// Bind a single role.
    pub fn account(mut self, role: impl Into<String>, binding: AccountBinding) -> Self {
        self.accounts.insert(role.into(), binding);
        self
    }

    /// Build the [`NetworkContext`].
    ///
    /// This method:
    /// 1. Parses the RPC URL
    /// 2. Fetches the chain id and checks it against the configured one, if any
    /// 3. Fetches the node accounts if a role is bound by index
    pub async fn build(self) -> Result<(NetworkContext, RpcSubmitter), DeployError> {
        let url = Url::parse(&self.config.rpc_url).map_err(|e| {
            DeployError::InvalidManifest(format!(
                "invalid rpc_url `{}` for network `{}`: {e}",
                self.config.rpc_url, self.name
            ))
        })?;

        let client = rpc::create_client().map_err(DeployError::network)?;
        let unreachable = |e: anyhow::Error| {
            DeployError::Network(format!("network `{}` at {url}: {e:#}", self.name))
        };

        let chain_id = rpc::chain_id(&client, url.as_str())
            .await
            .map_err(unreachable)?;

        if let Some(expected) = self.config.chain_id {
            if expected != chain_id {
                return Err(DeployError::ChainIdMismatch {
                    network: self.name.clone(),
                    expected,
                    actual: chain_id,
                });
            }
        }

        let needs_node_accounts = self
            .accounts
            .values()
            .any(|binding| matches!(binding, AccountBinding::Index(_)));
        let node_accounts = if needs_node_accounts {
            rpc::accounts(&client, url.as_str())
                .await
                .map_err(unreachable)?
        } else {
            Vec::new()
        };

        tracing::info!(
            network = %self.name,
            url = %url,
            chain_id,
            node_accounts = node_accounts.len(),
            roles = self.accounts.len(),
            "Connected to network"
        );

        let submitter =
            RpcSubmitter::new(url, self.config.poll_interval()).map_err(DeployError::network)?;

        let context = NetworkContext {
            name: self.name,
            chain_id,
            confirmations: self.config.confirmations,
            confirmation_timeout: self.config.confirmation_timeout(),
            gas_limit: self.config.gas_limit,
            verify_existing: self.config.verify_existing,
            accounts: self.accounts,
            node_accounts,
        };

        Ok((context, submitter))
    }
}

#[cfg(test)]
mod tests {
    use alloy_core::primitives::Address;
    use serde_json::json;

    use super::*;
    use crate::rpc::mock_node::MockNode;

    const DEPLOYER: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    async fn anvil_node() -> MockNode {
        MockNode::start([
            ("eth_chainId", json!("0x7a69")),
            ("eth_accounts", json!([DEPLOYER])),
        ])
        .await
    }

    #[test]
    fn test_from_manifest_merges_bindings() {
        let mut manifest = Manifest::example();
        let owner = Address::with_last_byte(0x42);
        manifest
            .networks
            .get_mut("localhost")
            .unwrap()
            .accounts
            .insert("owner".to_string(), AccountBinding::Address(owner));

        let builder = NetworkContextBuilder::from_manifest(&manifest, "localhost").unwrap();
        assert_eq!(builder.accounts.get("deployer"), Some(&AccountBinding::Index(0)));
        assert_eq!(builder.accounts.get("owner"), Some(&AccountBinding::Address(owner)));
    }

    #[test]
    fn test_from_manifest_unknown_network() {
        let manifest = Manifest::example();
        let result = NetworkContextBuilder::from_manifest(&manifest, "mainnet");
        assert!(matches!(result, Err(DeployError::UnknownNetwork(name)) if name == "mainnet"));
    }

    #[tokio::test]
    async fn test_build_rejects_invalid_url() {
        let result = NetworkContextBuilder::new("local", NetworkConfig::new("not a url"))
            .build()
            .await;
        assert!(matches!(result, Err(DeployError::InvalidManifest(_))));
    }

    #[tokio::test]
    async fn test_build_fetches_chain_and_accounts() {
        let node = anvil_node().await;
        let mut config = NetworkConfig::new(node.url());
        config.confirmations = 3;

        let (context, submitter) = NetworkContextBuilder::new("localhost", config)
            .account("deployer", AccountBinding::Index(0))
            .build()
            .await
            .unwrap();

        assert_eq!(context.chain_id, 31337);
        assert_eq!(context.confirmations, 3);
        assert_eq!(context.node_accounts, vec![DEPLOYER.parse::<Address>().unwrap()]);
        assert_eq!(submitter.url().host_str(), Some("127.0.0.1"));
    }

    #[tokio::test]
    async fn test_build_skips_accounts_without_index_bindings() {
        let node = MockNode::start([("eth_chainId", json!("0x1"))]).await;

        let (context, _) = NetworkContextBuilder::new("mainnet", NetworkConfig::new(node.url()))
            .account("deployer", AccountBinding::Address(Address::with_last_byte(1)))
            .build()
            .await
            .unwrap();

        assert_eq!(context.chain_id, 1);
        assert!(context.node_accounts.is_empty());
    }

    #[tokio::test]
    async fn test_build_rejects_chain_id_mismatch() {
        let node = anvil_node().await;
        let mut config = NetworkConfig::new(node.url());
        config.chain_id = Some(1);

        let result = NetworkContextBuilder::new("mainnet", config).build().await;
        assert!(matches!(
            result,
            Err(DeployError::ChainIdMismatch { expected: 1, actual: 31337, .. })
        ));
    }

    #[tokio::test]
    async fn test_build_unreachable_node_is_network_error() {
        let result = NetworkContextBuilder::new("local", NetworkConfig::new("http://127.0.0.1:1"))
            .build()
            .await;
        assert!(matches!(result, Err(ref e) if e.class() == crate::ErrorClass::Network));
    }
}
