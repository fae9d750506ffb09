//! Named account resolution.

use std::collections::BTreeMap;

use alloy_core::primitives::Address;
use serde::{Deserialize, Serialize};

use crate::{DeployError, NetworkContext};

/// How a role is bound to an account on a network.
///
/// In the manifest a binding is either an index into the accounts exposed by the node
/// (`deployer = 0`) or an explicit address (`owner = "0x…"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AccountBinding {
    Index(usize),
    Address(Address),
}

/// A role resolved to a concrete account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NamedAccount {
    pub role: String,
    pub address: Address,
}

/// Resolves role names to accounts for the active network.
///
/// The first resolution of a role on a network is memoized, so a role keeps mapping to
/// the same account for the whole run.
#[derive(Debug, Default)]
pub struct AccountResolver {
    resolved: BTreeMap<(String, String), NamedAccount>,
}

impl AccountResolver {
    pub fn resolve(
        &mut self,
        role: &str,
        network: &NetworkContext,
    ) -> Result<NamedAccount, DeployError> {
        let key = (network.name.clone(), role.to_string());
        if let Some(account) = self.resolved.get(&key) {
            return Ok(account.clone());
        }

        let unknown_role = || DeployError::UnknownRole {
            role: role.to_string(),
            network: network.name.clone(),
        };

        let address = match network.accounts.get(role).ok_or_else(unknown_role)? {
            AccountBinding::Address(address) => *address,
            AccountBinding::Index(index) => {
                *network.node_accounts.get(*index).ok_or_else(unknown_role)?
            }
        };

        let account = NamedAccount {
            role: role.to_string(),
            address,
        };
        tracing::debug!(
            role = %role,
            address = %address,
            network = %network.name,
            "Resolved named account"
        );

        self.resolved.insert(key, account.clone());
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> NetworkContext {
        NetworkContext::new("localhost", 31337)
            .with_node_accounts(vec![
                Address::with_last_byte(0xa0),
                Address::with_last_byte(0xa1),
            ])
            .with_account("deployer", AccountBinding::Index(0))
            .with_account("owner", AccountBinding::Address(Address::with_last_byte(0xbb)))
            .with_account("treasury", AccountBinding::Index(5))
    }

    #[test]
    fn test_resolve_index_binding() {
        let mut resolver = AccountResolver::default();
        let account = resolver.resolve("deployer", &context()).unwrap();
        assert_eq!(account.role, "deployer");
        assert_eq!(account.address, Address::with_last_byte(0xa0));
    }

    #[test]
    fn test_resolve_address_binding() {
        let mut resolver = AccountResolver::default();
        let account = resolver.resolve("owner", &context()).unwrap();
        assert_eq!(account.address, Address::with_last_byte(0xbb));
    }

    #[test]
    fn test_unknown_role() {
        let mut resolver = AccountResolver::default();
        let result = resolver.resolve("minter", &context());
        assert!(matches!(
            result,
            Err(DeployError::UnknownRole { role, network })
                if role == "minter" && network == "localhost"
        ));
    }

    #[test]
    fn test_index_out_of_range() {
        let mut resolver = AccountResolver::default();
        assert!(matches!(
            resolver.resolve("treasury", &context()),
            Err(DeployError::UnknownRole { .. })
        ));
    }

    #[test]
    fn test_resolution_is_stable_within_run() {
        let mut resolver = AccountResolver::default();
        let first = resolver.resolve("deployer", &context()).unwrap();

        // A later context with reordered node accounts must not change the binding.
        let reordered = context().with_node_accounts(vec![
            Address::with_last_byte(0xa1),
            Address::with_last_byte(0xa0),
        ]);
        let second = resolver.resolve("deployer", &reordered).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_parse_bindings() {
        let content = r#"
            deployer = 0
            owner = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8"
        "#;
        let bindings: BTreeMap<String, AccountBinding> = toml::from_str(content).unwrap();
        assert_eq!(bindings["deployer"], AccountBinding::Index(0));
        assert!(matches!(bindings["owner"], AccountBinding::Address(_)));
    }
}
