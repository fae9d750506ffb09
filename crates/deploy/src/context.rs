//! Per-run network context.

use std::{collections::BTreeMap, time::Duration};

use alloy_core::primitives::Address;

use crate::AccountBinding;

/// Default number of confirmations a creation transaction must reach.
pub const DEFAULT_CONFIRMATIONS: u64 = 1;
/// Default bound on the confirmation wait.
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Everything the account resolver and the executor need to know about the active network.
///
/// Built once per run (see [`NetworkContextBuilder`](crate::NetworkContextBuilder)) and
/// passed explicitly to every component. Never mutated during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkContext {
    /// Network name, also the artifact store namespace.
    pub name: String,
    /// Chain id reported by the node.
    pub chain_id: u64,
    /// Confirmations required before a deployment is considered final.
    pub confirmations: u64,
    /// Upper bound on the confirmation wait.
    pub confirmation_timeout: Duration,
    /// Gas limit for creation transactions. Left to the node when unset.
    pub gas_limit: Option<u64>,
    /// Check that recorded addresses still hold code before skipping.
    pub verify_existing: bool,
    /// Role bindings for this network.
    pub accounts: BTreeMap<String, AccountBinding>,
    /// Accounts exposed by the node (`eth_accounts`), used by index bindings.
    pub node_accounts: Vec<Address>,
}

impl NetworkContext {
    pub fn new(name: impl Into<String>, chain_id: u64) -> Self {
        Self {
            name: name.into(),
            chain_id,
            confirmations: DEFAULT_CONFIRMATIONS,
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            gas_limit: None,
            verify_existing: true,
            accounts: BTreeMap::new(),
            node_accounts: Vec::new(),
        }
    }

    pub fn with_account(mut self, role: impl Into<String>, binding: AccountBinding) -> Self {
        self.accounts.insert(role.into(), binding);
        self
    }

    pub fn with_node_accounts(mut self, accounts: Vec<Address>) -> Self {
        self.node_accounts = accounts;
        self
    }

    pub fn with_confirmations(mut self, confirmations: u64) -> Self {
        self.confirmations = confirmations;
        self
    }

    pub fn with_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    pub fn with_verify_existing(mut self, verify: bool) -> Self {
        self.verify_existing = verify;
        self
    }
}
