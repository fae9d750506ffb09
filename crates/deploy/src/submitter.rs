//! Network transaction submission.
//!
//! The executor only talks to the network through [`TransactionSubmitter`]. The
//! JSON-RPC implementation delegates signing to the node (`eth_sendTransaction` with
//! node-managed accounts).

use std::{future::Future, time::Duration};

use alloy_core::primitives::{Address, Bytes, TxHash};
use backon::{ExponentialBuilder, Retryable};
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::rpc;

/// A contract-creation transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreationTransaction {
    pub from: Address,
    /// Creation bytecode followed by the encoded constructor arguments.
    pub data: Bytes,
    pub gas: Option<u64>,
}

/// A creation transaction that reached the requested number of confirmations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmation {
    pub contract_address: Address,
    pub block_number: u64,
}

/// Why a confirmation wait ended without a [`Confirmation`].
#[derive(Debug, Error)]
pub enum ConfirmationError {
    #[error("transaction reverted in block {block_number}")]
    Reverted { block_number: u64 },
    #[error("{0}")]
    Rpc(String),
}

/// Collaborator submitting transactions to a network.
///
/// `submit` must broadcast exactly once: callers never retry it, because a second
/// broadcast with another nonce would deploy a second contract.
pub trait TransactionSubmitter: Send + Sync {
    /// Broadcast a creation transaction and return its hash.
    fn submit(
        &self,
        tx: &CreationTransaction,
    ) -> impl Future<Output = anyhow::Result<TxHash>> + Send;

    /// Wait until `tx_hash` is included and has `confirmations` confirmations.
    ///
    /// Waits indefinitely; callers bound the wait.
    fn wait_for_confirmation(
        &self,
        tx_hash: TxHash,
        confirmations: u64,
    ) -> impl Future<Output = Result<Confirmation, ConfirmationError>> + Send;

    /// Whether code is deployed at `address`.
    fn contract_exists(
        &self,
        address: Address,
    ) -> impl Future<Output = anyhow::Result<bool>> + Send;
}

/// Subset of a transaction receipt needed to confirm a deployment.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionReceipt {
    #[serde(deserialize_with = "rpc::deserialize_u64_from_hex")]
    block_number: u64,
    contract_address: Option<Address>,
    #[serde(default, deserialize_with = "rpc::deserialize_opt_u64_from_hex")]
    status: Option<u64>,
}

/// [`TransactionSubmitter`] backed by a JSON-RPC endpoint.
#[derive(Debug, Clone)]
pub struct RpcSubmitter {
    client: reqwest::Client,
    url: Url,
    poll_interval: Duration,
}

impl RpcSubmitter {
    pub fn new(url: Url, poll_interval: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            client: rpc::create_client()?,
            url,
            poll_interval,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Read-only calls are retried on transport errors.
    async fn fetch_receipt(&self, tx_hash: TxHash) -> anyhow::Result<Option<TransactionReceipt>> {
        let client = &self.client;
        let url = self.url.as_str();

        (move || async move {
            rpc::json_rpc_call(
                client,
                url,
                "eth_getTransactionReceipt",
                vec![serde_json::json!(tx_hash)],
            )
            .await
        })
        .retry(ExponentialBuilder::default().with_max_times(3))
        .notify(|err: &anyhow::Error, dur: Duration| {
            tracing::debug!(
                err = %err,
                retry_in = ?dur,
                tx_hash = %tx_hash,
                "Receipt query failed, retrying..."
            );
        })
        .await
    }

    async fn fetch_block_number(&self) -> anyhow::Result<u64> {
        let client = &self.client;
        let url = self.url.as_str();

        (move || async move { rpc::block_number(client, url).await })
            .retry(ExponentialBuilder::default().with_max_times(3))
            .await
    }
}

impl TransactionSubmitter for RpcSubmitter {
    fn submit(
        &self,
        tx: &CreationTransaction,
    ) -> impl Future<Output = anyhow::Result<TxHash>> + Send {
        let mut request = serde_json::json!({
            "from": tx.from,
            "data": tx.data,
        });
        if let Some(gas) = tx.gas {
            request["gas"] = serde_json::json!(format!("0x{gas:x}"));
        }

        async move {
            rpc::json_rpc_call(
                &self.client,
                self.url.as_str(),
                "eth_sendTransaction",
                vec![request],
            )
            .await
        }
    }

    fn wait_for_confirmation(
        &self,
        tx_hash: TxHash,
        confirmations: u64,
    ) -> impl Future<Output = Result<Confirmation, ConfirmationError>> + Send {
        let confirmations = confirmations.max(1);
        let rpc_error = |e: anyhow::Error| ConfirmationError::Rpc(format!("{e:#}"));

        async move {
            loop {
                if let Some(receipt) = self.fetch_receipt(tx_hash).await.map_err(rpc_error)? {
                    if receipt.status == Some(0) {
                        return Err(ConfirmationError::Reverted {
                            block_number: receipt.block_number,
                        });
                    }

                    let contract_address = receipt.contract_address.ok_or_else(|| {
                        ConfirmationError::Rpc("receipt has no contract address".to_string())
                    })?;

                    let head = self.fetch_block_number().await.map_err(rpc_error)?;
                    let depth = (head + 1).saturating_sub(receipt.block_number);
                    if depth >= confirmations {
                        return Ok(Confirmation {
                            contract_address,
                            block_number: receipt.block_number,
                        });
                    }
                    tracing::trace!(
                        tx_hash = %tx_hash,
                        depth,
                        confirmations,
                        "Waiting for more confirmations..."
                    );
                }

                tokio::time::sleep(self.poll_interval).await;
            }
        }
    }

    fn contract_exists(
        &self,
        address: Address,
    ) -> impl Future<Output = anyhow::Result<bool>> + Send {
        async move {
            let code: Bytes = rpc::json_rpc_call(
                &self.client,
                self.url.as_str(),
                "eth_getCode",
                vec![serde_json::json!(address), serde_json::json!("latest")],
            )
            .await?;
            Ok(!code.is_empty())
        }
    }
}
