//! Shared RPC utilities for interacting with Ethereum JSON-RPC endpoints.

use std::time::Duration;

use alloy_core::primitives::Address;
use anyhow::Context;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;

/// Default timeout for RPC requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Create an HTTP client configured for JSON-RPC requests.
pub fn create_client() -> Result<reqwest::Client, anyhow::Error> {
    reqwest::Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .build()
        .context("Failed to create HTTP client")
}

/// Make a JSON-RPC call and deserialize the result.
///
/// # Arguments
/// * `client` - The HTTP client to use
/// * `url` - The RPC endpoint URL
/// * `method` - The RPC method name
/// * `params` - The method parameters
///
/// # Returns
/// The deserialized result, or an error if the request failed or returned an error response.
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: Vec<Value>,
) -> Result<T, anyhow::Error> {
    let response = client
        .post(url)
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await
        .with_context(|| format!("Failed to send {} request", method))?;

    let result: Value = response
        .json()
        .await
        .with_context(|| format!("Failed to parse {} response", method))?;

    if let Some(error) = result.get("error") {
        anyhow::bail!(
            "RPC error: {}",
            error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown")
        );
    }

    let result_value = result
        .get("result")
        .context("No result in response")?
        .clone();

    serde_json::from_value(result_value)
        .with_context(|| format!("Failed to deserialize {} result", method))
}

/// Parse a hex quantity (with 0x prefix).
pub fn parse_quantity(s: &str) -> anyhow::Result<u64> {
    u64::from_str_radix(s.trim_start_matches("0x"), 16)
        .with_context(|| format!("Invalid hex quantity: {s}"))
}

/// Deserialize a u64 from a hex string (with 0x prefix).
pub fn deserialize_u64_from_hex<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    // Owned: results are deserialized from `serde_json::Value`, which cannot lend strings.
    let s: String = Deserialize::deserialize(deserializer)?;
    parse_quantity(&s).map_err(serde::de::Error::custom)
}

/// Deserialize an optional u64 from a hex string (with 0x prefix).
pub fn deserialize_opt_u64_from_hex<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: Option<String> = Deserialize::deserialize(deserializer)?;
    s.map(|s| parse_quantity(&s).map_err(serde::de::Error::custom))
        .transpose()
}

/// Fetch the chain id of the node.
pub async fn chain_id(client: &reqwest::Client, url: &str) -> anyhow::Result<u64> {
    let id: String = json_rpc_call(client, url, "eth_chainId", vec![]).await?;
    parse_quantity(&id)
}

/// Fetch the latest block number.
pub async fn block_number(client: &reqwest::Client, url: &str) -> anyhow::Result<u64> {
    let number: String = json_rpc_call(client, url, "eth_blockNumber", vec![]).await?;
    parse_quantity(&number)
}

/// Fetch the accounts managed by the node.
pub async fn accounts(client: &reqwest::Client, url: &str) -> anyhow::Result<Vec<Address>> {
    json_rpc_call(client, url, "eth_accounts", vec![]).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Receipt {
        #[serde(deserialize_with = "deserialize_u64_from_hex")]
        block_number: u64,
        #[serde(default, deserialize_with = "deserialize_opt_u64_from_hex")]
        status: Option<u64>,
    }

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x7a69").unwrap(), 31337);
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert!(parse_quantity("0xzz").is_err());
    }

    #[test]
    fn test_deserialize_hex_fields() {
        let receipt: Receipt =
            serde_json::from_str(r#"{ "block_number": "0x10", "status": "0x1" }"#).unwrap();
        assert_eq!(receipt.block_number, 16);
        assert_eq!(receipt.status, Some(1));

        let receipt: Receipt = serde_json::from_str(r#"{ "block_number": "0x10" }"#).unwrap();
        assert_eq!(receipt.status, None);
    }
}

/// Local JSON-RPC node answering each method with a fixed result.
#[cfg(test)]
pub(crate) mod mock_node {
    use mockito::{Matcher, Mock, Server, ServerGuard};
    use serde_json::{Value, json};

    pub(crate) struct MockNode {
        server: ServerGuard,
        mocks: Vec<Mock>,
    }

    impl MockNode {
        /// Start a node that knows no method.
        pub(crate) async fn new() -> Self {
            Self {
                server: Server::new_async().await,
                mocks: Vec::new(),
            }
        }

        /// Start a node answering every `(method, result)` pair.
        pub(crate) async fn start(results: impl IntoIterator<Item = (&str, Value)>) -> Self {
            let mut node = Self::new().await;
            for (method, result) in results {
                node.respond(method, json!({ "jsonrpc": "2.0", "id": 1, "result": result }))
                    .await;
            }
            node
        }

        /// Answer `method` with a JSON-RPC error.
        pub(crate) async fn reject(&mut self, method: &str, message: &str) {
            let error = json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": { "code": -32000, "message": message }
            });
            self.respond(method, error).await;
        }

        pub(crate) fn url(&self) -> String {
            self.server.url()
        }

        async fn respond(&mut self, method: &str, body: Value) {
            let mock = self
                .server
                .mock("POST", "/")
                .match_body(Matcher::PartialJson(json!({ "method": method })))
                .with_status(200)
                .with_header("content-type", "application/json")
                .with_body(body.to_string())
                .create_async()
                .await;
            self.mocks.push(mock);
        }
    }
}
