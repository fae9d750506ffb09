use derive_more::{Deref, From};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Constructor arguments after references to deployments and accounts were replaced by
/// concrete addresses.
///
/// The hash of the canonical encoding is stored in every
/// [`DeploymentRecord`](crate::DeploymentRecord) so later runs can detect argument changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deref, From, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResolvedArgs(Vec<Value>);

impl ResolvedArgs {
    /// Canonical encoding of the arguments: compact JSON.
    ///
    /// Object keys are emitted in sorted order, so the encoding only depends on the
    /// argument values and their positions.
    pub fn canonical_encoding(&self) -> String {
        serde_json::to_string(&self.0).expect("JSON values always serialize")
    }

    /// Compute the SHA-256 hash of the canonical encoding, hex encoded.
    pub fn compute_hash(&self) -> String {
        sha256_hex(self.canonical_encoding().as_bytes())
    }

    pub fn into_inner(self) -> Vec<Value> {
        self.0
    }
}

/// Hex-encoded SHA-256 digest of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
