//! Compiled contract artifacts.
//!
//! Compilation is out of scope: artifacts are read from `<artifacts_dir>/<Contract>.json`
//! as produced by hardhat (`"bytecode": "0x…"`) or foundry (`"bytecode": { "object": "0x…" }`).

use std::path::Path;

use alloy_core::{
    dyn_abi::{DynSolType, DynSolValue, JsonAbiExt, Specifier},
    json_abi::JsonAbi,
    primitives::Bytes,
};
use serde_json::Value;

use crate::{DeployError, args_hash::sha256_hex};

/// ABI and creation bytecode of a compiled contract.
#[derive(Debug, Clone)]
pub struct CompiledArtifact {
    pub contract_name: String,
    /// The ABI exactly as found in the artifact, persisted in deployment records.
    pub abi_json: Value,
    pub abi: JsonAbi,
    pub bytecode: Bytes,
}

impl CompiledArtifact {
    /// Load `<artifacts_dir>/<contract>.json`.
    pub fn load(artifacts_dir: &Path, contract: &str) -> Result<Self, DeployError> {
        let path = artifacts_dir.join(format!("{contract}.json"));
        let content = std::fs::read_to_string(&path).map_err(|e| DeployError::Artifact {
            contract: contract.to_string(),
            reason: format!("failed to read {}: {e}", path.display()),
        })?;
        let json: Value = serde_json::from_str(&content).map_err(|e| DeployError::Artifact {
            contract: contract.to_string(),
            reason: format!("failed to parse {}: {e}", path.display()),
        })?;
        Self::from_json(contract, json)
    }

    /// Build an artifact from its JSON document.
    pub fn from_json(contract: &str, json: Value) -> Result<Self, DeployError> {
        let invalid = |reason: String| DeployError::Artifact {
            contract: contract.to_string(),
            reason,
        };

        let abi_json = json
            .get("abi")
            .cloned()
            .ok_or_else(|| invalid("missing `abi`".to_string()))?;
        let abi: JsonAbi = serde_json::from_value(abi_json.clone())
            .map_err(|e| invalid(format!("malformed `abi`: {e}")))?;

        let bytecode_hex = match json.get("bytecode") {
            Some(Value::String(hex)) => hex.as_str(),
            Some(Value::Object(object)) => object
                .get("object")
                .and_then(Value::as_str)
                .ok_or_else(|| invalid("missing `bytecode.object`".to_string()))?,
            _ => return Err(invalid("missing `bytecode`".to_string())),
        };
        let bytecode = hex::decode(bytecode_hex.trim_start_matches("0x"))
            .map_err(|e| invalid(format!("malformed bytecode: {e}")))?;
        if bytecode.is_empty() {
            return Err(invalid(
                "empty bytecode: abstract contracts and interfaces cannot be deployed".to_string(),
            ));
        }

        Ok(Self {
            contract_name: contract.to_string(),
            abi_json,
            abi,
            bytecode: Bytes::from(bytecode),
        })
    }

    /// SHA-256 of the creation bytecode, used to detect artifact drift.
    pub fn bytecode_hash(&self) -> String {
        sha256_hex(&self.bytecode)
    }

    /// Creation code: the bytecode followed by the ABI-encoded constructor arguments.
    ///
    /// `spec` only names the deployment in errors.
    pub fn creation_code(&self, spec: &str, args: &[Value]) -> Result<Bytes, DeployError> {
        let invalid = |reason: String| DeployError::InvalidArgument {
            spec: spec.to_string(),
            reason,
        };

        let Some(constructor) = self.abi.constructor() else {
            if !args.is_empty() {
                return Err(invalid(format!(
                    "`{}` has no constructor but {} argument(s) were given",
                    self.contract_name,
                    args.len()
                )));
            }
            return Ok(self.bytecode.clone());
        };

        if constructor.inputs.len() != args.len() {
            return Err(invalid(format!(
                "constructor expects {} argument(s), got {}",
                constructor.inputs.len(),
                args.len()
            )));
        }

        let values = constructor
            .inputs
            .iter()
            .zip(args)
            .map(|(param, arg)| {
                let ty = param
                    .resolve()
                    .map_err(|e| invalid(format!("unsupported type `{}`: {e}", param.ty)))?;
                coerce(&ty, arg).map_err(|reason| {
                    invalid(format!("argument `{}` ({}): {reason}", param.name, param.ty))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let encoded = constructor
            .abi_encode_input(&values)
            .map_err(|e| invalid(e.to_string()))?;

        let mut code = self.bytecode.to_vec();
        code.extend_from_slice(&encoded);
        Ok(Bytes::from(code))
    }
}

/// Convert a JSON argument into a Solidity value of type `ty`.
fn coerce(ty: &DynSolType, value: &Value) -> Result<DynSolValue, String> {
    match (ty, value) {
        (DynSolType::Array(inner), Value::Array(items)) => items
            .iter()
            .map(|item| coerce(inner, item))
            .collect::<Result<_, _>>()
            .map(DynSolValue::Array),
        (DynSolType::FixedArray(inner, len), Value::Array(items)) if items.len() == *len => items
            .iter()
            .map(|item| coerce(inner, item))
            .collect::<Result<_, _>>()
            .map(DynSolValue::FixedArray),
        (DynSolType::Tuple(types), Value::Array(items)) if items.len() == types.len() => types
            .iter()
            .zip(items)
            .map(|(ty, item)| coerce(ty, item))
            .collect::<Result<_, _>>()
            .map(DynSolValue::Tuple),
        (_, Value::String(s)) => ty.coerce_str(s).map_err(|e| e.to_string()),
        (_, Value::Number(n)) => ty.coerce_str(&n.to_string()).map_err(|e| e.to_string()),
        (_, Value::Bool(b)) => ty.coerce_str(&b.to_string()).map_err(|e| e.to_string()),
        (_, other) => Err(format!("cannot convert {other} to {}", ty.sol_type_name())),
    }
}
