//! Declarative deployment intents.
//!
//! A [`Catalog`] is the ordered set of [`DeploymentSpec`]s loaded from the manifest.
//! Specs describe what should be deployed, never what was deployed: outcomes live in
//! the [`ArtifactStore`](crate::ArtifactStore).

use std::collections::{BTreeSet, HashSet};

use derive_more::Deref;
use serde::{Deserialize, Deserializer, Serialize, de};
use serde_json::Value;

use crate::DeployError;

/// The signer role used when a spec does not name one.
pub const DEFAULT_SIGNER_ROLE: &str = "deployer";

fn default_signer_role() -> String {
    DEFAULT_SIGNER_ROLE.to_string()
}

/// A single constructor argument.
///
/// Besides literal values, an argument can refer to the address of another deployment
/// on the same network or to the address bound to a named account.
///
/// A table holding a `deployment` or `account` key is always read as a reference and
/// must hold nothing else.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ConstructorArg {
    /// Address of a deployment recorded on the active network.
    Deployment { deployment: String },
    /// Address bound to a named account role.
    Account { account: String },
    /// Any literal value, coerced against the constructor ABI at deploy time.
    Literal(Value),
}

impl ConstructorArg {
    fn parse_value(value: Value) -> Result<Self, String> {
        let map = match value {
            Value::Object(map) if map.contains_key("deployment") || map.contains_key("account") => {
                map
            }
            literal => return Ok(Self::Literal(literal)),
        };

        let keys: Vec<&str> = map.keys().map(String::as_str).collect();
        let [key] = keys.as_slice() else {
            return Err(format!(
                "reference argument must have a single `deployment` or `account` key, found `{}`",
                keys.join("`, `")
            ));
        };
        let Some(Value::String(target)) = map.get(*key) else {
            return Err(format!("`{key}` reference must be a name"));
        };

        Ok(match *key {
            "deployment" => Self::Deployment {
                deployment: target.clone(),
            },
            _ => Self::Account {
                account: target.clone(),
            },
        })
    }
}

impl<'de> Deserialize<'de> for ConstructorArg {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::parse_value(value).map_err(de::Error::custom)
    }
}

impl From<Value> for ConstructorArg {
    fn from(value: Value) -> Self {
        Self::Literal(value)
    }
}

impl From<&str> for ConstructorArg {
    fn from(value: &str) -> Self {
        Self::Literal(Value::from(value))
    }
}

impl From<String> for ConstructorArg {
    fn from(value: String) -> Self {
        Self::Literal(Value::from(value))
    }
}

impl From<i64> for ConstructorArg {
    fn from(value: i64) -> Self {
        Self::Literal(Value::from(value))
    }
}

impl From<bool> for ConstructorArg {
    fn from(value: bool) -> Self {
        Self::Literal(Value::from(value))
    }
}

/// Intent to deploy one contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeploymentSpec {
    /// Unique name of the deployment within the catalog. Also the record key.
    pub name: String,
    /// Name of the compiled artifact to deploy. Defaults to `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract: Option<String>,
    /// Ordered constructor arguments.
    #[serde(default, rename = "args")]
    pub constructor_args: Vec<ConstructorArg>,
    /// Named account role that signs the creation transaction.
    #[serde(default = "default_signer_role", rename = "signer")]
    pub signer_role: String,
    /// Tags used to select this spec.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    /// Names of the specs that must be recorded before this one.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub depends_on: BTreeSet<String>,
}

impl DeploymentSpec {
    /// Create a spec with no arguments, signed by the default role.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contract: None,
            constructor_args: Vec::new(),
            signer_role: default_signer_role(),
            tags: BTreeSet::new(),
            depends_on: BTreeSet::new(),
        }
    }

    /// Set the compiled artifact name.
    pub fn contract(mut self, contract: impl Into<String>) -> Self {
        self.contract = Some(contract.into());
        self
    }

    /// Append a constructor argument.
    pub fn arg(mut self, arg: impl Into<ConstructorArg>) -> Self {
        self.constructor_args.push(arg.into());
        self
    }

    /// Set the signer role.
    pub fn signer(mut self, role: impl Into<String>) -> Self {
        self.signer_role = role.into();
        self
    }

    /// Add a tag.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Add a dependency.
    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.depends_on.insert(name.into());
        self
    }

    /// The compiled artifact backing this spec.
    pub fn contract_name(&self) -> &str {
        self.contract.as_deref().unwrap_or(&self.name)
    }

    /// Names of the deployments whose addresses are used as constructor arguments.
    pub fn deployment_references(&self) -> impl Iterator<Item = &str> {
        self.constructor_args.iter().filter_map(|arg| match arg {
            ConstructorArg::Deployment { deployment } => Some(deployment.as_str()),
            _ => None,
        })
    }
}

/// Ordered set of deployment specs, keyed by name.
///
/// Construction validates that names are unique and usable as record keys, that every
/// dependency exists and that every deployment reference is declared as a dependency.
/// Cycles are detected at selection time by [`select`](crate::select).
#[derive(Debug, Clone, Default, PartialEq, Deref, Serialize, Deserialize)]
#[serde(try_from = "Vec<DeploymentSpec>", into = "Vec<DeploymentSpec>")]
pub struct Catalog(Vec<DeploymentSpec>);

impl Catalog {
    pub fn new(specs: Vec<DeploymentSpec>) -> Result<Self, DeployError> {
        let catalog = Self(specs);
        catalog.validate()?;
        Ok(catalog)
    }

    /// Look up a spec by name.
    pub fn get(&self, name: &str) -> Option<&DeploymentSpec> {
        self.0.iter().find(|spec| spec.name == name)
    }

    fn validate(&self) -> Result<(), DeployError> {
        let mut names = HashSet::new();
        for spec in &self.0 {
            validate_name("deployment", &spec.name)?;
            if !names.insert(spec.name.as_str()) {
                return Err(DeployError::DuplicateSpec(spec.name.clone()));
            }
        }

        for spec in &self.0 {
            if let Some(dependency) = spec
                .depends_on
                .iter()
                .find(|dependency| !names.contains(dependency.as_str()))
            {
                return Err(DeployError::UnknownDependency {
                    spec: spec.name.clone(),
                    dependency: dependency.clone(),
                });
            }

            if let Some(reference) = spec
                .deployment_references()
                .find(|reference| !spec.depends_on.contains(*reference))
            {
                return Err(DeployError::UndeclaredReference {
                    spec: spec.name.clone(),
                    reference: reference.to_string(),
                });
            }
        }

        Ok(())
    }
}

impl TryFrom<Vec<DeploymentSpec>> for Catalog {
    type Error = DeployError;

    fn try_from(specs: Vec<DeploymentSpec>) -> Result<Self, Self::Error> {
        Self::new(specs)
    }
}

impl From<Catalog> for Vec<DeploymentSpec> {
    fn from(catalog: Catalog) -> Self {
        catalog.0
    }
}

/// Spec and network names double as file and directory names in the artifact store.
pub(crate) fn validate_name(kind: &str, name: &str) -> Result<(), DeployError> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));

    if !valid {
        return Err(DeployError::InvalidManifest(format!(
            "invalid {kind} name `{name}`: use ASCII letters, digits, `_`, `-` or `.`"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_names_rejected() {
        let result = Catalog::new(vec![DeploymentSpec::new("Token"), DeploymentSpec::new("Token")]);
        assert!(matches!(result, Err(DeployError::DuplicateSpec(name)) if name == "Token"));
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let result = Catalog::new(vec![DeploymentSpec::new("Vault").depends_on("Token")]);
        assert!(matches!(
            result,
            Err(DeployError::UnknownDependency { spec, dependency })
                if spec == "Vault" && dependency == "Token"
        ));
    }

    #[test]
    fn test_undeclared_reference_rejected() {
        let result = Catalog::new(vec![
            DeploymentSpec::new("Token"),
            DeploymentSpec::new("Vault").arg(ConstructorArg::Deployment {
                deployment: "Token".into(),
            }),
        ]);
        assert!(matches!(
            result,
            Err(DeployError::UndeclaredReference { spec, reference })
                if spec == "Vault" && reference == "Token"
        ));
    }

    #[test]
    fn test_invalid_name_rejected() {
        assert!(Catalog::new(vec![DeploymentSpec::new("../escape")]).is_err());
        assert!(Catalog::new(vec![DeploymentSpec::new(".hidden")]).is_err());
        assert!(Catalog::new(vec![DeploymentSpec::new("")]).is_err());
        assert!(Catalog::new(vec![DeploymentSpec::new("My_Token-v2.1")]).is_ok());
    }

    #[test]
    fn test_parse_spec_from_toml() {
        let content = r#"
            [[contracts]]
            name = "Token"
            contract = "ERC20Token"
            args = ["MyToken", "MTK", 18]
            tags = ["erc20"]

            [[contracts]]
            name = "Vault"
            args = [{ deployment = "Token" }, { account = "owner" }]
            signer = "owner"
            depends_on = ["Token"]
        "#;

        #[derive(Deserialize)]
        struct Wrapper {
            contracts: Catalog,
        }

        let wrapper: Wrapper = toml::from_str(content).expect("Failed to parse catalog");
        let catalog = wrapper.contracts;

        let token = catalog.get("Token").expect("Token spec missing");
        assert_eq!(token.contract_name(), "ERC20Token");
        assert_eq!(token.signer_role, DEFAULT_SIGNER_ROLE);
        assert_eq!(
            token.constructor_args,
            vec![
                ConstructorArg::from("MyToken"),
                ConstructorArg::from("MTK"),
                ConstructorArg::from(18_i64),
            ]
        );

        let vault = catalog.get("Vault").expect("Vault spec missing");
        assert_eq!(vault.contract_name(), "Vault");
        assert_eq!(vault.signer_role, "owner");
        assert_eq!(
            vault.constructor_args,
            vec![
                ConstructorArg::Deployment {
                    deployment: "Token".into()
                },
                ConstructorArg::Account {
                    account: "owner".into()
                },
            ]
        );
    }

    #[test]
    fn test_reference_with_unknown_key_rejected() {
        let content = r#"
            name = "Vault"
            args = [{ deployment = "Token", acount = "owner" }]
        "#;
        let result: Result<DeploymentSpec, _> = toml::from_str(content);
        let err = result.expect_err("A mistyped reference key must not be dropped");
        assert!(err.to_string().contains("acount"));

        let content = r#"
            name = "Vault"
            args = [{ account = 7 }]
        "#;
        assert!(toml::from_str::<DeploymentSpec>(content).is_err());
    }

    #[test]
    fn test_table_literal_without_reference_key() {
        let content = r#"
            name = "Vault"
            args = [{ threshold = 2 }]
        "#;
        let spec: DeploymentSpec = toml::from_str(content).unwrap();
        assert_eq!(
            spec.constructor_args,
            vec![ConstructorArg::Literal(serde_json::json!({ "threshold": 2 }))]
        );
    }

    #[test]
    fn test_unknown_spec_field_rejected() {
        let content = r#"
            name = "Token"
            args = []
            log = true
        "#;
        let result: Result<DeploymentSpec, _> = toml::from_str(content);
        assert!(result.is_err(), "Unrecognized options must not be ignored");
    }

    #[test]
    fn test_invalid_catalog_fails_deserialization() {
        let content = r#"
            [[contracts]]
            name = "Vault"
            depends_on = ["Token"]
        "#;

        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Wrapper {
            contracts: Catalog,
        }

        let result: Result<Wrapper, _> = toml::from_str(content);
        assert!(result.is_err());
    }
}
