//! Orchestration of a deployment run.
//!
//! Specs are processed one at a time in the order produced by [`select`]. Each spec
//! moves through `PENDING → SKIPPED` when a matching record is already stored, or
//! `PENDING → DEPLOYING → RECORDED` otherwise. A failing spec ends `FAILED` and blocks
//! its dependents; independent specs still proceed. A persistence failure aborts the
//! run: the store can no longer be trusted.

use std::collections::HashMap;

use serde_json::Value;

use crate::{
    AccountResolver, ArtifactStore, Catalog, ConstructorArg, DeployError, DeploymentExecutor,
    DeploymentRecord, DeploymentSpec, ErrorClass, NetworkContext, ResolvedArgs, select,
    submitter::TransactionSubmitter,
};

/// Lifecycle state of a spec within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum SpecState {
    Pending,
    Deploying,
    Recorded,
    Skipped,
    Failed,
    Blocked,
}

/// Final state of one selected spec.
#[derive(Debug, Clone)]
pub struct SpecOutcome {
    pub name: String,
    pub state: SpecState,
    /// The stored record, for `RECORDED` and `SKIPPED` specs.
    pub record: Option<DeploymentRecord>,
    /// Why the spec failed, for `FAILED` specs.
    pub error: Option<DeployError>,
    /// Why the spec was not attempted, for `BLOCKED` specs.
    pub blocked_by: Option<String>,
}

impl SpecOutcome {
    fn completed(name: &str, state: SpecState, record: DeploymentRecord) -> Self {
        Self {
            name: name.to_string(),
            state,
            record: Some(record),
            error: None,
            blocked_by: None,
        }
    }

    fn failed(name: &str, error: DeployError) -> Self {
        Self {
            name: name.to_string(),
            state: SpecState::Failed,
            record: None,
            error: Some(error),
            blocked_by: None,
        }
    }

    fn blocked(name: &str, reason: String) -> Self {
        Self {
            name: name.to_string(),
            state: SpecState::Blocked,
            record: None,
            error: None,
            blocked_by: Some(reason),
        }
    }
}

/// Aggregate result of a run.
#[derive(Debug, Clone)]
pub struct DeploymentReport {
    pub network: String,
    /// One outcome per selected spec, in processing order.
    pub outcomes: Vec<SpecOutcome>,
    /// The persistence failure that aborted the run, if any.
    pub aborted: Option<DeployError>,
}

impl DeploymentReport {
    /// Whether every selected spec ended `RECORDED` or `SKIPPED`.
    pub fn is_success(&self) -> bool {
        self.aborted.is_none()
            && self
                .outcomes
                .iter()
                .all(|outcome| matches!(outcome.state, SpecState::Recorded | SpecState::Skipped))
    }

    pub fn outcome(&self, name: &str) -> Option<&SpecOutcome> {
        self.outcomes.iter().find(|outcome| outcome.name == name)
    }

    /// Number of specs that ended in `state`.
    pub fn count(&self, state: SpecState) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.state == state)
            .count()
    }

    /// The most severe class among the failures of the run.
    pub fn error_class(&self) -> Option<ErrorClass> {
        self.outcomes
            .iter()
            .filter_map(|outcome| outcome.error.as_ref())
            .chain(self.aborted.as_ref())
            .map(DeployError::class)
            .max()
    }
}

/// Options of a single run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Tags to select. Empty selects the whole catalog.
    pub tags: Vec<String>,
    /// Supersede the stored records of every selected spec before deploying.
    pub force: bool,
}

/// Drives the selection, execution and recording of a catalog on one network.
#[derive(Debug)]
pub struct Orchestrator<S> {
    store: ArtifactStore,
    executor: DeploymentExecutor<S>,
}

impl<S: TransactionSubmitter> Orchestrator<S> {
    pub fn new(store: ArtifactStore, executor: DeploymentExecutor<S>) -> Self {
        Self { store, executor }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn executor(&self) -> &DeploymentExecutor<S> {
        &self.executor
    }

    /// Run the catalog on `network`.
    ///
    /// Errors returned here happen before any deployment (cycles, a store bound to
    /// another chain, a failed `--force` removal). Failures of individual specs are
    /// reported in the [`DeploymentReport`] instead.
    pub async fn run(
        &self,
        catalog: &Catalog,
        network: &NetworkContext,
        options: &RunOptions,
    ) -> Result<DeploymentReport, DeployError> {
        let selection = select(catalog, &options.tags)?;

        tracing::info!(
            network = %network.name,
            chain_id = network.chain_id,
            tags = ?options.tags,
            selected = selection.len(),
            "Starting deployment run"
        );

        self.store.ensure_chain_id(&network.name, network.chain_id)?;

        if options.force {
            for spec in &selection {
                if let Some(archived) = self.store.remove(&network.name, &spec.name)? {
                    tracing::info!(
                        contract = %spec.name,
                        archived = %archived.display(),
                        "Superseded stored record"
                    );
                }
            }
        }

        let mut resolver = AccountResolver::default();
        let mut records: HashMap<String, DeploymentRecord> = HashMap::new();
        let mut outcomes = Vec::with_capacity(selection.len());
        let mut aborted: Option<DeployError> = None;

        for spec in selection {
            if aborted.is_some() {
                tracing::warn!(contract = %spec.name, state = %SpecState::Blocked, "Run aborted");
                outcomes.push(SpecOutcome::blocked(&spec.name, "run aborted".to_string()));
                continue;
            }

            if let Some(dependency) = spec
                .depends_on
                .iter()
                .find(|dependency| !records.contains_key(dependency.as_str()))
            {
                tracing::warn!(
                    contract = %spec.name,
                    dependency = %dependency,
                    state = %SpecState::Blocked,
                    "Dependency has no record on this network"
                );
                outcomes.push(SpecOutcome::blocked(
                    &spec.name,
                    format!("dependency `{dependency}` has no record"),
                ));
                continue;
            }

            match self.process(spec, network, &mut resolver, &records).await {
                Ok((state, record)) => {
                    records.insert(spec.name.clone(), record.clone());
                    outcomes.push(SpecOutcome::completed(&spec.name, state, record));
                }
                Err(err) => {
                    let class = err.class();
                    tracing::warn!(
                        contract = %spec.name,
                        state = %SpecState::Failed,
                        class = %class,
                        err = %err,
                        "Deployment failed"
                    );
                    if class == ErrorClass::Persistence {
                        tracing::error!(
                            network = %network.name,
                            "Artifact store failure, aborting the run"
                        );
                        aborted = Some(err.clone());
                    }
                    outcomes.push(SpecOutcome::failed(&spec.name, err));
                }
            }
        }

        let report = DeploymentReport {
            network: network.name.clone(),
            outcomes,
            aborted,
        };

        tracing::info!(
            network = %report.network,
            recorded = report.count(SpecState::Recorded),
            skipped = report.count(SpecState::Skipped),
            failed = report.count(SpecState::Failed),
            blocked = report.count(SpecState::Blocked),
            "Deployment run finished"
        );

        Ok(report)
    }

    /// Take one spec from `PENDING` to `SKIPPED` or `RECORDED`.
    async fn process(
        &self,
        spec: &DeploymentSpec,
        network: &NetworkContext,
        resolver: &mut AccountResolver,
        records: &HashMap<String, DeploymentRecord>,
    ) -> Result<(SpecState, DeploymentRecord), DeployError> {
        tracing::info!(contract = %spec.name, state = %SpecState::Pending, "Processing deployment");

        let args = resolve_args(spec, network, resolver, records)?;
        let args_hash = args.compute_hash();

        if let Some(existing) = self.store.get(&network.name, &spec.name)? {
            if existing.args_hash != args_hash {
                return Err(DeployError::Conflict {
                    network: network.name.clone(),
                    contract: spec.name.clone(),
                    stored: existing.args_hash,
                    requested: args_hash,
                });
            }

            self.check_existing(spec, network, &existing).await?;

            tracing::info!(
                contract = %spec.name,
                address = %existing.address,
                state = %SpecState::Skipped,
                "Matching deployment already recorded"
            );
            return Ok((SpecState::Skipped, existing));
        }

        let artifact = self.executor.load_artifact(spec.contract_name())?;
        let signer = resolver.resolve(&spec.signer_role, network)?;

        tracing::info!(
            contract = %spec.name,
            artifact = %spec.contract_name(),
            signer = %signer.address,
            args_hash = %args_hash,
            state = %SpecState::Deploying,
            "Deploying contract"
        );

        let record = self
            .executor
            .execute(&spec.name, &artifact, &args, &signer, network)
            .await?;

        if let Err(err) = self.store.put(&network.name, &spec.name, &record) {
            tracing::error!(
                contract = %spec.name,
                network = %network.name,
                address = %record.address,
                tx_hash = %record.transaction_hash,
                err = %err,
                "Contract deployed but its record could not be stored, \
                 manual reconciliation required"
            );
            return Err(err);
        }

        tracing::info!(
            contract = %spec.name,
            address = %record.address,
            state = %SpecState::Recorded,
            "Deployment recorded"
        );

        Ok((SpecState::Recorded, record))
    }

    /// Checks on a stored record that is about to be reused.
    async fn check_existing(
        &self,
        spec: &DeploymentSpec,
        network: &NetworkContext,
        existing: &DeploymentRecord,
    ) -> Result<(), DeployError> {
        if network.verify_existing {
            let exists = self
                .executor
                .submitter()
                .contract_exists(existing.address)
                .await
                .map_err(DeployError::network)?;
            if !exists {
                tracing::error!(
                    contract = %spec.name,
                    network = %network.name,
                    address = %existing.address,
                    "Recorded deployment has no code on the network"
                );
                return Err(DeployError::Reconciliation {
                    network: network.name.clone(),
                    reason: format!(
                        "`{}` is recorded at {} but no code exists there; redeploy with --force",
                        spec.name, existing.address
                    ),
                });
            }
        }

        match self.executor.load_artifact(spec.contract_name()) {
            Ok(artifact) if artifact.bytecode_hash() != existing.bytecode_hash => {
                tracing::warn!(
                    contract = %spec.name,
                    "Compiled bytecode changed since the recorded deployment, \
                     use --force to redeploy"
                );
            }
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(contract = %spec.name, err = %err, "Skipping bytecode drift check");
            }
        }

        Ok(())
    }
}

/// Resolve the constructor arguments of `spec` to concrete values.
///
/// Addresses are rendered as checksummed hex strings.
fn resolve_args(
    spec: &DeploymentSpec,
    network: &NetworkContext,
    resolver: &mut AccountResolver,
    records: &HashMap<String, DeploymentRecord>,
) -> Result<ResolvedArgs, DeployError> {
    spec.constructor_args
        .iter()
        .map(|arg| match arg {
            ConstructorArg::Literal(value) => Ok(value.clone()),
            ConstructorArg::Deployment { deployment } => records
                .get(deployment)
                .map(|record| Value::String(record.address.to_checksum(None)))
                .ok_or_else(|| DeployError::InvalidArgument {
                    spec: spec.name.clone(),
                    reason: format!(
                        "deployment `{deployment}` has no record on `{}`",
                        network.name
                    ),
                }),
            ConstructorArg::Account { account } => resolver
                .resolve(account, network)
                .map(|named| Value::String(named.address.to_checksum(None))),
        })
        .collect::<Result<Vec<_>, _>>()
        .map(ResolvedArgs::from)
}
