//! Ordered, strictly sequential deployment of dependent contracts.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use alloy_dyn_abi::DynSolValue;
use alloy_primitives::{Address, B256, keccak256};
use chrono::Utc;
use tracing::{info, warn};

use crate::abi;
use crate::binding::{BindingError, BindingFactory, BoundContract, Overrides};
use crate::deployments::{DeploymentRecord, DeploymentRecords};
use crate::descriptor::ContractDescriptor;
use crate::ledger::TxHash;
use crate::signer::SignerIdentity;

/// Resolves constructor arguments from the steps confirmed so far.
pub type ArgumentResolver =
    Box<dyn Fn(&Deployments) -> Result<Vec<DynSolValue>, String> + Send + Sync>;

pub struct DeploymentStep {
    pub name: String,
    pub descriptor: Arc<ContractDescriptor>,
    pub resolver: ArgumentResolver,
    pub overrides: Overrides,
}

impl DeploymentStep {
    pub fn new(
        name: impl Into<String>,
        descriptor: Arc<ContractDescriptor>,
        resolver: impl Fn(&Deployments) -> Result<Vec<DynSolValue>, String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            descriptor,
            resolver: Box::new(resolver),
            overrides: Overrides::default(),
        }
    }

    /// A step with fixed constructor arguments.
    pub fn with_args(
        name: impl Into<String>,
        descriptor: Arc<ContractDescriptor>,
        args: Vec<DynSolValue>,
    ) -> Self {
        Self::new(name, descriptor, move |_| Ok(args.clone()))
    }

    pub fn overrides(mut self, overrides: Overrides) -> Self {
        self.overrides = overrides;
        self
    }
}

impl fmt::Debug for DeploymentStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeploymentStep")
            .field("name", &self.name)
            .field("contract", &self.descriptor.name)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct DeployedContract {
    pub name: String,
    pub contract: BoundContract,
    /// `None` when an existing deployment was reused.
    pub tx_hash: Option<TxHash>,
    pub reused: bool,
}

/// Confirmed steps in execution order.
#[derive(Debug, Clone, Default)]
pub struct Deployments {
    entries: Vec<DeployedContract>,
}

impl Deployments {
    pub fn get(&self, name: &str) -> Option<&BoundContract> {
        self.entries
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| &entry.contract)
    }

    pub fn address(&self, name: &str) -> Option<Address> {
        self.get(name).and_then(BoundContract::address)
    }

    /// Like [`Deployments::address`] but with a resolver-friendly error.
    pub fn require_address(&self, name: &str) -> Result<Address, String> {
        self.address(name)
            .ok_or_else(|| format!("no confirmed deployment named `{name}`"))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.name.as_str())
    }

    pub fn entries(&self) -> &[DeployedContract] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_entries(self) -> Vec<DeployedContract> {
        self.entries
    }

    fn push(&mut self, entry: DeployedContract) {
        self.entries.push(entry);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StepFailure {
    #[error("argument resolution failed: {0}")]
    ArgumentResolution(String),

    #[error(transparent)]
    Binding(#[from] BindingError),
}

/// A step failed; later steps were not attempted.
#[derive(Debug, thiserror::Error)]
#[error("Deployment aborted at step {index} ({step}): {cause}")]
pub struct SequenceAborted {
    pub step: String,
    /// Zero-based position of the failing step.
    pub index: usize,
    pub cause: StepFailure,
    /// Steps that were confirmed before the failure.
    pub partial: Deployments,
}

#[derive(Debug, thiserror::Error)]
pub enum SequencerError {
    #[error(transparent)]
    Aborted(#[from] SequenceAborted),

    #[error("Deployment records: {0:#}")]
    Records(anyhow::Error),
}

/// Where and how to persist the resulting name → address table.
#[derive(Debug, Clone)]
pub struct RecordsTarget {
    pub path: PathBuf,
    /// Attach instead of redeploying when the recorded bytecode hash matches.
    pub reuse_unchanged: bool,
}

pub struct DeploymentSequencer {
    factory: BindingFactory,
    signer: SignerIdentity,
    records: Option<RecordsTarget>,
}

impl DeploymentSequencer {
    pub fn new(factory: BindingFactory, signer: SignerIdentity) -> Self {
        Self {
            factory,
            signer,
            records: None,
        }
    }

    pub fn with_records(mut self, target: RecordsTarget) -> Self {
        self.records = Some(target);
        self
    }

    /// Run `steps` in order. Each resolver sees only confirmed steps. On
    /// failure the remaining steps are skipped and the confirmed prefix is
    /// returned inside the error. Records are written only after every step
    /// succeeded.
    pub async fn run(&self, steps: Vec<DeploymentStep>) -> Result<Deployments, SequencerError> {
        let mut records = match &self.records {
            Some(target) => {
                DeploymentRecords::load_from_file(&target.path).map_err(SequencerError::Records)?
            }
            None => DeploymentRecords::new(),
        };
        let reuse = self.records.as_ref().is_some_and(|t| t.reuse_unchanged);

        let mut deployed = Deployments::default();
        let total = steps.len();
        for (index, step) in steps.into_iter().enumerate() {
            info!(step = %step.name, contract = %step.descriptor.name, "deploying {}/{}", index + 1, total);

            let args = match (step.resolver)(&deployed) {
                Ok(args) => args,
                Err(reason) => {
                    return Err(abort(step, index, StepFailure::ArgumentResolution(reason), deployed));
                }
            };
            let args_hash = constructor_args_hash(&step.descriptor, &args);

            if reuse {
                if let Some(existing) = self.reusable(&records, &step, args_hash) {
                    info!(step = %step.name, address = ?existing.address(), "bytecode and arguments unchanged, reusing");
                    deployed.push(DeployedContract {
                        name: step.name,
                        contract: existing,
                        tx_hash: None,
                        reused: true,
                    });
                    continue;
                }
            }

            match self.deploy_step(&step, &args).await {
                Ok((contract, tx)) => {
                    if let Some(address) = contract.address() {
                        records.insert(
                            step.name.clone(),
                            DeploymentRecord {
                                contract: step.descriptor.name.clone(),
                                address,
                                tx_hash: Some(tx),
                                bytecode_hash: step.descriptor.bytecode_hash(),
                                constructor_args_hash: args_hash,
                                interface: step.descriptor.interface.clone(),
                                deployed_at: Utc::now(),
                            },
                        );
                    }
                    deployed.push(DeployedContract {
                        name: step.name,
                        contract,
                        tx_hash: Some(tx),
                        reused: false,
                    });
                }
                Err(cause) => return Err(abort(step, index, cause, deployed)),
            }
        }

        if let Some(target) = &self.records {
            records
                .save_to_file(&target.path)
                .map_err(SequencerError::Records)?;
        }
        Ok(deployed)
    }

    async fn deploy_step(
        &self,
        step: &DeploymentStep,
        args: &[DynSolValue],
    ) -> Result<(BoundContract, TxHash), StepFailure> {
        let (contract, receipt) = self
            .factory
            .deploy_with_receipt(
                Arc::clone(&step.descriptor),
                self.signer.clone(),
                args,
                step.overrides.clone(),
            )
            .await?;
        Ok((contract, receipt.tx))
    }

    /// A recorded deployment is reused only when the contract kind, its
    /// bytecode and the freshly resolved constructor arguments all match.
    fn reusable(
        &self,
        records: &DeploymentRecords,
        step: &DeploymentStep,
        args_hash: Option<B256>,
    ) -> Option<BoundContract> {
        let record = records.get(&step.name)?;
        if record.contract != step.descriptor.name
            || record.bytecode_hash != step.descriptor.bytecode_hash()
            || args_hash.is_none()
            || record.constructor_args_hash != args_hash
        {
            return None;
        }
        Some(self.factory.attach(
            Arc::clone(&step.descriptor),
            record.address,
            self.signer.clone(),
        ))
    }
}

fn abort(step: DeploymentStep, index: usize, cause: StepFailure, partial: Deployments) -> SequencerError {
    warn!(step = %step.name, "deployment aborted: {cause}");
    SequenceAborted {
        step: step.name,
        index,
        cause,
        partial,
    }
    .into()
}

/// `None` when the arguments do not fit the constructor; such a step is
/// never reused and its deployment reports the encoding error.
fn constructor_args_hash(descriptor: &ContractDescriptor, args: &[DynSolValue]) -> Option<B256> {
    abi::encode_params(descriptor.interface.constructor_inputs(), args)
        .ok()
        .map(keccak256)
}
