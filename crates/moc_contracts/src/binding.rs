//! Typed client handles over a [`ContractDescriptor`], and the factory that
//! deploys, attaches and re-signs them.

use std::fmt;
use std::sync::Arc;

use alloy_dyn_abi::DynSolValue;
use alloy_primitives::{Address, Bytes, U256};
use tracing::info;

use crate::abi::{self, AbiError};
use crate::descriptor::{ContractDescriptor, InterfaceShape};
use crate::signer::SignerIdentity;
use crate::submitter::{ConfirmedReceipt, FailureReason, TransactionSubmitter};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BindingError {
    #[error("{contract} has no method `{method}`")]
    UnknownMethod { contract: String, method: String },

    #[error("{contract}.{method} is read-only and cannot be sent as a transaction")]
    NotMutating { contract: String, method: String },

    #[error("{0} has no bytecode and cannot be deployed")]
    NotDeployable(String),

    #[error("{0} is not attached to an address")]
    Unattached(String),

    #[error("{contract} is already attached at {address}")]
    AlreadyAttached { contract: String, address: Address },

    #[error("Encoding failed for {contract}: {source}")]
    Abi {
        contract: String,
        #[source]
        source: AbiError,
    },

    #[error("Deployment of {0} confirmed without a contract address")]
    MissingContractAddress(String),

    #[error(transparent)]
    Transaction(#[from] FailureReason),
}

/// What a mutating call does: create the contract, or invoke a method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallKind {
    Deploy,
    /// Bare method name or full signature.
    Method(String),
}

impl CallKind {
    pub fn method(name: impl Into<String>) -> Self {
        CallKind::Method(name.into())
    }
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallKind::Deploy => f.write_str("deploy"),
            CallKind::Method(name) => f.write_str(name),
        }
    }
}

/// Per-call transaction overrides. Unset fields are left to the node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub gas_limit: Option<u64>,
    pub gas_price: Option<u128>,
    pub value: U256,
}

/// A client handle for one contract instance, or for a contract still to be
/// deployed.
///
/// The address is fixed at construction: deploying or attaching produces a
/// new handle rather than mutating this one.
#[derive(Debug, Clone)]
pub struct BoundContract {
    descriptor: Arc<ContractDescriptor>,
    address: Option<Address>,
    signer: SignerIdentity,
}

impl BoundContract {
    /// An unattached handle that can only deploy.
    pub fn unattached(descriptor: Arc<ContractDescriptor>, signer: SignerIdentity) -> Self {
        Self {
            descriptor,
            address: None,
            signer,
        }
    }

    /// An attached handle. No check is made that code exists at `address`.
    pub fn attached(
        descriptor: Arc<ContractDescriptor>,
        address: Address,
        signer: SignerIdentity,
    ) -> Self {
        Self {
            descriptor,
            address: Some(address),
            signer,
        }
    }

    pub fn descriptor(&self) -> &Arc<ContractDescriptor> {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn address(&self) -> Option<Address> {
        self.address
    }

    pub fn is_attached(&self) -> bool {
        self.address.is_some()
    }

    pub fn signer(&self) -> &SignerIdentity {
        &self.signer
    }

    pub fn interface(&self) -> &InterfaceShape {
        &self.descriptor.interface
    }

    /// Human-readable label for logs and progress events.
    pub fn call_label(&self, call: &CallKind) -> String {
        format!("{}.{call}", self.descriptor.name)
    }

    /// Resolve `call` to a destination and calldata.
    ///
    /// Deploy data is the creation bytecode followed by the encoded
    /// constructor arguments; method data is the selector followed by the
    /// encoded arguments.
    pub fn encode(
        &self,
        call: &CallKind,
        args: &[DynSolValue],
    ) -> Result<(Option<Address>, Bytes), BindingError> {
        let contract = self.descriptor.name.clone();
        match call {
            CallKind::Deploy => {
                if let Some(address) = self.address {
                    return Err(BindingError::AlreadyAttached { contract, address });
                }
                if !self.descriptor.is_deployable() {
                    return Err(BindingError::NotDeployable(contract));
                }
                let params = abi::encode_params(self.interface().constructor_inputs(), args)
                    .map_err(|source| BindingError::Abi {
                        contract: contract.clone(),
                        source,
                    })?;
                let mut data = self.descriptor.bytecode.to_vec();
                data.extend(params);
                Ok((None, Bytes::from(data)))
            }
            CallKind::Method(name) => {
                let address = self.address.ok_or(BindingError::Unattached(contract.clone()))?;
                let method =
                    self.interface()
                        .method(name)
                        .ok_or_else(|| BindingError::UnknownMethod {
                            contract: contract.clone(),
                            method: name.clone(),
                        })?;
                if !method.mutability.is_mutating() {
                    return Err(BindingError::NotMutating {
                        contract,
                        method: method.name.clone(),
                    });
                }
                let data = abi::encode_call(&method.name, &method.inputs, args)
                    .map_err(|source| BindingError::Abi { contract, source })?;
                Ok((Some(address), Bytes::from(data)))
            }
        }
    }
}

/// Builds [`BoundContract`]s. Deployment goes through the shared
/// [`TransactionSubmitter`]; everything else is local.
#[derive(Clone)]
pub struct BindingFactory {
    submitter: Arc<TransactionSubmitter>,
}

impl BindingFactory {
    pub fn new(submitter: Arc<TransactionSubmitter>) -> Self {
        Self { submitter }
    }

    pub fn submitter(&self) -> &Arc<TransactionSubmitter> {
        &self.submitter
    }

    /// Deploy `descriptor` and wait until the creation is confirmed.
    pub async fn deploy(
        &self,
        descriptor: Arc<ContractDescriptor>,
        signer: SignerIdentity,
        constructor_args: &[DynSolValue],
        overrides: Overrides,
    ) -> Result<BoundContract, BindingError> {
        self.deploy_with_receipt(descriptor, signer, constructor_args, overrides)
            .await
            .map(|(contract, _)| contract)
    }

    /// As [`BindingFactory::deploy`], also returning the creation receipt.
    pub async fn deploy_with_receipt(
        &self,
        descriptor: Arc<ContractDescriptor>,
        signer: SignerIdentity,
        constructor_args: &[DynSolValue],
        overrides: Overrides,
    ) -> Result<(BoundContract, ConfirmedReceipt), BindingError> {
        let pending = BoundContract::unattached(Arc::clone(&descriptor), signer.clone());
        let handle = self
            .submitter
            .submit(&pending, CallKind::Deploy, constructor_args, overrides)
            .await?;
        let receipt = self.submitter.await_terminal(&handle).await?;
        let address = receipt
            .contract_address
            .ok_or_else(|| BindingError::MissingContractAddress(descriptor.name.clone()))?;

        info!(contract = %descriptor.name, %address, tx = %receipt.tx, "contract deployed");
        Ok((BoundContract::attached(descriptor, address, signer), receipt))
    }

    /// Bind to an existing deployment. Purely local: the caller vouches for
    /// the address.
    pub fn attach(
        &self,
        descriptor: Arc<ContractDescriptor>,
        address: Address,
        signer: SignerIdentity,
    ) -> BoundContract {
        BoundContract::attached(descriptor, address, signer)
    }

    /// Same contract, different signer.
    pub fn connect(
        &self,
        contract: &BoundContract,
        signer: SignerIdentity,
    ) -> Result<BoundContract, BindingError> {
        let address = contract
            .address
            .ok_or_else(|| BindingError::Unattached(contract.name().to_string()))?;
        Ok(BoundContract::attached(
            Arc::clone(&contract.descriptor),
            address,
            signer,
        ))
    }

    /// The static interface, with no call capability.
    pub fn create_interface_view(descriptor: &ContractDescriptor) -> InterfaceShape {
        descriptor.interface.clone()
    }
}
