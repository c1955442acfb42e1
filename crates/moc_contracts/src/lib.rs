// Contract bindings and the transaction lifecycle

pub mod abi;
pub mod binding;
pub mod builtin;
pub mod deployments;
pub mod descriptor;
pub mod ledger;
pub mod plan;
pub mod purchases;
pub mod registry;
pub mod sequencer;
pub mod signer;
pub mod storefront;
pub mod submitter;

// Re-export primary types for convenient access.
pub use binding::{BindingError, BindingFactory, BoundContract, CallKind, Overrides};
pub use deployments::{DeploymentRecord, DeploymentRecords};
pub use descriptor::{ContractDescriptor, DescriptorError, InterfaceShape, MethodSpec, Mutability};
pub use ledger::{JsonRpcLedger, LedgerError, LedgerRpc, MemoryLedger, ReceiptStatus, TxHash};
pub use plan::{DeploymentPlan, PlanError};
pub use purchases::{BatchMode, BatchReport, PurchaseOrchestrator, PurchaseOutcome, PurchaseRequest};
pub use registry::DescriptorRegistry;
pub use sequencer::{
    DeploymentSequencer, DeploymentStep, Deployments, RecordsTarget, SequenceAborted,
    SequencerError, StepFailure,
};
pub use signer::{NodeAccountSigner, SignerIdentity, SigningDenied, TransactionSigner};
pub use storefront::{PurchaseFeedback, Storefront};
pub use submitter::{
    ConfirmedReceipt, FailureReason, SubmitterConfig, TransactionHandle, TransactionSubmitter,
    TxEvent, TxEventKind, TxState,
};
