use std::sync::Arc;

use alloy_dyn_abi::DynSolValue;
use alloy_primitives::Address;
use moc_contracts::ledger::memory::DEV_ACCOUNTS;
use moc_contracts::*;
use serde_json::json;

fn factory(ledger: Arc<MemoryLedger>) -> BindingFactory {
    let submitter = TransactionSubmitter::new(
        ledger,
        Arc::new(NodeAccountSigner::new(DEV_ACCOUNTS)),
        SubmitterConfig::default(),
    );
    BindingFactory::new(Arc::new(submitter))
}

fn oracle_descriptor() -> Arc<ContractDescriptor> {
    let abi = json!([
        {
            "type": "constructor",
            "inputs": [
                { "name": "link", "type": "address" },
                { "name": "owner", "type": "address" }
            ],
            "stateMutability": "nonpayable"
        },
        {
            "type": "function",
            "name": "setAuthorizedSenders",
            "inputs": [{ "name": "senders", "type": "address[]" }],
            "outputs": [],
            "stateMutability": "nonpayable"
        }
    ]);
    Arc::new(ContractDescriptor::new("Oracle", &abi, "0x6080604052348015600f57600080fd5b50").unwrap())
}

fn deployer() -> SignerIdentity {
    SignerIdentity::named(DEV_ACCOUNTS[0], "deployer")
}

#[tokio::test]
async fn test_deploy_returns_attached_contract() {
    let ledger = Arc::new(MemoryLedger::new());
    let factory = factory(Arc::clone(&ledger));
    let args = [
        DynSolValue::Address(Address::repeat_byte(1)),
        DynSolValue::Address(Address::repeat_byte(2)),
    ];

    let contract = factory
        .deploy(oracle_descriptor(), deployer(), &args, Overrides::default())
        .await
        .unwrap();

    assert!(contract.is_attached());
    assert_eq!(contract.address(), Some(DEV_ACCOUNTS[0].create(0)));
    assert_eq!(contract.signer(), &deployer());
    assert_eq!(ledger.accepted().len(), 1);
}

#[tokio::test]
async fn test_deploy_revert_is_reported_not_raised() {
    let ledger = Arc::new(MemoryLedger::new());
    ledger.revert_deployments("insufficient balance");
    let factory = factory(Arc::clone(&ledger));
    let args = [
        DynSolValue::Address(Address::repeat_byte(1)),
        DynSolValue::Address(Address::repeat_byte(2)),
    ];

    let err = factory
        .deploy(oracle_descriptor(), deployer(), &args, Overrides::default())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        BindingError::Transaction(FailureReason::ExecutionReverted(
            "insufficient balance".into()
        ))
    );
}

#[tokio::test]
async fn test_deploy_rejected_by_signer() {
    let ledger = Arc::new(MemoryLedger::new());
    let factory = factory(Arc::clone(&ledger));
    let stranger = SignerIdentity::new(Address::repeat_byte(0xee));
    let args = [
        DynSolValue::Address(Address::repeat_byte(1)),
        DynSolValue::Address(Address::repeat_byte(2)),
    ];

    let err = factory
        .deploy(oracle_descriptor(), stranger, &args, Overrides::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BindingError::Transaction(FailureReason::SubmissionRejected(_))
    ));
    assert!(ledger.accepted().is_empty());
}

#[tokio::test]
async fn test_interface_only_descriptor_fails_before_signing() {
    let ledger = Arc::new(MemoryLedger::new());
    let factory = factory(Arc::clone(&ledger));
    let descriptor = DescriptorRegistry::with_builtins()
        .unwrap()
        .require(builtin::MAP_OF_CRYPTO)
        .unwrap();

    let err = factory
        .deploy(descriptor, deployer(), &[], Overrides::default())
        .await
        .unwrap_err();
    assert_eq!(err, BindingError::NotDeployable("MapOfCrypto".into()));
    assert!(ledger.accepted().is_empty());
}

#[test]
fn test_attach_is_local_and_exact() {
    let ledger = Arc::new(MemoryLedger::new());
    let factory = factory(Arc::clone(&ledger));
    let address: Address = "0xabc0000000000000000000000000000000000123".parse().unwrap();

    let contract = factory.attach(oracle_descriptor(), address, deployer());
    assert_eq!(contract.address(), Some(address));
    assert!(ledger.accepted().is_empty());
}

#[test]
fn test_connect_swaps_signer_only() {
    let factory = factory(Arc::new(MemoryLedger::new()));
    let address = Address::repeat_byte(0x42);
    let original = factory.attach(oracle_descriptor(), address, deployer());
    let buyer = SignerIdentity::named(DEV_ACCOUNTS[1], "buyer");

    let reconnected = factory.connect(&original, buyer.clone()).unwrap();
    assert_eq!(reconnected.address(), Some(address));
    assert_eq!(reconnected.signer(), &buyer);
    assert!(Arc::ptr_eq(reconnected.descriptor(), original.descriptor()));
    assert_eq!(original.signer(), &deployer());
}

#[test]
fn test_connect_requires_attached_contract() {
    let factory = factory(Arc::new(MemoryLedger::new()));
    let pending = BoundContract::unattached(oracle_descriptor(), deployer());
    let err = factory.connect(&pending, deployer()).unwrap_err();
    assert_eq!(err, BindingError::Unattached("Oracle".into()));
}
