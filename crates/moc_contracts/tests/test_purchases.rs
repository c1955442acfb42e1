use std::collections::HashSet;
use std::sync::Arc;

use alloy_primitives::Address;
use moc_contracts::ledger::memory::DEV_ACCOUNTS;
use moc_contracts::*;

fn submitter(ledger: Arc<MemoryLedger>) -> TransactionSubmitter {
    TransactionSubmitter::new(
        ledger,
        Arc::new(NodeAccountSigner::new(DEV_ACCOUNTS)),
        SubmitterConfig::default(),
    )
}

fn shop() -> BoundContract {
    BoundContract::attached(
        Arc::new(builtin::map_of_crypto().unwrap()),
        Address::repeat_byte(0x66),
        SignerIdentity::named(DEV_ACCOUNTS[0], "buyer"),
    )
}

#[tokio::test]
async fn test_twenty_purchases_all_confirm() {
    let ledger = Arc::new(MemoryLedger::new());
    let submitter = submitter(Arc::clone(&ledger));

    let report = PurchaseOrchestrator::new(&submitter)
        .run_batch(&shop(), &[(1, 1)], 20)
        .await;

    assert_eq!(report.len(), 20);
    assert_eq!(report.succeeded().count(), 20);
    let indexes: Vec<usize> = report.outcomes.iter().map(|o| o.index).collect();
    assert_eq!(indexes, (0..20).collect::<Vec<_>>());
    let ids: HashSet<_> = report.outcomes.iter().filter_map(|o| o.tx).collect();
    assert_eq!(ids.len(), 20);
}

#[tokio::test(start_paused = true)]
async fn test_accept_mode_awaits_receipts_after_the_loop() {
    let ledger = Arc::new(MemoryLedger::new());
    ledger.set_polls_until_mined(2);
    let submitter = submitter(Arc::clone(&ledger));

    let report = PurchaseOrchestrator::new(&submitter)
        .with_mode(BatchMode::AwaitAcceptance)
        .run_batch(&shop(), &[(1, 1), (2, 5)], 6)
        .await;

    assert_eq!(report.succeeded().count(), 6);
    let products: Vec<u64> = report.outcomes.iter().map(|o| o.request.product_id).collect();
    assert_eq!(products, [1, 5, 1, 5, 1, 5]);
    let nonces: Vec<u64> = ledger.accepted().iter().map(|tx| tx.nonce).collect();
    assert_eq!(nonces, (0..6).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_single_failure_does_not_abort_batch() {
    let ledger = Arc::new(MemoryLedger::new());
    ledger.reject_next_submission("insufficient funds for gas * price + value");
    let submitter = submitter(Arc::clone(&ledger));

    let report = PurchaseOrchestrator::new(&submitter)
        .run_batch(&shop(), &[(1, 1)], 5)
        .await;

    assert_eq!(report.len(), 5);
    let failed: Vec<&PurchaseOutcome> = report.failed().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].index, 0);
    assert!(failed[0].tx.is_none());
    assert!(matches!(
        failed[0].result,
        Err(BindingError::Transaction(FailureReason::SubmissionRejected(_)))
    ));
    assert_eq!(report.succeeded().count(), 4);
}

#[tokio::test]
async fn test_reverts_are_recorded_per_index() {
    let ledger = Arc::new(MemoryLedger::new());
    ledger.revert_method("makePurchaseRequest(uint256,uint256)", "unknown product");
    let submitter = submitter(Arc::clone(&ledger));

    let report = PurchaseOrchestrator::new(&submitter)
        .run_batch(&shop(), &[(1, 9)], 3)
        .await;

    assert_eq!(report.failed().count(), 3);
    for outcome in &report.outcomes {
        assert!(outcome.tx.is_some());
        assert!(matches!(
            &outcome.result,
            Err(BindingError::Transaction(FailureReason::ExecutionReverted(r))) if r == "unknown product"
        ));
    }
}

#[tokio::test]
async fn test_empty_request_list_is_a_no_op() {
    let ledger = Arc::new(MemoryLedger::new());
    let submitter = submitter(Arc::clone(&ledger));

    let report = PurchaseOrchestrator::new(&submitter)
        .run_batch(&shop(), &[], 20)
        .await;
    assert!(report.is_empty());
    assert!(ledger.accepted().is_empty());
}
