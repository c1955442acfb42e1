//! Transaction lifecycle: submit one mutating call, then await exactly one
//! terminal outcome.
//!
//! `submit` returns once the ledger has accepted the transaction into its
//! pending pool; `await_terminal` suspends until a receipt arrives or the
//! client-side timeout expires. A timeout only bounds how long we wait: the
//! transaction may still be mined afterwards, so a `Timeout` outcome means
//! "unknown", never "did not happen".

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy_dyn_abi::DynSolValue;
use alloy_primitives::Address;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::binding::{BindingError, BoundContract, CallKind, Overrides};
use crate::ledger::{LedgerError, LedgerRpc, LogEntry, ReceiptStatus, TransactionIntent, TxHash};
use crate::signer::TransactionSigner;

const EVENT_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FailureReason {
    /// Refused before acceptance: signing denied, malformed call,
    /// insufficient funds, nonce conflict.
    #[error("Transaction rejected: {0}")]
    SubmissionRejected(String),

    /// Contract logic rejected the call.
    #[error("Execution reverted: {0}")]
    ExecutionReverted(String),

    /// No receipt within the bound. The outcome is unknown.
    #[error("No receipt after {}s; the transaction may still be mined", .0.as_secs())]
    Timeout(Duration),
}

impl FailureReason {
    /// Text for the user. Revert reasons are passed through untouched.
    pub fn user_message(&self) -> String {
        match self {
            FailureReason::ExecutionReverted(reason) => reason.clone(),
            other => other.to_string(),
        }
    }

    fn from_submission(err: LedgerError) -> Self {
        match err {
            LedgerError::Reverted(reason) | LedgerError::MinedReverted { reason, .. } => {
                FailureReason::ExecutionReverted(reason)
            }
            LedgerError::Rejected(reason) => FailureReason::SubmissionRejected(reason),
            other => FailureReason::SubmissionRejected(other.to_string()),
        }
    }
}

/// A successfully mined transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedReceipt {
    pub tx: TxHash,
    pub contract_address: Option<Address>,
    pub block_number: Option<u64>,
    pub gas_used: Option<u64>,
    pub logs: Vec<LogEntry>,
}

pub type TerminalOutcome = Result<ConfirmedReceipt, FailureReason>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxState {
    Pending,
    Confirmed(ConfirmedReceipt),
    Failed(FailureReason),
}

impl TxState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TxState::Pending)
    }

    fn outcome(&self) -> Option<TerminalOutcome> {
        match self {
            TxState::Pending => None,
            TxState::Confirmed(receipt) => Some(Ok(receipt.clone())),
            TxState::Failed(reason) => Some(Err(reason.clone())),
        }
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct HandleInner {
    submission: u64,
    tx: TxHash,
    label: String,
    submitted_at: DateTime<Utc>,
    state: Mutex<TxState>,
}

/// One accepted transaction. Clones share state.
#[derive(Debug, Clone)]
pub struct TransactionHandle {
    inner: Arc<HandleInner>,
}

impl TransactionHandle {
    fn new(submission: u64, tx: TxHash, label: String) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                submission,
                tx,
                label,
                submitted_at: Utc::now(),
                state: Mutex::new(TxState::Pending),
            }),
        }
    }

    /// Ledger-assigned transaction id.
    pub fn id(&self) -> TxHash {
        self.inner.tx
    }

    /// Local submission counter, unique per submitter.
    pub fn submission(&self) -> u64 {
        self.inner.submission
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.inner.submitted_at
    }

    pub fn state(&self) -> TxState {
        self.inner.state.lock().clone()
    }

    pub fn is_terminal(&self) -> bool {
        self.inner.state.lock().is_terminal()
    }

    pub fn terminal(&self) -> Option<TerminalOutcome> {
        self.inner.state.lock().outcome()
    }

    /// Move to a terminal state. Returns the outcome the handle ends up with
    /// and whether this call made the transition; a handle that is already
    /// terminal keeps its first outcome.
    fn settle(&self, outcome: TerminalOutcome) -> (TerminalOutcome, bool) {
        let mut state = self.inner.state.lock();
        if let Some(existing) = state.outcome() {
            return (existing, false);
        }
        *state = match &outcome {
            Ok(receipt) => TxState::Confirmed(receipt.clone()),
            Err(reason) => TxState::Failed(reason.clone()),
        };
        (outcome, true)
    }
}

// ---------------------------------------------------------------------------
// Progress events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxEventKind {
    Pending,
    Confirmed,
    Failed(FailureReason),
}

/// Progress of one submission, broadcast to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxEvent {
    pub submission: u64,
    pub label: String,
    /// `None` when the call was refused before the ledger assigned an id.
    pub tx: Option<TxHash>,
    pub kind: TxEventKind,
}

// ---------------------------------------------------------------------------
// Submitter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SubmitterConfig {
    pub receipt_timeout: Duration,
    pub poll_interval: Duration,
    pub chain_id: u64,
}

impl Default for SubmitterConfig {
    fn default() -> Self {
        Self {
            receipt_timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(1),
            chain_id: 31337,
        }
    }
}

impl SubmitterConfig {
    pub fn from_config(config: &moc_core::MocConfig, chain_id: u64) -> Self {
        Self {
            receipt_timeout: config.receipt_timeout(),
            poll_interval: config.poll_interval(),
            chain_id,
        }
    }
}

/// Nonce bookkeeping for one sender. Holding the lane's lock is what orders
/// that sender's submissions.
#[derive(Debug, Default)]
struct Lane {
    next_nonce: Option<u64>,
}

/// A transaction the ledger took, possibly already mined as reverted.
struct Accepted {
    tx: TxHash,
    nonce: u64,
    reverted: Option<String>,
}

pub struct TransactionSubmitter {
    ledger: Arc<dyn LedgerRpc>,
    signer: Arc<dyn TransactionSigner>,
    config: SubmitterConfig,
    lanes: Mutex<HashMap<Address, Arc<tokio::sync::Mutex<Lane>>>>,
    next_submission: AtomicU64,
    events: broadcast::Sender<TxEvent>,
}

impl TransactionSubmitter {
    pub fn new(
        ledger: Arc<dyn LedgerRpc>,
        signer: Arc<dyn TransactionSigner>,
        config: SubmitterConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            ledger,
            signer,
            config,
            lanes: Mutex::new(HashMap::new()),
            next_submission: AtomicU64::new(0),
            events,
        }
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerRpc> {
        &self.ledger
    }

    pub fn config(&self) -> &SubmitterConfig {
        &self.config
    }

    /// Progress events for every submission from now on. Delivery is
    /// asynchronous; slow subscribers may observe `Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<TxEvent> {
        self.events.subscribe()
    }

    fn lane(&self, sender: Address) -> Arc<tokio::sync::Mutex<Lane>> {
        Arc::clone(self.lanes.lock().entry(sender).or_default())
    }

    fn emit(&self, submission: u64, label: &str, tx: Option<TxHash>, kind: TxEventKind) {
        // No subscribers is fine.
        let _ = self.events.send(TxEvent {
            submission,
            label: label.to_string(),
            tx,
            kind,
        });
    }

    /// Sign and submit one mutating call. Returns once the ledger has
    /// accepted it; exactly one submission attempt is made.
    ///
    /// Submissions from the same sender are serialized: a second call waits
    /// until the first has been accepted or refused.
    pub async fn submit(
        &self,
        contract: &BoundContract,
        call: CallKind,
        args: &[DynSolValue],
        overrides: Overrides,
    ) -> Result<TransactionHandle, BindingError> {
        let (to, data) = contract.encode(&call, args)?;
        let label = contract.call_label(&call);
        let submission = self.next_submission.fetch_add(1, Ordering::Relaxed);
        let sender = contract.signer().address;

        let lane = self.lane(sender);
        let mut lane = lane.lock().await;

        let result = self
            .submit_in_lane(&mut lane, contract, to, data, overrides)
            .await;
        match result {
            Ok(accepted) => {
                lane.next_nonce = Some(accepted.nonce + 1);
                drop(lane);
                info!(tx = %accepted.tx, nonce = accepted.nonce, %sender, "{label} submitted");
                let handle = TransactionHandle::new(submission, accepted.tx, label);
                self.emit(submission, handle.label(), Some(accepted.tx), TxEventKind::Pending);
                if let Some(reason) = accepted.reverted {
                    let _ = self.finish(&handle, Err(FailureReason::ExecutionReverted(reason)));
                }
                Ok(handle)
            }
            Err(reason) => {
                // The ledger's count is authoritative after a refusal.
                lane.next_nonce = None;
                drop(lane);
                warn!(%sender, "{label} refused: {reason}");
                self.emit(submission, &label, None, TxEventKind::Failed(reason.clone()));
                Err(BindingError::Transaction(reason))
            }
        }
    }

    async fn submit_in_lane(
        &self,
        lane: &mut Lane,
        contract: &BoundContract,
        to: Option<Address>,
        data: alloy_primitives::Bytes,
        overrides: Overrides,
    ) -> Result<Accepted, FailureReason> {
        let sender = contract.signer().address;
        let nonce = match lane.next_nonce {
            Some(nonce) => nonce,
            None => self
                .ledger
                .transaction_count(sender)
                .await
                .map_err(FailureReason::from_submission)?,
        };

        let intent = TransactionIntent {
            from: sender,
            to,
            data,
            value: overrides.value,
            nonce: Some(nonce),
            gas_limit: overrides.gas_limit,
            gas_price: overrides.gas_price,
            chain_id: self.config.chain_id,
        };
        let payload = self
            .signer
            .sign(&intent, contract.signer())
            .await
            .map_err(|denied| FailureReason::SubmissionRejected(denied.to_string()))?;

        match self.ledger.submit_transaction(payload).await {
            Ok(tx) => Ok(Accepted {
                tx,
                nonce,
                reverted: None,
            }),
            Err(LedgerError::MinedReverted { tx, reason }) => Ok(Accepted {
                tx,
                nonce,
                reverted: Some(reason),
            }),
            Err(e) => Err(FailureReason::from_submission(e)),
        }
    }

    /// Wait for the handle's terminal outcome. Calling this again (or on a
    /// clone) returns the same outcome without touching the ledger.
    pub async fn await_terminal(&self, handle: &TransactionHandle) -> TerminalOutcome {
        if let Some(outcome) = handle.terminal() {
            return outcome;
        }

        let timeout = self.config.receipt_timeout;
        let outcome = match tokio::time::timeout(timeout, self.poll_receipt(handle.id())).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(
                    tx = %handle.id(),
                    "{}: no receipt after {}s; it may still be mined",
                    handle.label(),
                    timeout.as_secs()
                );
                Err(FailureReason::Timeout(timeout))
            }
        };

        self.finish(handle, outcome)
    }

    /// Record `outcome` on the handle and report it, unless the handle had
    /// already reached a terminal state.
    fn finish(&self, handle: &TransactionHandle, outcome: TerminalOutcome) -> TerminalOutcome {
        let (outcome, transitioned) = handle.settle(outcome);
        if transitioned {
            let kind = match &outcome {
                Ok(_) => {
                    info!(tx = %handle.id(), "{} confirmed", handle.label());
                    TxEventKind::Confirmed
                }
                Err(reason) => {
                    warn!(tx = %handle.id(), "{} failed: {reason}", handle.label());
                    TxEventKind::Failed(reason.clone())
                }
            };
            self.emit(handle.submission(), handle.label(), Some(handle.id()), kind);
        }
        outcome
    }

    async fn poll_receipt(&self, tx: TxHash) -> TerminalOutcome {
        loop {
            match self.ledger.get_receipt(tx).await {
                Ok(ReceiptStatus::Pending) => {}
                Ok(ReceiptStatus::Success {
                    contract_address,
                    block_number,
                    gas_used,
                    logs,
                }) => {
                    return Ok(ConfirmedReceipt {
                        tx,
                        contract_address,
                        block_number,
                        gas_used,
                        logs,
                    });
                }
                Ok(ReceiptStatus::Reverted { reason }) => {
                    return Err(FailureReason::ExecutionReverted(reason));
                }
                Err(e) => debug!(tx = %tx, "receipt poll failed: {e}"),
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}
