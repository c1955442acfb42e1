//! In-process ledger for dry runs and tests.
//!
//! Enforces per-sender nonces, derives contract addresses the way `CREATE`
//! does, and can be scripted to revert, reject or never mine.

use std::collections::HashMap;
use std::time::Duration;

use alloy_primitives::{Address, Bytes, address, keccak256};
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use super::{LedgerError, LedgerRpc, ReceiptStatus, SignedPayload, TxHash};
use crate::abi;

/// Chain id reported by [`MemoryLedger`].
pub const MEMORY_CHAIN_ID: u64 = 1337;

/// First two well-known development accounts.
pub const DEV_ACCOUNTS: [Address; 2] = [
    address!("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"),
    address!("0x70997970C51812dc3A010C7d01b50e0d17dc79C8"),
];

/// One transaction as the ledger accepted it, in acceptance order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedTx {
    pub hash: TxHash,
    pub from: Address,
    pub nonce: u64,
    pub to: Option<Address>,
    pub data: Bytes,
}

#[derive(Debug)]
struct MinedTx {
    polls_remaining: u32,
    outcome: ReceiptStatus,
}

#[derive(Debug, Default)]
struct State {
    accounts: Vec<Address>,
    nonces: HashMap<Address, u64>,
    txs: HashMap<TxHash, MinedTx>,
    accepted: Vec<AcceptedTx>,
    creation_inputs: HashMap<Address, Bytes>,
    method_reverts: HashMap<[u8; 4], String>,
    deployment_revert: Option<String>,
    reject_next: Option<String>,
    polls_until_mined: u32,
    never_mine: bool,
    automine_reverts: bool,
    block: u64,
}

pub struct MemoryLedger {
    state: Mutex<State>,
    latency: Option<Duration>,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedger {
    /// A ledger holding the development accounts, mining on the first poll.
    pub fn new() -> Self {
        Self::with_accounts(DEV_ACCOUNTS.to_vec())
    }

    pub fn with_accounts(accounts: Vec<Address>) -> Self {
        Self {
            state: Mutex::new(State {
                accounts,
                ..State::default()
            }),
            latency: None,
        }
    }

    /// Delay every RPC by `latency` (a suspension point, like a real node).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of receipt polls that report `Pending` before a transaction is
    /// mined.
    pub fn set_polls_until_mined(&self, polls: u32) {
        self.state.lock().polls_until_mined = polls;
    }

    /// Stop mining altogether; receipts stay `Pending`.
    pub fn set_never_mine(&self, never: bool) {
        self.state.lock().never_mine = never;
    }

    /// Calls to `signature` (e.g. `makePurchaseRequest(uint256,uint256)`) are
    /// mined as reverted with `reason`.
    pub fn revert_method(&self, signature: &str, reason: impl Into<String>) {
        self.state
            .lock()
            .method_reverts
            .insert(abi::selector(signature), reason.into());
    }

    /// Report reverting transactions from `submit_transaction` itself, the
    /// way an automining node does. The transaction is still recorded and
    /// its nonce spent.
    pub fn set_automine_reverts(&self, enabled: bool) {
        self.state.lock().automine_reverts = enabled;
    }

    /// Contract creations are mined as reverted with `reason`.
    pub fn revert_deployments(&self, reason: impl Into<String>) {
        self.state.lock().deployment_revert = Some(reason.into());
    }

    /// The next submission is refused before acceptance.
    pub fn reject_next_submission(&self, reason: impl Into<String>) {
        self.state.lock().reject_next = Some(reason.into());
    }

    /// Accepted transactions, oldest first.
    pub fn accepted(&self) -> Vec<AcceptedTx> {
        self.state.lock().accepted.clone()
    }

    /// Creation data (bytecode followed by constructor arguments) of the
    /// contract deployed at `address`.
    pub fn creation_input(&self, address: Address) -> Option<Bytes> {
        self.state.lock().creation_inputs.get(&address).cloned()
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

fn tx_hash(from: Address, nonce: u64, data: &[u8]) -> TxHash {
    let mut preimage = Vec::with_capacity(20 + 8 + data.len());
    preimage.extend_from_slice(from.as_slice());
    preimage.extend_from_slice(&nonce.to_be_bytes());
    preimage.extend_from_slice(data);
    keccak256(preimage)
}

#[async_trait]
impl LedgerRpc for MemoryLedger {
    async fn submit_transaction(&self, payload: SignedPayload) -> Result<TxHash, LedgerError> {
        self.delay().await;
        let mut state = self.state.lock();

        if let Some(reason) = state.reject_next.take() {
            return Err(LedgerError::Rejected(reason));
        }
        let intent = payload.intent;
        if !state.accounts.contains(&intent.from) {
            return Err(LedgerError::Rejected(format!(
                "unknown account {}",
                intent.from
            )));
        }

        let expected = state.nonces.get(&intent.from).copied().unwrap_or(0);
        let nonce = intent.nonce.unwrap_or(expected);
        if nonce != expected {
            return Err(LedgerError::Rejected(format!(
                "nonce mismatch for {}: expected {expected}, got {nonce}",
                intent.from
            )));
        }
        state.nonces.insert(intent.from, expected + 1);
        state.block += 1;
        let block = state.block;

        let hash = tx_hash(intent.from, nonce, &intent.data);
        let outcome = match intent.to {
            None => match state.deployment_revert.clone() {
                Some(reason) => ReceiptStatus::Reverted { reason },
                None => {
                    let created = intent.from.create(nonce);
                    state.creation_inputs.insert(created, intent.data.clone());
                    ReceiptStatus::Success {
                        contract_address: Some(created),
                        block_number: Some(block),
                        gas_used: Some(21_000),
                        logs: Vec::new(),
                    }
                }
            },
            Some(_) => {
                let revert = intent
                    .data
                    .get(..4)
                    .and_then(|sel| <[u8; 4]>::try_from(sel).ok())
                    .and_then(|sel| state.method_reverts.get(&sel).cloned());
                match revert {
                    Some(reason) => ReceiptStatus::Reverted { reason },
                    None => ReceiptStatus::Success {
                        contract_address: None,
                        block_number: Some(block),
                        gas_used: Some(21_000),
                        logs: Vec::new(),
                    },
                }
            }
        };

        let automined_revert = match &outcome {
            ReceiptStatus::Reverted { reason } if state.automine_reverts => Some(reason.clone()),
            _ => None,
        };
        let polls_remaining = state.polls_until_mined;
        state.txs.insert(
            hash,
            MinedTx {
                polls_remaining,
                outcome,
            },
        );
        state.accepted.push(AcceptedTx {
            hash,
            from: intent.from,
            nonce,
            to: intent.to,
            data: intent.data,
        });
        debug!(tx = %hash, nonce, "memory ledger accepted transaction");
        match automined_revert {
            Some(reason) => Err(LedgerError::MinedReverted { tx: hash, reason }),
            None => Ok(hash),
        }
    }

    async fn get_receipt(&self, tx: TxHash) -> Result<ReceiptStatus, LedgerError> {
        self.delay().await;
        let mut state = self.state.lock();
        let never_mine = state.never_mine;
        let Some(entry) = state.txs.get_mut(&tx) else {
            return Ok(ReceiptStatus::Pending);
        };
        if never_mine {
            return Ok(ReceiptStatus::Pending);
        }
        if entry.polls_remaining > 0 {
            entry.polls_remaining -= 1;
            return Ok(ReceiptStatus::Pending);
        }
        Ok(entry.outcome.clone())
    }

    async fn transaction_count(&self, address: Address) -> Result<u64, LedgerError> {
        self.delay().await;
        Ok(self.state.lock().nonces.get(&address).copied().unwrap_or(0))
    }

    async fn accounts(&self) -> Result<Vec<Address>, LedgerError> {
        Ok(self.state.lock().accounts.clone())
    }

    async fn chain_id(&self) -> Result<u64, LedgerError> {
        Ok(MEMORY_CHAIN_ID)
    }
}
