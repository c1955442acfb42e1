//! The ledger RPC boundary: accept a signed transaction, report its receipt.
//!
//! Retries and backoff on transient transport errors belong to the
//! implementation, not to callers of [`LedgerRpc`].

pub mod json_rpc;
pub mod memory;

use alloy_primitives::{Address, B256, Bytes, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use json_rpc::JsonRpcLedger;
pub use memory::MemoryLedger;

/// Ledger-assigned transaction identifier.
pub type TxHash = B256;

/// An unsigned transaction as the binding layer builds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionIntent {
    pub from: Address,
    /// `None` creates a contract from `data`.
    pub to: Option<Address>,
    pub data: Bytes,
    pub value: U256,
    pub nonce: Option<u64>,
    pub gas_limit: Option<u64>,
    pub gas_price: Option<u128>,
    pub chain_id: u64,
}

impl TransactionIntent {
    pub fn is_deployment(&self) -> bool {
        self.to.is_none()
    }
}

/// What the signer hands to the ledger: an intent approved for an account
/// the node holds keys for. The node signs on submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPayload {
    pub intent: TransactionIntent,
}

impl SignedPayload {
    pub fn node_managed(intent: TransactionIntent) -> Self {
        Self { intent }
    }

    pub fn from(&self) -> Address {
        self.intent.from
    }
}

/// An event log emitted by a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiptStatus {
    /// Not mined yet (or unknown to the node).
    Pending,
    Success {
        contract_address: Option<Address>,
        block_number: Option<u64>,
        gas_used: Option<u64>,
        logs: Vec<LogEntry>,
    },
    Reverted {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// The node refused the transaction before accepting it into the pool.
    #[error("Transaction rejected: {0}")]
    Rejected(String),

    /// The node executed the call while accepting it and it reverted.
    #[error("Execution reverted: {0}")]
    Reverted(String),

    /// The node mined the transaction while accepting it (Hardhat automine)
    /// and it reverted. Its sequence number is spent.
    #[error("Transaction {tx} reverted: {reason}")]
    MinedReverted { tx: TxHash, reason: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait LedgerRpc: Send + Sync {
    /// Submit a signed transaction. `Ok` means accepted into the pending pool.
    async fn submit_transaction(&self, payload: SignedPayload) -> Result<TxHash, LedgerError>;

    async fn get_receipt(&self, tx: TxHash) -> Result<ReceiptStatus, LedgerError>;

    /// Next sequence number (nonce) for `address`, counting pending
    /// transactions.
    async fn transaction_count(&self, address: Address) -> Result<u64, LedgerError>;

    /// Accounts the node can sign for.
    async fn accounts(&self) -> Result<Vec<Address>, LedgerError>;

    async fn chain_id(&self) -> Result<u64, LedgerError>;
}
