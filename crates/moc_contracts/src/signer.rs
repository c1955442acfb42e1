//! The signer boundary: turn a transaction intent into something the ledger
//! accepts, on behalf of one identity.

use std::collections::HashSet;
use std::fmt;

use alloy_primitives::Address;
use async_trait::async_trait;

use crate::ledger::{LedgerError, LedgerRpc, SignedPayload, TransactionIntent};

/// The credential that authorizes and orders a sender's transactions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SignerIdentity {
    pub address: Address,
    /// Named-account label (`deployer`, `buyer`), informational only.
    pub label: Option<String>,
}

impl SignerIdentity {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            label: None,
        }
    }

    pub fn named(address: Address, label: impl Into<String>) -> Self {
        Self {
            address,
            label: Some(label.into()),
        }
    }
}

impl fmt::Display for SignerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => write!(f, "{label} ({})", self.address),
            None => write!(f, "{}", self.address),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Signing denied for {identity}: {reason}")]
pub struct SigningDenied {
    pub identity: Address,
    pub reason: String,
}

#[async_trait]
pub trait TransactionSigner: Send + Sync {
    /// Sign `intent` as `identity`. Fails when the identity is unavailable or
    /// the holder declines.
    async fn sign(
        &self,
        intent: &TransactionIntent,
        identity: &SignerIdentity,
    ) -> Result<SignedPayload, SigningDenied>;
}

/// Signs for accounts the node itself holds keys for (unlocked development
/// accounts). The node signs on `eth_sendTransaction`; this signer only
/// vouches that the identity is one of them.
#[derive(Debug, Clone, Default)]
pub struct NodeAccountSigner {
    accounts: HashSet<Address>,
}

impl NodeAccountSigner {
    pub fn new(accounts: impl IntoIterator<Item = Address>) -> Self {
        Self {
            accounts: accounts.into_iter().collect(),
        }
    }

    /// Use whatever `eth_accounts` reports.
    pub async fn from_ledger(ledger: &dyn LedgerRpc) -> Result<Self, LedgerError> {
        Ok(Self::new(ledger.accounts().await?))
    }

    pub fn holds(&self, address: &Address) -> bool {
        self.accounts.contains(address)
    }

    /// Accounts sorted by address, for stable named-account indexing.
    pub fn accounts(&self) -> Vec<Address> {
        let mut accounts: Vec<Address> = self.accounts.iter().copied().collect();
        accounts.sort();
        accounts
    }
}

#[async_trait]
impl TransactionSigner for NodeAccountSigner {
    async fn sign(
        &self,
        intent: &TransactionIntent,
        identity: &SignerIdentity,
    ) -> Result<SignedPayload, SigningDenied> {
        if intent.from != identity.address {
            return Err(SigningDenied {
                identity: identity.address,
                reason: format!("intent is from {}", intent.from),
            });
        }
        if !self.holds(&identity.address) {
            return Err(SigningDenied {
                identity: identity.address,
                reason: "account is not unlocked on the node".into(),
            });
        }
        Ok(SignedPayload::node_managed(intent.clone()))
    }
}
