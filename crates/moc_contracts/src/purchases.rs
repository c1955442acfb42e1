//! Bulk purchase driver: N purchase transactions against one storefront
//! contract, one outcome recorded per index.

use std::fmt;
use std::str::FromStr;

use alloy_dyn_abi::DynSolValue;
use alloy_primitives::U256;
use futures::future::join_all;
use tracing::{info, warn};

use crate::binding::{BindingError, BoundContract, CallKind, Overrides};
use crate::ledger::TxHash;
use crate::submitter::{ConfirmedReceipt, TransactionHandle, TransactionSubmitter};

pub const PURCHASE_METHOD: &str = "makePurchaseRequest";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurchaseRequest {
    pub merchant_id: u64,
    pub product_id: u64,
    pub attempt_index: usize,
}

impl PurchaseRequest {
    pub fn args(&self) -> Vec<DynSolValue> {
        vec![
            DynSolValue::Uint(U256::from(self.merchant_id), 256),
            DynSolValue::Uint(U256::from(self.product_id), 256),
        ]
    }
}

/// How far each purchase gets before the next one is submitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BatchMode {
    /// Wait for the terminal outcome of each purchase.
    #[default]
    AwaitConfirmation,
    /// Wait only for acceptance; all receipts are awaited after the loop.
    AwaitAcceptance,
}

impl FromStr for BatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "confirm" | "confirmation" => Ok(BatchMode::AwaitConfirmation),
            "accept" | "acceptance" => Ok(BatchMode::AwaitAcceptance),
            other => Err(format!("unknown batch mode `{other}` (expected confirm or accept)")),
        }
    }
}

impl fmt::Display for BatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchMode::AwaitConfirmation => f.write_str("confirm"),
            BatchMode::AwaitAcceptance => f.write_str("accept"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PurchaseOutcome {
    pub index: usize,
    pub request: PurchaseRequest,
    /// Set once the ledger accepted the transaction.
    pub tx: Option<TxHash>,
    pub result: Result<ConfirmedReceipt, BindingError>,
}

impl PurchaseOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub outcomes: Vec<PurchaseOutcome>,
}

impl BatchReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &PurchaseOutcome> {
        self.outcomes.iter().filter(|o| o.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &PurchaseOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

pub struct PurchaseOrchestrator<'a> {
    submitter: &'a TransactionSubmitter,
    mode: BatchMode,
}

impl<'a> PurchaseOrchestrator<'a> {
    pub fn new(submitter: &'a TransactionSubmitter) -> Self {
        Self {
            submitter,
            mode: BatchMode::default(),
        }
    }

    pub fn with_mode(mut self, mode: BatchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Issue `count` purchases, cycling through `requests` as
    /// `(merchant_id, product_id)` pairs. A failed purchase is recorded and
    /// the batch carries on.
    pub async fn run_batch(
        &self,
        contract: &BoundContract,
        requests: &[(u64, u64)],
        count: usize,
    ) -> BatchReport {
        let mut report = BatchReport::default();
        if requests.is_empty() {
            return report;
        }

        let mut in_flight: Vec<(usize, PurchaseRequest, TransactionHandle)> = Vec::new();
        for index in 0..count {
            let (merchant_id, product_id) = requests[index % requests.len()];
            let request = PurchaseRequest {
                merchant_id,
                product_id,
                attempt_index: index,
            };

            let handle = match self
                .submitter
                .submit(
                    contract,
                    CallKind::method(PURCHASE_METHOD),
                    &request.args(),
                    Overrides::default(),
                )
                .await
            {
                Ok(handle) => handle,
                Err(e) => {
                    warn!(index, merchant_id, product_id, "purchase refused: {e}");
                    report.outcomes.push(PurchaseOutcome {
                        index,
                        request,
                        tx: None,
                        result: Err(e),
                    });
                    continue;
                }
            };

            match self.mode {
                BatchMode::AwaitConfirmation => {
                    let outcome = self.settle(index, request, &handle).await;
                    report.outcomes.push(outcome);
                }
                BatchMode::AwaitAcceptance => {
                    info!(index, tx = %handle.id(), "purchase accepted");
                    in_flight.push((index, request, handle));
                }
            }
        }

        let settled = join_all(
            in_flight
                .iter()
                .map(|(index, request, handle)| self.settle(*index, *request, handle)),
        )
        .await;
        report.outcomes.extend(settled);
        report.outcomes.sort_by_key(|o| o.index);

        info!(
            total = report.len(),
            succeeded = report.succeeded().count(),
            failed = report.failed().count(),
            mode = %self.mode,
            "purchase batch finished"
        );
        report
    }

    async fn settle(
        &self,
        index: usize,
        request: PurchaseRequest,
        handle: &TransactionHandle,
    ) -> PurchaseOutcome {
        let result = self
            .submitter
            .await_terminal(handle)
            .await
            .map_err(BindingError::Transaction);
        match &result {
            Ok(_) => info!(index, tx = %handle.id(), "purchase confirmed"),
            Err(e) => warn!(index, tx = %handle.id(), "purchase failed: {e}"),
        }
        PurchaseOutcome {
            index,
            request,
            tx: Some(handle.id()),
            result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_mode_parses() {
        assert_eq!("confirm".parse::<BatchMode>().unwrap(), BatchMode::AwaitConfirmation);
        assert_eq!("Accept".parse::<BatchMode>().unwrap(), BatchMode::AwaitAcceptance);
        assert!("later".parse::<BatchMode>().is_err());
        assert_eq!(BatchMode::default(), BatchMode::AwaitConfirmation);
    }

    #[test]
    fn request_encodes_as_two_uints() {
        let request = PurchaseRequest {
            merchant_id: 1,
            product_id: 7,
            attempt_index: 0,
        };
        assert_eq!(
            request.args(),
            vec![
                DynSolValue::Uint(U256::from(1), 256),
                DynSolValue::Uint(U256::from(7), 256),
            ]
        );
    }
}
