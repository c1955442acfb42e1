//! Single-purchase flow with user feedback: one notification line moving
//! from "waiting" to success or error.

use std::sync::Arc;

use moc_core::{AppNotification, NetworkConfig, NotificationStore, NotificationType};
use parking_lot::Mutex;

use crate::binding::{BindingError, BoundContract, CallKind, Overrides};
use crate::ledger::TxHash;
use crate::purchases::{PURCHASE_METHOD, PurchaseRequest};
use crate::submitter::TransactionSubmitter;

pub const FEEDBACK_KEY: &str = "updatable";
pub const PENDING_MESSAGE: &str = "Waiting for acceptance...";
const SUCCESS_SECS: u64 = 5;
const ERROR_SECS: u64 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurchaseFeedback {
    Pending,
    Success {
        tx: TxHash,
        link: Option<String>,
    },
    /// Failure text as shown to the user. Revert reasons appear verbatim.
    Error(String),
}

pub struct Storefront {
    submitter: Arc<TransactionSubmitter>,
    network: NetworkConfig,
    notifications: Arc<Mutex<NotificationStore>>,
}

impl Storefront {
    pub fn new(
        submitter: Arc<TransactionSubmitter>,
        network: NetworkConfig,
        notifications: Arc<Mutex<NotificationStore>>,
    ) -> Self {
        Self {
            submitter,
            network,
            notifications,
        }
    }

    pub fn notifications(&self) -> &Arc<Mutex<NotificationStore>> {
        &self.notifications
    }

    fn show(&self, notification: AppNotification) {
        self.notifications
            .lock()
            .push(notification.with_key(FEEDBACK_KEY));
    }

    /// Buy one product. Shows the pending state right away, then replaces it
    /// with the outcome. Failures are reported, never raised.
    pub async fn buy(
        &self,
        contract: &BoundContract,
        merchant_id: u64,
        product_id: u64,
    ) -> PurchaseFeedback {
        self.show(AppNotification::new(NotificationType::Loading, PENDING_MESSAGE));

        let request = PurchaseRequest {
            merchant_id,
            product_id,
            attempt_index: 0,
        };
        let result = match self
            .submitter
            .submit(
                contract,
                CallKind::method(PURCHASE_METHOD),
                &request.args(),
                Overrides::default(),
            )
            .await
        {
            Ok(handle) => self
                .submitter
                .await_terminal(&handle)
                .await
                .map_err(BindingError::Transaction),
            Err(e) => Err(e),
        };

        match result {
            Ok(receipt) => {
                let link = self.network.tx_url(&receipt.tx.to_string());
                let mut notification =
                    AppNotification::new(NotificationType::Success, "Purchase confirmed")
                        .with_duration(SUCCESS_SECS);
                if let Some(link) = &link {
                    notification = notification.with_link(link.clone());
                }
                self.show(notification);
                PurchaseFeedback::Success {
                    tx: receipt.tx,
                    link,
                }
            }
            Err(e) => {
                let message = match &e {
                    BindingError::Transaction(reason) => reason.user_message(),
                    other => other.to_string(),
                };
                self.show(
                    AppNotification::new(NotificationType::Error, message.clone())
                        .with_duration(ERROR_SECS),
                );
                PurchaseFeedback::Error(message)
            }
        }
    }
}
