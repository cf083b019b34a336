use cc_core::{DeliveryError, PendingReport};
use cc_storage::StorageError;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::capabilities::{CredentialProvider, ReportDelivery, ReportQueue};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("no cached credential; sync cycle skipped")]
    MissingCredential,
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// What happened to one queued report during a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Remote accepted the report and its queue row was removed.
    Delivered { status: u16 },
    /// Remote accepted the report but another cycle had already removed the row.
    DeliveredElsewhere { status: u16 },
    /// Delivery failed; the report stays queued for the next cycle.
    Failed(DeliveryError),
    /// Remote accepted the report but the row could not be removed, so it will
    /// be sent again next cycle.
    DeleteFailed { status: u16, reason: String },
}

impl ItemOutcome {
    pub fn was_accepted(&self) -> bool {
        !matches!(self, ItemOutcome::Failed(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub outcomes: Vec<(i64, ItemOutcome)>,
}

impl SyncReport {
    pub fn attempted(&self) -> usize {
        self.outcomes.len()
    }

    pub fn delivered(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| outcome.was_accepted())
            .count()
    }

    pub fn failed(&self) -> usize {
        self.attempted() - self.delivered()
    }

    pub fn outcome(&self, id: i64) -> Option<&ItemOutcome> {
        self.outcomes
            .iter()
            .find(|(item_id, _)| *item_id == id)
            .map(|(_, outcome)| outcome)
    }
}

/// Drains the report queue against the remote endpoint.
///
/// Reports are delivered one at a time in queue order. A report leaves the
/// queue only after the remote confirmed it; every other failure leaves it in
/// place and the cycle moves on to the next one.
pub struct SyncWorker<Q, C, D> {
    queue: Q,
    credentials: C,
    delivery: D,
}

impl<Q, C, D> SyncWorker<Q, C, D>
where
    Q: ReportQueue,
    C: CredentialProvider,
    D: ReportDelivery,
{
    pub fn new(queue: Q, credentials: C, delivery: D) -> Self {
        Self {
            queue,
            credentials,
            delivery,
        }
    }

    pub async fn run_cycle(&self) -> Result<SyncReport, SyncError> {
        let token = match self.credentials.credential().await? {
            Some(token) if !token.trim().is_empty() => token,
            _ => {
                warn!(event = "sync_skipped", reason = "missing_credential");
                return Err(SyncError::MissingCredential);
            }
        };

        let pending = self.queue.list_pending_reports().await?;
        debug!(event = "sync_start", pending = pending.len());

        let mut report = SyncReport::default();
        for item in pending {
            let outcome = self.deliver_one(&item, &token).await;
            report.outcomes.push((item.id, outcome));
        }

        info!(
            event = "sync_complete",
            attempted = report.attempted(),
            delivered = report.delivered(),
            failed = report.failed()
        );
        Ok(report)
    }

    async fn deliver_one(&self, item: &PendingReport, token: &str) -> ItemOutcome {
        let request = item.delivery_request();
        let receipt = match self.delivery.deliver(&request, token).await {
            Ok(receipt) => receipt,
            Err(err) => {
                warn!(
                    event = "report_delivery_failed",
                    report_id = item.id,
                    kind = err.kind(),
                    status = err.status(),
                    error = %err
                );
                return ItemOutcome::Failed(err);
            }
        };

        match self.queue.delete_report(item.id).await {
            Ok(true) => {
                info!(event = "report_synced", report_id = item.id, status = receipt.status);
                ItemOutcome::Delivered {
                    status: receipt.status,
                }
            }
            Ok(false) => {
                debug!(event = "report_already_removed", report_id = item.id);
                ItemOutcome::DeliveredElsewhere {
                    status: receipt.status,
                }
            }
            Err(err) => {
                warn!(event = "report_delete_failed", report_id = item.id, error = %err);
                ItemOutcome::DeleteFailed {
                    status: receipt.status,
                    reason: err.to_string(),
                }
            }
        }
    }
}
