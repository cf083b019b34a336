use std::future::Future;

use thiserror::Error;
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tracing::{debug, info, warn};

use crate::capabilities::{CredentialProvider, ReportDelivery, ReportQueue};
use crate::worker::{SyncError, SyncWorker};

pub const DEFAULT_SIGNAL_CAPACITY: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSignal {
    pub tag: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Queued,
    /// The signal buffer is full; a cycle is already pending and will pick up
    /// whatever this request wanted synced.
    Coalesced,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TriggerError {
    #[error("sync dispatcher has stopped")]
    Closed,
}

/// Sending side used by whatever observes connectivity or user actions.
#[derive(Debug, Clone)]
pub struct SyncTrigger {
    tx: mpsc::Sender<SyncSignal>,
}

impl SyncTrigger {
    pub fn request(&self, tag: impl Into<String>) -> Result<TriggerOutcome, TriggerError> {
        match self.tx.try_send(SyncSignal { tag: tag.into() }) {
            Ok(()) => Ok(TriggerOutcome::Queued),
            Err(TrySendError::Full(_)) => Ok(TriggerOutcome::Coalesced),
            Err(TrySendError::Closed(_)) => Err(TriggerError::Closed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub cycles: usize,
    pub coalesced: usize,
    pub ignored: usize,
    pub skipped_without_credential: usize,
    pub storage_failures: usize,
    pub delivered: usize,
}

/// Receives sync signals and runs one worker cycle per burst of matching
/// signals.
pub struct SyncDispatcher<Q, C, D> {
    worker: SyncWorker<Q, C, D>,
    rx: mpsc::Receiver<SyncSignal>,
}

pub fn sync_channel<Q, C, D>(
    worker: SyncWorker<Q, C, D>,
    capacity: usize,
) -> (SyncTrigger, SyncDispatcher<Q, C, D>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (SyncTrigger { tx }, SyncDispatcher { worker, rx })
}

impl<Q, C, D> SyncDispatcher<Q, C, D>
where
    Q: ReportQueue,
    C: CredentialProvider,
    D: ReportDelivery,
{
    /// Runs until every [`SyncTrigger`] is dropped or `shutdown` resolves.
    /// A cycle already in progress when shutdown fires is finished first.
    pub async fn run<F>(mut self, shutdown: F) -> DispatchSummary
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut summary = DispatchSummary::default();

        loop {
            let signal = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    debug!(event = "sync_dispatcher_shutdown");
                    break;
                }
                signal = self.rx.recv() => match signal {
                    Some(signal) => signal,
                    None => break,
                },
            };

            if !cc_core::is_sync_tag(&signal.tag) {
                debug!(event = "sync_signal_ignored", tag = %signal.tag);
                summary.ignored += 1;
                continue;
            }

            self.drain_buffered(&mut summary);
            self.run_one(&mut summary).await;
        }

        info!(
            event = "sync_dispatcher_stopped",
            cycles = summary.cycles,
            delivered = summary.delivered
        );
        summary
    }

    fn drain_buffered(&mut self, summary: &mut DispatchSummary) {
        loop {
            match self.rx.try_recv() {
                Ok(signal) if cc_core::is_sync_tag(&signal.tag) => summary.coalesced += 1,
                Ok(signal) => {
                    debug!(event = "sync_signal_ignored", tag = %signal.tag);
                    summary.ignored += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
    }

    async fn run_one(&self, summary: &mut DispatchSummary) {
        summary.cycles += 1;
        match self.worker.run_cycle().await {
            Ok(report) => summary.delivered += report.delivered(),
            Err(SyncError::MissingCredential) => summary.skipped_without_credential += 1,
            Err(SyncError::Storage(err)) => {
                warn!(event = "sync_cycle_failed", error = %err);
                summary.storage_failures += 1;
            }
        }
    }
}
