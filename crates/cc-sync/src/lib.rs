//! Background replay of the offline report queue.
//!
//! A [`SyncWorker`] drains the queue once per cycle; a [`SyncDispatcher`]
//! turns `sync-new-reports` signals into cycles. Queue, credential and
//! delivery are injected capabilities so each piece can be exercised alone.

mod capabilities;
mod dispatcher;
mod http;
#[cfg(test)]
mod testing;
mod worker;

pub use capabilities::{CredentialProvider, ReportDelivery, ReportQueue};
pub use dispatcher::{
    sync_channel, DispatchSummary, SyncDispatcher, SyncSignal, SyncTrigger, TriggerError,
    TriggerOutcome, DEFAULT_SIGNAL_CAPACITY,
};
pub use http::{HttpDelivery, HttpDeliveryConfig, IDEMPOTENCY_KEY_HEADER};
pub use reqwest::Url;
pub use worker::{ItemOutcome, SyncError, SyncReport, SyncWorker};
