//! In-memory fakes for the sync capabilities.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use cc_core::{DeliveryError, DeliveryReceipt, DeliveryRequest, PendingReport};
use cc_storage::StorageError;
use chrono::Utc;

use crate::capabilities::{CredentialProvider, ReportDelivery, ReportQueue};

#[derive(Default)]
pub(crate) struct MemoryQueue {
    reports: Mutex<BTreeMap<i64, PendingReport>>,
    failing_deletes: Mutex<HashSet<i64>>,
    vanishing: Mutex<HashSet<i64>>,
    list_calls: AtomicUsize,
    delete_calls: AtomicUsize,
}

impl MemoryQueue {
    pub(crate) fn with_titles(titles: &[&str]) -> Self {
        let queue = Self::default();
        {
            let mut reports = queue.reports.lock().expect("reports lock");
            for (index, title) in titles.iter().enumerate() {
                let id = index as i64 + 1;
                reports.insert(
                    id,
                    PendingReport {
                        id,
                        title: title.to_string(),
                        description: format!("{title} description"),
                        category: None,
                        subcategory: None,
                        location: None,
                        idempotency_key: format!("key-{id}"),
                        created_at: Utc::now(),
                    },
                );
            }
        }
        queue
    }

    pub(crate) fn ids(&self) -> Vec<i64> {
        self.reports
            .lock()
            .expect("reports lock")
            .keys()
            .copied()
            .collect()
    }

    pub(crate) fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_deletes_for(&self, id: i64) {
        self.failing_deletes.lock().expect("lock").insert(id);
    }

    /// Simulates a concurrent cycle removing `id` between list and delete.
    pub(crate) fn forget_before_delete(&self, id: i64) {
        self.vanishing.lock().expect("lock").insert(id);
    }
}

#[async_trait]
impl ReportQueue for MemoryQueue {
    async fn list_pending_reports(&self) -> Result<Vec<PendingReport>, StorageError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .reports
            .lock()
            .expect("reports lock")
            .values()
            .cloned()
            .collect())
    }

    async fn delete_report(&self, id: i64) -> Result<bool, StorageError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_deletes.lock().expect("lock").contains(&id) {
            return Err(StorageError::Worker(format!("scripted delete failure for {id}")));
        }
        let mut reports = self.reports.lock().expect("reports lock");
        if self.vanishing.lock().expect("lock").remove(&id) {
            reports.remove(&id);
            return Ok(false);
        }
        Ok(reports.remove(&id).is_some())
    }
}

pub(crate) enum StaticCredential {
    Present(Option<String>),
    Broken,
}

impl StaticCredential {
    pub(crate) fn none() -> Self {
        Self::Present(None)
    }

    pub(crate) fn token(token: &str) -> Self {
        Self::Present(Some(token.to_string()))
    }

    pub(crate) fn broken() -> Self {
        Self::Broken
    }
}

#[async_trait]
impl CredentialProvider for StaticCredential {
    async fn credential(&self) -> Result<Option<String>, StorageError> {
        match self {
            Self::Present(token) => Ok(token.clone()),
            Self::Broken => Err(StorageError::Worker("scripted credential failure".to_string())),
        }
    }
}

/// Answers each delivery with a status chosen by report title.
pub(crate) struct ScriptedDelivery {
    by_title: HashMap<String, u16>,
    default_status: Option<u16>,
    calls: Mutex<Vec<(DeliveryRequest, String)>>,
}

impl ScriptedDelivery {
    pub(crate) fn always(status: u16) -> Self {
        Self::by_title(&[], status)
    }

    pub(crate) fn by_title(statuses: &[(&str, u16)], default_status: u16) -> Self {
        Self {
            by_title: statuses
                .iter()
                .map(|(title, status)| (title.to_string(), *status))
                .collect(),
            default_status: Some(default_status),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn offline() -> Self {
        Self {
            by_title: HashMap::new(),
            default_status: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().expect("calls lock").len()
    }

    pub(crate) fn titles(&self) -> Vec<String> {
        self.calls
            .lock()
            .expect("calls lock")
            .iter()
            .map(|(request, _)| request.title.clone())
            .collect()
    }

    pub(crate) fn tokens(&self) -> Vec<String> {
        self.calls
            .lock()
            .expect("calls lock")
            .iter()
            .map(|(_, token)| token.clone())
            .collect()
    }
}

#[async_trait]
impl ReportDelivery for ScriptedDelivery {
    async fn deliver(
        &self,
        request: &DeliveryRequest,
        token: &str,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        self.calls
            .lock()
            .expect("calls lock")
            .push((request.clone(), token.to_string()));

        let status = self
            .by_title
            .get(&request.title)
            .copied()
            .or(self.default_status);
        match status {
            Some(status) if (200..300).contains(&status) => Ok(DeliveryReceipt { status }),
            Some(status) => Err(DeliveryError::Status {
                status,
                body: "scripted failure".to_string(),
            }),
            None => Err(DeliveryError::Transport("network unreachable".to_string())),
        }
    }
}
