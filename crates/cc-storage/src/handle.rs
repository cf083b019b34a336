use std::sync::{Arc, Mutex};

use cc_core::{NewReport, PendingReport};

use crate::{Durability, ReportStore, StorageError};

/// Cloneable async front for a [`ReportStore`].
///
/// SQLite calls block, so every operation runs on tokio's blocking pool and
/// the async caller only suspends until it completes.
#[derive(Clone, Debug)]
pub struct QueueHandle {
    store: Arc<Mutex<ReportStore>>,
    durability: Durability,
}

impl QueueHandle {
    pub fn new(store: ReportStore) -> Self {
        let durability = store.durability();
        Self {
            store: Arc::new(Mutex::new(store)),
            durability,
        }
    }

    pub fn durability(&self) -> Durability {
        self.durability
    }

    async fn with_store<T, F>(&self, op: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&ReportStore) -> Result<T, StorageError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || {
            let guard = store
                .lock()
                .map_err(|_| StorageError::Worker("report store lock poisoned".to_string()))?;
            op(&guard)
        })
        .await
        .map_err(|err| StorageError::Worker(format!("blocking task failed: {err}")))?
    }

    pub async fn enqueue_report(&self, report: NewReport) -> Result<PendingReport, StorageError> {
        self.with_store(move |store| store.enqueue_report(&report))
            .await
    }

    pub async fn list_pending_reports(&self) -> Result<Vec<PendingReport>, StorageError> {
        self.with_store(|store| store.list_pending_reports()).await
    }

    pub async fn pending_count(&self) -> Result<u64, StorageError> {
        self.with_store(|store| store.pending_count()).await
    }

    pub async fn delete_report(&self, id: i64) -> Result<bool, StorageError> {
        self.with_store(move |store| store.delete_report(id)).await
    }

    pub async fn set_credential(&self, token: impl Into<String>) -> Result<(), StorageError> {
        let token = token.into();
        self.with_store(move |store| store.set_credential(&token))
            .await
    }

    pub async fn get_credential(&self) -> Result<Option<String>, StorageError> {
        self.with_store(|store| store.get_credential()).await
    }

    pub async fn clear_credential(&self) -> Result<bool, StorageError> {
        self.with_store(|store| store.clear_credential()).await
    }
}
