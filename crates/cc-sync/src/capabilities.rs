use std::sync::Arc;

use async_trait::async_trait;
use cc_core::{DeliveryError, DeliveryReceipt, DeliveryRequest, PendingReport};
use cc_storage::{QueueHandle, StorageError};

/// Read/delete access to the queued reports. The sync worker never inserts.
#[async_trait]
pub trait ReportQueue: Send + Sync {
    async fn list_pending_reports(&self) -> Result<Vec<PendingReport>, StorageError>;

    async fn delete_report(&self, id: i64) -> Result<bool, StorageError>;
}

/// Read-only access to the cached session token.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn credential(&self) -> Result<Option<String>, StorageError>;
}

/// Submits one report to the remote complaint endpoint.
#[async_trait]
pub trait ReportDelivery: Send + Sync {
    async fn deliver(
        &self,
        request: &DeliveryRequest,
        token: &str,
    ) -> Result<DeliveryReceipt, DeliveryError>;
}

#[async_trait]
impl ReportQueue for QueueHandle {
    async fn list_pending_reports(&self) -> Result<Vec<PendingReport>, StorageError> {
        QueueHandle::list_pending_reports(self).await
    }

    async fn delete_report(&self, id: i64) -> Result<bool, StorageError> {
        QueueHandle::delete_report(self, id).await
    }
}

#[async_trait]
impl CredentialProvider for QueueHandle {
    async fn credential(&self) -> Result<Option<String>, StorageError> {
        self.get_credential().await
    }
}

#[async_trait]
impl<T: ReportQueue + ?Sized> ReportQueue for Arc<T> {
    async fn list_pending_reports(&self) -> Result<Vec<PendingReport>, StorageError> {
        (**self).list_pending_reports().await
    }

    async fn delete_report(&self, id: i64) -> Result<bool, StorageError> {
        (**self).delete_report(id).await
    }
}

#[async_trait]
impl<T: CredentialProvider + ?Sized> CredentialProvider for Arc<T> {
    async fn credential(&self) -> Result<Option<String>, StorageError> {
        (**self).credential().await
    }
}

#[async_trait]
impl<T: ReportDelivery + ?Sized> ReportDelivery for Arc<T> {
    async fn deliver(
        &self,
        request: &DeliveryRequest,
        token: &str,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        (**self).deliver(request, token).await
    }
}
