pub mod delivery;
pub mod report;

pub use delivery::{DeliveryError, DeliveryReceipt, DeliveryRequest};
pub use report::{GeoPoint, NewReport, PendingReport, ReportCategory, ReportValidationError};

/// Tag the page layer registers when a report is queued while offline.
pub const SYNC_TAG_NEW_REPORTS: &str = "sync-new-reports";

/// Fixed key of the single cached credential row.
pub const CREDENTIAL_KEY: &str = "authToken";

pub const DATABASE_FILE_NAME: &str = "citizen-connect.db";

/// Fresh client-side reference used by the remote endpoint to deduplicate
/// repeated deliveries of the same queued report.
pub fn new_idempotency_key() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub fn is_sync_tag(tag: &str) -> bool {
    tag.trim() == SYNC_TAG_NEW_REPORTS
}
