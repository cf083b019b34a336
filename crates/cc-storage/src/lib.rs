use cc_core::{GeoPoint, NewReport, PendingReport, ReportCategory, ReportValidationError};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

mod handle;
mod migrations;

pub use handle::QueueHandle;
pub use migrations::{Migration, LATEST_SCHEMA_VERSION, MIGRATIONS};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("report store unavailable at {path}: {reason}")]
    Unavailable { path: String, reason: String },
    #[error("persistence error during {operation}: {source}")]
    Persistence {
        operation: &'static str,
        #[source]
        source: rusqlite::Error,
    },
    #[error("invalid report: {0}")]
    InvalidReport(#[from] ReportValidationError),
    #[error("credential token must not be blank")]
    InvalidCredential,
    #[error("unsupported schema version {found}, max supported {supported}")]
    UnsupportedSchemaVersion { found: i64, supported: i64 },
    #[error("storage worker failed: {0}")]
    Worker(String),
}

pub(crate) fn persistence(operation: &'static str) -> impl FnOnce(rusqlite::Error) -> StorageError {
    move |source| StorageError::Persistence { operation, source }
}

fn unavailable(path: &Path, reason: impl ToString) -> StorageError {
    StorageError::Unavailable {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

/// Whether queued reports survive a restart of the process that owns them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Durability {
    Durable,
    Ephemeral,
}

/// Durable queue of complaint submissions plus the single cached credential.
///
/// Every operation touches one row and is atomic on its own; two stores opened
/// on the same file may be used from different processes at the same time.
#[derive(Debug)]
pub struct ReportStore {
    conn: Connection,
    durability: Durability,
}

impl ReportStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|err| unavailable(path, err))?;
        Self::initialize(conn, Durability::Durable).map_err(|err| match err {
            StorageError::Persistence { source, .. } => unavailable(path, source),
            other => other,
        })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory().map_err(persistence("open_in_memory"))?;
        Self::initialize(conn, Durability::Ephemeral)
    }

    /// Opens the store at `path`, degrading to an in-memory store when the
    /// host refuses persistent storage. Check [`ReportStore::durability`] to
    /// warn the user that offline submissions will not survive a restart.
    pub fn open_or_in_memory(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        match Self::open(path) {
            Ok(store) => Ok(store),
            Err(StorageError::Unavailable { path, reason }) => {
                warn!(
                    event = "store_unavailable",
                    path = %path,
                    reason = %reason,
                    fallback = "in_memory"
                );
                Self::open_in_memory()
            }
            Err(err) => Err(err),
        }
    }

    fn initialize(conn: Connection, durability: Durability) -> Result<Self, StorageError> {
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(persistence("configure_busy_timeout"))?;
        let store = Self { conn, durability };
        store.migrate()?;
        Ok(store)
    }

    pub fn durability(&self) -> Durability {
        self.durability
    }

    pub fn schema_version(&self) -> Result<i64, StorageError> {
        migrations::schema_version(&self.conn)
    }

    pub fn migrate(&self) -> Result<(), StorageError> {
        migrations::apply(&self.conn, LATEST_SCHEMA_VERSION).map(|_| ())
    }

    /// Inserts a report and returns it as stored, including the assigned id
    /// and idempotency key.
    pub fn enqueue_report(&self, report: &NewReport) -> Result<PendingReport, StorageError> {
        report.validate()?;

        let idempotency_key = cc_core::new_idempotency_key();
        let created_at = Utc::now();
        let subcategory = report.normalized_subcategory();

        self.conn
            .execute(
                "
                INSERT INTO pending_reports (
                    title,
                    description,
                    category,
                    subcategory,
                    latitude,
                    longitude,
                    idempotency_key,
                    created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ",
                params![
                    report.title,
                    report.description,
                    report.category.map(|category| category.as_str()),
                    subcategory,
                    report.location.map(|point| point.latitude),
                    report.location.map(|point| point.longitude),
                    idempotency_key,
                    created_at.to_rfc3339(),
                ],
            )
            .map_err(persistence("enqueue_report"))?;

        Ok(PendingReport {
            id: self.conn.last_insert_rowid(),
            title: report.title.clone(),
            description: report.description.clone(),
            category: report.category,
            subcategory,
            location: report.location,
            idempotency_key,
            created_at,
        })
    }

    pub fn list_pending_reports(&self) -> Result<Vec<PendingReport>, StorageError> {
        let mut stmt = self
            .conn
            .prepare(
                "
                SELECT id, title, description, category, subcategory, latitude, longitude,
                       idempotency_key, created_at
                FROM pending_reports
                ORDER BY id ASC
                ",
            )
            .map_err(persistence("list_pending_reports"))?;
        let mut rows = stmt
            .query([])
            .map_err(persistence("list_pending_reports"))?;

        // A row that no longer decodes stays on disk but must not hold back
        // the rest of the queue.
        let mut reports = Vec::new();
        while let Some(row) = rows.next().map_err(persistence("list_pending_reports"))? {
            match pending_report_from_row(row) {
                Ok(report) => reports.push(report),
                Err(
                    err @ (rusqlite::Error::FromSqlConversionFailure(..)
                    | rusqlite::Error::InvalidColumnType(..)),
                ) => {
                    let report_id = row.get::<_, i64>(0).ok();
                    warn!(
                        event = "pending_report_undecodable",
                        report_id = ?report_id,
                        error = %err
                    );
                }
                Err(err) => return Err(persistence("list_pending_reports")(err)),
            }
        }
        Ok(reports)
    }

    pub fn pending_report(&self, id: i64) -> Result<Option<PendingReport>, StorageError> {
        self.conn
            .query_row(
                "
                SELECT id, title, description, category, subcategory, latitude, longitude,
                       idempotency_key, created_at
                FROM pending_reports
                WHERE id = ?1
                ",
                [id],
                pending_report_from_row,
            )
            .optional()
            .map_err(persistence("pending_report"))
    }

    pub fn pending_count(&self) -> Result<u64, StorageError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM pending_reports", [], |row| row.get(0))
            .map_err(persistence("pending_count"))?;
        Ok(count.max(0) as u64)
    }

    /// Removes the report if it is still queued. Returns `false` when another
    /// cycle (or an explicit cleanup) already removed it.
    pub fn delete_report(&self, id: i64) -> Result<bool, StorageError> {
        let changes = self
            .conn
            .execute("DELETE FROM pending_reports WHERE id = ?1", [id])
            .map_err(persistence("delete_report"))?;
        Ok(changes > 0)
    }

    pub fn set_credential(&self, token: &str) -> Result<(), StorageError> {
        if token.trim().is_empty() {
            return Err(StorageError::InvalidCredential);
        }

        self.conn
            .execute(
                "
                INSERT INTO auth_token_store (id, value, updated_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(id) DO UPDATE SET
                    value=excluded.value,
                    updated_at=excluded.updated_at
                ",
                params![cc_core::CREDENTIAL_KEY, token, Utc::now().to_rfc3339()],
            )
            .map_err(persistence("set_credential"))?;
        Ok(())
    }

    pub fn get_credential(&self) -> Result<Option<String>, StorageError> {
        self.conn
            .query_row(
                "SELECT value FROM auth_token_store WHERE id = ?1",
                [cc_core::CREDENTIAL_KEY],
                |row| row.get(0),
            )
            .optional()
            .map_err(persistence("get_credential"))
    }

    pub fn clear_credential(&self) -> Result<bool, StorageError> {
        let changes = self
            .conn
            .execute(
                "DELETE FROM auth_token_store WHERE id = ?1",
                [cc_core::CREDENTIAL_KEY],
            )
            .map_err(persistence("clear_credential"))?;
        Ok(changes > 0)
    }

    pub fn table_exists(&self, table_name: &str) -> Result<bool, StorageError> {
        let exists = self
            .conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table_name],
                |_| Ok(()),
            )
            .optional()
            .map_err(persistence("table_exists"))?;
        Ok(exists.is_some())
    }
}

fn pending_report_from_row(row: &Row<'_>) -> rusqlite::Result<PendingReport> {
    let category = row
        .get::<_, Option<String>>(3)?
        .map(|value| value.parse::<ReportCategory>())
        .transpose()
        .map_err(|err| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(err))
        })?;

    let latitude: Option<f64> = row.get(5)?;
    let longitude: Option<f64> = row.get(6)?;
    let location = match (latitude, longitude) {
        (Some(latitude), Some(longitude)) => Some(GeoPoint {
            latitude,
            longitude,
        }),
        _ => None,
    };

    let created_at = parse_timestamp(&row.get::<_, String>(8)?).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(err))
    })?;

    Ok(PendingReport {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        category,
        subcategory: row.get(4)?,
        location,
        idempotency_key: row.get(7)?,
        created_at,
    })
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(value).map(|timestamp| timestamp.with_timezone(&Utc))
}
