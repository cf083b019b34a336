use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing::debug;

use crate::{persistence, StorageError};

pub const LATEST_SCHEMA_VERSION: i64 = 2;

/// One forward step of the on-disk layout. Steps run in ascending `version`
/// order and each one commits together with its `user_version` bump.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    sql: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "pending_reports",
        sql: include_str!("../migrations/0001_pending_reports.sql"),
    },
    Migration {
        version: 2,
        name: "report_metadata",
        sql: include_str!("../migrations/0002_report_metadata.sql"),
    },
];

pub(crate) fn schema_version(conn: &Connection) -> Result<i64, StorageError> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(persistence("read_schema_version"))
}

/// Brings the database up to `target`, returning the version it ends at.
///
/// Each step takes the write lock up front and re-reads `user_version` under
/// it, so connections racing to initialize the same file apply every step
/// exactly once.
pub(crate) fn apply(conn: &Connection, target: i64) -> Result<i64, StorageError> {
    let mut current = ensure_supported(schema_version(conn)?)?;

    for migration in MIGRATIONS
        .iter()
        .filter(|migration| migration.version <= target)
    {
        if migration.version <= current {
            continue;
        }

        let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)
            .map_err(persistence("begin_migration"))?;
        let found = ensure_supported(schema_version(&tx)?)?;
        if found >= migration.version {
            debug!(
                event = "schema_migration_skipped",
                version = migration.version,
                found
            );
            current = found;
            continue;
        }

        tx.execute_batch(migration.sql)
            .map_err(persistence("apply_migration"))?;
        tx.pragma_update(None, "user_version", migration.version)
            .map_err(persistence("bump_schema_version"))?;
        tx.commit().map_err(persistence("commit_migration"))?;

        debug!(
            event = "schema_migrated",
            from = found,
            to = migration.version,
            name = migration.name
        );
        current = migration.version;
    }

    Ok(current)
}

fn ensure_supported(version: i64) -> Result<i64, StorageError> {
    if version > LATEST_SCHEMA_VERSION {
        return Err(StorageError::UnsupportedSchemaVersion {
            found: version,
            supported: LATEST_SCHEMA_VERSION,
        });
    }
    Ok(version)
}
