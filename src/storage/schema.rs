//! Telemetry store schema and migrations.
//!
//! Five bucket tables (raw, hour, day, month, year) plus a `metadata` table of
//! per-stage watermarks. Migrations are applied in order inside a transaction
//! and recorded in `schema_migrations`.

use rusqlite::Connection;

use crate::error::{PvError, Result};

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sql: include_str!("../../migrations/001_raw_samples.sql"),
    },
    Migration {
        version: 2,
        sql: include_str!("../../migrations/002_buckets.sql"),
    },
];

/// Latest schema version this build knows about.
pub const SCHEMA_VERSION: i32 = 2;

/// Tables a caller may count or inspect.
pub const TABLES: &[&str] = &[
    "raw_samples",
    "hour_buckets",
    "day_buckets",
    "month_buckets",
    "year_buckets",
    "metadata",
];

/// Run schema migrations.
///
/// Returns the latest schema version applied.
///
/// # Errors
/// Returns an error if creating the migrations table, reading the schema version,
/// or applying any migration fails.
pub fn run_migrations(conn: &mut Connection) -> Result<i32> {
    ensure_schema_migrations_table(conn)?;

    let mut current_version = get_schema_version(conn)?;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            apply_migration(conn, migration)?;
            current_version = migration.version;
        }
    }

    Ok(current_version)
}

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: i32,
    sql: &'static str,
}

fn ensure_schema_migrations_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (\
            version INTEGER PRIMARY KEY,\
            applied_at TEXT DEFAULT (datetime('now'))\
        );",
    )
    .map_err(|e| PvError::Store(format!("create schema_migrations: {e}")))?;

    Ok(())
}

fn get_schema_version(conn: &Connection) -> Result<i32> {
    let version: Option<i32> = conn
        .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
            row.get(0)
        })
        .map_err(|e| PvError::Store(format!("read schema version: {e}")))?;

    Ok(version.unwrap_or(0))
}

fn apply_migration(conn: &mut Connection, migration: &Migration) -> Result<()> {
    let tx = conn
        .transaction()
        .map_err(|e| PvError::Store(format!("begin migration: {e}")))?;

    tx.execute_batch(migration.sql)
        .map_err(|e| PvError::Store(format!("apply migration {}: {e}", migration.version)))?;

    tx.execute(
        "INSERT INTO schema_migrations (version) VALUES (?1)",
        [migration.version],
    )
    .map_err(|e| PvError::Store(format!("record migration {}: {e}", migration.version)))?;

    tx.commit()
        .map_err(|e| PvError::Store(format!("commit migration {}: {e}", migration.version)))?;

    tracing::debug!(version = migration.version, "Applied schema migration");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_in_memory() -> Connection {
        Connection::open_in_memory().expect("open in-memory db")
    }

    #[test]
    fn migrations_create_every_table() {
        let mut conn = open_in_memory();
        let version = run_migrations(&mut conn).expect("run migrations");
        assert_eq!(version, SCHEMA_VERSION);

        for table in TABLES {
            let exists: i32 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .expect("query table existence");
            assert_eq!(exists, 1, "missing table {table}");
        }
    }

    #[test]
    fn migrations_are_idempotent() {
        let mut conn = open_in_memory();
        let first = run_migrations(&mut conn).expect("first run");
        let second = run_migrations(&mut conn).expect("second run");
        assert_eq!(first, second);

        let count: i32 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .expect("count migrations");
        assert_eq!(count, SCHEMA_VERSION);
    }

    #[test]
    fn natural_keys_reject_duplicates_without_upsert() {
        let mut conn = open_in_memory();
        run_migrations(&mut conn).expect("migrations");

        let insert = "INSERT INTO hour_buckets \
            (start_timestamp, energy_delta_wh, power_avg_w, power_max_w, power_min_w, sample_count) \
            VALUES (3600, 1.0, 1.0, 1.0, 1.0, 1)";
        conn.execute(insert, []).expect("first insert");
        assert!(conn.execute(insert, []).is_err());
    }
}
