//! Database schema migrations
//!
//! The schema version lives in `PRAGMA user_version`. Each step runs in its
//! own transaction together with the version bump.

use crate::{Error, Result};
use rusqlite::Connection;

/// Ordered schema steps; entry `i` upgrades version `i` to `i + 1`
const MIGRATIONS: &[&str] = &[
    // v1: one key-value table, partitioned by named region
    r#"
    CREATE TABLE IF NOT EXISTS secure_prefs (
        region TEXT NOT NULL,
        key TEXT NOT NULL,
        value TEXT NOT NULL,
        updated_at INTEGER NOT NULL,
        PRIMARY KEY (region, key)
    );
    "#,
];

/// Version a fully migrated database reports
pub const SCHEMA_VERSION: i32 = MIGRATIONS.len() as i32;

/// Bring the schema up to [`SCHEMA_VERSION`]
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let from = get_schema_version(conn)?;
    if from > SCHEMA_VERSION {
        return Err(Error::Migration(format!(
            "database schema {} is newer than supported {}",
            from, SCHEMA_VERSION
        )));
    }

    for (index, sql) in MIGRATIONS.iter().enumerate().skip(from as usize) {
        let target = index as i32 + 1;
        tracing::debug!("Applying schema migration v{}", target);
        conn.execute_batch(&format!(
            "BEGIN; {} PRAGMA user_version = {}; COMMIT;",
            sql, target
        ))
        .map_err(|e| {
            let _ = conn.execute_batch("ROLLBACK;");
            Error::Migration(format!("v{}: {}", target, e))
        })?;
    }

    Ok(())
}

/// Current schema version, 0 for a fresh database
pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_database_migrates_to_current() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), 0);

        run_migrations(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);

        // Idempotent
        run_migrations(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'secure_prefs'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 1);
    }

    #[test]
    fn test_newer_schema_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1)
            .unwrap();
        assert!(matches!(run_migrations(&conn), Err(Error::Migration(_))));
    }
}
