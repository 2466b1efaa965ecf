//! Database connection and initialization

use crate::{encryption::EncryptionKey, migrations, Error, Result};
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::time::Duration;

/// How long SQLite itself waits on a locked database before reporting busy
const BUSY_TIMEOUT: Duration = Duration::from_millis(250);

/// Database connection wrapper
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) an SQLCipher database with a raw 256-bit key
    pub fn open<P: AsRef<Path>>(path: P, key: &EncryptionKey) -> Result<Self> {
        let path = path.as_ref();
        let db_exists = path.exists() && std::fs::metadata(path)?.len() > 0;

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        // PRAGMA key must be the first statement on the connection, otherwise
        // SQLCipher creates the file unencrypted.
        let key_hex = key.pragma_hex();
        conn.execute_batch(&format!("PRAGMA key = \"x'{}'\";", key_hex.as_str()))
            .map_err(|e| Error::Encryption(format!("Failed to set database key: {}", e)))?;

        let cipher_version: std::result::Result<String, rusqlite::Error> =
            conn.query_row("PRAGMA cipher_version", [], |row| row.get(0));
        match cipher_version {
            Ok(version) if !version.is_empty() => {
                tracing::debug!("SQLCipher version: {}", version);
            }
            _ => {
                return Err(Error::StorageUnavailable(
                    "SQLCipher not available; refusing to store credentials unencrypted"
                        .to_string(),
                ));
            }
        }

        if db_exists {
            let readable: std::result::Result<i64, rusqlite::Error> =
                conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| row.get(0));
            if let Err(e) = readable {
                tracing::warn!("Encrypted preferences could not be read: {}", e);
                return Err(Error::StorageUnavailable(
                    "cannot read encrypted database (wrong key or corrupted file)".to_string(),
                ));
            }
        }

        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        migrations::run_migrations(&conn)?;

        Ok(Self { conn })
    }

    /// Get connection
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Begin a transaction that takes the write lock up front
    pub fn immediate_transaction(&mut self) -> Result<rusqlite::Transaction<'_>> {
        Ok(self
            .conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_database() {
        let dir = tempdir().unwrap();
        let key = EncryptionKey::generate();
        assert!(Database::open(dir.path().join("prefs.db"), &key).is_ok());
    }

    #[test]
    fn test_reopen_with_same_key() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prefs.db");
        let key = EncryptionKey::from_bytes([0x42; 32]);

        let db = Database::open(&path, &key).unwrap();
        db.conn()
            .execute(
                "INSERT INTO secure_prefs (region, key, value, updated_at) VALUES ('r', 'k', 'v', 0)",
                [],
            )
            .unwrap();
        drop(db);

        let db = Database::open(&path, &key).unwrap();
        let value: String = db
            .conn()
            .query_row(
                "SELECT value FROM secure_prefs WHERE region = 'r' AND key = 'k'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(value, "v");
    }

    #[test]
    fn test_wrong_database_key_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prefs.db");

        let db = Database::open(&path, &EncryptionKey::generate()).unwrap();
        drop(db);

        let result = Database::open(&path, &EncryptionKey::generate());
        assert!(matches!(result, Err(Error::StorageUnavailable(_))));
    }

    #[test]
    fn test_database_file_is_encrypted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prefs.db");
        let key = EncryptionKey::generate();

        let db = Database::open(&path, &key).unwrap();
        db.conn()
            .execute(
                "INSERT INTO secure_prefs (region, key, value, updated_at) VALUES ('r', 'password_salt', 'plaintext-marker', 0)",
                [],
            )
            .unwrap();
        // Fold the WAL back so the row lands in the main file
        db.conn()
            .execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
            .unwrap();
        drop(db);

        let contents = std::fs::read(&path).unwrap();
        let text = String::from_utf8_lossy(&contents);
        assert!(!text.contains("plaintext-marker"));
        assert!(!text.contains("password_salt"));
        assert!(!text.contains("SQLite format 3"));
    }
}
