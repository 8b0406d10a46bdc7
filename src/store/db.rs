// Privacy Guard — SQLite Database Management
//
// One database handle per process, shared behind an Arc. The connection is
// opened lazily on first use; opening, preparing, binding and stepping all
// happen under a single mutex so concurrent handlers never interleave
// statements.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::Connection;

use super::StoreError;

#[derive(Debug, Clone)]
enum Location {
    File(PathBuf),
    Memory,
}

/// Lazily opened, mutex-guarded SQLite connection.
pub struct Database {
    location: Location,
    conn: Mutex<Option<Connection>>,
}

impl Database {
    /// Describe a database at `path` without opening it yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            location: Location::File(path.into()),
            conn: Mutex::new(None),
        }
    }

    /// Open (or create) the database at `path` right away, running migrations.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let db = Self::new(path);
        db.with_conn(|_| Ok(()))?;
        Ok(db)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let db = Self {
            location: Location::Memory,
            conn: Mutex::new(None),
        };
        db.with_conn(|_| Ok(()))?;
        Ok(db)
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.location {
            Location::File(path) => Some(path),
            Location::Memory => None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.conn.lock().map(|c| c.is_some()).unwrap_or(false)
    }

    /// Run `f` against the connection while holding the database lock,
    /// opening the connection first if needed. The lock is released when
    /// `f` returns, on success or failure.
    pub fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        let mut guard = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        if guard.is_none() {
            *guard = Some(self.connect()?);
        }
        match guard.as_ref() {
            Some(conn) => f(conn),
            None => Err(StoreError::Poisoned),
        }
    }

    /// Like `with_conn`, inside a transaction committed when `f` succeeds.
    pub fn with_transaction<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&rusqlite::Transaction<'_>) -> Result<T, StoreError>,
    {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let out = f(&tx)?;
            tx.commit()?;
            Ok(out)
        })
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        let conn = match &self.location {
            Location::File(path) => {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                Connection::open(path).map_err(|source| StoreError::Open {
                    path: path.display().to_string(),
                    source,
                })?
            }
            Location::Memory => Connection::open_in_memory()?,
        };
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        run_migrations(&conn)?;
        tracing::debug!(location = ?self.location, "Database opened");
        Ok(conn)
    }
}

/// Create tables and indexes if missing.
fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS monitor_policy (
            user_id         INTEGER NOT NULL,
            pkg_id          TEXT NOT NULL,
            privacy_id      TEXT NOT NULL,
            monitor_policy  INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (user_id, pkg_id, privacy_id)
        );

        CREATE TABLE IF NOT EXISTS main_monitor_policy (
            user_id             INTEGER PRIMARY KEY,
            main_monitor_policy INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS access_log (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id     INTEGER NOT NULL,
            pkg_id      TEXT NOT NULL,
            privacy_id  TEXT NOT NULL,
            use_date    INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_access_log_user_date
            ON access_log(user_id, use_date);

        CREATE INDEX IF NOT EXISTS idx_access_log_pkg
            ON access_log(pkg_id);
        ",
    )?;

    tracing::debug!("Database migrations completed successfully");
    Ok(())
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn table_exists(db: &Database, name: &str) -> bool {
        db.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT count(*) FROM sqlite_master WHERE type='table' AND name=?1",
                [name],
                |row| row.get(0),
            )?;
            Ok(count == 1)
        })
        .unwrap()
    }

    #[test]
    fn test_open_in_memory_succeeds() {
        let db = Database::open_in_memory();
        assert!(db.is_ok(), "Should be able to open an in-memory database");
    }

    #[test]
    fn test_schema_migration_creates_tables() {
        let db = Database::open_in_memory().unwrap();
        assert!(table_exists(&db, "monitor_policy"));
        assert!(table_exists(&db, "main_monitor_policy"));
        assert!(table_exists(&db, "access_log"));
    }

    #[test]
    fn test_schema_migration_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let result = db.with_conn(run_migrations);
        assert!(result.is_ok(), "Migrations should be idempotent");
    }

    #[test]
    fn test_new_is_lazy_until_first_use() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("guard.db");
        let db = Database::new(&path);
        assert!(!db.is_open());
        assert!(!path.exists());

        db.with_conn(|_| Ok(())).unwrap();
        assert!(db.is_open());
        assert!(path.exists(), "First use should create the file and its directory");
    }

    #[test]
    fn test_failed_closure_releases_lock() {
        let db = Database::open_in_memory().unwrap();
        let err = db.with_conn(|conn| {
            conn.execute("INSERT INTO no_such_table VALUES (1)", [])?;
            Ok(())
        });
        assert!(err.is_err());
        // A second call would deadlock if the guard leaked.
        assert!(db.with_conn(|_| Ok(())).is_ok());
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let db = Database::open_in_memory().unwrap();
        let result: Result<(), StoreError> = db.with_transaction(|tx| {
            tx.execute(
                "INSERT INTO main_monitor_policy (user_id, main_monitor_policy) VALUES (1, 1)",
                [],
            )?;
            Err(StoreError::InvalidValue("abort".to_string()))
        });
        assert!(result.is_err());

        let count: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT count(*) FROM main_monitor_policy", [], |row| {
                    row.get(0)
                })?)
            })
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_file_database_persists_across_handles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guard.db");
        {
            let db = Database::open(&path).unwrap();
            db.with_conn(|conn| {
                conn.execute(
                    "INSERT INTO main_monitor_policy (user_id, main_monitor_policy) VALUES (7, 1)",
                    [],
                )?;
                Ok(())
            })
            .unwrap();
        }
        let db = Database::open(&path).unwrap();
        let flag: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT main_monitor_policy FROM main_monitor_policy WHERE user_id = 7",
                    [],
                    |row| row.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(flag, 1);
    }
}
