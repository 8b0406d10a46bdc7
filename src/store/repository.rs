// Privacy Guard — Policy Store Repository
//
// CRUD and reporting operations over the monitor policy, main policy and
// access log tables. Policy writes are upserts keyed on
// (user, package, category), so the last completed write wins.

use std::sync::Arc;

use rusqlite::{params, OptionalExtension};

use super::db::Database;
use super::models::{AccessLogEntry, DateRange, MonitorPolicy, UsageCount};
use super::StoreError;

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over policy and access-log storage.
pub trait PolicyStore: Send + Sync {
    /// Append one access record. The timestamp must be positive.
    fn add_access_log(&self, entry: &AccessLogEntry) -> Result<(), StoreError>;

    /// Append a batch of (package, category) accesses for one user, all
    /// stamped with `timestamp`, in a single transaction.
    fn add_access_logs(
        &self,
        user_id: i32,
        accesses: &[(String, String)],
        timestamp: i64,
    ) -> Result<(), StoreError>;

    /// Upsert one row per category for `package_id`.
    fn add_monitor_policy(
        &self,
        user_id: i32,
        package_id: &str,
        privacy_ids: &[String],
        monitor_policy: i32,
    ) -> Result<(), StoreError>;

    /// Whether any policy row exists for the package.
    fn check_privacy_package(&self, user_id: i32, package_id: &str) -> Result<bool, StoreError>;

    /// Delete every log, policy and main-policy row.
    fn delete_all_logs_and_policies(&self) -> Result<(), StoreError>;

    /// Returns the number of rows removed.
    fn delete_logs_by_package(&self, package_id: &str) -> Result<usize, StoreError>;

    /// Returns the number of rows removed.
    fn delete_monitor_policy_by_package(&self, package_id: &str) -> Result<usize, StoreError>;

    /// Access counts per package inside `range`.
    fn count_by_package(&self, user_id: i32, range: DateRange) -> Result<Vec<UsageCount>, StoreError>;

    /// Access counts per category inside `range`.
    fn count_by_privacy(&self, user_id: i32, range: DateRange) -> Result<Vec<UsageCount>, StoreError>;

    /// Per-package counts for one category.
    fn count_packages_for_privacy(
        &self,
        user_id: i32,
        range: DateRange,
        privacy_id: &str,
    ) -> Result<Vec<UsageCount>, StoreError>;

    /// Per-category counts for one package.
    fn count_privacies_for_package(
        &self,
        user_id: i32,
        range: DateRange,
        package_id: &str,
    ) -> Result<Vec<UsageCount>, StoreError>;

    /// Distinct packages that have policy rows.
    fn package_ids(&self, user_id: i32) -> Result<Vec<String>, StoreError>;

    /// Distinct packages with a policy row for `privacy_id`.
    fn packages_by_privacy(&self, user_id: i32, privacy_id: &str) -> Result<Vec<String>, StoreError>;

    fn policies_for_package(&self, user_id: i32, package_id: &str) -> Result<Vec<MonitorPolicy>, StoreError>;

    /// Monitor flag for one key, 0 when no row exists.
    fn get_monitor_policy(&self, user_id: i32, package_id: &str, privacy_id: &str) -> Result<i32, StoreError>;

    fn all_monitor_policies(&self) -> Result<Vec<MonitorPolicy>, StoreError>;

    /// Returns whether a row was changed. Missing rows are not created.
    fn update_monitor_policy(
        &self,
        user_id: i32,
        package_id: &str,
        privacy_id: &str,
        monitor_policy: i32,
    ) -> Result<bool, StoreError>;

    fn update_main_monitor_policy(&self, user_id: i32, enabled: bool) -> Result<(), StoreError>;

    /// Reads the main flag, inserting a default (off) row if the user has none.
    fn get_main_monitor_policy(&self, user_id: i32) -> Result<bool, StoreError>;

    /// Returns whether a row existed.
    fn delete_main_monitor_policy(&self, user_id: i32) -> Result<bool, StoreError>;
}

// ─── SQLite Implementation ──────────────────────────────────────────────────

#[derive(Clone)]
pub struct SqlitePolicyStore {
    db: Arc<Database>,
}

impl SqlitePolicyStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    fn row_to_policy(row: &rusqlite::Row<'_>) -> rusqlite::Result<MonitorPolicy> {
        Ok(MonitorPolicy {
            user_id: row.get(0)?,
            package_id: row.get(1)?,
            privacy_id: row.get(2)?,
            monitor_policy: row.get(3)?,
        })
    }

    fn row_to_count(row: &rusqlite::Row<'_>) -> rusqlite::Result<UsageCount> {
        Ok(UsageCount {
            name: row.get(0)?,
            count: row.get(1)?,
        })
    }

    fn query_counts(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<UsageCount>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(sql)?;
            let rows = stmt
                .query_map(args, Self::row_to_count)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    fn query_strings(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<String>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(sql)?;
            let rows = stmt
                .query_map(args, |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(rows)
        })
    }
}

impl PolicyStore for SqlitePolicyStore {
    fn add_access_log(&self, entry: &AccessLogEntry) -> Result<(), StoreError> {
        if entry.timestamp <= 0 {
            return Err(StoreError::InvalidValue(format!(
                "timestamp must be positive, got {}",
                entry.timestamp
            )));
        }
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "INSERT INTO access_log (user_id, pkg_id, privacy_id, use_date)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            stmt.execute(params![
                entry.user_id,
                entry.package_id,
                entry.privacy_id,
                entry.timestamp
            ])?;
            Ok(())
        })?;

        tracing::debug!(
            user_id = entry.user_id,
            package = %entry.package_id,
            privacy = %entry.privacy_id,
            "Access logged"
        );
        Ok(())
    }

    fn add_access_logs(
        &self,
        user_id: i32,
        accesses: &[(String, String)],
        timestamp: i64,
    ) -> Result<(), StoreError> {
        if timestamp <= 0 {
            return Err(StoreError::InvalidValue(format!(
                "timestamp must be positive, got {}",
                timestamp
            )));
        }
        self.db.with_transaction(|tx| {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO access_log (user_id, pkg_id, privacy_id, use_date)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (package_id, privacy_id) in accesses {
                stmt.execute(params![user_id, package_id, privacy_id, timestamp])?;
            }
            Ok(())
        })?;

        tracing::debug!(user_id, entries = accesses.len(), "Access log batch stored");
        Ok(())
    }

    fn add_monitor_policy(
        &self,
        user_id: i32,
        package_id: &str,
        privacy_ids: &[String],
        monitor_policy: i32,
    ) -> Result<(), StoreError> {
        self.db.with_transaction(|tx| {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO monitor_policy (user_id, pkg_id, privacy_id, monitor_policy)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(user_id, pkg_id, privacy_id)
                 DO UPDATE SET monitor_policy = excluded.monitor_policy",
            )?;
            for privacy_id in privacy_ids {
                stmt.execute(params![user_id, package_id, privacy_id, monitor_policy])?;
            }
            Ok(())
        })?;

        tracing::info!(
            user_id,
            package = %package_id,
            categories = privacy_ids.len(),
            monitor_policy,
            "Monitor policy stored"
        );
        Ok(())
    }

    fn check_privacy_package(&self, user_id: i32, package_id: &str) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT count(*) FROM monitor_policy WHERE user_id = ?1 AND pkg_id = ?2",
            )?;
            let count: i64 = stmt.query_row(params![user_id, package_id], |row| row.get(0))?;
            Ok(count > 0)
        })
    }

    fn delete_all_logs_and_policies(&self) -> Result<(), StoreError> {
        self.db.with_transaction(|tx| {
            tx.execute("DELETE FROM access_log", [])?;
            tx.execute("DELETE FROM monitor_policy", [])?;
            tx.execute("DELETE FROM main_monitor_policy", [])?;
            Ok(())
        })?;

        tracing::info!("All access logs and monitor policies deleted");
        Ok(())
    }

    fn delete_logs_by_package(&self, package_id: &str) -> Result<usize, StoreError> {
        let removed = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare_cached("DELETE FROM access_log WHERE pkg_id = ?1")?;
            Ok(stmt.execute(params![package_id])?)
        })?;

        tracing::info!(package = %package_id, removed, "Access logs deleted");
        Ok(removed)
    }

    fn delete_monitor_policy_by_package(&self, package_id: &str) -> Result<usize, StoreError> {
        let removed = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare_cached("DELETE FROM monitor_policy WHERE pkg_id = ?1")?;
            Ok(stmt.execute(params![package_id])?)
        })?;

        tracing::info!(package = %package_id, removed, "Monitor policy deleted");
        Ok(removed)
    }

    fn count_by_package(&self, user_id: i32, range: DateRange) -> Result<Vec<UsageCount>, StoreError> {
        self.query_counts(
            "SELECT pkg_id, count(*) FROM access_log
             WHERE user_id = ?1 AND use_date >= ?2 AND use_date <= ?3
             GROUP BY pkg_id ORDER BY pkg_id",
            &[&user_id, &range.start, &range.end],
        )
    }

    fn count_by_privacy(&self, user_id: i32, range: DateRange) -> Result<Vec<UsageCount>, StoreError> {
        self.query_counts(
            "SELECT privacy_id, count(*) FROM access_log
             WHERE user_id = ?1 AND use_date >= ?2 AND use_date <= ?3
             GROUP BY privacy_id ORDER BY privacy_id",
            &[&user_id, &range.start, &range.end],
        )
    }

    fn count_packages_for_privacy(
        &self,
        user_id: i32,
        range: DateRange,
        privacy_id: &str,
    ) -> Result<Vec<UsageCount>, StoreError> {
        self.query_counts(
            "SELECT pkg_id, count(*) FROM access_log
             WHERE user_id = ?1 AND use_date >= ?2 AND use_date <= ?3 AND privacy_id = ?4
             GROUP BY pkg_id ORDER BY pkg_id",
            &[&user_id, &range.start, &range.end, &privacy_id],
        )
    }

    fn count_privacies_for_package(
        &self,
        user_id: i32,
        range: DateRange,
        package_id: &str,
    ) -> Result<Vec<UsageCount>, StoreError> {
        self.query_counts(
            "SELECT privacy_id, count(*) FROM access_log
             WHERE user_id = ?1 AND use_date >= ?2 AND use_date <= ?3 AND pkg_id = ?4
             GROUP BY privacy_id ORDER BY privacy_id",
            &[&user_id, &range.start, &range.end, &package_id],
        )
    }

    fn package_ids(&self, user_id: i32) -> Result<Vec<String>, StoreError> {
        self.query_strings(
            "SELECT DISTINCT pkg_id FROM monitor_policy WHERE user_id = ?1 ORDER BY pkg_id",
            &[&user_id],
        )
    }

    fn packages_by_privacy(&self, user_id: i32, privacy_id: &str) -> Result<Vec<String>, StoreError> {
        self.query_strings(
            "SELECT DISTINCT pkg_id FROM monitor_policy
             WHERE user_id = ?1 AND privacy_id = ?2 ORDER BY pkg_id",
            &[&user_id, &privacy_id],
        )
    }

    fn policies_for_package(&self, user_id: i32, package_id: &str) -> Result<Vec<MonitorPolicy>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT user_id, pkg_id, privacy_id, monitor_policy FROM monitor_policy
                 WHERE user_id = ?1 AND pkg_id = ?2 ORDER BY privacy_id",
            )?;
            let rows = stmt
                .query_map(params![user_id, package_id], Self::row_to_policy)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    fn get_monitor_policy(&self, user_id: i32, package_id: &str, privacy_id: &str) -> Result<i32, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT monitor_policy FROM monitor_policy
                 WHERE user_id = ?1 AND pkg_id = ?2 AND privacy_id = ?3",
            )?;
            let flag: Option<i32> = stmt
                .query_row(params![user_id, package_id, privacy_id], |row| row.get(0))
                .optional()?;
            Ok(flag.unwrap_or(0))
        })
    }

    fn all_monitor_policies(&self) -> Result<Vec<MonitorPolicy>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT user_id, pkg_id, privacy_id, monitor_policy FROM monitor_policy
                 ORDER BY user_id, pkg_id, privacy_id",
            )?;
            let rows = stmt
                .query_map([], Self::row_to_policy)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    fn update_monitor_policy(
        &self,
        user_id: i32,
        package_id: &str,
        privacy_id: &str,
        monitor_policy: i32,
    ) -> Result<bool, StoreError> {
        let changed = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "UPDATE monitor_policy SET monitor_policy = ?1
                 WHERE user_id = ?2 AND pkg_id = ?3 AND privacy_id = ?4",
            )?;
            Ok(stmt.execute(params![monitor_policy, user_id, package_id, privacy_id])?)
        })?;

        tracing::info!(
            user_id,
            package = %package_id,
            privacy = %privacy_id,
            monitor_policy,
            changed,
            "Monitor policy updated"
        );
        Ok(changed > 0)
    }

    fn update_main_monitor_policy(&self, user_id: i32, enabled: bool) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "INSERT INTO main_monitor_policy (user_id, main_monitor_policy) VALUES (?1, ?2)
                 ON CONFLICT(user_id) DO UPDATE SET main_monitor_policy = excluded.main_monitor_policy",
            )?;
            stmt.execute(params![user_id, enabled])?;
            Ok(())
        })?;

        tracing::info!(user_id, enabled, "Main monitor policy updated");
        Ok(())
    }

    fn get_main_monitor_policy(&self, user_id: i32) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let existing: Option<bool> = conn
                .prepare_cached(
                    "SELECT main_monitor_policy FROM main_monitor_policy WHERE user_id = ?1",
                )?
                .query_row(params![user_id], |row| row.get(0))
                .optional()?;

            match existing {
                Some(enabled) => Ok(enabled),
                None => {
                    conn.prepare_cached(
                        "INSERT OR IGNORE INTO main_monitor_policy (user_id) VALUES (?1)",
                    )?
                    .execute(params![user_id])?;
                    tracing::debug!(user_id, "Default main monitor policy created");
                    Ok(false)
                }
            }
        })
    }

    fn delete_main_monitor_policy(&self, user_id: i32) -> Result<bool, StoreError> {
        let removed = self.db.with_conn(|conn| {
            let mut stmt =
                conn.prepare_cached("DELETE FROM main_monitor_policy WHERE user_id = ?1")?;
            Ok(stmt.execute(params![user_id])?)
        })?;
        Ok(removed > 0)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const LOCATION: &str = "http://tizen.org/privacy/location";
    const CONTACT: &str = "http://tizen.org/privacy/contact";

    fn setup_store() -> SqlitePolicyStore {
        let db = Arc::new(Database::open_in_memory().unwrap());
        SqlitePolicyStore::new(db)
    }

    fn log(store: &SqlitePolicyStore, user_id: i32, pkg: &str, privacy: &str, ts: i64) {
        store
            .add_access_log(&AccessLogEntry {
                user_id,
                package_id: pkg.to_string(),
                privacy_id: privacy.to_string(),
                timestamp: ts,
            })
            .unwrap();
    }

    #[test]
    fn test_add_and_get_monitor_policy() {
        let store = setup_store();
        store
            .add_monitor_policy(1, "app.a", &[LOCATION.to_string(), CONTACT.to_string()], 1)
            .unwrap();

        assert_eq!(store.get_monitor_policy(1, "app.a", LOCATION).unwrap(), 1);
        assert_eq!(store.get_monitor_policy(1, "app.a", CONTACT).unwrap(), 1);
        assert!(store.check_privacy_package(1, "app.a").unwrap());
        assert!(!store.check_privacy_package(2, "app.a").unwrap());
    }

    #[test]
    fn test_missing_policy_reads_as_zero() {
        let store = setup_store();
        assert_eq!(store.get_monitor_policy(1, "ghost", LOCATION).unwrap(), 0);
    }

    #[test]
    fn test_add_monitor_policy_is_last_write_wins() {
        let store = setup_store();
        store.add_monitor_policy(1, "app.a", &[LOCATION.to_string()], 1).unwrap();
        store.add_monitor_policy(1, "app.a", &[LOCATION.to_string()], 0).unwrap();

        assert_eq!(store.get_monitor_policy(1, "app.a", LOCATION).unwrap(), 0);
        assert_eq!(store.policies_for_package(1, "app.a").unwrap().len(), 1);
    }

    #[test]
    fn test_update_monitor_policy_only_touches_existing_rows() {
        let store = setup_store();
        assert!(!store.update_monitor_policy(1, "app.a", LOCATION, 1).unwrap());
        assert_eq!(store.all_monitor_policies().unwrap().len(), 0);

        store.add_monitor_policy(1, "app.a", &[LOCATION.to_string()], 0).unwrap();
        assert!(store.update_monitor_policy(1, "app.a", LOCATION, 1).unwrap());
        assert_eq!(store.get_monitor_policy(1, "app.a", LOCATION).unwrap(), 1);
    }

    #[test]
    fn test_package_listings() {
        let store = setup_store();
        store.add_monitor_policy(1, "app.b", &[LOCATION.to_string()], 1).unwrap();
        store
            .add_monitor_policy(1, "app.a", &[LOCATION.to_string(), CONTACT.to_string()], 1)
            .unwrap();
        store.add_monitor_policy(2, "app.c", &[CONTACT.to_string()], 1).unwrap();

        assert_eq!(store.package_ids(1).unwrap(), vec!["app.a", "app.b"]);
        assert_eq!(store.packages_by_privacy(1, CONTACT).unwrap(), vec!["app.a"]);
        assert_eq!(store.packages_by_privacy(2, CONTACT).unwrap(), vec!["app.c"]);

        let all = store.all_monitor_policies().unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all[0].composite_key(), format!("1|app.a|{}", CONTACT));
    }

    #[test]
    fn test_usage_counts() {
        let store = setup_store();
        log(&store, 1, "app.a", LOCATION, 100);
        log(&store, 1, "app.a", LOCATION, 150);
        log(&store, 1, "app.a", CONTACT, 160);
        log(&store, 1, "app.b", LOCATION, 170);
        log(&store, 1, "app.b", LOCATION, 500); // outside window
        log(&store, 2, "app.a", LOCATION, 120); // other user

        let range = DateRange::new(100, 200);
        assert_eq!(
            store.count_by_package(1, range).unwrap(),
            vec![UsageCount::new("app.a", 3), UsageCount::new("app.b", 1)]
        );
        assert_eq!(
            store.count_by_privacy(1, range).unwrap(),
            vec![UsageCount::new(CONTACT, 1), UsageCount::new(LOCATION, 3)]
        );
        assert_eq!(
            store.count_packages_for_privacy(1, range, LOCATION).unwrap(),
            vec![UsageCount::new("app.a", 2), UsageCount::new("app.b", 1)]
        );
        assert_eq!(
            store.count_privacies_for_package(1, range, "app.a").unwrap(),
            vec![UsageCount::new(CONTACT, 1), UsageCount::new(LOCATION, 2)]
        );
    }

    #[test]
    fn test_access_log_rejects_non_positive_timestamp() {
        let store = setup_store();
        let err = store
            .add_access_log(&AccessLogEntry {
                user_id: 1,
                package_id: "app.a".to_string(),
                privacy_id: LOCATION.to_string(),
                timestamp: 0,
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidValue(_)));
        assert!(store.add_access_logs(1, &[], -5).is_err());
    }

    #[test]
    fn test_batch_access_logs() {
        let store = setup_store();
        let batch = vec![
            ("app.a".to_string(), LOCATION.to_string()),
            ("app.a".to_string(), CONTACT.to_string()),
            ("app.b".to_string(), LOCATION.to_string()),
        ];
        store.add_access_logs(1, &batch, 1_000).unwrap();

        let counts = store.count_by_package(1, DateRange::new(0, 2_000)).unwrap();
        assert_eq!(counts, vec![UsageCount::new("app.a", 2), UsageCount::new("app.b", 1)]);
    }

    #[test]
    fn test_delete_by_package() {
        let store = setup_store();
        store.add_monitor_policy(1, "app.a", &[LOCATION.to_string()], 1).unwrap();
        store.add_monitor_policy(1, "app.b", &[LOCATION.to_string()], 1).unwrap();
        log(&store, 1, "app.a", LOCATION, 10);
        log(&store, 1, "app.b", LOCATION, 10);

        assert_eq!(store.delete_logs_by_package("app.a").unwrap(), 1);
        assert_eq!(store.delete_monitor_policy_by_package("app.a").unwrap(), 1);
        assert_eq!(store.delete_monitor_policy_by_package("app.a").unwrap(), 0);

        assert_eq!(store.package_ids(1).unwrap(), vec!["app.b"]);
        let counts = store.count_by_package(1, DateRange::new(0, 100)).unwrap();
        assert_eq!(counts, vec![UsageCount::new("app.b", 1)]);
    }

    #[test]
    fn test_delete_all_is_idempotent() {
        let store = setup_store();
        store.add_monitor_policy(1, "app.a", &[LOCATION.to_string()], 1).unwrap();
        store.update_main_monitor_policy(1, true).unwrap();
        log(&store, 1, "app.a", LOCATION, 10);

        store.delete_all_logs_and_policies().unwrap();
        let after_first = (
            store.all_monitor_policies().unwrap(),
            store.count_by_package(1, DateRange::new(0, 100)).unwrap(),
        );
        store.delete_all_logs_and_policies().unwrap();
        let after_second = (
            store.all_monitor_policies().unwrap(),
            store.count_by_package(1, DateRange::new(0, 100)).unwrap(),
        );

        assert!(after_first.0.is_empty());
        assert!(after_first.1.is_empty());
        assert_eq!(after_first, after_second);
        assert!(!store.delete_main_monitor_policy(1).unwrap());
    }

    #[test]
    fn test_main_monitor_policy_lifecycle() {
        let store = setup_store();

        // First read creates a default row.
        assert!(!store.get_main_monitor_policy(5).unwrap());
        store.update_main_monitor_policy(5, true).unwrap();
        assert!(store.get_main_monitor_policy(5).unwrap());

        assert!(store.delete_main_monitor_policy(5).unwrap());
        assert!(!store.delete_main_monitor_policy(5).unwrap());
        assert!(!store.get_main_monitor_policy(5).unwrap());
    }

    #[test]
    fn test_concurrent_writers_share_one_database() {
        let store = setup_store();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    let pkg = format!("app.{}", i);
                    store.add_monitor_policy(1, &pkg, &[LOCATION.to_string()], 1).unwrap();
                    log(&store, 1, &pkg, LOCATION, 100);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.package_ids(1).unwrap().len(), 8);
    }
}
