// Privacy Guard — PrivacyInfoService
//
// One handler per RPC method. Each handler reads its own arguments from the
// connection, calls the policy store, and always writes a result code first.
// If the arguments cannot be decoded the handler returns the codec error
// without replying; the server logs it and closes the connection.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::{GuardError, ResultCode};
use crate::gateway::{CodecError, Connection, ServiceRegistry, Shape, Value};
use crate::notify::{EventPublisher, PolicyEvent};
use crate::store::{DateRange, PolicyStore, StoreError, UsageCount};

use super::{method, INTERFACE_NAME};

type MethodFn = fn(&PrivacyInfoService, &mut Connection) -> Result<(), CodecError>;

pub struct PrivacyInfoService {
    store: Arc<dyn PolicyStore>,
    publisher: Arc<dyn EventPublisher>,
}

impl PrivacyInfoService {
    const METHODS: &'static [(&'static str, MethodFn)] = &[
        (method::ADD_PRIVACY_ACCESS_LOG, Self::add_privacy_access_log),
        (method::ADD_PRIVACY_ACCESS_LOG_TEST, Self::add_privacy_access_log_test),
        (method::ADD_MONITOR_POLICY, Self::add_monitor_policy),
        (method::DELETE_ALL_LOGS_AND_MONITOR_POLICY, Self::delete_all_logs_and_monitor_policy),
        (method::DELETE_LOGS_BY_PACKAGE_ID, Self::delete_logs_by_package_id),
        (method::DELETE_MONITOR_POLICY_BY_PACKAGE_ID, Self::delete_monitor_policy_by_package_id),
        (method::FOREACH_TOTAL_PRIVACY_COUNT_OF_PACKAGE, Self::foreach_total_privacy_count_of_package),
        (method::FOREACH_TOTAL_PRIVACY_COUNT_OF_PRIVACY, Self::foreach_total_privacy_count_of_privacy),
        (method::FOREACH_PRIVACY_COUNT_BY_PRIVACY_ID, Self::foreach_privacy_count_by_privacy_id),
        (method::FOREACH_PRIVACY_COUNT_BY_PACKAGE_ID, Self::foreach_privacy_count_by_package_id),
        (method::FOREACH_PRIVACY_PACKAGE_ID, Self::foreach_privacy_package_id),
        (method::FOREACH_PACKAGE_BY_PRIVACY_ID, Self::foreach_package_by_privacy_id),
        (method::FOREACH_MONITOR_POLICY_BY_PACKAGE_ID, Self::foreach_monitor_policy_by_package_id),
        (method::GET_MONITOR_POLICY, Self::get_monitor_policy),
        (method::GET_ALL_MONITOR_POLICY, Self::get_all_monitor_policy),
        (method::CHECK_PRIVACY_PACKAGE, Self::check_privacy_package),
        (method::UPDATE_MONITOR_POLICY, Self::update_monitor_policy),
        (method::UPDATE_MAIN_MONITOR_POLICY, Self::update_main_monitor_policy),
        (method::GET_MAIN_MONITOR_POLICY, Self::get_main_monitor_policy),
        (method::DELETE_MAIN_MONITOR_POLICY_BY_USER_ID, Self::delete_main_monitor_policy_by_user_id),
    ];

    pub fn new(store: Arc<dyn PolicyStore>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { store, publisher }
    }

    /// Register every method of the interface on `registry`.
    pub fn register(self: Arc<Self>, registry: &mut ServiceRegistry) -> Result<(), GuardError> {
        for &(name, handler) in Self::METHODS {
            let service = Arc::clone(&self);
            registry.register(INTERFACE_NAME, name, move |conn: &mut Connection| {
                handler(&service, conn)
            })?;
        }
        tracing::debug!(methods = Self::METHODS.len(), "PrivacyInfoService registered");
        Ok(())
    }

    // ─── Method Handlers ─────────────────────────────────────────────────────

    fn add_privacy_access_log(&self, conn: &mut Connection) -> Result<(), CodecError> {
        let user_id = conn.read_i32()?;
        let accesses = conn
            .read(&Shape::seq(Shape::pair(Shape::Str, Shape::Str)))?
            .into_seq()?
            .into_iter()
            .map(|item| {
                let (package, privacy) = item.into_pair()?;
                Ok((package.into_string()?, privacy.into_string()?))
            })
            .collect::<Result<Vec<_>, CodecError>>()?;

        let result = self.store.add_access_logs(user_id, &accesses, now());
        conn.write(&[result_code(&result)])
    }

    fn add_privacy_access_log_test(&self, conn: &mut Connection) -> Result<(), CodecError> {
        let user_id = conn.read_i32()?;
        let package = conn.read_string()?;
        let privacy = conn.read_string()?;

        let result = self.store.add_access_logs(user_id, &[(package, privacy)], now());
        conn.write(&[result_code(&result)])
    }

    fn add_monitor_policy(&self, conn: &mut Connection) -> Result<(), CodecError> {
        let user_id = conn.read_i32()?;
        let package = conn.read_string()?;
        let privacy_ids = read_string_seq(conn)?;
        let policy = conn.read_i32()?;

        let result = self.store.add_monitor_policy(user_id, &package, &privacy_ids, policy);
        conn.write(&[result_code(&result)])
    }

    fn delete_all_logs_and_monitor_policy(&self, conn: &mut Connection) -> Result<(), CodecError> {
        // Remember which packages had rows so their caches can be evicted.
        let packages: BTreeSet<String> = self
            .store
            .all_monitor_policies()
            .map(|rows| rows.into_iter().map(|p| p.package_id).collect())
            .unwrap_or_default();

        let result = self.store.delete_all_logs_and_policies();
        if result.is_ok() {
            for package in packages {
                self.publisher.publish(PolicyEvent::PackageRemoved { package });
            }
        }
        conn.write(&[result_code(&result)])
    }

    fn delete_logs_by_package_id(&self, conn: &mut Connection) -> Result<(), CodecError> {
        let package = conn.read_string()?;
        let result = self.store.delete_logs_by_package(&package);
        conn.write(&[result_code(&result)])
    }

    fn delete_monitor_policy_by_package_id(&self, conn: &mut Connection) -> Result<(), CodecError> {
        let package = conn.read_string()?;
        let result = self.store.delete_monitor_policy_by_package(&package);
        if result.is_ok() {
            self.publisher.publish(PolicyEvent::PackageRemoved { package });
        }
        conn.write(&[result_code(&result)])
    }

    fn foreach_total_privacy_count_of_package(&self, conn: &mut Connection) -> Result<(), CodecError> {
        let user_id = conn.read_i32()?;
        let range = read_range(conn)?;
        let result = self.store.count_by_package(user_id, range);
        write_counts(conn, result)
    }

    fn foreach_total_privacy_count_of_privacy(&self, conn: &mut Connection) -> Result<(), CodecError> {
        let user_id = conn.read_i32()?;
        let range = read_range(conn)?;
        let result = self.store.count_by_privacy(user_id, range);
        write_counts(conn, result)
    }

    fn foreach_privacy_count_by_privacy_id(&self, conn: &mut Connection) -> Result<(), CodecError> {
        let user_id = conn.read_i32()?;
        let range = read_range(conn)?;
        let privacy = conn.read_string()?;
        let result = self.store.count_packages_for_privacy(user_id, range, &privacy);
        write_counts(conn, result)
    }

    fn foreach_privacy_count_by_package_id(&self, conn: &mut Connection) -> Result<(), CodecError> {
        let user_id = conn.read_i32()?;
        let range = read_range(conn)?;
        let package = conn.read_string()?;
        let result = self.store.count_privacies_for_package(user_id, range, &package);
        write_counts(conn, result)
    }

    fn foreach_privacy_package_id(&self, conn: &mut Connection) -> Result<(), CodecError> {
        let user_id = conn.read_i32()?;
        let result = self.store.package_ids(user_id);
        write_strings(conn, result)
    }

    fn foreach_package_by_privacy_id(&self, conn: &mut Connection) -> Result<(), CodecError> {
        let user_id = conn.read_i32()?;
        let privacy = conn.read_string()?;
        let result = self.store.packages_by_privacy(user_id, &privacy);
        write_strings(conn, result)
    }

    fn foreach_monitor_policy_by_package_id(&self, conn: &mut Connection) -> Result<(), CodecError> {
        let user_id = conn.read_i32()?;
        let package = conn.read_string()?;
        let result = self.store.policies_for_package(user_id, &package);
        let code = result_code(&result);
        let records = result
            .unwrap_or_default()
            .into_iter()
            .map(|p| Value::Record {
                privacy_id: p.privacy_id,
                policy: p.monitor_policy,
            })
            .collect();
        conn.write(&[code, Value::Seq(records)])
    }

    fn get_monitor_policy(&self, conn: &mut Connection) -> Result<(), CodecError> {
        let user_id = conn.read_i32()?;
        let package = conn.read_string()?;
        let privacy = conn.read_string()?;
        let result = self.store.get_monitor_policy(user_id, &package, &privacy);
        let code = result_code(&result);
        conn.write(&[code, Value::I32(result.unwrap_or(0))])
    }

    fn get_all_monitor_policy(&self, conn: &mut Connection) -> Result<(), CodecError> {
        let result = self.store.all_monitor_policies();
        let (code, entries) = match result {
            Ok(rows) if rows.is_empty() => (Value::I32(ResultCode::NoData.as_i32()), Vec::new()),
            Ok(rows) => (
                Value::I32(ResultCode::Success.as_i32()),
                rows.into_iter()
                    .map(|p| Value::pair(p.composite_key(), p.monitor_policy))
                    .collect(),
            ),
            Err(e) => (store_failure(&e), Vec::new()),
        };
        conn.write(&[code, Value::Seq(entries)])
    }

    fn check_privacy_package(&self, conn: &mut Connection) -> Result<(), CodecError> {
        let user_id = conn.read_i32()?;
        let package = conn.read_string()?;
        let result = self.store.check_privacy_package(user_id, &package);
        let code = result_code(&result);
        conn.write(&[code, Value::Bool(result.unwrap_or(false))])
    }

    fn update_monitor_policy(&self, conn: &mut Connection) -> Result<(), CodecError> {
        let user_id = conn.read_i32()?;
        let package = conn.read_string()?;
        let privacy = conn.read_string()?;
        let policy = conn.read_i32()?;

        let result = self.store.update_monitor_policy(user_id, &package, &privacy, policy);
        if result.is_ok() {
            self.publisher.publish(PolicyEvent::CategoryChanged {
                package,
                category: privacy,
            });
        }
        conn.write(&[result_code(&result)])
    }

    fn update_main_monitor_policy(&self, conn: &mut Connection) -> Result<(), CodecError> {
        let user_id = conn.read_i32()?;
        let enabled = conn.read_bool()?;
        let result = self.store.update_main_monitor_policy(user_id, enabled);
        conn.write(&[result_code(&result)])
    }

    fn get_main_monitor_policy(&self, conn: &mut Connection) -> Result<(), CodecError> {
        let user_id = conn.read_i32()?;
        let result = self.store.get_main_monitor_policy(user_id);
        let code = result_code(&result);
        conn.write(&[code, Value::Bool(result.unwrap_or(false))])
    }

    fn delete_main_monitor_policy_by_user_id(&self, conn: &mut Connection) -> Result<(), CodecError> {
        let user_id = conn.read_i32()?;
        let result = self.store.delete_main_monitor_policy(user_id);
        conn.write(&[result_code(&result)])
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn store_failure(e: &StoreError) -> Value {
    tracing::error!(error = %e, "Store operation failed");
    Value::I32(e.code().as_i32())
}

fn result_code<T>(result: &Result<T, StoreError>) -> Value {
    match result {
        Ok(_) => Value::I32(ResultCode::Success.as_i32()),
        Err(e) => store_failure(e),
    }
}

fn read_range(conn: &mut Connection) -> Result<DateRange, CodecError> {
    let start = conn.read_i32()?;
    let end = conn.read_i32()?;
    Ok(DateRange::new(i64::from(start), i64::from(end)))
}

fn read_string_seq(conn: &mut Connection) -> Result<Vec<String>, CodecError> {
    conn.read(&Shape::seq(Shape::Str))?
        .into_seq()?
        .into_iter()
        .map(Value::into_string)
        .collect()
}

fn write_counts(
    conn: &mut Connection,
    result: Result<Vec<UsageCount>, StoreError>,
) -> Result<(), CodecError> {
    let code = result_code(&result);
    let items = result
        .unwrap_or_default()
        .into_iter()
        .map(|c| Value::pair(c.name, c.count))
        .collect();
    conn.write(&[code, Value::Seq(items)])
}

fn write_strings(
    conn: &mut Connection,
    result: Result<Vec<String>, StoreError>,
) -> Result<(), CodecError> {
    let code = result_code(&result);
    let items = result
        .unwrap_or_default()
        .into_iter()
        .map(Value::Str)
        .collect();
    conn.write(&[code, Value::Seq(items)])
}

// ─── Tests ───────────────────────────────────────────────────────────────────
