// Privacy Guard — RPC Client
//
// Synchronous client for the PrivacyInfoService interface. Every operation
// opens one connection, makes one call and disconnects. Arguments naming a
// privacy category are validated locally before any I/O, and access logs
// are batched before being sent.

mod batch;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::checker::PolicySource;
use crate::error::{GuardError, ResultCode, Result};
use crate::gateway::{Shape, SocketTransport, TransportError, Value};
use crate::privacy::PrivacyMapper;
use crate::service::{method, INTERFACE_NAME};
use crate::store::{DateRange, MonitorPolicy, PolicyStore, UsageCount};

use batch::{Batch, PendingLogs};

/// Default number of access logs sent per batch.
pub const DEFAULT_LOG_BATCH_SIZE: usize = 10;

pub struct PrivacyGuardClient {
    socket_path: PathBuf,
    timeout: Option<Duration>,
    mapper: Arc<dyn PrivacyMapper>,
    batch_size: usize,
    pending: Mutex<PendingLogs>,
    offline_store: Option<Arc<dyn PolicyStore>>,
}

impl PrivacyGuardClient {
    pub fn new(socket_path: impl Into<PathBuf>, mapper: Arc<dyn PrivacyMapper>) -> Self {
        Self {
            socket_path: socket_path.into(),
            timeout: None,
            mapper,
            batch_size: DEFAULT_LOG_BATCH_SIZE,
            pending: Mutex::new(PendingLogs::default()),
            offline_store: None,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Write `add_monitor_policy` straight to `store` when the daemon is
    /// unreachable.
    pub fn with_offline_store(mut self, store: Arc<dyn PolicyStore>) -> Self {
        self.offline_store = Some(store);
        self
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Number of access logs waiting to be sent.
    pub fn pending_logs(&self) -> usize {
        self.lock_pending().len()
    }

    // ─── Access Logs ─────────────────────────────────────────────────────────

    /// Queue an access record; sends the batch once it is full.
    pub fn add_access_log(&self, user_id: i32, package: &str, privacy_id: &str) -> Result<()> {
        let mut pending = self.lock_pending();

        // Queue first so a failed flush of an earlier user loses nothing.
        pending.push(user_id, package.to_string(), privacy_id.to_string());
        tracing::debug!(user_id, pending = pending.len(), "Access log queued");

        while let Some(earlier) = pending.take_earlier_run() {
            self.send_batch(&mut pending, earlier)?;
        }

        match pending.take_if_full(self.batch_size) {
            Some(batch) => self.send_batch(&mut pending, batch),
            None => Ok(()),
        }
    }

    /// Send whatever is pending, oldest user first. Call before the process
    /// exits.
    pub fn flush_before_exit(&self) -> Result<()> {
        let mut pending = self.lock_pending();
        while let Some(batch) = pending.take() {
            self.send_batch(&mut pending, batch)?;
        }
        Ok(())
    }

    /// Record a single access immediately, bypassing the batch.
    pub fn add_access_log_now(&self, user_id: i32, package: &str, privacy_id: &str) -> Result<()> {
        let out = self.call(
            method::ADD_PRIVACY_ACCESS_LOG_TEST,
            &[Value::I32(user_id), package.into(), privacy_id.into()],
            &[Shape::I32],
        )?;
        check(out)?;
        Ok(())
    }

    fn send_batch(&self, pending: &mut PendingLogs, batch: Batch) -> Result<()> {
        let entries = batch
            .entries
            .iter()
            .map(|(p, c)| Value::pair(p.as_str(), c.as_str()))
            .collect();
        let result = self
            .call(
                method::ADD_PRIVACY_ACCESS_LOG,
                &[Value::I32(batch.user_id), Value::Seq(entries)],
                &[Shape::I32],
            )
            .and_then(check);

        match result {
            Ok(_) => {
                tracing::debug!(user_id = batch.user_id, sent = batch.entries.len(), "Access logs sent");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to send access logs; keeping them queued");
                pending.restore(batch);
                Err(e)
            }
        }
    }

    // ─── Monitor Policy ──────────────────────────────────────────────────────

    /// Register a package's privileges. Privileges are mapped to categories;
    /// nothing is sent when none of them is privacy-relevant.
    pub fn add_monitor_policy(
        &self,
        user_id: i32,
        package: &str,
        privileges: &[String],
        monitor_policy: i32,
    ) -> Result<()> {
        let privacy_ids = self.mapper.privacy_ids_for(privileges);
        if privacy_ids.is_empty() {
            tracing::debug!(package, "No privacy-relevant privileges, nothing to register");
            return Ok(());
        }

        let args = [
            Value::I32(user_id),
            package.into(),
            Value::Seq(privacy_ids.iter().map(|c| Value::from(c.as_str())).collect()),
            Value::I32(monitor_policy),
        ];
        match self.call(method::ADD_MONITOR_POLICY, &args, &[Shape::I32]) {
            Ok(out) => check(out).map(|_| ()),
            Err(GuardError::Transport(e)) if e.is_connect_failure() => match &self.offline_store {
                Some(store) => {
                    tracing::info!(package, "Daemon unreachable, writing policy to local store");
                    store.add_monitor_policy(user_id, package, &privacy_ids, monitor_policy)?;
                    Ok(())
                }
                None => Err(GuardError::Transport(e)),
            },
            Err(e) => Err(e),
        }
    }

    pub fn delete_all_logs_and_monitor_policy(&self) -> Result<()> {
        let out = self.call(method::DELETE_ALL_LOGS_AND_MONITOR_POLICY, &[], &[Shape::I32])?;
        check(out).map(|_| ())
    }

    pub fn delete_logs_by_package(&self, package: &str) -> Result<()> {
        let out = self.call(method::DELETE_LOGS_BY_PACKAGE_ID, &[package.into()], &[Shape::I32])?;
        check(out).map(|_| ())
    }

    pub fn delete_monitor_policy_by_package(&self, package: &str) -> Result<()> {
        let out = self.call(
            method::DELETE_MONITOR_POLICY_BY_PACKAGE_ID,
            &[package.into()],
            &[Shape::I32],
        )?;
        check(out).map(|_| ())
    }

    pub fn policies_for_package(&self, user_id: i32, package: &str) -> Result<Vec<(String, i32)>> {
        let out = self.call(
            method::FOREACH_MONITOR_POLICY_BY_PACKAGE_ID,
            &[Value::I32(user_id), package.into()],
            &[Shape::I32, Shape::seq(Shape::Record)],
        )?;
        let mut rest = check(out)?;
        take_seq(&mut rest)?
            .into_iter()
            .map(|v| v.into_record().map_err(GuardError::from))
            .collect()
    }

    pub fn get_monitor_policy(&self, user_id: i32, package: &str, privacy_id: &str) -> Result<i32> {
        self.require_privacy_id(privacy_id)?;
        let out = self.call(
            method::GET_MONITOR_POLICY,
            &[Value::I32(user_id), package.into(), privacy_id.into()],
            &[Shape::I32, Shape::I32],
        )?;
        let mut rest = check(out)?;
        Ok(take(&mut rest)?.into_i32()?)
    }

    /// Every policy row. An empty store is not an error.
    pub fn all_monitor_policies(&self) -> Result<Vec<MonitorPolicy>> {
        let out = self.call(
            method::GET_ALL_MONITOR_POLICY,
            &[],
            &[Shape::I32, Shape::seq(Shape::pair(Shape::Str, Shape::I32))],
        )?;
        let mut rest = match check(out) {
            Ok(rest) => rest,
            Err(GuardError::Rejected(ResultCode::NoData)) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        take_seq(&mut rest)?
            .into_iter()
            .map(|item| {
                let (key, flag) = item.into_pair()?;
                parse_composite_key(&key.into_string()?, flag.into_i32()?)
            })
            .collect()
    }

    pub fn check_privacy_package(&self, user_id: i32, package: &str) -> Result<bool> {
        let out = self.call(
            method::CHECK_PRIVACY_PACKAGE,
            &[Value::I32(user_id), package.into()],
            &[Shape::I32, Shape::Bool],
        )?;
        let mut rest = check(out)?;
        Ok(take(&mut rest)?.into_bool()?)
    }

    pub fn update_monitor_policy(
        &self,
        user_id: i32,
        package: &str,
        privacy_id: &str,
        monitor_policy: i32,
    ) -> Result<()> {
        self.require_privacy_id(privacy_id)?;
        let out = self.call(
            method::UPDATE_MONITOR_POLICY,
            &[
                Value::I32(user_id),
                package.into(),
                privacy_id.into(),
                Value::I32(monitor_policy),
            ],
            &[Shape::I32],
        )?;
        check(out).map(|_| ())
    }

    pub fn update_main_monitor_policy(&self, user_id: i32, enabled: bool) -> Result<()> {
        let out = self.call(
            method::UPDATE_MAIN_MONITOR_POLICY,
            &[Value::I32(user_id), Value::Bool(enabled)],
            &[Shape::I32],
        )?;
        check(out).map(|_| ())
    }

    pub fn get_main_monitor_policy(&self, user_id: i32) -> Result<bool> {
        let out = self.call(
            method::GET_MAIN_MONITOR_POLICY,
            &[Value::I32(user_id)],
            &[Shape::I32, Shape::Bool],
        )?;
        let mut rest = check(out)?;
        Ok(take(&mut rest)?.into_bool()?)
    }

    pub fn delete_main_monitor_policy(&self, user_id: i32) -> Result<()> {
        let out = self.call(
            method::DELETE_MAIN_MONITOR_POLICY_BY_USER_ID,
            &[Value::I32(user_id)],
            &[Shape::I32],
        )?;
        check(out).map(|_| ())
    }

    // ─── Reports ─────────────────────────────────────────────────────────────

    pub fn package_ids(&self, user_id: i32) -> Result<Vec<String>> {
        let out = self.call(
            method::FOREACH_PRIVACY_PACKAGE_ID,
            &[Value::I32(user_id)],
            &[Shape::I32, Shape::seq(Shape::Str)],
        )?;
        strings(out)
    }

    pub fn packages_by_privacy(&self, user_id: i32, privacy_id: &str) -> Result<Vec<String>> {
        self.require_privacy_id(privacy_id)?;
        let out = self.call(
            method::FOREACH_PACKAGE_BY_PRIVACY_ID,
            &[Value::I32(user_id), privacy_id.into()],
            &[Shape::I32, Shape::seq(Shape::Str)],
        )?;
        strings(out)
    }

    pub fn count_by_package(&self, user_id: i32, range: DateRange) -> Result<Vec<UsageCount>> {
        let args = range_args(user_id, range)?;
        self.counts(method::FOREACH_TOTAL_PRIVACY_COUNT_OF_PACKAGE, &args)
    }

    pub fn count_by_privacy(&self, user_id: i32, range: DateRange) -> Result<Vec<UsageCount>> {
        let args = range_args(user_id, range)?;
        self.counts(method::FOREACH_TOTAL_PRIVACY_COUNT_OF_PRIVACY, &args)
    }

    pub fn count_packages_for_privacy(
        &self,
        user_id: i32,
        range: DateRange,
        privacy_id: &str,
    ) -> Result<Vec<UsageCount>> {
        self.require_privacy_id(privacy_id)?;
        let mut args = range_args(user_id, range)?;
        args.push(privacy_id.into());
        self.counts(method::FOREACH_PRIVACY_COUNT_BY_PRIVACY_ID, &args)
    }

    pub fn count_privacies_for_package(
        &self,
        user_id: i32,
        range: DateRange,
        package: &str,
    ) -> Result<Vec<UsageCount>> {
        let mut args = range_args(user_id, range)?;
        args.push(package.into());
        self.counts(method::FOREACH_PRIVACY_COUNT_BY_PACKAGE_ID, &args)
    }

    fn counts(&self, method: &str, args: &[Value]) -> Result<Vec<UsageCount>> {
        let out = self.call(
            method,
            args,
            &[Shape::I32, Shape::seq(Shape::pair(Shape::Str, Shape::I32))],
        )?;
        let mut rest = check(out)?;
        take_seq(&mut rest)?
            .into_iter()
            .map(|item| {
                let (name, count) = item.into_pair()?;
                Ok(UsageCount::new(name.into_string()?, count.into_i32()?))
            })
            .collect()
    }

    // ─── Plumbing ────────────────────────────────────────────────────────────

    fn call(&self, method: &str, inputs: &[Value], outputs: &[Shape]) -> Result<Vec<Value>> {
        let mut transport = SocketTransport::new(&self.socket_path, INTERFACE_NAME);
        if let Some(timeout) = self.timeout {
            transport = transport.with_timeout(timeout);
        }
        transport.connect()?;
        let result = transport.call(method, inputs, outputs);
        transport.disconnect();
        result.map_err(|e: TransportError| {
            tracing::warn!(method, error = %e, "RPC failed");
            GuardError::from(e)
        })
    }

    fn require_privacy_id(&self, privacy_id: &str) -> Result<()> {
        if self.mapper.is_valid_privacy_id(privacy_id) {
            Ok(())
        } else {
            Err(GuardError::InvalidParameter(format!(
                "unknown privacy id: {}",
                privacy_id
            )))
        }
    }

    fn lock_pending(&self) -> MutexGuard<'_, PendingLogs> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PolicySource for PrivacyGuardClient {
    fn package_policies(&self, user_id: i32, package: &str) -> Result<Vec<(String, i32)>> {
        self.policies_for_package(user_id, package)
    }

    fn monitor_policy(&self, user_id: i32, package: &str, privacy_id: &str) -> Result<i32> {
        self.get_monitor_policy(user_id, package, privacy_id)
    }
}

// ─── Reply Helpers ───────────────────────────────────────────────────────────

/// Split off the leading result code; non-success becomes `Rejected`.
fn check(out: Vec<Value>) -> Result<Vec<Value>> {
    let mut iter = out.into_iter();
    let code = iter
        .next()
        .ok_or_else(|| GuardError::Internal("empty reply".to_string()))?
        .into_i32()?;
    match ResultCode::from_i32(code) {
        ResultCode::Success => Ok(iter.collect()),
        other => Err(GuardError::Rejected(other)),
    }
}

fn take(rest: &mut Vec<Value>) -> Result<Value> {
    if rest.is_empty() {
        return Err(GuardError::Internal("reply is missing a value".to_string()));
    }
    Ok(rest.remove(0))
}

fn take_seq(rest: &mut Vec<Value>) -> Result<Vec<Value>> {
    Ok(take(rest)?.into_seq()?)
}

fn strings(out: Vec<Value>) -> Result<Vec<String>> {
    let mut rest = check(out)?;
    take_seq(&mut rest)?
        .into_iter()
        .map(|v| v.into_string().map_err(GuardError::from))
        .collect()
}

/// Dates travel as `I32` seconds.
fn range_args(user_id: i32, range: DateRange) -> Result<Vec<Value>> {
    let to_i32 = |t: i64| {
        i32::try_from(t).map_err(|_| GuardError::InvalidParameter(format!("date out of range: {}", t)))
    };
    Ok(vec![
        Value::I32(user_id),
        Value::I32(to_i32(range.start)?),
        Value::I32(to_i32(range.end)?),
    ])
}

fn parse_composite_key(key: &str, monitor_policy: i32) -> Result<MonitorPolicy> {
    let mut parts = key.splitn(3, '|');
    let (Some(user), Some(package), Some(privacy)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(GuardError::Internal(format!("malformed policy key: {}", key)));
    };
    let user_id = user
        .parse()
        .map_err(|_| GuardError::Internal(format!("malformed user id in key: {}", key)))?;
    Ok(MonitorPolicy {
        user_id,
        package_id: package.to_string(),
        privacy_id: privacy.to_string(),
        monitor_policy,
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
