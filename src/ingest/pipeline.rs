// Privacy Guard — Ingestion Pipeline
//
// One dedicated thread: fetch a batch from the monitor, map each privilege to
// a privacy category, and append an access-log record when the package's
// monitor flag for that category is on. Fetch failures back off and retry.
// Stopping flushes the monitor and processes what was buffered before the
// thread exits.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::config::MonitorConfig;
use crate::privacy::PrivacyMapper;
use crate::store::{AccessLogEntry, PolicyStore};

use super::{AccessEvent, AccessMonitor, MonitorError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Started,
    Draining,
    Stopped,
}

impl PipelineState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Started,
            2 => Self::Draining,
            3 => Self::Stopped,
            _ => Self::Idle,
        }
    }
}

/// Totals for the lifetime of a pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub events: u64,
    pub logged: u64,
    pub skipped: u64,
    pub fetch_errors: u64,
}

#[derive(Default)]
struct Counters {
    events: AtomicU64,
    logged: AtomicU64,
    skipped: AtomicU64,
    fetch_errors: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> IngestStats {
        IngestStats {
            events: self.events.load(Ordering::SeqCst),
            logged: self.logged.load(Ordering::SeqCst),
            skipped: self.skipped.load(Ordering::SeqCst),
            fetch_errors: self.fetch_errors.load(Ordering::SeqCst),
        }
    }
}

struct Worker {
    monitor: Arc<dyn AccessMonitor>,
    store: Arc<dyn PolicyStore>,
    mapper: Arc<dyn PrivacyMapper>,
    actor_prefix: String,
    backoff: Duration,
    exit: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
    counters: Arc<Counters>,
}

pub struct IngestionPipeline {
    monitor: Arc<dyn AccessMonitor>,
    exit: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
    counters: Arc<Counters>,
    handle: Option<JoinHandle<()>>,
}

impl IngestionPipeline {
    pub fn start(
        monitor: Arc<dyn AccessMonitor>,
        store: Arc<dyn PolicyStore>,
        mapper: Arc<dyn PrivacyMapper>,
        config: &MonitorConfig,
    ) -> Result<Self, MonitorError> {
        let exit = Arc::new(AtomicBool::new(false));
        let state = Arc::new(AtomicU8::new(PipelineState::Idle as u8));
        let counters = Arc::new(Counters::default());

        let worker = Worker {
            monitor: Arc::clone(&monitor),
            store,
            mapper,
            actor_prefix: config.actor_prefix.clone(),
            backoff: Duration::from_millis(config.backoff_ms),
            exit: Arc::clone(&exit),
            state: Arc::clone(&state),
            counters: Arc::clone(&counters),
        };

        state.store(PipelineState::Started as u8, Ordering::SeqCst);
        let handle = std::thread::Builder::new()
            .name("privacy-guard-ingest".to_string())
            .spawn(move || worker.run())?;

        tracing::info!(
            buffer_size = config.buffer_size,
            backoff_ms = config.backoff_ms,
            "Ingestion pipeline started"
        );
        Ok(Self {
            monitor,
            exit,
            state,
            counters,
            handle: Some(handle),
        })
    }

    pub fn state(&self) -> PipelineState {
        PipelineState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn stats(&self) -> IngestStats {
        self.counters.snapshot()
    }

    /// Flush the monitor, process the final batch, join the thread and
    /// finish the monitor.
    pub fn stop(mut self) -> IngestStats {
        self.shutdown();
        self.stats()
    }

    fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.exit.store(true, Ordering::SeqCst);
        if let Err(e) = self.monitor.flush() {
            tracing::warn!(error = %e, "Access monitor flush failed");
        }
        handle.thread().unpark();
        if handle.join().is_err() {
            tracing::error!("Ingestion thread panicked");
        }
        if let Err(e) = self.monitor.finish() {
            tracing::warn!(error = %e, "Access monitor finish failed");
        }
        self.state.store(PipelineState::Stopped as u8, Ordering::SeqCst);
        let stats = self.counters.snapshot();
        tracing::info!(
            events = stats.events,
            logged = stats.logged,
            skipped = stats.skipped,
            "Ingestion pipeline stopped"
        );
    }
}

impl Drop for IngestionPipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Worker {
    fn run(self) {
        loop {
            let stopping = self.exit.load(Ordering::SeqCst);
            if stopping {
                self.state.store(PipelineState::Draining as u8, Ordering::SeqCst);
            }

            match self.monitor.next_batch() {
                Ok(batch) => {
                    let drained = batch.is_empty();
                    for event in &batch {
                        self.handle_event(event);
                    }
                    if stopping && drained {
                        break;
                    }
                }
                Err(MonitorError::Finished) => break,
                Err(e) => {
                    self.counters.fetch_errors.fetch_add(1, Ordering::SeqCst);
                    tracing::warn!(error = %e, backoff_ms = self.backoff.as_millis() as u64, "Access monitor fetch failed");
                    if stopping {
                        break;
                    }
                    std::thread::park_timeout(self.backoff);
                }
            }
        }
    }

    fn handle_event(&self, event: &AccessEvent) {
        self.counters.events.fetch_add(1, Ordering::SeqCst);
        match self.log_event(event) {
            Ok(true) => {
                self.counters.logged.fetch_add(1, Ordering::SeqCst);
            }
            Ok(false) => {
                self.counters.skipped.fetch_add(1, Ordering::SeqCst);
            }
            Err(e) => {
                self.counters.skipped.fetch_add(1, Ordering::SeqCst);
                tracing::warn!(error = %e, client = %event.client, "Failed to record access");
            }
        }
    }

    /// Returns whether a record was written.
    fn log_event(&self, event: &AccessEvent) -> Result<bool, crate::store::StoreError> {
        let Some(privacy_id) = self.mapper.privacy_id(&event.privilege) else {
            return Ok(false);
        };

        let user_id: i32 = match event.user.parse() {
            Ok(id) => id,
            Err(_) => {
                tracing::warn!(user = %event.user, "Access event has a non-numeric user, skipping");
                return Ok(false);
            }
        };

        let package_id = event
            .client
            .strip_prefix(self.actor_prefix.as_str())
            .unwrap_or(&event.client);

        if self.store.get_monitor_policy(user_id, package_id, privacy_id)? == 0 {
            return Ok(false);
        }

        self.store.add_access_log(&AccessLogEntry {
            user_id,
            package_id: package_id.to_string(),
            privacy_id: privacy_id.to_string(),
            timestamp: event.timestamp,
        })?;
        tracing::debug!(user_id, package_id, privacy_id, "Access recorded");
        Ok(true)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
