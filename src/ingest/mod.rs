// Privacy Guard — Access-Decision Ingestion
//
// Drains batches of access decisions from a monitor and turns the
// privacy-relevant ones into access-log records, gated by each package's
// monitor policy.

mod pipeline;
mod queue;

use thiserror::Error;

pub use pipeline::{IngestStats, IngestionPipeline, PipelineState};
pub use queue::QueueMonitor;

#[derive(Debug, Error)]
pub enum MonitorError {
    /// The monitor has been finished; no more batches will be produced.
    #[error("access monitor finished")]
    Finished,

    #[error("access monitor fetch failed: {0}")]
    Fetch(String),

    #[error("failed to start ingestion thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// One access decision as reported by the access-control layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessEvent {
    /// User label; expected to hold a decimal user id.
    pub user: String,
    /// Actor label, usually `User::App::<package>`.
    pub client: String,
    pub privilege: String,
    /// Seconds since the epoch.
    pub timestamp: i64,
}

impl AccessEvent {
    pub fn new(
        user: impl Into<String>,
        client: impl Into<String>,
        privilege: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            user: user.into(),
            client: client.into(),
            privilege: privilege.into(),
            timestamp,
        }
    }
}

/// Source of access-decision batches.
pub trait AccessMonitor: Send + Sync {
    /// Block until a batch is available: the buffer filled up or a flush
    /// was requested. May return an empty batch after a flush.
    fn next_batch(&self) -> Result<Vec<AccessEvent>, MonitorError>;

    /// Stop waiting for a full buffer. The blocked and every later
    /// `next_batch` return whatever is buffered.
    fn flush(&self) -> Result<(), MonitorError>;

    /// Release the monitor. Later fetches fail with `Finished`.
    fn finish(&self) -> Result<(), MonitorError>;
}
