// Privacy Guard — Queue-Backed Access Monitor
//
// In-process `AccessMonitor`: producers push access decisions, the
// ingestion thread receives them in batches of `buffer_size`.

use std::sync::{Condvar, Mutex, MutexGuard};

use super::{AccessEvent, AccessMonitor, MonitorError};

#[derive(Debug, Default)]
struct QueueState {
    events: Vec<AccessEvent>,
    flushing: bool,
    finished: bool,
}

pub struct QueueMonitor {
    buffer_size: usize,
    state: Mutex<QueueState>,
    ready: Condvar,
}

impl QueueMonitor {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            buffer_size: buffer_size.max(1),
            state: Mutex::new(QueueState::default()),
            ready: Condvar::new(),
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Number of events waiting to be fetched.
    pub fn pending(&self) -> usize {
        self.lock().events.len()
    }

    /// Record one access decision.
    pub fn push(&self, event: AccessEvent) -> Result<(), MonitorError> {
        let mut state = self.lock();
        if state.finished {
            return Err(MonitorError::Finished);
        }
        state.events.push(event);
        if state.events.len() >= self.buffer_size {
            self.ready.notify_all();
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl AccessMonitor for QueueMonitor {
    fn next_batch(&self) -> Result<Vec<AccessEvent>, MonitorError> {
        let mut state = self.lock();
        while state.events.len() < self.buffer_size && !state.flushing && !state.finished {
            state = self
                .ready
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        if state.finished && state.events.is_empty() {
            return Err(MonitorError::Finished);
        }
        let take = state.events.len().min(self.buffer_size);
        Ok(state.events.drain(..take).collect())
    }

    fn flush(&self) -> Result<(), MonitorError> {
        let mut state = self.lock();
        state.flushing = true;
        self.ready.notify_all();
        Ok(())
    }

    fn finish(&self) -> Result<(), MonitorError> {
        let mut state = self.lock();
        state.finished = true;
        let dropped = state.events.len();
        state.events.clear();
        if dropped > 0 {
            tracing::warn!(dropped, "Access monitor finished with unprocessed events");
        }
        self.ready.notify_all();
        Ok(())
    }
}
