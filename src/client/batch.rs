// Privacy Guard — Pending Access-Log Batch
//
// Access logs are sent in batches: entries accumulate for one user until the
// threshold is reached. Entries for a different user start a new run, and
// earlier runs go out first, so a batch never mixes users. A run that fails
// to send goes back to the front of the queue.

use std::collections::VecDeque;

/// A batch ready to be sent as one RPC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Batch {
    pub user_id: i32,
    pub entries: Vec<(String, String)>,
}

/// Entries waiting to be sent, grouped into consecutive runs per user.
#[derive(Debug, Default)]
pub(crate) struct PendingLogs {
    runs: VecDeque<Batch>,
}

impl PendingLogs {
    pub fn len(&self) -> usize {
        self.runs.iter().map(|run| run.entries.len()).sum()
    }

    pub fn push(&mut self, user_id: i32, package: String, privacy: String) {
        if let Some(run) = self.runs.back_mut() {
            if run.user_id == user_id {
                run.entries.push((package, privacy));
                return;
            }
        }
        self.runs.push_back(Batch {
            user_id,
            entries: vec![(package, privacy)],
        });
    }

    /// Take the oldest run if a newer user's run follows it.
    pub fn take_earlier_run(&mut self) -> Option<Batch> {
        if self.runs.len() > 1 {
            self.runs.pop_front()
        } else {
            None
        }
    }

    /// Take the batch if it is the only run and has reached `threshold`.
    pub fn take_if_full(&mut self, threshold: usize) -> Option<Batch> {
        let full = self.runs.len() == 1
            && self.runs.front().map_or(false, |run| run.entries.len() >= threshold);
        if full {
            self.runs.pop_front()
        } else {
            None
        }
    }

    /// Take the oldest run.
    pub fn take(&mut self) -> Option<Batch> {
        self.runs.pop_front()
    }

    /// Put a batch that failed to send back in front of newer entries.
    pub fn restore(&mut self, mut batch: Batch) {
        if let Some(run) = self.runs.front_mut() {
            if run.user_id == batch.user_id {
                batch.entries.append(&mut run.entries);
                run.entries = batch.entries;
                return;
            }
        }
        self.runs.push_front(batch);
    }
}
