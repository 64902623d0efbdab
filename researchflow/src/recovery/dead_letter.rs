//! Bounded dead-letter queue.
//!
//! A diagnostic aid, not a durable work queue: entries live in a
//! fixed-capacity ring buffer and the oldest are silently evicted on
//! overflow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Why an entry was dead-lettered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadLetterReason {
    /// Every retry attempt failed.
    RetriesExhausted,
    /// The step's circuit was open and the call was skipped.
    CircuitOpen,
}

/// A record of a failure that exhausted recovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    /// The step that failed.
    pub step_name: String,
    /// Coarse error category for operator triage.
    pub category: String,
    /// The final error message.
    pub message: String,
    /// How many attempts were consumed.
    pub attempts: u32,
    /// Why the entry was enqueued.
    pub reason: DeadLetterReason,
    /// When the entry was enqueued.
    pub enqueued_at: DateTime<Utc>,
}

/// Fixed-capacity ring buffer of dead letters.
#[derive(Debug)]
pub struct DeadLetterQueue {
    capacity: usize,
    entries: VecDeque<DeadLetterEntry>,
}

impl DeadLetterQueue {
    /// Creates a queue holding at most `capacity` entries (floored at 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Appends an entry, evicting the oldest on overflow.
    pub fn push(&mut self, entry: DeadLetterEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// A read-only copy of the current contents, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<DeadLetterEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Current number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
