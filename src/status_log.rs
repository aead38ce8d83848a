use chrono::Utc;
use log::info;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use crate::models::StatusEntry;

/// Capped, insertion-ordered record of lifecycle messages.
///
/// Writers are the dispatcher and the poll scheduler; everything else only
/// reads through [`StatusLog::snapshot`]. Once `capacity` is reached the
/// oldest entry is evicted.
#[derive(Debug)]
pub struct StatusLog {
    entries: Mutex<VecDeque<StatusEntry>>,
    capacity: usize,
}

impl StatusLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn append(&self, message: impl Into<String>) {
        let entry = StatusEntry {
            message: message.into(),
            timestamp: Utc::now(),
        };
        info!("{}", entry.message);

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    pub fn snapshot(&self) -> Vec<StatusEntry> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
