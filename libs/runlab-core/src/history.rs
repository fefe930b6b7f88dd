/// Submission History
///
/// Fixed-capacity ring buffer of finished submissions. The oldest record is
/// evicted first once the buffer is full.
use runlab_common::types::SubmissionRecord;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

#[derive(Debug)]
pub struct SubmissionHistory {
    capacity: usize,
    records: Mutex<VecDeque<SubmissionRecord>>,
}

impl Default for SubmissionHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl SubmissionHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<SubmissionRecord>> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn push(&self, record: SubmissionRecord) {
        let mut records = self.lock();
        while records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn get(&self, id: &Uuid) -> Option<SubmissionRecord> {
        self.lock().iter().find(|r| &r.id == id).cloned()
    }

    /// Up to `limit` records, newest first.
    pub fn recent(&self, limit: usize) -> Vec<SubmissionRecord> {
        self.lock().iter().rev().take(limit).cloned().collect()
    }
}
