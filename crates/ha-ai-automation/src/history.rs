//! Recently generated automations
//!
//! Every generated automation is kept here, saved or not, so the panel can
//! still show the YAML when persisting it failed. The history is bounded;
//! the oldest record is dropped first.

use std::collections::VecDeque;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

/// One generated automation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRecord {
    /// ULID of the create request
    pub request_id: String,
    pub description: String,
    pub automation_id: String,
    /// The automation as an `automations.yaml` list item
    pub yaml: String,
    pub saved: bool,
    pub created_at: DateTime<Utc>,
}

/// Bounded, newest-first history keyed by request id
#[derive(Debug)]
pub struct GenerationHistory {
    capacity: usize,
    records: RwLock<VecDeque<GenerationRecord>>,
}

impl GenerationHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// A panic while the lock was held leaves the records themselves intact,
    /// so a poisoned lock is used as is
    fn read(&self) -> RwLockReadGuard<'_, VecDeque<GenerationRecord>> {
        self.records.read().unwrap_or_else(|poisoned| {
            warn!("Generation history lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, VecDeque<GenerationRecord>> {
        self.records.write().unwrap_or_else(|poisoned| {
            warn!("Generation history lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn record(&self, record: GenerationRecord) {
        debug!("Recording generation {}", record.request_id);
        let mut records = self.write();
        records.push_front(record);
        records.truncate(self.capacity);
    }

    /// Update the saved flag; false when the record is gone
    pub fn set_saved(&self, request_id: &str, saved: bool) -> bool {
        match self.write().iter_mut().find(|r| r.request_id == request_id) {
            Some(record) => {
                record.saved = saved;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, request_id: &str) -> Option<GenerationRecord> {
        self.read()
            .iter()
            .find(|r| r.request_id == request_id)
            .cloned()
    }

    pub fn latest(&self) -> Option<GenerationRecord> {
        self.read().front().cloned()
    }

    /// All records, newest first
    pub fn list(&self) -> Vec<GenerationRecord> {
        self.read().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
