//! In-memory append-only logs (application tracker, audit log).

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{AuditEntry, Result};
use crate::ports::{ApplicationTracker, AuditLog, TrackerEntry};

/// Vec-backed log usable as either port.
pub struct MemoryLog<T> {
    entries: Mutex<Vec<T>>,
}

impl<T> MemoryLog<T> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }
}

impl<T> Default for MemoryLog<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> MemoryLog<T> {
    async fn push(&self, entry: T) {
        self.entries.lock().await.push(entry);
    }

    async fn all(&self) -> Vec<T> {
        self.entries.lock().await.clone()
    }
}

pub type MemoryTracker = MemoryLog<TrackerEntry>;
pub type MemoryAuditLog = MemoryLog<AuditEntry>;

#[async_trait]
impl ApplicationTracker for MemoryLog<TrackerEntry> {
    async fn append(&self, entry: TrackerEntry) -> Result<()> {
        self.push(entry).await;
        Ok(())
    }

    async fn entries(&self) -> Result<Vec<TrackerEntry>> {
        Ok(self.all().await)
    }
}

#[async_trait]
impl AuditLog for MemoryLog<AuditEntry> {
    async fn append(&self, entry: AuditEntry) -> Result<()> {
        self.push(entry).await;
        Ok(())
    }

    async fn entries(&self) -> Result<Vec<AuditEntry>> {
        Ok(self.all().await)
    }
}
