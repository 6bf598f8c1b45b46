//! JSON Lines logs (application tracker, audit log).

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use tokio::sync::Mutex;

use super::journal::Journal;
use crate::domain::{AuditEntry, Result};
use crate::ports::{ApplicationTracker, AuditLog, TrackerEntry};

struct LogState<T> {
    cached: Vec<T>,
    journal: Journal<T>,
}

/// Append-only file log usable as either port. Never compacted.
pub struct FileLog<T> {
    state: Mutex<LogState<T>>,
}

impl<T: Serialize + DeserializeOwned + Clone + Send> FileLog<T> {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let (journal, cached) = Journal::open(path).await?;
        Ok(Self {
            state: Mutex::new(LogState { cached, journal }),
        })
    }

    async fn push(&self, entry: T) -> Result<()> {
        let mut state = self.state.lock().await;
        state.journal.append(&entry).await?;
        state.cached.push(entry);
        Ok(())
    }

    async fn all(&self) -> Vec<T> {
        self.state.lock().await.cached.clone()
    }
}

pub type FileTracker = FileLog<TrackerEntry>;
pub type FileAuditLog = FileLog<AuditEntry>;

#[async_trait]
impl ApplicationTracker for FileLog<TrackerEntry> {
    async fn append(&self, entry: TrackerEntry) -> Result<()> {
        self.push(entry).await
    }

    async fn entries(&self) -> Result<Vec<TrackerEntry>> {
        Ok(self.all().await)
    }
}

#[async_trait]
impl AuditLog for FileLog<AuditEntry> {
    async fn append(&self, entry: AuditEntry) -> Result<()> {
        self.push(entry).await
    }

    async fn entries(&self) -> Result<Vec<AuditEntry>> {
        Ok(self.all().await)
    }
}
