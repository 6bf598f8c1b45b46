//! In-memory LockManager.
//!
//! 取得は一つの mutex の内側での compare-and-set（holder + 期限）。
//! 期限切れのレコードは取得時に上書きされ、読み取り時には存在しないものとして扱う。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::{HolderId, LockName, LockRecord, Result, ShuttleError};
use crate::ports::{Clock, LockManager};

pub struct MemoryLockManager {
    locks: Mutex<HashMap<LockName, LockRecord>>,
    clock: Arc<dyn Clock>,
}

impl MemoryLockManager {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            clock,
        }
    }

    fn expiry(now: DateTime<Utc>, ttl: Duration) -> Result<DateTime<Utc>> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| ShuttleError::Config(format!("lock ttl out of range: {e}")))?;
        now.checked_add_signed(ttl)
            .ok_or_else(|| ShuttleError::Config("lock ttl overflows the clock".into()))
    }
}

#[async_trait]
impl LockManager for MemoryLockManager {
    async fn try_acquire(&self, name: &LockName, holder: &HolderId, ttl: Duration) -> Result<bool> {
        let now = self.clock.now();
        let expires_at = Self::expiry(now, ttl)?;
        let mut locks = self.locks.lock().await;

        if let Some(current) = locks.get(name)
            && current.is_live(now)
        {
            debug!(lock = %name, holder = %current.holder, "lock is held");
            return Ok(false);
        }

        locks.insert(
            name.clone(),
            LockRecord {
                name: name.clone(),
                holder: holder.clone(),
                acquired_at: now,
                expires_at,
            },
        );
        Ok(true)
    }

    async fn release(&self, name: &LockName, holder: &HolderId) -> Result<()> {
        let mut locks = self.locks.lock().await;
        if locks.get(name).is_some_and(|r| &r.holder == holder) {
            locks.remove(name);
        }
        Ok(())
    }

    async fn is_held(&self, name: &LockName) -> Result<bool> {
        let now = self.clock.now();
        Ok(self
            .locks
            .lock()
            .await
            .get(name)
            .is_some_and(|r| r.is_live(now)))
    }

    async fn renew(&self, name: &LockName, holder: &HolderId, ttl: Duration) -> Result<bool> {
        let now = self.clock.now();
        let expires_at = Self::expiry(now, ttl)?;
        let mut locks = self.locks.lock().await;
        match locks.get_mut(name) {
            Some(record) if record.is_held_by(holder, now) => {
                record.expires_at = expires_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn holder(&self, name: &LockName) -> Result<Option<LockRecord>> {
        let now = self.clock.now();
        Ok(self
            .locks
            .lock()
            .await
            .get(name)
            .filter(|r| r.is_live(now))
            .cloned())
    }

    async fn force_expire(&self, name: &LockName) -> Result<Option<LockRecord>> {
        Ok(self.locks.lock().await.remove(name))
    }

    async fn snapshot(&self) -> Result<Vec<LockRecord>> {
        let now = self.clock.now();
        let mut live: Vec<LockRecord> = self
            .locks
            .lock()
            .await
            .values()
            .filter(|r| r.is_live(now))
            .cloned()
            .collect();
        live.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(live)
    }
}
