//! LockManager port - 名前付き・期限付きの相互排他
//!
//! holder は不透明な ID で、Lock Manager はプロセスかどうかを問わない。
//! 生死判定は期限（expires_at）のみ。

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::{HolderId, LockName, LockRecord, Result};

#[async_trait]
pub trait LockManager: Send + Sync {
    /// Atomic compare-and-set: succeeds when the lock is free or expired.
    async fn try_acquire(&self, name: &LockName, holder: &HolderId, ttl: Duration) -> Result<bool>;

    /// Release if `holder` is the current holder; otherwise a no-op.
    async fn release(&self, name: &LockName, holder: &HolderId) -> Result<()>;

    async fn is_held(&self, name: &LockName) -> Result<bool>;

    /// Extend the expiry. Only the live holder may renew.
    async fn renew(&self, name: &LockName, holder: &HolderId, ttl: Duration) -> Result<bool>;

    /// The live record, if any.
    async fn holder(&self, name: &LockName) -> Result<Option<LockRecord>>;

    /// Operator escape hatch: drop the lock regardless of holder.
    async fn force_expire(&self, name: &LockName) -> Result<Option<LockRecord>>;

    /// All live locks.
    async fn snapshot(&self) -> Result<Vec<LockRecord>>;
}
