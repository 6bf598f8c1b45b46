//! AuditLog port - operator override の記録

use async_trait::async_trait;

use crate::domain::{AuditEntry, Result};

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append(&self, entry: AuditEntry) -> Result<()>;

    async fn entries(&self) -> Result<Vec<AuditEntry>>;
}
