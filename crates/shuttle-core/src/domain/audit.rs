//! Operator override audit entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{AuditId, LockName, PostingId};
use super::lock::LockRecord;
use super::state::PostingState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AuditAction {
    ForceExpireLock {
        lock: LockName,
        previous: Option<LockRecord>,
    },
    ForceState {
        posting: PostingId,
        from: PostingState,
        to: PostingState,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditId,
    pub operator: String,
    pub reason: String,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub action: AuditAction,
}
