//! Lock records held by the Lock Manager.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{HolderId, LockName};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub name: LockName,
    pub holder: HolderId,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl LockRecord {
    /// A lock is live strictly before its expiry instant.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    pub fn is_held_by(&self, holder: &HolderId, now: DateTime<Utc>) -> bool {
        self.is_live(now) && &self.holder == holder
    }
}
