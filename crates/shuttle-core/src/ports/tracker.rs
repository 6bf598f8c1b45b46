//! ApplicationTracker port - 提出済み応募の記録

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Partition, Posting, PostingId, Result};

/// One row of the application tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerEntry {
    pub posting: PostingId,
    pub partition: Partition,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub applied_at: DateTime<Utc>,
    pub evidence: String,
}

impl TrackerEntry {
    /// Build from an APPLIED posting. `None` if the posting carries no evidence.
    pub fn from_applied(posting: &Posting) -> Option<Self> {
        let evidence = posting.evidence.as_ref()?;
        Some(Self {
            posting: posting.id.clone(),
            partition: posting.partition.clone(),
            url: posting.url.clone(),
            company: posting.meta.company.clone(),
            title: posting.meta.title.clone(),
            applied_at: posting.state_changed_at,
            evidence: evidence.summary.clone(),
        })
    }
}

#[async_trait]
pub trait ApplicationTracker: Send + Sync {
    async fn append(&self, entry: TrackerEntry) -> Result<()>;

    async fn entries(&self) -> Result<Vec<TrackerEntry>>;
}
