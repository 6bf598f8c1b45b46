//! In-memory DedupIndex.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::domain::{DedupEntry, DedupKey, DedupLookup, DedupOutcome, PostingId, Result};
use crate::ports::{Clock, DedupIndex};

pub struct MemoryDedupIndex {
    entries: Mutex<HashMap<DedupKey, DedupEntry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryDedupIndex {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }
}

#[async_trait]
impl DedupIndex for MemoryDedupIndex {
    async fn lookup(&self, key: &DedupKey) -> Result<DedupLookup> {
        Ok(match self.entries.lock().await.get(key) {
            Some(entry) => DedupLookup::Seen(entry.clone()),
            None => DedupLookup::New,
        })
    }

    async fn record(&self, key: &DedupKey, posting: &PostingId, outcome: DedupOutcome) -> Result<()> {
        let entry = DedupEntry {
            key: key.clone(),
            posting: posting.clone(),
            outcome,
            recorded_at: self.clock.now(),
        };
        self.entries.lock().await.insert(key.clone(), entry);
        Ok(())
    }
}
