//! Journal-backed DedupIndex.
//!
//! 各行は「そのキーの最新エントリ」。再生時は後勝ち。

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use super::journal::Journal;
use crate::domain::{DedupEntry, DedupKey, DedupLookup, DedupOutcome, PostingId, Result};
use crate::ports::{Clock, DedupIndex};

struct DedupState {
    entries: HashMap<DedupKey, DedupEntry>,
    journal: Journal<DedupEntry>,
}

pub struct FileDedupIndex {
    state: Mutex<DedupState>,
    clock: Arc<dyn Clock>,
}

impl FileDedupIndex {
    pub async fn open(path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Result<Self> {
        let (journal, records) = Journal::<DedupEntry>::open(path).await?;
        let mut entries = HashMap::new();
        for entry in records {
            entries.insert(entry.key.clone(), entry);
        }
        info!(path = %journal.path().display(), keys = entries.len(), "dedup index replayed");
        Ok(Self {
            state: Mutex::new(DedupState { entries, journal }),
            clock,
        })
    }

    /// Rewrite the journal with one line per key.
    pub async fn compact(&self) -> Result<usize> {
        let mut state = self.state.lock().await;
        let DedupState { entries, journal } = &mut *state;
        journal.compact(entries.values()).await?;
        Ok(journal.records())
    }
}

#[async_trait]
impl DedupIndex for FileDedupIndex {
    async fn lookup(&self, key: &DedupKey) -> Result<DedupLookup> {
        Ok(match self.state.lock().await.entries.get(key) {
            Some(entry) => DedupLookup::Seen(entry.clone()),
            None => DedupLookup::New,
        })
    }

    async fn record(&self, key: &DedupKey, posting: &PostingId, outcome: DedupOutcome) -> Result<()> {
        let mut state = self.state.lock().await;
        if state
            .entries
            .get(key)
            .is_some_and(|e| e.outcome == outcome && &e.posting == posting)
        {
            return Ok(());
        }
        let entry = DedupEntry {
            key: key.clone(),
            posting: posting.clone(),
            outcome,
            recorded_at: self.clock.now(),
        };
        state.journal.append(&entry).await?;
        state.entries.insert(key.clone(), entry);
        Ok(())
    }
}
