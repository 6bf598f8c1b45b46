//! Journal-backed PostingStore.
//!
//! 全変更はまず journal に追記し（write-ahead）、成功してからテーブルに反映する。
//! 起動時は journal を再生してテーブルを再構築する。レコード単位で原子的なので、
//! クラッシュしても半端に更新されたレコードは残らない。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::journal::{Journal, JournalError};
use super::posting_table::PostingTable;
use crate::domain::{Evidence, Partition, Posting, PostingId, PostingState, Result, Transition};
use crate::ports::{Clock, PostingStore, StateCounts, UpsertResult};

/// One journal line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum PostingRecord {
    Put { posting: Posting },
    Remove { id: PostingId },
}

struct FileState {
    table: PostingTable,
    journal: Journal<PostingRecord>,
}

pub struct FilePostingStore {
    state: Mutex<FileState>,
    clock: Arc<dyn Clock>,
    /// Compact when the journal holds this many times more lines than live records.
    compact_ratio: usize,
}

impl FilePostingStore {
    pub const DEFAULT_COMPACT_RATIO: usize = 4;

    pub async fn open(path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Result<Self> {
        let (journal, records) = Journal::<PostingRecord>::open(path).await?;
        let mut table = PostingTable::new();
        for record in records {
            match record {
                PostingRecord::Put { posting } => table.commit(posting),
                PostingRecord::Remove { id } => {
                    table.remove(&id);
                }
            }
        }
        info!(
            path = %journal.path().display(),
            postings = table.len(),
            journal_lines = journal.records(),
            "posting store replayed"
        );
        Ok(Self {
            state: Mutex::new(FileState { table, journal }),
            clock,
            compact_ratio: Self::DEFAULT_COMPACT_RATIO,
        })
    }

    pub fn with_compact_ratio(mut self, ratio: usize) -> Self {
        self.compact_ratio = ratio.max(2);
        self
    }

    /// Rewrite the journal as one `Put` per live record.
    pub async fn compact(&self) -> Result<CompactionReport> {
        let mut state = self.state.lock().await;
        compact_locked(&mut state).await.map_err(Into::into)
    }

    async fn write(&self, state: &mut FileState, record: PostingRecord) -> Result<()> {
        state.journal.append(&record).await?;
        match record {
            PostingRecord::Put { posting } => state.table.commit(posting),
            PostingRecord::Remove { id } => {
                state.table.remove(&id);
            }
        }

        let live = state.table.len().max(1);
        if state.journal.records() > live * self.compact_ratio && state.journal.records() > 64 {
            let report = compact_locked(state).await?;
            debug!(before = report.lines_before, after = report.lines_after, "auto-compacted posting journal");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CompactionReport {
    pub lines_before: usize,
    pub lines_after: usize,
}

async fn compact_locked(state: &mut FileState) -> Result<CompactionReport, JournalError> {
    let lines_before = state.journal.records();
    let snapshot: Vec<PostingRecord> = state
        .table
        .records()
        .map(|p| PostingRecord::Put { posting: p.clone() })
        .collect();
    state.journal.compact(snapshot.iter()).await?;
    Ok(CompactionReport {
        lines_before,
        lines_after: state.journal.records(),
    })
}

#[async_trait]
impl PostingStore for FilePostingStore {
    async fn upsert(&self, posting: Posting) -> Result<UpsertResult> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.table.existing(&posting) {
            return Ok(UpsertResult::Existing(existing.clone()));
        }
        self.write(
            &mut state,
            PostingRecord::Put {
                posting: posting.clone(),
            },
        )
        .await?;
        Ok(UpsertResult::Inserted(posting))
    }

    async fn get(&self, id: &PostingId) -> Result<Option<Posting>> {
        Ok(self.state.lock().await.table.get(id).cloned())
    }

    async fn transition(&self, t: Transition) -> Result<Posting> {
        let mut state = self.state.lock().await;
        let next = state.table.prepare_transition(&t, self.clock.now())?;
        self.write(
            &mut state,
            PostingRecord::Put {
                posting: next.clone(),
            },
        )
        .await?;
        Ok(next)
    }

    async fn list_actionable(&self, partition: &Partition, limit: usize) -> Result<Vec<Posting>> {
        Ok(self.state.lock().await.table.list_actionable(partition, limit))
    }

    async fn list_by_state(&self, state: PostingState) -> Result<Vec<Posting>> {
        Ok(self.state.lock().await.table.list_by_state(state))
    }

    async fn count_by_state(&self, partition: &Partition) -> Result<StateCounts> {
        Ok(self.state.lock().await.table.count_by_state(partition))
    }

    async fn force_state(
        &self,
        id: &PostingId,
        to: PostingState,
        evidence: Option<Evidence>,
        reason: String,
    ) -> Result<Posting> {
        let mut state = self.state.lock().await;
        let next = state
            .table
            .prepare_force(id, to, evidence, reason, self.clock.now())?;
        self.write(
            &mut state,
            PostingRecord::Put {
                posting: next.clone(),
            },
        )
        .await?;
        Ok(next)
    }

    async fn remove_if(&self, id: &PostingId, expected: PostingState) -> Result<bool> {
        let mut state = self.state.lock().await;
        if !state.table.get(id).is_some_and(|p| p.state == expected) {
            return Ok(false);
        }
        self.write(&mut state, PostingRecord::Remove { id: id.clone() })
            .await?;
        Ok(true)
    }
}
