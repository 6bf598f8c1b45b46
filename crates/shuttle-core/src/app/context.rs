//! AppContext - ports の束
//!
//! すべてのコンポーネントはこの束を clone して持つ（中身は Arc）。
//! コンポーネント間の調整は Store / DedupIndex / LockManager を通してのみ行う。

use std::path::Path;
use std::sync::Arc;

use crate::domain::Result;
use crate::impls::{
    FileAuditLog, FileDedupIndex, FilePostingStore, FileTracker, MemoryAuditLog,
    MemoryDedupIndex, MemoryLockManager, MemoryPostingStore, MemoryTracker,
};
use crate::ports::{
    ApplicationTracker, AuditLog, Clock, DedupIndex, IdGenerator, LockManager, PostingStore,
    UlidGenerator,
};

pub const POSTINGS_JOURNAL: &str = "postings.jsonl";
pub const DEDUP_JOURNAL: &str = "dedup.jsonl";
pub const TRACKER_LOG: &str = "applications.jsonl";
pub const AUDIT_LOG: &str = "audit.jsonl";

#[derive(Clone)]
pub struct AppContext {
    pub store: Arc<dyn PostingStore>,
    pub dedup: Arc<dyn DedupIndex>,
    pub locks: Arc<dyn LockManager>,
    pub tracker: Arc<dyn ApplicationTracker>,
    pub audit: Arc<dyn AuditLog>,
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdGenerator>,
}

impl AppContext {
    /// Everything in memory.
    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        Self {
            store: Arc::new(MemoryPostingStore::new(clock.clone())),
            dedup: Arc::new(MemoryDedupIndex::new(clock.clone())),
            locks: Arc::new(MemoryLockManager::new(clock.clone())),
            tracker: Arc::new(MemoryTracker::new()),
            audit: Arc::new(MemoryAuditLog::new()),
            ids: Arc::new(UlidGenerator::new(clock.clone())),
            clock,
        }
    }

    /// Journals under `state_dir`; locks stay in memory.
    pub async fn file_backed(state_dir: &Path, clock: Arc<dyn Clock>) -> Result<FileBacked> {
        let store = Arc::new(FilePostingStore::open(state_dir.join(POSTINGS_JOURNAL), clock.clone()).await?);
        let dedup = Arc::new(FileDedupIndex::open(state_dir.join(DEDUP_JOURNAL), clock.clone()).await?);
        let tracker = Arc::new(FileTracker::open(state_dir.join(TRACKER_LOG)).await?);
        let audit = Arc::new(FileAuditLog::open(state_dir.join(AUDIT_LOG)).await?);

        let context = Self {
            store: store.clone(),
            dedup: dedup.clone(),
            locks: Arc::new(MemoryLockManager::new(clock.clone())),
            tracker,
            audit,
            ids: Arc::new(UlidGenerator::new(clock.clone())),
            clock,
        };
        Ok(FileBacked {
            context,
            store,
            dedup,
        })
    }
}

/// A file-backed context plus concrete handles for compaction.
pub struct FileBacked {
    pub context: AppContext,
    pub store: Arc<FilePostingStore>,
    pub dedup: Arc<FileDedupIndex>,
}
