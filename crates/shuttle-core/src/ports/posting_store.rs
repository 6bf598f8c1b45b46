//! PostingStore port - posting の正本
//!
//! # 保証すること
//! - identity（主キー・副キー）の一意性。重複 upsert は既存を返す no-op
//! - `transition` は from 状態に対する compare-and-set（レコード単位で原子的）
//! - `state == Applied ⇒ evidence.is_some()`
//!
//! 実装: `impls::MemoryPostingStore`（テスト・開発用）、`impls::FilePostingStore`（journal）

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{Evidence, Partition, Posting, PostingId, PostingState, Result, Transition};

/// Result of an insert attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertResult {
    Inserted(Posting),
    /// The identity already exists; nothing was written.
    Existing(Posting),
}

impl UpsertResult {
    pub fn posting(&self) -> &Posting {
        match self {
            UpsertResult::Inserted(p) | UpsertResult::Existing(p) => p,
        }
    }

    pub fn is_inserted(&self) -> bool {
        matches!(self, UpsertResult::Inserted(_))
    }
}

/// Number of postings per state in one partition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCounts {
    pub pending: usize,
    pub claimed: usize,
    pub applied: usize,
    pub skipped: usize,
    pub deferred: usize,
}

impl StateCounts {
    pub fn add(&mut self, state: PostingState) {
        match state {
            PostingState::Pending => self.pending += 1,
            PostingState::Claimed => self.claimed += 1,
            PostingState::Applied => self.applied += 1,
            PostingState::Skipped => self.skipped += 1,
            PostingState::Deferred => self.deferred += 1,
        }
    }

    pub fn get(&self, state: PostingState) -> usize {
        match state {
            PostingState::Pending => self.pending,
            PostingState::Claimed => self.claimed,
            PostingState::Applied => self.applied,
            PostingState::Skipped => self.skipped,
            PostingState::Deferred => self.deferred,
        }
    }

    pub fn total(&self) -> usize {
        self.pending + self.claimed + self.applied + self.skipped + self.deferred
    }
}

impl std::ops::AddAssign for StateCounts {
    fn add_assign(&mut self, other: Self) {
        self.pending += other.pending;
        self.claimed += other.claimed;
        self.applied += other.applied;
        self.skipped += other.skipped;
        self.deferred += other.deferred;
    }
}

#[async_trait]
pub trait PostingStore: Send + Sync {
    /// Insert unless the primary id or the secondary key already exists.
    async fn upsert(&self, posting: Posting) -> Result<UpsertResult>;

    async fn get(&self, id: &PostingId) -> Result<Option<Posting>>;

    /// Compare-and-set transition. `StateConflict` when the current state is not `t.from`.
    async fn transition(&self, t: Transition) -> Result<Posting>;

    /// PENDING postings of a partition in queue order.
    async fn list_actionable(&self, partition: &Partition, limit: usize) -> Result<Vec<Posting>>;

    async fn list_by_state(&self, state: PostingState) -> Result<Vec<Posting>>;

    async fn count_by_state(&self, partition: &Partition) -> Result<StateCounts>;

    /// Operator override. Never produces CLAIMED.
    async fn force_state(
        &self,
        id: &PostingId,
        to: PostingState,
        evidence: Option<Evidence>,
        reason: String,
    ) -> Result<Posting>;

    /// Delete a posting only if it is still in `expected`. Returns whether it was removed.
    async fn remove_if(&self, id: &PostingId, expected: PostingState) -> Result<bool>;
}
