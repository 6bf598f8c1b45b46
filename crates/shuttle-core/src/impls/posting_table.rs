//! PostingTable - ストア実装が共有する同期的なテーブル
//!
//! 変更は「prepare（検証済みの新レコードを作る）→ commit（差し替える）」の二段階。
//! file store は間に journal 書き込みを挟む（write-ahead）。
//! prepare が失敗した場合はテーブルに一切触れない。

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::domain::queue::top_n;
use crate::domain::{
    DedupKey, Evidence, Partition, Posting, PostingId, PostingState, Result, ShuttleError,
    Transition,
};
use crate::ports::StateCounts;

#[derive(Debug, Default)]
pub(crate) struct PostingTable {
    postings: HashMap<PostingId, Posting>,
    secondary: HashMap<DedupKey, PostingId>,
}

impl PostingTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// The record that already owns this posting's primary or secondary identity.
    pub(crate) fn existing(&self, posting: &Posting) -> Option<&Posting> {
        if let Some(p) = self.postings.get(&posting.id) {
            return Some(p);
        }
        let by_primary_as_key = self
            .secondary
            .get(&DedupKey::from(&posting.id))
            .and_then(|id| self.postings.get(id));
        if by_primary_as_key.is_some() {
            return by_primary_as_key;
        }
        posting
            .secondary_key
            .as_ref()
            .and_then(|k| self.secondary.get(k))
            .and_then(|id| self.postings.get(id))
    }

    pub(crate) fn get(&self, id: &PostingId) -> Option<&Posting> {
        self.postings.get(id)
    }

    /// Validated copy of the record after `t`, not yet committed.
    pub(crate) fn prepare_transition(&self, t: &Transition, now: DateTime<Utc>) -> Result<Posting> {
        let mut next = self
            .postings
            .get(&t.id)
            .cloned()
            .ok_or_else(|| ShuttleError::NotFound(t.id.clone()))?;
        next.apply(t, now)?;
        Ok(next)
    }

    pub(crate) fn prepare_force(
        &self,
        id: &PostingId,
        to: PostingState,
        evidence: Option<Evidence>,
        reason: String,
        now: DateTime<Utc>,
    ) -> Result<Posting> {
        let mut next = self
            .postings
            .get(id)
            .cloned()
            .ok_or_else(|| ShuttleError::NotFound(id.clone()))?;
        next.force(to, evidence, reason, now)?;
        Ok(next)
    }

    /// Insert or replace a record, keeping the secondary index in step.
    pub(crate) fn commit(&mut self, posting: Posting) {
        if let Some(key) = &posting.secondary_key {
            self.secondary
                .entry(key.clone())
                .or_insert_with(|| posting.id.clone());
        }
        self.postings.insert(posting.id.clone(), posting);
    }

    pub(crate) fn remove(&mut self, id: &PostingId) -> Option<Posting> {
        let removed = self.postings.remove(id)?;
        if let Some(key) = &removed.secondary_key
            && self.secondary.get(key) == Some(id)
        {
            self.secondary.remove(key);
        }
        Some(removed)
    }

    pub(crate) fn list_actionable(&self, partition: &Partition, limit: usize) -> Vec<Posting> {
        let pending = self
            .postings
            .values()
            .filter(|p| &p.partition == partition && p.state.is_claimable())
            .cloned()
            .collect();
        top_n(pending, limit)
    }

    pub(crate) fn list_by_state(&self, state: PostingState) -> Vec<Posting> {
        let mut out: Vec<Posting> = self
            .postings
            .values()
            .filter(|p| p.state == state)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    pub(crate) fn count_by_state(&self, partition: &Partition) -> StateCounts {
        let mut counts = StateCounts::default();
        for p in self.postings.values().filter(|p| &p.partition == partition) {
            counts.add(p.state);
        }
        counts
    }

    pub(crate) fn len(&self) -> usize {
        self.postings.len()
    }

    pub(crate) fn records(&self) -> impl Iterator<Item = &Posting> {
        self.postings.values()
    }
}
