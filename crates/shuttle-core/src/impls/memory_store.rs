//! In-memory PostingStore.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::posting_table::PostingTable;
use crate::domain::{Evidence, Partition, Posting, PostingId, PostingState, Result, Transition};
use crate::ports::{Clock, PostingStore, StateCounts, UpsertResult};

/// PostingStore backed by a table under one async mutex.
pub struct MemoryPostingStore {
    table: Mutex<PostingTable>,
    clock: Arc<dyn Clock>,
}

impl MemoryPostingStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            table: Mutex::new(PostingTable::new()),
            clock,
        }
    }
}

#[async_trait]
impl PostingStore for MemoryPostingStore {
    async fn upsert(&self, posting: Posting) -> Result<UpsertResult> {
        let mut table = self.table.lock().await;
        if let Some(existing) = table.existing(&posting) {
            return Ok(UpsertResult::Existing(existing.clone()));
        }
        table.commit(posting.clone());
        Ok(UpsertResult::Inserted(posting))
    }

    async fn get(&self, id: &PostingId) -> Result<Option<Posting>> {
        Ok(self.table.lock().await.get(id).cloned())
    }

    async fn transition(&self, t: Transition) -> Result<Posting> {
        let mut table = self.table.lock().await;
        let next = table.prepare_transition(&t, self.clock.now())?;
        table.commit(next.clone());
        Ok(next)
    }

    async fn list_actionable(&self, partition: &Partition, limit: usize) -> Result<Vec<Posting>> {
        Ok(self.table.lock().await.list_actionable(partition, limit))
    }

    async fn list_by_state(&self, state: PostingState) -> Result<Vec<Posting>> {
        Ok(self.table.lock().await.list_by_state(state))
    }

    async fn count_by_state(&self, partition: &Partition) -> Result<StateCounts> {
        Ok(self.table.lock().await.count_by_state(partition))
    }

    async fn force_state(
        &self,
        id: &PostingId,
        to: PostingState,
        evidence: Option<Evidence>,
        reason: String,
    ) -> Result<Posting> {
        let mut table = self.table.lock().await;
        let next = table.prepare_force(id, to, evidence, reason, self.clock.now())?;
        table.commit(next.clone());
        Ok(next)
    }

    async fn remove_if(&self, id: &PostingId, expected: PostingState) -> Result<bool> {
        let mut table = self.table.lock().await;
        if !table.get(id).is_some_and(|p| p.state == expected) {
            return Ok(false);
        }
        Ok(table.remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Actor, ShuttleError};
    use crate::ports::FixedClock;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 8, 0, 0).unwrap()
    }

    fn store() -> (MemoryPostingStore, FixedClock) {
        let clock = FixedClock::new(t0());
        (MemoryPostingStore::new(Arc::new(clock.clone())), clock)
    }

    fn posting(id: &str, score: u32) -> Posting {
        Posting::new(id.into(), id, "greenhouse".into(), score, t0())
    }

    fn claim(id: &str, holder: &str) -> Transition {
        Transition::new(
            id.into(),
            PostingState::Pending,
            PostingState::Claimed,
            Actor::Dispatcher(holder.into()),
        )
    }

    #[tokio::test]
    async fn upsert_is_idempotent() {
        let (store, _) = store();
        assert!(store.upsert(posting("a", 10)).await.unwrap().is_inserted());
        let again = store.upsert(posting("a", 99)).await.unwrap();
        assert!(!again.is_inserted());
        assert_eq!(again.posting().score, 10);
    }

    #[tokio::test]
    async fn only_one_claim_wins() {
        let (store, _) = store();
        store.upsert(posting("a", 10)).await.unwrap();

        store.transition(claim("a", "run-1")).await.unwrap();
        let err = store.transition(claim("a", "run-2")).await.unwrap_err();
        assert!(matches!(
            err,
            ShuttleError::StateConflict {
                actual: PostingState::Claimed,
                ..
            }
        ));
        let p = store.get(&"a".into()).await.unwrap().unwrap();
        assert_eq!(p.claim.unwrap().holder.as_str(), "run-1");
    }

    #[tokio::test]
    async fn transition_stamps_clock_time() {
        let (store, clock) = store();
        store.upsert(posting("a", 10)).await.unwrap();
        clock.advance(Duration::minutes(3));
        let p = store.transition(claim("a", "run-1")).await.unwrap();
        assert_eq!(p.state_changed_at, t0() + Duration::minutes(3));
        assert_eq!(p.claim.unwrap().claimed_at, t0() + Duration::minutes(3));
    }

    #[tokio::test]
    async fn actionable_excludes_claimed_and_other_partitions() {
        let (store, _) = store();
        store.upsert(posting("a", 10)).await.unwrap();
        store.upsert(posting("b", 20)).await.unwrap();
        store
            .upsert(Posting::new("c".into(), "c", "lever".into(), 99, t0()))
            .await
            .unwrap();
        store.transition(claim("b", "run-1")).await.unwrap();

        let top = store
            .list_actionable(&"greenhouse".into(), 10)
            .await
            .unwrap();
        let ids: Vec<_> = top.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a"]);

        let counts = store.count_by_state(&"greenhouse".into()).await.unwrap();
        assert_eq!((counts.pending, counts.claimed), (1, 1));
    }

    #[tokio::test]
    async fn remove_if_checks_state() {
        let (store, _) = store();
        store.upsert(posting("a", 10)).await.unwrap();
        assert!(!store.remove_if(&"a".into(), PostingState::Claimed).await.unwrap());
        assert!(store.remove_if(&"a".into(), PostingState::Pending).await.unwrap());
        assert!(store.get(&"a".into()).await.unwrap().is_none());
    }
}
