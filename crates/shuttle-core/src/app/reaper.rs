//! Reaper - 放棄された claim と期限切れの defer を回収
//!
//! # フロー
//! 1. CLAIMED のうち、claim から liveness 以上経過し、かつ holder が
//!    パーティションロックをもう保持していないものを PENDING に戻す
//! 2. defer_until を過ぎた DEFERRED を PENDING に戻す
//!
//! liveness はパーティションごとに `min(claim_liveness, lock_ttl)`。
//! ロックが切れた後に claim だけが残り続けることはない。

use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::context::AppContext;
use crate::config::{DispatchConfig, PartitionConfig};
use crate::domain::{Actor, Partition, Posting, PostingState, Result, Transition};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapReport {
    /// CLAIMED -> PENDING.
    pub reverted: usize,
    /// DEFERRED -> PENDING.
    pub requeued: usize,
}

pub struct Reaper {
    ctx: AppContext,
    default_liveness: Duration,
    liveness: HashMap<Partition, Duration>,
}

impl Reaper {
    pub fn new(ctx: AppContext, dispatch: &DispatchConfig, partitions: &[PartitionConfig]) -> Self {
        let liveness = partitions
            .iter()
            .map(|p| (p.name.clone(), dispatch.claim_liveness.min(p.lock_ttl)))
            .collect();
        Self {
            ctx,
            default_liveness: dispatch.claim_liveness,
            liveness,
        }
    }

    pub fn liveness_for(&self, partition: &Partition) -> Duration {
        self.liveness
            .get(partition)
            .copied()
            .unwrap_or(self.default_liveness)
    }

    pub async fn reap(&self) -> Result<ReapReport> {
        let mut report = ReapReport::default();

        for posting in self.ctx.store.list_by_state(PostingState::Claimed).await? {
            if self.is_abandoned(&posting).await? {
                let t = Transition::new(
                    posting.id.clone(),
                    PostingState::Claimed,
                    PostingState::Pending,
                    Actor::Reaper,
                )
                .with_reason("claim abandoned");
                if self.apply(t).await? {
                    warn!(id = %posting.id, partition = %posting.partition, "reverted abandoned claim");
                    report.reverted += 1;
                }
            }
        }

        let now = self.ctx.clock.now();
        for posting in self.ctx.store.list_by_state(PostingState::Deferred).await? {
            let Some(until) = posting.defer_until else {
                continue;
            };
            if until > now {
                continue;
            }
            let t = Transition::new(
                posting.id.clone(),
                PostingState::Deferred,
                PostingState::Pending,
                Actor::Reaper,
            )
            .with_reason("defer window elapsed");
            if self.apply(t).await? {
                info!(id = %posting.id, defer_count = posting.defer_count, "requeued deferred posting");
                report.requeued += 1;
            }
        }

        Ok(report)
    }

    async fn is_abandoned(&self, posting: &Posting) -> Result<bool> {
        let Some(claim) = &posting.claim else {
            return Ok(true);
        };
        let age = self.ctx.clock.now() - claim.claimed_at;
        let liveness = chrono::Duration::from_std(self.liveness_for(&posting.partition))
            .unwrap_or(chrono::Duration::MAX);
        if age < liveness {
            return Ok(false);
        }
        let lock = posting.partition.lock_name();
        let held_by_claimant = self
            .ctx
            .locks
            .holder(&lock)
            .await?
            .is_some_and(|r| r.holder == claim.holder);
        Ok(!held_by_claimant)
    }

    /// Conflicts mean someone else moved the posting first; skip it.
    async fn apply(&self, t: Transition) -> Result<bool> {
        match self.ctx.store.transition(t).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_conflict() => {
                debug!(error = %e, "reaper lost a race");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}
