//! Status - オペレータ向けのキュー状態
//!
//! パーティションごとの件数・ロック保持者・上位 N 件と、全体の backlog tier を返す。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::context::AppContext;
use crate::config::PartitionConfig;
use crate::domain::queue::top_n;
use crate::domain::{LockRecord, Partition, PostingId, PostingState, Result};
use crate::ports::StateCounts;

/// Backlog pressure from the number of actionable postings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BacklogTier {
    Normal,
    High,
    Critical,
}

impl BacklogTier {
    pub fn for_backlog(actionable: usize) -> Self {
        match actionable {
            0..=100 => BacklogTier::Normal,
            101..=250 => BacklogTier::High,
            _ => BacklogTier::Critical,
        }
    }
}

impl fmt::Display for BacklogTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BacklogTier::Normal => "normal",
            BacklogTier::High => "high",
            BacklogTier::Critical => "critical",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: PostingId,
    pub score: u32,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionView {
    pub partition: Partition,
    pub enabled: bool,
    pub counts: StateCounts,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock: Option<LockRecord>,
    pub top: Vec<QueueEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub generated_at: DateTime<Utc>,
    pub backlog: BacklogTier,
    pub totals: StateCounts,
    pub partitions: Vec<PartitionView>,
    /// Postings parked in DEFERRED waiting for an operator.
    pub parked: Vec<PostingId>,
}

pub struct StatusQuery {
    ctx: AppContext,
    partitions: Vec<PartitionConfig>,
}

impl StatusQuery {
    pub fn new(ctx: AppContext, partitions: Vec<PartitionConfig>) -> Self {
        Self { ctx, partitions }
    }

    pub async fn report(&self, top: usize) -> Result<StatusReport> {
        let mut totals = StateCounts::default();
        let mut views = Vec::with_capacity(self.partitions.len());

        for config in &self.partitions {
            let counts = self.ctx.store.count_by_state(&config.name).await?;
            totals += counts;
            let lock = self.ctx.locks.holder(&config.name.lock_name()).await?;
            let entries = top_n(self.ctx.store.list_actionable(&config.name, top).await?, top)
                .into_iter()
                .map(|p| QueueEntry {
                    id: p.id,
                    score: p.score,
                    url: p.url,
                    company: p.meta.company,
                    title: p.meta.title,
                })
                .collect();
            views.push(PartitionView {
                partition: config.name.clone(),
                enabled: config.enabled,
                counts,
                lock,
                top: entries,
            });
        }

        let parked = self
            .ctx
            .store
            .list_by_state(PostingState::Deferred)
            .await?
            .into_iter()
            .filter(|p| p.defer_until.is_none())
            .map(|p| p.id)
            .collect();

        Ok(StatusReport {
            generated_at: self.ctx.clock.now(),
            backlog: BacklogTier::for_backlog(totals.pending),
            totals,
            partitions: views,
            parked,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ShuttleConfig;
    use crate::domain::Posting;
    use crate::ports::{Clock, FixedClock};
    use chrono::TimeZone;
    use rstest::rstest;
    use std::sync::Arc;
    use std::time::Duration;

    #[rstest]
    #[case::empty(0, BacklogTier::Normal)]
    #[case::edge_normal(100, BacklogTier::Normal)]
    #[case::high(101, BacklogTier::High)]
    #[case::edge_high(250, BacklogTier::High)]
    #[case::critical(251, BacklogTier::Critical)]
    fn backlog_tiers(#[case] actionable: usize, #[case] tier: BacklogTier) {
        assert_eq!(BacklogTier::for_backlog(actionable), tier);
    }

    #[tokio::test]
    async fn report_lists_counts_locks_and_top() {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2026, 3, 3, 3, 0, 0).unwrap());
        let ctx = AppContext::in_memory(Arc::new(clock.clone()));
        for (id, score) in [("l1", 10), ("l2", 80), ("l3", 50)] {
            ctx.store
                .upsert(Posting::new(id.into(), format!("https://jobs.lever.co/x/{id}"), "lever".into(), score, clock.now()))
                .await
                .unwrap();
        }
        ctx.locks
            .try_acquire(&Partition::new("lever").lock_name(), &"run-9".into(), Duration::from_secs(60))
            .await
            .unwrap();

        let cfg = ShuttleConfig::default();
        let report = StatusQuery::new(ctx, cfg.partitions).report(2).await.unwrap();

        assert_eq!(report.backlog, BacklogTier::Normal);
        assert_eq!(report.totals.pending, 3);
        let lever = report
            .partitions
            .iter()
            .find(|v| v.partition.as_str() == "lever")
            .unwrap();
        assert_eq!(lever.counts.pending, 3);
        assert_eq!(lever.lock.as_ref().unwrap().holder.as_str(), "run-9");
        let ids: Vec<_> = lever.top.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["l2", "l3"]);
    }
}
