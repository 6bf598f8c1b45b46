//! StaleLinkSweep - 掲載終了した PENDING posting の掃除
//!
//! LinkChecker が DEAD と判定した PENDING posting を削除し、dedup に Skipped を記録する。
//! 判定できなかったもの（エラー）は残す。削除は `remove_if(PENDING)` なので
//! 途中で claim されたものには触れない。

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::context::AppContext;
use crate::domain::{DedupKey, DedupOutcome, Liveness, PostingState, Result};
use crate::ports::LinkChecker;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub checked: usize,
    pub removed: usize,
    pub errors: usize,
}

pub struct StaleLinkSweep {
    ctx: AppContext,
    checker: Arc<dyn LinkChecker>,
}

impl StaleLinkSweep {
    pub fn new(ctx: AppContext, checker: Arc<dyn LinkChecker>) -> Self {
        Self { ctx, checker }
    }

    /// Check up to `limit` PENDING postings, oldest first.
    pub async fn sweep(&self, limit: usize) -> Result<SweepReport> {
        let mut pending = self.ctx.store.list_by_state(PostingState::Pending).await?;
        pending.sort_by(|a, b| a.discovered_at.cmp(&b.discovered_at).then_with(|| a.id.cmp(&b.id)));

        let mut report = SweepReport::default();
        for posting in pending.into_iter().take(limit) {
            report.checked += 1;
            let reason = match self.checker.check(&posting.url).await {
                Ok(Liveness::Alive) => continue,
                Ok(Liveness::Dead { reason }) => reason,
                Err(e) => {
                    debug!(id = %posting.id, error = %e, "link check failed");
                    report.errors += 1;
                    continue;
                }
            };
            if !self.ctx.store.remove_if(&posting.id, PostingState::Pending).await? {
                continue;
            }
            self.ctx
                .dedup
                .record(&DedupKey::from(&posting.id), &posting.id, DedupOutcome::Skipped)
                .await?;
            if let Some(secondary) = &posting.secondary_key {
                self.ctx
                    .dedup
                    .record(secondary, &posting.id, DedupOutcome::Skipped)
                    .await?;
            }
            info!(id = %posting.id, %reason, "removed stale posting");
            report.removed += 1;
        }

        if report.errors > 0 {
            warn!(errors = report.errors, "some links could not be checked");
        }
        Ok(report)
    }
}
