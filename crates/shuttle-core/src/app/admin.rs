//! Admin - 監査付きのオペレータ操作
//!
//! - ロックの強制失効
//! - posting の状態の強制変更（CLAIMED 以外）
//!
//! どちらも実行前に AuditLog へ記録する。記録できなければ操作しない。

use tracing::{info, warn};

use super::context::AppContext;
use crate::domain::{
    AuditAction, AuditEntry, DedupKey, DedupOutcome, Evidence, LockName, LockRecord, Posting,
    PostingId, PostingState, Result, ShuttleError,
};
use crate::ports::TrackerEntry;

pub struct Admin {
    ctx: AppContext,
}

impl Admin {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    pub async fn force_expire_lock(
        &self,
        lock: &LockName,
        operator: &str,
        reason: &str,
    ) -> Result<Option<LockRecord>> {
        let previous = self.ctx.locks.holder(lock).await?;
        self.audit(
            operator,
            reason,
            AuditAction::ForceExpireLock {
                lock: lock.clone(),
                previous: previous.clone(),
            },
        )
        .await?;
        let expired = self.ctx.locks.force_expire(lock).await?;
        warn!(%lock, %operator, %reason, holder = ?previous.as_ref().map(|r| &r.holder), "lock force-expired");
        Ok(expired.or(previous))
    }

    /// Force a posting into `to`. APPLIED needs an evidence summary from the operator.
    pub async fn force_state(
        &self,
        id: &PostingId,
        to: PostingState,
        operator: &str,
        reason: &str,
        evidence: Option<String>,
    ) -> Result<Posting> {
        let current = self
            .ctx
            .store
            .get(id)
            .await?
            .ok_or_else(|| ShuttleError::NotFound(id.clone()))?;
        let evidence = evidence.map(|summary| {
            Evidence::new(format!("operator {operator}: {summary}"), self.ctx.clock.now())
        });
        if to == PostingState::Applied && !evidence.as_ref().is_some_and(Evidence::is_substantive) {
            return Err(ShuttleError::InvalidTransition {
                id: id.clone(),
                from: current.state,
                to,
                reason: "applied requires evidence".into(),
            });
        }

        self.audit(
            operator,
            reason,
            AuditAction::ForceState {
                posting: id.clone(),
                from: current.state,
                to,
            },
        )
        .await?;
        let posting = self
            .ctx
            .store
            .force_state(id, to, evidence, format!("forced by {operator}: {reason}"))
            .await?;
        info!(%id, from = %current.state, %to, %operator, "posting state forced");

        let outcome = DedupOutcome::from(posting.state);
        self.ctx
            .dedup
            .record(&DedupKey::from(&posting.id), &posting.id, outcome)
            .await?;
        if let Some(secondary) = &posting.secondary_key {
            self.ctx.dedup.record(secondary, &posting.id, outcome).await?;
        }
        if posting.state == PostingState::Applied
            && let Some(entry) = TrackerEntry::from_applied(&posting)
            && let Err(e) = self.ctx.tracker.append(entry).await
        {
            warn!(%id, error = %e, "tracker append failed");
        }
        Ok(posting)
    }

    async fn audit(&self, operator: &str, reason: &str, action: AuditAction) -> Result<()> {
        if operator.trim().is_empty() || reason.trim().is_empty() {
            return Err(ShuttleError::Config(
                "operator overrides need an operator and a reason".into(),
            ));
        }
        self.ctx
            .audit
            .append(AuditEntry {
                id: self.ctx.ids.generate_audit_id(),
                operator: operator.to_string(),
                reason: reason.to_string(),
                at: self.ctx.clock.now(),
                action,
            })
            .await
    }
}
