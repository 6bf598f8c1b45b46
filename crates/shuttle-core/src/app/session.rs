//! SubmissionSession - 1 回の worker run と 1 件の posting の結びつき
//!
//! - `bind_target` は run ごとに一度だけ成功する（以後 TargetHandle は不変）
//! - `report_phase` は phase の結果を履歴に積む（preflight が ALIVE になるまで submission は不可）
//! - `finish` が唯一の終端書き込み。dedup / tracker への反映もここで行う

use chrono::Duration as ChronoDuration;
use tracing::{info, warn};

use super::context::AppContext;
use crate::config::WorkerConfig;
use crate::domain::{
    Actor, DedupKey, DedupOutcome, HolderId, Liveness, Phase, PhaseOutcome, PhaseRecord, Posting,
    PostingId, PostingState, Result, RetryPolicy, RunId, ShuttleError, TerminalOutcome,
    Transition,
};
use crate::ports::{TargetHandle, TrackerEntry};

pub struct SubmissionSession {
    ctx: AppContext,
    run_id: RunId,
    holder: HolderId,
    target: Option<TargetHandle>,
    history: Vec<PhaseRecord>,
    defer_backoff: RetryPolicy,
    max_defers: u32,
}

impl SubmissionSession {
    pub fn new(ctx: AppContext, run_id: RunId, worker: &WorkerConfig) -> Self {
        Self {
            ctx,
            run_id,
            holder: run_id.into(),
            target: None,
            history: Vec::new(),
            defer_backoff: worker.defer_backoff.clone(),
            max_defers: worker.max_defers,
        }
    }

    pub fn holder(&self) -> &HolderId {
        &self.holder
    }

    pub fn target(&self) -> Option<&TargetHandle> {
        self.target.as_ref()
    }

    pub fn history(&self) -> &[PhaseRecord] {
        &self.history
    }

    /// Bind the run to the posting it claimed. Succeeds once.
    pub async fn bind_target(&mut self, id: &PostingId) -> Result<TargetHandle> {
        if let Some(bound) = &self.target {
            return Err(ShuttleError::Session(format!(
                "run {} already bound to {}",
                self.run_id,
                bound.posting()
            )));
        }
        let posting = self
            .ctx
            .store
            .get(id)
            .await?
            .ok_or_else(|| ShuttleError::NotFound(id.clone()))?;
        if posting.state != PostingState::Claimed {
            return Err(ShuttleError::StateConflict {
                id: id.clone(),
                expected: PostingState::Claimed,
                actual: posting.state,
            });
        }
        if !posting.claim.as_ref().is_some_and(|c| c.holder == self.holder) {
            return Err(ShuttleError::ClaimLost {
                id: id.clone(),
                holder: self.holder.clone(),
            });
        }

        let handle = TargetHandle::new(
            self.run_id,
            posting.id,
            posting.url,
            posting.partition,
            posting.meta,
        );
        self.target = Some(handle.clone());
        Ok(handle)
    }

    pub fn report_phase(
        &mut self,
        handle: &TargetHandle,
        phase: Phase,
        outcome: PhaseOutcome,
    ) -> Result<()> {
        self.check_handle(handle)?;
        if phase == Phase::Submission && !self.preflight_passed() {
            return Err(ShuttleError::Session(
                "submission reported before a live preflight".into(),
            ));
        }
        self.history.push(PhaseRecord {
            phase,
            outcome,
            at: self.ctx.clock.now(),
        });
        Ok(())
    }

    fn preflight_passed(&self) -> bool {
        self.history.iter().any(|r| {
            r.phase == Phase::Preflight
                && matches!(r.outcome, PhaseOutcome::Preflight(Liveness::Alive))
        })
    }

    /// Write the terminal state of the run.
    ///
    /// APPLIED かどうかは evidence で決まる。中身のない evidence は保留（DEFERRED）扱い。
    pub async fn finish(self, handle: &TargetHandle, outcome: TerminalOutcome) -> Result<Posting> {
        self.check_handle(handle)?;
        let id = handle.posting().clone();
        let actor = Actor::Worker(self.holder.clone());
        let label = outcome.label();

        let transition = match outcome {
            TerminalOutcome::Applied(evidence) if evidence.is_substantive() => {
                Transition::new(id.clone(), PostingState::Claimed, PostingState::Applied, actor)
                    .with_reason(evidence.summary.clone())
                    .with_evidence(evidence)
            }
            TerminalOutcome::Applied(_) => {
                Transition::new(id.clone(), PostingState::Claimed, PostingState::Deferred, actor)
                    .with_reason("submitted without evidence")
            }
            TerminalOutcome::Skipped { reason } => {
                Transition::new(id.clone(), PostingState::Claimed, PostingState::Skipped, actor)
                    .with_reason(reason)
            }
            TerminalOutcome::Deferred { reason, requeue } => {
                let until = if requeue { self.requeue_at(&id).await? } else { None };
                Transition::new(id.clone(), PostingState::Claimed, PostingState::Deferred, actor)
                    .with_reason(reason)
                    .with_defer_until(until)
            }
            TerminalOutcome::Released { reason } => {
                Transition::new(id.clone(), PostingState::Claimed, PostingState::Pending, actor)
                    .with_reason(reason)
            }
        };

        let posting = self.ctx.store.transition(transition).await?;
        info!(
            id = %posting.id,
            run_id = %self.run_id,
            requested = label,
            state = %posting.state,
            reason = posting.last_reason.as_deref().unwrap_or(""),
            "run finished"
        );

        if let Some(outcome) = match posting.state {
            PostingState::Applied => Some(DedupOutcome::Applied),
            PostingState::Skipped => Some(DedupOutcome::Skipped),
            _ => None,
        } {
            self.ctx
                .dedup
                .record(&DedupKey::from(&posting.id), &posting.id, outcome)
                .await?;
            if let Some(secondary) = &posting.secondary_key {
                self.ctx.dedup.record(secondary, &posting.id, outcome).await?;
            }
        }

        if let Some(entry) = TrackerEntry::from_applied(&posting).filter(|_| posting.state == PostingState::Applied)
            && let Err(e) = self.ctx.tracker.append(entry).await
        {
            warn!(id = %posting.id, error = %e, "tracker append failed");
        }

        Ok(posting)
    }

    /// None once the posting has used up its deferrals (parked).
    async fn requeue_at(&self, id: &PostingId) -> Result<Option<chrono::DateTime<chrono::Utc>>> {
        let defer_count = self
            .ctx
            .store
            .get(id)
            .await?
            .map(|p| p.defer_count)
            .unwrap_or_default();
        let next = defer_count.saturating_add(1);
        if next > self.max_defers {
            return Ok(None);
        }
        let delay = ChronoDuration::from_std(self.defer_backoff.next_delay(next))
            .map_err(ShuttleError::infrastructure)?;
        Ok(Some(self.ctx.clock.now() + delay))
    }

    fn check_handle(&self, handle: &TargetHandle) -> Result<()> {
        match &self.target {
            Some(bound) if bound == handle => Ok(()),
            Some(_) => Err(ShuttleError::Session(format!(
                "handle for {} does not belong to run {}",
                handle.posting(),
                self.run_id
            ))),
            None => Err(ShuttleError::Session("no target bound".into())),
        }
    }
}
