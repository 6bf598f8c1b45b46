//! WorkerRun - 1 件の claim を終端状態まで運ぶ有限状態機械
//!
//! # フロー
//! 1. `bind_target` で claim 済み posting に結びつく
//! 2. preflight（ALIVE / DEAD）
//! 3. submission（SUBMITTED / BLOCKED / AMBIGUOUS）、BLOCKED は Decider に従ってリトライ
//! 4. `finish` で終端状態を書く
//! 5. どの経路でも最後にパーティションロックを解放
//!
//! run 全体は run budget、各 phase は phase timeout で打ち切る。
//! phase の実行中は TTL の 1/3 ごとにロックを renew し、失ったら phase を捨てる。
//! Infrastructure エラーは状態を変えずに中断する（claim は reaper が回収）。

use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior, interval_at, timeout};
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::context::AppContext;
use super::session::SubmissionSession;
use crate::config::WorkerConfig;
use crate::domain::{
    Decider, Decision, ErrorKind, HolderId, Liveness, Partition, Phase, PhaseOutcome, PostingId,
    PostingState, Result, RunId, SubmissionResult, TerminalOutcome,
};
use crate::ports::{SubmissionStrategy, TargetHandle};

/// Everything a worker run needs to know about its dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerTicket {
    pub run_id: RunId,
    pub posting: PostingId,
    pub partition: Partition,
    pub lock_ttl: Duration,
    pub run_budget: Duration,
}

impl WorkerTicket {
    pub fn holder(&self) -> HolderId {
        self.run_id.into()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RunOutcome {
    /// A terminal state was written.
    Finished {
        state: PostingState,
        reason: Option<String>,
    },
    /// No state was written; the claim is left for the reaper.
    Aborted { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub posting: PostingId,
    pub partition: Partition,
    pub phases: usize,
    #[serde(flatten)]
    pub outcome: RunOutcome,
}

impl RunReport {
    pub fn state(&self) -> Option<PostingState> {
        match &self.outcome {
            RunOutcome::Finished { state, .. } => Some(*state),
            RunOutcome::Aborted { .. } => None,
        }
    }
}

pub struct WorkerRun {
    ctx: AppContext,
    strategy: Arc<dyn SubmissionStrategy>,
    decider: Arc<dyn Decider>,
    config: WorkerConfig,
    shutdown: watch::Receiver<bool>,
}

impl WorkerRun {
    pub fn new(
        ctx: AppContext,
        strategy: Arc<dyn SubmissionStrategy>,
        decider: Arc<dyn Decider>,
        config: WorkerConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            ctx,
            strategy,
            decider,
            config,
            shutdown,
        }
    }

    pub async fn run(&self, ticket: WorkerTicket) -> RunReport {
        let span = info_span!(
            "worker_run",
            run_id = %ticket.run_id,
            partition = %ticket.partition,
            posting = %ticket.posting,
        );
        async move {
            let (phases, outcome) = self.execute(&ticket).await;

            // 終端書き込みの成否に関わらずロックは必ず返す
            let lock = ticket.partition.lock_name();
            if let Err(e) = self.ctx.locks.release(&lock, &ticket.holder()).await {
                error!(lock = %lock, error = %e, "lock release failed");
            }

            RunReport {
                run_id: ticket.run_id.to_string(),
                posting: ticket.posting.clone(),
                partition: ticket.partition.clone(),
                phases,
                outcome,
            }
        }
        .instrument(span)
        .await
    }

    async fn execute(&self, ticket: &WorkerTicket) -> (usize, RunOutcome) {
        let mut session = SubmissionSession::new(self.ctx.clone(), ticket.run_id, &self.config);
        let handle = match session.bind_target(&ticket.posting).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(error = %e, "could not bind target");
                return (0, RunOutcome::Aborted { error: e.to_string() });
            }
        };

        let mut submission_started = false;
        let driven = timeout(
            ticket.run_budget,
            self.drive(&mut session, &handle, ticket, &mut submission_started),
        )
        .await;

        let terminal = match driven {
            Ok(Ok(terminal)) => terminal,
            Ok(Err(e)) => {
                error!(error = %e, "run aborted");
                return (session.history().len(), RunOutcome::Aborted { error: e.to_string() });
            }
            Err(_) => {
                warn!(budget = ?ticket.run_budget, submission_started, "run budget exhausted");
                TerminalOutcome::Deferred {
                    reason: "run budget exhausted".into(),
                    // 送信が始まっていたら成否不明なので自動再投入しない
                    requeue: !submission_started,
                }
            }
        };

        let phases = session.history().len();
        match session.finish(&handle, terminal).await {
            Ok(posting) => (
                phases,
                RunOutcome::Finished {
                    state: posting.state,
                    reason: posting.last_reason,
                },
            ),
            Err(e) => {
                error!(error = %e, "terminal write failed");
                (phases, RunOutcome::Aborted { error: e.to_string() })
            }
        }
    }

    async fn drive(
        &self,
        session: &mut SubmissionSession,
        handle: &TargetHandle,
        ticket: &WorkerTicket,
        submission_started: &mut bool,
    ) -> Result<TerminalOutcome> {
        if let Some(released) = self.checkpoint(ticket).await? {
            return Ok(released);
        }

        let preflight = timeout(self.config.phase_timeout, self.strategy.preflight(handle));
        let Some(preflight) = self.guarded(ticket, preflight).await? else {
            return Ok(TerminalOutcome::Released {
                reason: "partition lock lost during preflight".into(),
            });
        };
        let liveness = match preflight {
            Err(_) => {
                session.report_phase(handle, Phase::Preflight, PhaseOutcome::TimedOut)?;
                return Ok(TerminalOutcome::Deferred {
                    reason: "preflight timed out".into(),
                    requeue: true,
                });
            }
            Ok(Err(e)) => {
                if e.kind() == ErrorKind::Infrastructure {
                    return Err(e);
                }
                session.report_phase(
                    handle,
                    Phase::Preflight,
                    PhaseOutcome::Failed { error: e.to_string() },
                )?;
                return Ok(match e.kind() {
                    ErrorKind::Unreachable => TerminalOutcome::Skipped {
                        reason: format!("unreachable: {e}"),
                    },
                    _ => TerminalOutcome::Deferred {
                        reason: format!("preflight failed: {e}"),
                        requeue: true,
                    },
                });
            }
            Ok(Ok(liveness)) => liveness,
        };
        session.report_phase(handle, Phase::Preflight, PhaseOutcome::Preflight(liveness.clone()))?;
        if let Liveness::Dead { reason } = liveness {
            info!(%reason, "target is dead");
            return Ok(TerminalOutcome::Skipped {
                reason: format!("unreachable: {reason}"),
            });
        }

        let mut blocked_attempts = 0;
        loop {
            if let Some(released) = self.checkpoint(ticket).await? {
                return Ok(released);
            }
            *submission_started = true;

            let submit = timeout(self.config.phase_timeout, self.strategy.submit(handle));
            let Some(submitted) = self.guarded(ticket, submit).await? else {
                // 送信が途中だった可能性があるので自動再投入しない
                session.report_phase(
                    handle,
                    Phase::Submission,
                    PhaseOutcome::Failed {
                        error: "partition lock lost".into(),
                    },
                )?;
                return Ok(TerminalOutcome::Deferred {
                    reason: "partition lock lost during submission".into(),
                    requeue: false,
                });
            };
            let result = match submitted {
                Err(_) => {
                    session.report_phase(handle, Phase::Submission, PhaseOutcome::TimedOut)?;
                    return Ok(TerminalOutcome::Deferred {
                        reason: "submission timed out".into(),
                        requeue: false,
                    });
                }
                Ok(Err(e)) => match e.kind() {
                    ErrorKind::Infrastructure => return Err(e),
                    ErrorKind::Unreachable => {
                        session.report_phase(
                            handle,
                            Phase::Submission,
                            PhaseOutcome::Failed { error: e.to_string() },
                        )?;
                        return Ok(TerminalOutcome::Skipped {
                            reason: format!("unreachable: {e}"),
                        });
                    }
                    ErrorKind::TransientBlock => SubmissionResult::Blocked {
                        reason: e.to_string(),
                    },
                    _ => SubmissionResult::Ambiguous {
                        reason: e.to_string(),
                    },
                },
                Ok(Ok(result)) => result,
            };
            session.report_phase(handle, Phase::Submission, PhaseOutcome::Submission(result.clone()))?;

            match result {
                SubmissionResult::Submitted { evidence: Some(evidence) } if evidence.is_substantive() => {
                    return Ok(TerminalOutcome::Applied(evidence));
                }
                SubmissionResult::Submitted { .. } => {
                    return Ok(TerminalOutcome::Deferred {
                        reason: "submitted without evidence".into(),
                        requeue: false,
                    });
                }
                SubmissionResult::Ambiguous { reason } => {
                    return Ok(TerminalOutcome::Deferred {
                        reason: format!("ambiguous: {reason}"),
                        requeue: false,
                    });
                }
                SubmissionResult::Blocked { reason } => {
                    blocked_attempts += 1;
                    match self.decider.decide(blocked_attempts, &reason) {
                        Decision::Defer { reason } => {
                            return Ok(TerminalOutcome::Deferred {
                                reason,
                                requeue: true,
                            });
                        }
                        Decision::Retry { delay, reason } => {
                            debug!(attempt = blocked_attempts, %reason, "submission blocked");
                            let mut shutdown = self.shutdown.clone();
                            tokio::select! {
                                _ = tokio::time::sleep(delay) => {}
                                _ = wait_for_shutdown(&mut shutdown) => {
                                    return Ok(TerminalOutcome::Released {
                                        reason: "shutdown during backoff".into(),
                                    });
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    /// Drive one phase while renewing the partition lock every `lock_ttl / 3`.
    ///
    /// `None` when a renewal fails; the phase future is dropped at that point.
    async fn guarded<F: Future>(&self, ticket: &WorkerTicket, phase: F) -> Result<Option<F::Output>> {
        let lock = ticket.partition.lock_name();
        let every = (ticket.lock_ttl / 3).max(Duration::from_millis(10));
        let mut heartbeat = interval_at(Instant::now() + every, every);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut phase = std::pin::pin!(phase);

        loop {
            tokio::select! {
                out = &mut phase => return Ok(Some(out)),
                _ = heartbeat.tick() => {
                    if !self.ctx.locks.renew(&lock, &ticket.holder(), ticket.lock_ttl).await? {
                        warn!(lock = %lock, "partition lock lost mid-phase");
                        return Ok(None);
                    }
                    debug!(lock = %lock, "partition lock renewed");
                }
            }
        }
    }

    /// Before each phase: honour shutdown and renew the partition lock.
    async fn checkpoint(&self, ticket: &WorkerTicket) -> Result<Option<TerminalOutcome>> {
        if *self.shutdown.borrow() {
            return Ok(Some(TerminalOutcome::Released {
                reason: "shutdown".into(),
            }));
        }
        let lock = ticket.partition.lock_name();
        if !self
            .ctx
            .locks
            .renew(&lock, &ticket.holder(), ticket.lock_ttl)
            .await?
        {
            warn!(lock = %lock, "partition lock lost");
            return Ok(Some(TerminalOutcome::Released {
                reason: "partition lock lost".into(),
            }));
        }
        Ok(None)
    }
}

/// Resolves once shutdown is requested; never if the sender is gone.
pub(crate) async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}
