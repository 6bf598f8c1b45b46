//! Dispatcher - 1 tick で高々 1 パーティションを起動する
//!
//! # フロー
//! 0. （有効なら）グローバル `dispatch` ロックを取る。取れなければ静かに中断
//! 1. Reaper で放棄 claim / 期限切れ defer を回収
//! 2. パーティションごとのスナップショット（Disabled / Busy / Idle / Ready）
//! 3. `decide` で勝者を選ぶ
//! 4. `apply-{p}` ロックを run id で取得（失敗したら中断、リトライしない）
//! 5. PENDING → CLAIMED。衝突したら先頭を一度だけ読み直して再試行
//! 6. WorkerLauncher に渡す。以後ロックは worker run のもの
//!
//! Store / Lock Manager の障害時は、この tick で取ったロックを返して中断する。

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::context::AppContext;
use super::launcher::WorkerLauncher;
use super::reaper::Reaper;
use super::worker::WorkerTicket;
use crate::config::{DispatchConfig, PartitionConfig, ShuttleConfig};
use crate::domain::dispatch::decide;
use crate::domain::{
    Actor, DISPATCH_LOCK, HolderId, LockName, PartitionOrder, PartitionSnapshot,
    PartitionStatus, Posting, PostingId, PostingState, QueueTop, Result, RunId, ShuttleError,
    TickReport, TickResult, Transition,
};

pub struct Dispatcher {
    ctx: AppContext,
    reaper: Reaper,
    launcher: Arc<dyn WorkerLauncher>,
    dispatch: DispatchConfig,
    partitions: Vec<PartitionConfig>,
    order: PartitionOrder,
    /// Holder of the global `dispatch` lock for this instance.
    holder: HolderId,
}

impl Dispatcher {
    pub fn new(ctx: AppContext, config: &ShuttleConfig, launcher: Arc<dyn WorkerLauncher>) -> Self {
        let holder = HolderId::new(format!("dispatcher-{}", ctx.ids.generate_run_id()));
        Self {
            reaper: Reaper::new(ctx.clone(), &config.dispatch, &config.partitions),
            ctx,
            launcher,
            dispatch: config.dispatch.clone(),
            partitions: config.partitions.clone(),
            order: config.partition_order(),
            holder,
        }
    }

    pub async fn tick(&self) -> TickReport {
        let dispatch_lock = LockName::new(DISPATCH_LOCK);
        if self.dispatch.global_lock {
            match self
                .ctx
                .locks
                .try_acquire(&dispatch_lock, &self.holder, self.dispatch.dispatch_lock_ttl)
                .await
            {
                Ok(true) => {}
                Ok(false) => {
                    debug!("dispatch lock held elsewhere; skipping tick");
                    return TickReport {
                        reaped: 0,
                        requeued: 0,
                        snapshots: Vec::new(),
                        result: TickResult::DispatchLockHeld,
                    };
                }
                Err(e) => {
                    error!(error = %e, "dispatch lock unavailable");
                    return TickReport::aborted(e);
                }
            }
        }

        let report = match self.run_tick().await {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "tick aborted");
                TickReport::aborted(e)
            }
        };

        if self.dispatch.global_lock {
            self.release(&dispatch_lock, &self.holder).await;
        }
        report
    }

    async fn run_tick(&self) -> Result<TickReport> {
        let reaped = self.reaper.reap().await?;
        let snapshots = self.snapshots().await?;
        let mut report = TickReport {
            reaped: reaped.reverted,
            requeued: reaped.requeued,
            snapshots,
            result: TickResult::Nothing,
        };

        let Some((partition, top)) = decide(&report.snapshots, &self.order) else {
            debug!("no partition ready");
            return Ok(report);
        };
        let (partition, top) = (partition.clone(), top.clone());
        let config = self
            .partitions
            .iter()
            .find(|p| p.name == partition)
            .ok_or_else(|| ShuttleError::Config(format!("unknown partition '{partition}'")))?;

        let run_id = self.ctx.ids.generate_run_id();
        let holder = HolderId::from(run_id);
        let lock = partition.lock_name();
        if !self
            .ctx
            .locks
            .try_acquire(&lock, &holder, config.lock_ttl)
            .await?
        {
            debug!(%partition, "partition lock taken since snapshot");
            report.result = TickResult::LockContention { partition };
            return Ok(report);
        }

        report.result = match self.claim_and_launch(config, &top, run_id).await {
            Ok(dispatched @ TickResult::Dispatched { .. }) => dispatched,
            Ok(other) => {
                self.release(&lock, &holder).await;
                other
            }
            Err(e) => {
                self.release(&lock, &holder).await;
                return Err(e);
            }
        };
        Ok(report)
    }

    async fn snapshots(&self) -> Result<Vec<PartitionSnapshot>> {
        let mut snapshots = Vec::with_capacity(self.partitions.len());
        for config in &self.partitions {
            let status = if !config.enabled {
                PartitionStatus::Disabled
            } else if self.ctx.locks.is_held(&config.name.lock_name()).await? {
                PartitionStatus::Busy
            } else {
                match self.ctx.store.list_actionable(&config.name, 1).await?.into_iter().next() {
                    Some(top) => PartitionStatus::Ready {
                        top: QueueTop {
                            id: top.id,
                            score: top.score,
                        },
                    },
                    None => PartitionStatus::Idle,
                }
            };
            snapshots.push(PartitionSnapshot {
                partition: config.name.clone(),
                status,
            });
        }
        Ok(snapshots)
    }

    /// Caller holds the partition lock and releases it unless this returns `Dispatched`.
    async fn claim_and_launch(
        &self,
        config: &PartitionConfig,
        top: &QueueTop,
        run_id: RunId,
    ) -> Result<TickResult> {
        let partition = &config.name;
        let holder = HolderId::from(run_id);

        let claimed = match self.claim(&top.id, &holder).await {
            Ok(p) => p,
            Err(e) if e.is_conflict() => {
                warn!(%partition, id = %top.id, "claim conflict; re-reading queue top");
                let Some(next) = self.ctx.store.list_actionable(partition, 1).await?.into_iter().next()
                else {
                    return Ok(TickResult::ClaimConflict {
                        partition: partition.clone(),
                    });
                };
                match self.claim(&next.id, &holder).await {
                    Ok(p) => p,
                    Err(e) if e.is_conflict() => {
                        warn!(%partition, id = %next.id, "claim conflicted twice");
                        return Ok(TickResult::ClaimConflict {
                            partition: partition.clone(),
                        });
                    }
                    Err(e) => return Err(e),
                }
            }
            Err(e) => return Err(e),
        };

        let ticket = WorkerTicket {
            run_id,
            posting: claimed.id.clone(),
            partition: partition.clone(),
            lock_ttl: config.lock_ttl,
            run_budget: config.run_budget(),
        };
        if let Err(e) = self.launcher.launch(ticket).await {
            error!(%partition, id = %claimed.id, error = %e, "launch failed; reverting claim");
            let revert = Transition::new(
                claimed.id.clone(),
                PostingState::Claimed,
                PostingState::Pending,
                Actor::Dispatcher(holder),
            )
            .with_reason("launch failed");
            if let Err(revert_err) = self.ctx.store.transition(revert).await {
                error!(id = %claimed.id, error = %revert_err, "claim revert failed");
            }
            return Err(e);
        }

        info!(
            %partition,
            id = %claimed.id,
            score = claimed.score,
            run_id = %run_id,
            "dispatched"
        );
        Ok(TickResult::dispatched(partition.clone(), claimed.id, run_id))
    }

    async fn claim(&self, id: &PostingId, holder: &HolderId) -> Result<Posting> {
        self.ctx
            .store
            .transition(Transition::new(
                id.clone(),
                PostingState::Pending,
                PostingState::Claimed,
                Actor::Dispatcher(holder.clone()),
            ))
            .await
    }

    async fn release(&self, lock: &LockName, holder: &HolderId) {
        if let Err(e) = self.ctx.locks.release(lock, holder).await {
            error!(%lock, error = %e, "lock release failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Partition;
    use crate::ports::{Clock, FixedClock};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        tickets: Mutex<Vec<WorkerTicket>>,
        fail: bool,
    }

    #[async_trait]
    impl WorkerLauncher for Recording {
        async fn launch(&self, ticket: WorkerTicket) -> Result<()> {
            if self.fail {
                return Err(ShuttleError::Infrastructure("spawn failed".into()));
            }
            self.tickets.lock().await.push(ticket);
            Ok(())
        }
    }

    struct Fixture {
        ctx: AppContext,
        clock: FixedClock,
        launcher: Arc<Recording>,
        dispatcher: Dispatcher,
    }

    fn fixture_with(config: ShuttleConfig, launcher: Recording) -> Fixture {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2026, 9, 1, 12, 0, 0).unwrap());
        let ctx = AppContext::in_memory(Arc::new(clock.clone()));
        let launcher = Arc::new(launcher);
        let dispatcher = Dispatcher::new(ctx.clone(), &config, launcher.clone());
        Fixture {
            ctx,
            clock,
            launcher,
            dispatcher,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(ShuttleConfig::default(), Recording::default())
    }

    async fn add(f: &Fixture, id: &str, partition: &str, score: u32) {
        let p = Posting::new(id.into(), format!("https://x/{id}"), partition.into(), score, f.clock.now());
        f.ctx.store.upsert(p).await.unwrap();
    }

    #[tokio::test]
    async fn dispatches_highest_score_across_partitions() {
        let f = fixture();
        add(&f, "a1", "ashby", 40).await;
        add(&f, "g1", "greenhouse", 90).await;
        add(&f, "l1", "lever", 60).await;

        let report = f.dispatcher.tick().await;
        assert_eq!(report.result, TickResult::Dispatched {
            partition: "greenhouse".into(),
            posting: "g1".into(),
            run_id: report.dispatched_run().unwrap().to_string(),
        });
        let tickets = f.launcher.tickets.lock().await;
        assert_eq!(tickets.len(), 1);
        assert_eq!(tickets[0].lock_ttl, Duration::from_secs(45 * 60));

        let p = f.ctx.store.get(&"g1".into()).await.unwrap().unwrap();
        assert_eq!(p.state, PostingState::Claimed);
        assert!(f.ctx.locks.is_held(&Partition::new("greenhouse").lock_name()).await.unwrap());
        assert!(!f.ctx.locks.is_held(&LockName::new(DISPATCH_LOCK)).await.unwrap());
    }

    #[tokio::test]
    async fn ties_follow_partition_order() {
        let f = fixture();
        add(&f, "l1", "lever", 70).await;
        add(&f, "a1", "ashby", 70).await;

        let report = f.dispatcher.tick().await;
        assert!(matches!(
            report.result,
            TickResult::Dispatched { ref partition, .. } if partition.as_str() == "ashby"
        ));
    }

    #[tokio::test]
    async fn busy_and_disabled_partitions_are_skipped() {
        let mut config = ShuttleConfig::default();
        config.partitions[1].enabled = false; // greenhouse
        let f = fixture_with(config, Recording::default());
        add(&f, "a1", "ashby", 90).await;
        add(&f, "g1", "greenhouse", 95).await;
        add(&f, "l1", "lever", 10).await;
        f.ctx
            .locks
            .try_acquire(&Partition::new("ashby").lock_name(), &"other".into(), Duration::from_secs(60))
            .await
            .unwrap();

        let report = f.dispatcher.tick().await;
        let statuses: Vec<_> = report.snapshots.iter().map(|s| &s.status).collect();
        assert_eq!(statuses[0], &PartitionStatus::Busy);
        assert_eq!(statuses[1], &PartitionStatus::Disabled);
        assert!(matches!(
            report.result,
            TickResult::Dispatched { ref posting, .. } if posting.as_str() == "l1"
        ));
    }

    #[tokio::test]
    async fn empty_queue_dispatches_nothing() {
        let f = fixture();
        let report = f.dispatcher.tick().await;
        assert_eq!(report.result, TickResult::Nothing);
        assert!(report.snapshots.iter().all(|s| s.status == PartitionStatus::Idle));
    }

    #[tokio::test]
    async fn held_dispatch_lock_skips_tick() {
        let f = fixture();
        add(&f, "a1", "ashby", 90).await;
        f.ctx
            .locks
            .try_acquire(&LockName::new(DISPATCH_LOCK), &"peer".into(), Duration::from_secs(30))
            .await
            .unwrap();

        let report = f.dispatcher.tick().await;
        assert_eq!(report.result, TickResult::DispatchLockHeld);
        let p = f.ctx.store.get(&"a1".into()).await.unwrap().unwrap();
        assert_eq!(p.state, PostingState::Pending);
    }

    #[tokio::test]
    async fn failed_launch_reverts_claim_and_lock() {
        let f = fixture_with(
            ShuttleConfig::default(),
            Recording {
                fail: true,
                ..Recording::default()
            },
        );
        add(&f, "a1", "ashby", 90).await;

        let report = f.dispatcher.tick().await;
        assert!(matches!(report.result, TickResult::Aborted { .. }));
        let p = f.ctx.store.get(&"a1".into()).await.unwrap().unwrap();
        assert_eq!(p.state, PostingState::Pending);
        assert!(!f.ctx.locks.is_held(&Partition::new("ashby").lock_name()).await.unwrap());
    }

    #[tokio::test]
    async fn reaped_claim_is_redispatched_in_same_tick() {
        let f = fixture();
        add(&f, "l1", "lever", 50).await;
        f.dispatcher.tick().await;

        // worker vanished without releasing; lock expires at 15 min
        f.clock.advance(chrono::Duration::minutes(16));
        let report = f.dispatcher.tick().await;
        assert_eq!(report.reaped, 1);
        assert!(matches!(report.result, TickResult::Dispatched { .. }));
        assert_eq!(f.launcher.tickets.lock().await.len(), 2);
    }
}
