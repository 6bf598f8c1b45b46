//! WorkerLauncher - dispatcher から worker run を起動する境界
//!
//! `TokioLauncher` は run ごとに tokio task を spawn する。
//! - `request_shutdown()` で進行中の run に停止を伝える（各 run は次の phase 境界で Released）
//! - `shutdown_and_join()` で全 run の終了を待てる

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::context::AppContext;
use super::registry::StrategyRegistry;
use super::worker::{RunReport, WorkerRun, WorkerTicket};
use crate::config::WorkerConfig;
use crate::domain::{Decider, Result, ShuttleError};

#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    /// Start a run for an already claimed posting. The run owns the partition lock from here on.
    async fn launch(&self, ticket: WorkerTicket) -> Result<()>;
}

pub struct TokioLauncher {
    ctx: AppContext,
    registry: StrategyRegistry,
    decider: Arc<dyn Decider>,
    config: WorkerConfig,
    shutdown_tx: watch::Sender<bool>,
    joins: Mutex<Vec<JoinHandle<RunReport>>>,
}

impl TokioLauncher {
    pub fn new(
        ctx: AppContext,
        registry: StrategyRegistry,
        decider: Arc<dyn Decider>,
        config: WorkerConfig,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            ctx,
            registry,
            decider,
            config,
            shutdown_tx,
            joins: Mutex::new(Vec::new()),
        }
    }

    /// Number of runs still in flight.
    pub async fn active(&self) -> usize {
        let mut joins = self.joins.lock().await;
        joins.retain(|j| !j.is_finished());
        joins.len()
    }

    pub fn request_shutdown(&self) {
        // send_replace stores the flag even with no subscribed run
        self.shutdown_tx.send_replace(true);
    }

    /// Shutdown and wait for every tracked run.
    pub async fn shutdown_and_join(&self) -> Vec<RunReport> {
        self.request_shutdown();
        self.join_all().await
    }

    /// Wait for every run without requesting shutdown.
    pub async fn join_all(&self) -> Vec<RunReport> {
        let joins = std::mem::take(&mut *self.joins.lock().await);
        let mut reports = Vec::with_capacity(joins.len());
        for join in joins {
            match join.await {
                Ok(report) => reports.push(report),
                Err(e) => warn!(error = %e, "worker task failed to join"),
            }
        }
        reports
    }
}

#[async_trait]
impl WorkerLauncher for TokioLauncher {
    async fn launch(&self, ticket: WorkerTicket) -> Result<()> {
        if *self.shutdown_tx.borrow() {
            return Err(ShuttleError::Session("launcher is shutting down".into()));
        }
        let strategy = self.registry.get(&ticket.partition).ok_or_else(|| {
            ShuttleError::Config(format!("no strategy registered for '{}'", ticket.partition))
        })?;

        let run = WorkerRun::new(
            self.ctx.clone(),
            strategy,
            self.decider.clone(),
            self.config.clone(),
            self.shutdown_tx.subscribe(),
        );
        info!(run_id = %ticket.run_id, partition = %ticket.partition, "launching worker");
        let join = tokio::spawn(async move { run.run(ticket).await });

        let mut joins = self.joins.lock().await;
        joins.retain(|j| !j.is_finished());
        joins.push(join);
        Ok(())
    }
}
