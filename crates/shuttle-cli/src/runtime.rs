//! Runtime - file-backed state plus the wired application
//!
//! 運用コマンドはすべて `ControlRequest` として表し、`execute` で処理する。
//! daemon が動いていれば control ディレクトリ経由で daemon 側が execute する。

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use shuttle_core::app::{App, AppBuilder, AppContext, StaleLinkSweep};
use shuttle_core::config::ShuttleConfig;
use shuttle_core::domain::{Candidate, LockName, PostingId, PostingState};
use shuttle_core::impls::{FileDedupIndex, FilePostingStore};
use shuttle_core::ports::{Clock, LinkChecker, SystemClock};

use crate::strategy::{CommandLinkChecker, CommandStrategy};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ControlRequest {
    Submit {
        candidate: Candidate,
    },
    Status {
        top: usize,
    },
    ExpireLock {
        lock: LockName,
        operator: String,
        reason: String,
    },
    ForceState {
        id: PostingId,
        to: PostingState,
        operator: String,
        reason: String,
        #[serde(default)]
        evidence: Option<String>,
    },
    Compact,
    Sweep {
        limit: usize,
    },
}

pub struct Runtime {
    pub app: App,
    store: Arc<FilePostingStore>,
    dedup: Arc<FileDedupIndex>,
    checker: Option<Arc<dyn LinkChecker>>,
}

impl Runtime {
    /// Open the journals under `config.state_dir`.
    ///
    /// With `workers`, a command strategy is registered for every partition
    /// that has one, and every enabled partition must have one.
    pub async fn open(config: ShuttleConfig, workers: bool) -> anyhow::Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        tokio::fs::create_dir_all(&config.state_dir)
            .await
            .with_context(|| format!("failed to create {}", config.state_dir.display()))?;
        let backed = AppContext::file_backed(&config.state_dir, clock.clone())
            .await
            .with_context(|| format!("failed to open state in {}", config.state_dir.display()))?;

        let mut builder = AppBuilder::new(config.clone());
        if workers {
            for p in config.partitions.iter().filter(|p| !p.command.is_empty()) {
                let strategy = CommandStrategy::new(p.command.clone(), clock.clone())
                    .with_context(|| format!("partition {}", p.name))?;
                builder = builder.register(p.name.clone(), Arc::new(strategy))?;
            }
            builder = builder.expect_enabled_partitions();
        }
        let app = builder.build(backed.context)?;

        let checker = CommandLinkChecker::from_partitions(&config.partitions, clock)?
            .map(|c| Arc::new(c) as Arc<dyn LinkChecker>);

        Ok(Self {
            app,
            store: backed.store,
            dedup: backed.dedup,
            checker,
        })
    }

    pub async fn execute(&self, request: ControlRequest) -> anyhow::Result<serde_json::Value> {
        let value = match request {
            ControlRequest::Submit { candidate } => {
                serde_json::to_value(self.app.producer.submit(candidate).await?)?
            }
            ControlRequest::Status { top } => serde_json::to_value(self.app.status.report(top).await?)?,
            ControlRequest::ExpireLock {
                lock,
                operator,
                reason,
            } => serde_json::to_value(
                self.app
                    .admin
                    .force_expire_lock(&lock, &operator, &reason)
                    .await?,
            )?,
            ControlRequest::ForceState {
                id,
                to,
                operator,
                reason,
                evidence,
            } => serde_json::to_value(
                self.app
                    .admin
                    .force_state(&id, to, &operator, &reason, evidence)
                    .await?,
            )?,
            ControlRequest::Compact => {
                let postings = self.store.compact().await?;
                let dedup_entries = self.dedup.compact().await?;
                serde_json::json!({ "postings": postings, "dedup_entries": dedup_entries })
            }
            ControlRequest::Sweep { limit } => {
                let Some(checker) = &self.checker else {
                    bail!("no partition has a command configured; nothing can check links");
                };
                let sweep = StaleLinkSweep::new(self.app.ctx.clone(), checker.clone());
                serde_json::to_value(sweep.sweep(limit).await?)?
            }
        };
        Ok(value)
    }
}
