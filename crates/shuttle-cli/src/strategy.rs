//! CommandStrategy - 外部コマンドで提出手順を実行する
//!
//! `argv... <phase> <url>` を起動し、stdout の最後の空でない行を JSON の判定として読む。
//!
//! ```text
//! {"status":"ALIVE"}
//! {"status":"DEAD","reason":"posting closed"}
//! {"status":"SUBMITTED","confirmation":"thanks page shown"}
//! {"status":"BLOCKED","reason":"captcha"}
//! {"status":"AMBIGUOUS","reason":"form vanished"}
//! {"status":"UNREACHABLE","reason":"404"}
//! ```
//!
//! Exit code 75 without a verdict is a transient block.
//! Any other failure without a verdict is ambiguous.

use async_trait::async_trait;
use serde::Deserialize;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::debug;

use shuttle_core::config::PartitionConfig;
use shuttle_core::domain::{
    Artifact, Evidence, Liveness, Phase, Result, ShuttleError, SubmissionResult,
};
use shuttle_core::ports::{Clock, LinkChecker, SubmissionStrategy, TargetHandle};

const EX_TEMPFAIL: i32 = 75;

/// The JSON line a strategy command prints.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
enum Verdict {
    Alive,
    Dead {
        reason: String,
    },
    Submitted {
        #[serde(default)]
        confirmation: Option<String>,
    },
    Blocked {
        reason: String,
    },
    Ambiguous {
        reason: String,
    },
    Unreachable {
        reason: String,
    },
}

struct CommandOutput {
    verdict: Option<Verdict>,
    stdout: String,
    stderr: String,
    code: Option<i32>,
}

pub struct CommandStrategy {
    argv: Vec<String>,
    clock: Arc<dyn Clock>,
}

impl CommandStrategy {
    pub fn new(argv: Vec<String>, clock: Arc<dyn Clock>) -> Result<Self> {
        if argv.is_empty() || argv[0].trim().is_empty() {
            return Err(ShuttleError::Config("strategy command is empty".into()));
        }
        Ok(Self { argv, clock })
    }

    async fn invoke(&self, phase: Phase, url: &str, target: Option<&TargetHandle>) -> Result<CommandOutput> {
        let mut cmd = Command::new(&self.argv[0]);
        cmd.args(&self.argv[1..])
            .arg(phase.to_string())
            .arg(url)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(target) = target {
            let meta = serde_json::to_string(target.meta()).map_err(ShuttleError::infrastructure)?;
            cmd.env("SHUTTLE_RUN_ID", target.run_id().to_string())
                .env("SHUTTLE_POSTING_ID", target.posting().as_str())
                .env("SHUTTLE_PARTITION", target.partition().as_str())
                .env("SHUTTLE_META", meta);
        }

        let output = cmd.output().await.map_err(|e| {
            ShuttleError::Infrastructure(format!("failed to run {}: {e}", self.argv[0]))
        })?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let verdict = stdout
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .and_then(|line| serde_json::from_str::<Verdict>(line.trim()).ok());
        debug!(%phase, url, code = ?output.status.code(), ?verdict, "strategy command finished");

        Ok(CommandOutput {
            verdict,
            stdout,
            stderr,
            code: output.status.code(),
        })
    }

    async fn liveness(&self, url: &str, target: Option<&TargetHandle>) -> Result<Liveness> {
        let out = self.invoke(Phase::Preflight, url, target).await?;
        match out.verdict {
            Some(Verdict::Alive) => Ok(Liveness::Alive),
            Some(Verdict::Dead { reason }) => Ok(Liveness::Dead { reason }),
            Some(Verdict::Unreachable { reason }) => Err(ShuttleError::Unreachable(reason)),
            Some(Verdict::Blocked { reason }) => Err(ShuttleError::TransientBlock(reason)),
            Some(other) => Err(ShuttleError::Ambiguous(format!(
                "unexpected preflight verdict {other:?}"
            ))),
            None => Err(no_verdict(&out)),
        }
    }
}

fn no_verdict(out: &CommandOutput) -> ShuttleError {
    let stderr = out.stderr.trim();
    match out.code {
        Some(EX_TEMPFAIL) => ShuttleError::TransientBlock(stderr.to_string()),
        code => ShuttleError::Ambiguous(format!("no verdict (exit {code:?}): {stderr}")),
    }
}

#[async_trait]
impl SubmissionStrategy for CommandStrategy {
    async fn preflight(&self, target: &TargetHandle) -> Result<Liveness> {
        self.liveness(target.url(), Some(target)).await
    }

    async fn submit(&self, target: &TargetHandle) -> Result<SubmissionResult> {
        let out = self.invoke(Phase::Submission, target.url(), Some(target)).await?;
        match out.verdict {
            Some(Verdict::Submitted { confirmation }) => Ok(SubmissionResult::Submitted {
                evidence: confirmation.map(|summary| {
                    Evidence::new(summary, self.clock.now())
                        .with_artifact(Artifact::Stdout(out.stdout.clone()))
                }),
            }),
            Some(Verdict::Blocked { reason }) => Ok(SubmissionResult::Blocked { reason }),
            Some(Verdict::Ambiguous { reason }) => Ok(SubmissionResult::Ambiguous { reason }),
            Some(Verdict::Unreachable { reason }) => Err(ShuttleError::Unreachable(reason)),
            Some(other) => Ok(SubmissionResult::Ambiguous {
                reason: format!("unexpected submission verdict {other:?}"),
            }),
            None => Err(no_verdict(&out)),
        }
    }
}

/// LinkChecker that runs the preflight of the partition matching a URL.
pub struct CommandLinkChecker {
    partitions: Vec<(PartitionConfig, CommandStrategy)>,
}

impl CommandLinkChecker {
    /// `None` when no partition has a command.
    pub fn from_partitions(partitions: &[PartitionConfig], clock: Arc<dyn Clock>) -> Result<Option<Self>> {
        let mut checkers = Vec::new();
        for p in partitions.iter().filter(|p| !p.command.is_empty()) {
            checkers.push((p.clone(), CommandStrategy::new(p.command.clone(), clock.clone())?));
        }
        if checkers.is_empty() {
            return Ok(None);
        }
        Ok(Some(Self {
            partitions: checkers,
        }))
    }
}

#[async_trait]
impl LinkChecker for CommandLinkChecker {
    async fn check(&self, url: &str) -> Result<Liveness> {
        let (_, strategy) = self
            .partitions
            .iter()
            .find(|(p, _)| p.matches(url))
            .ok_or_else(|| ShuttleError::Config(format!("no strategy command matches {url}")))?;
        strategy.liveness(url, None).await
    }
}
