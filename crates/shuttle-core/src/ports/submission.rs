//! SubmissionStrategy port - パーティションごとの提出手順
//!
//! フォーム入力や回答生成などの中身はこの trait の外側にある。
//! worker は結果（Liveness / SubmissionResult）だけを見て状態を決める。

use async_trait::async_trait;

use crate::domain::{Liveness, Partition, PostingId, PostingMeta, Result, RunId, SubmissionResult};

/// The immutable target a worker run is bound to.
///
/// run ごとに一度だけ作られ、途中で差し替えられない。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetHandle {
    run_id: RunId,
    posting: PostingId,
    url: String,
    partition: Partition,
    meta: PostingMeta,
}

impl TargetHandle {
    pub fn new(
        run_id: RunId,
        posting: PostingId,
        url: String,
        partition: Partition,
        meta: PostingMeta,
    ) -> Self {
        Self {
            run_id,
            posting,
            url,
            partition,
            meta,
        }
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn posting(&self) -> &PostingId {
        &self.posting
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn meta(&self) -> &PostingMeta {
        &self.meta
    }
}

/// Per-partition submission logic.
///
/// Errors are classified by `ShuttleError::kind()`:
/// `Unreachable` in preflight means DEAD, `TransientBlock` means BLOCKED,
/// `Infrastructure` aborts the run without a state change.
#[async_trait]
pub trait SubmissionStrategy: Send + Sync {
    /// Is the target still open?
    async fn preflight(&self, target: &TargetHandle) -> Result<Liveness>;

    /// Perform the submission.
    async fn submit(&self, target: &TargetHandle) -> Result<SubmissionResult>;
}
