//! Errors - エラー型と分類
//!
//! `ShuttleError` は全コンポーネント共通のドメインエラー。
//! `kind()` で運用上の分類（どう回復するか）に写像する。

use thiserror::Error;

use super::ids::{HolderId, LockName, PostingId};
use super::state::PostingState;

/// ErrorKind は実行エラーの運用分類
///
/// - Unreachable: 対象が存在しない / 到達不能（SKIPPED へ）
/// - Conflict: 楽観的並行制御の衝突（一度だけ再読込してリトライ）
/// - LockContention: 他の holder がロック保持中（tick を静かに中断）
/// - TransientBlock: 一時的な拒否（有限回リトライ → DEFERRED）
/// - Ambiguous: 成否不明（DEFERRED、APPLIED にはしない）
/// - Infrastructure: Store / Lock Manager の障害（状態変更せず中断）
/// - Invalid: 呼び出し側の誤り（不正な遷移・候補・設定、session の誤用）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unreachable,
    Conflict,
    LockContention,
    TransientBlock,
    Ambiguous,
    Infrastructure,
    Invalid,
}

/// ShuttleError はドメインエラー
#[derive(Debug, Error)]
pub enum ShuttleError {
    #[error("target unreachable: {0}")]
    Unreachable(String),

    #[error("state conflict on {id}: expected {expected}, found {actual}")]
    StateConflict {
        id: PostingId,
        expected: PostingState,
        actual: PostingState,
    },

    #[error("claim on {id} is no longer held by {holder}")]
    ClaimLost { id: PostingId, holder: HolderId },

    #[error("lock '{0}' is held by another holder")]
    LockContention(LockName),

    #[error("transient block: {0}")]
    TransientBlock(String),

    #[error("ambiguous outcome: {0}")]
    Ambiguous(String),

    #[error("infrastructure failure: {0}")]
    Infrastructure(String),

    #[error("posting not found: {0}")]
    NotFound(PostingId),

    #[error("invalid transition for {id}: {from} -> {to}: {reason}")]
    InvalidTransition {
        id: PostingId,
        from: PostingState,
        to: PostingState,
        reason: String,
    },

    #[error("invalid candidate: {0}")]
    InvalidCandidate(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("submission session misuse: {0}")]
    Session(String),
}

impl ShuttleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ShuttleError::Unreachable(_) | ShuttleError::NotFound(_) => ErrorKind::Unreachable,
            ShuttleError::StateConflict { .. } | ShuttleError::ClaimLost { .. } => {
                ErrorKind::Conflict
            }
            ShuttleError::LockContention(_) => ErrorKind::LockContention,
            ShuttleError::TransientBlock(_) => ErrorKind::TransientBlock,
            ShuttleError::Ambiguous(_) => ErrorKind::Ambiguous,
            ShuttleError::Infrastructure(_) => ErrorKind::Infrastructure,
            ShuttleError::InvalidTransition { .. }
            | ShuttleError::InvalidCandidate(_)
            | ShuttleError::Config(_)
            | ShuttleError::Session(_) => ErrorKind::Invalid,
        }
    }

    pub fn infrastructure(err: impl std::fmt::Display) -> Self {
        ShuttleError::Infrastructure(err.to_string())
    }

    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }
}

impl From<std::io::Error> for ShuttleError {
    fn from(err: std::io::Error) -> Self {
        ShuttleError::Infrastructure(err.to_string())
    }
}

pub type Result<T, E = ShuttleError> = std::result::Result<T, E>;
