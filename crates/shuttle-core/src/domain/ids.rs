//! Domain identifiers (strongly-typed IDs).
//!
//! # 二種類の ID
//! - **生成 ID**: ULID ベースの `Id<T>`（`RunId`, `AuditId`）。時刻でソート可能で、
//!   複数プロセスから調整なしで生成できる。
//! - **自然キー**: 文字列ベースの newtype（`PostingId`, `HolderId`, `LockName`）。
//!   posting の identity は正規化済み URL などの canonical key そのもの。
//!
//! ## Phantom Type パターン
//! `Id<T>` の `T` は実行時には使わないマーカー型で、
//! `RunId` と `AuditId` をコンパイル時に区別する。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
///
/// Display で使うプレフィックス（"run-", "audit-"）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// Worker run のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Run {}

impl IdMarker for Run {
    fn prefix() -> &'static str {
        "run-"
    }
}

/// 監査ログエントリのマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Audit {}

impl IdMarker for Audit {
    fn prefix() -> &'static str {
        "audit-"
    }
}

/// Identifier of one worker run (one claim, one lock, one target).
pub type RunId = Id<Run>;

/// Identifier of one operator override entry.
pub type AuditId = Id<Audit>;

// ========================================
// 文字列ベースの自然キー
// ========================================

macro_rules! string_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_key!(
    /// Identity of a posting: its canonical dedup key.
    PostingId
);

string_key!(
    /// Opaque identity of a lock holder.
    ///
    /// Lock Manager は holder の中身を解釈しない（プロセスでもスレッドでもよい）。
    HolderId
);

string_key!(
    /// Name of a lock resource (`apply-{partition}` or `dispatch`).
    LockName
);

impl From<RunId> for HolderId {
    fn from(run_id: RunId) -> Self {
        Self(run_id.to_string())
    }
}
