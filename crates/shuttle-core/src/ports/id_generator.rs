//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（本番用）

use crate::domain::ids::{AuditId, RunId};
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator は調整なしで一意な ID を生成
///
/// # ULID の特性
/// - 時刻でソート可能
/// - 複数プロセスから生成可能（調整不要）
pub trait IdGenerator: Send + Sync {
    /// Worker run ID を生成（lock holder としても使う）
    fn generate_run_id(&self) -> RunId;

    /// 監査ログエントリの ID を生成
    fn generate_audit_id(&self) -> AuditId;
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// Clock を使って現在時刻ベースの ULID を生成します。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_run_id(&self) -> RunId {
        RunId::from(self.next_ulid())
    }

    fn generate_audit_id(&self) -> AuditId {
        AuditId::from(self.next_ulid())
    }
}
