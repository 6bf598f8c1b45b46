//! DedupIndex port - canonical key の既知判定

use async_trait::async_trait;

use crate::domain::{DedupKey, DedupLookup, DedupOutcome, PostingId, Result};

/// DedupIndex はキーごとの最終 outcome を覚えている
///
/// エントリは削除しない。同じキーへの `record` は outcome を上書きする。
#[async_trait]
pub trait DedupIndex: Send + Sync {
    async fn lookup(&self, key: &DedupKey) -> Result<DedupLookup>;

    /// `posting` は key が指す Store 上の posting（副キーでも本体の id）
    async fn record(&self, key: &DedupKey, posting: &PostingId, outcome: DedupOutcome) -> Result<()>;

    /// First `Seen` among `keys`, checked in order.
    async fn lookup_any(&self, keys: &[&DedupKey]) -> Result<DedupLookup> {
        for key in keys {
            if let DedupLookup::Seen(entry) = self.lookup(key).await? {
                return Ok(DedupLookup::Seen(entry));
            }
        }
        Ok(DedupLookup::New)
    }
}
