//! Partition - 独立した作業レーン（外部システムのファミリーごとに一つ）

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use super::ids::LockName;

/// Name of the optional global lock serializing dispatch ticks.
pub const DISPATCH_LOCK: &str = "dispatch";

/// Partition は一つの外部システムファミリー（greenhouse, lever, ashby, ...）
///
/// 名前は小文字に正規化して保持する。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Partition(String);

impl<'de> Deserialize<'de> for Partition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Partition::new)
    }
}

impl Partition {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The per-partition lock (`apply-{name}`).
    pub fn lock_name(&self) -> LockName {
        LockName::new(format!("apply-{}", self.0))
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for Partition {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Static priority ordering of partitions, configured once.
///
/// 先頭ほど優先度が高い。dispatch のタイブレークに使う。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionOrder(Vec<Partition>);

impl PartitionOrder {
    pub fn new(partitions: Vec<Partition>) -> Self {
        Self(partitions)
    }

    /// Rank of a partition; unknown partitions sort last.
    pub fn rank(&self, partition: &Partition) -> usize {
        self.0
            .iter()
            .position(|p| p == partition)
            .unwrap_or(usize::MAX)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Partition> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_names_are_normalized() {
        assert_eq!(Partition::new(" Greenhouse ").as_str(), "greenhouse");
    }

    #[test]
    fn deserialization_normalizes() {
        let p: Partition = serde_json::from_str("\"Lever\"").unwrap();
        assert_eq!(p, Partition::new("lever"));
    }

    #[test]
    fn lock_name_is_prefixed() {
        assert_eq!(Partition::new("lever").lock_name().as_str(), "apply-lever");
    }

    #[test]
    fn rank_follows_configured_order() {
        let order = PartitionOrder::new(vec!["ashby".into(), "greenhouse".into()]);
        assert_eq!(order.rank(&"ashby".into()), 0);
        assert_eq!(order.rank(&"greenhouse".into()), 1);
        assert_eq!(order.rank(&"lever".into()), usize::MAX);
    }
}
