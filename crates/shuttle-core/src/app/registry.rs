//! StrategyRegistry - パーティションごとの SubmissionStrategy の登録と管理
//!
//! - HashMap<Partition, Arc<dyn SubmissionStrategy>> で管理
//! - 二重登録は RegistryError::AlreadyRegistered

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::Partition;
use crate::ports::SubmissionStrategy;

#[derive(Default, Clone)]
pub struct StrategyRegistry {
    strategies: HashMap<Partition, Arc<dyn SubmissionStrategy>>,
}

/// RegistryError は StrategyRegistry の操作エラー
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("strategy for partition '{0}' is already registered")]
    AlreadyRegistered(Partition),
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        partition: impl Into<Partition>,
        strategy: Arc<dyn SubmissionStrategy>,
    ) -> Result<(), RegistryError> {
        let partition = partition.into();
        if self.strategies.contains_key(&partition) {
            return Err(RegistryError::AlreadyRegistered(partition));
        }
        self.strategies.insert(partition, strategy);
        Ok(())
    }

    pub fn get(&self, partition: &Partition) -> Option<Arc<dyn SubmissionStrategy>> {
        self.strategies.get(partition).cloned()
    }

    pub fn registered(&self) -> Vec<Partition> {
        let mut partitions: Vec<_> = self.strategies.keys().cloned().collect();
        partitions.sort();
        partitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Liveness, Result, SubmissionResult};
    use crate::ports::TargetHandle;
    use async_trait::async_trait;

    struct Noop;

    #[async_trait]
    impl SubmissionStrategy for Noop {
        async fn preflight(&self, _: &TargetHandle) -> Result<Liveness> {
            Ok(Liveness::Alive)
        }

        async fn submit(&self, _: &TargetHandle) -> Result<SubmissionResult> {
            Ok(SubmissionResult::Ambiguous {
                reason: "noop".into(),
            })
        }
    }

    #[test]
    fn register_and_get() {
        let mut registry = StrategyRegistry::new();
        registry.register("lever", Arc::new(Noop)).unwrap();
        assert!(registry.get(&"lever".into()).is_some());
        assert!(registry.get(&"ashby".into()).is_none());
    }

    #[test]
    fn double_registration_is_rejected() {
        let mut registry = StrategyRegistry::new();
        registry.register("lever", Arc::new(Noop)).unwrap();
        let err = registry.register("LEVER", Arc::new(Noop)).unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyRegistered(p) if p.as_str() == "lever"));
    }

    #[test]
    fn registered_is_sorted() {
        let mut registry = StrategyRegistry::new();
        registry.register("lever", Arc::new(Noop)).unwrap();
        registry.register("ashby", Arc::new(Noop)).unwrap();
        assert_eq!(
            registry.registered(),
            vec![Partition::new("ashby"), Partition::new("lever")]
        );
    }
}
