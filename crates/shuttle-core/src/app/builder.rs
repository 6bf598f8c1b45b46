//! AppBuilder - アプリケーションの構築とワイヤリング
//!
//! # Fail-fast 設計
//! - 設定は build() 時に validate() する
//! - expect_partitions() で期待されるパーティションを登録
//! - build() 時に「期待集合 ⊆ 登録済み集合」をチェックし、不足があれば BuildError

use std::sync::Arc;

use super::admin::Admin;
use super::context::AppContext;
use super::dispatcher::Dispatcher;
use super::launcher::TokioLauncher;
use super::producer::Producer;
use super::registry::{RegistryError, StrategyRegistry};
use super::status::StatusQuery;
use crate::config::{ConfigError, ShuttleConfig};
use crate::domain::{BucketScorer, Decider, DefaultDecider, Partition, Scorer};
use crate::ports::SubmissionStrategy;

/// AppBuilder はアプリケーションを構築
///
/// # 使用例
/// ```ignore
/// let app = AppBuilder::new(config)
///     .register("lever", Arc::new(LeverStrategy))?
///     .expect_partitions(&["lever"])
///     .build(ctx)?;
/// ```
pub struct AppBuilder {
    config: ShuttleConfig,
    registry: StrategyRegistry,
    expected: Option<Vec<Partition>>,
    scorer: Option<Arc<dyn Scorer>>,
    decider: Option<Arc<dyn Decider>>,
}

/// BuildError はアプリケーション構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing strategies for partitions: {0:?}")]
    MissingStrategies(Vec<Partition>),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl AppBuilder {
    pub fn new(config: ShuttleConfig) -> Self {
        Self {
            config,
            registry: StrategyRegistry::new(),
            expected: None,
            scorer: None,
            decider: None,
        }
    }

    pub fn register(
        mut self,
        partition: impl Into<Partition>,
        strategy: Arc<dyn SubmissionStrategy>,
    ) -> Result<Self, RegistryError> {
        self.registry.register(partition, strategy)?;
        Ok(self)
    }

    pub fn expect_partitions(mut self, partitions: &[&str]) -> Self {
        self.expected = Some(partitions.iter().map(Partition::new).collect());
        self
    }

    /// Expect a strategy for every enabled partition of the config.
    pub fn expect_enabled_partitions(mut self) -> Self {
        self.expected = Some(
            self.config
                .partitions
                .iter()
                .filter(|p| p.enabled)
                .map(|p| p.name.clone())
                .collect(),
        );
        self
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn Scorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    pub fn with_decider(mut self, decider: Arc<dyn Decider>) -> Self {
        self.decider = Some(decider);
        self
    }

    pub fn build(self, ctx: AppContext) -> Result<App, BuildError> {
        self.config.validate()?;
        if let Some(expected) = &self.expected {
            let registered = self.registry.registered();
            let missing: Vec<Partition> = expected
                .iter()
                .filter(|p| !registered.contains(p))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingStrategies(missing));
            }
        }

        let config = self.config;
        let scorer: Arc<dyn Scorer> = match self.scorer {
            Some(scorer) => scorer,
            None => Arc::new(BucketScorer::new(
                config.scoring.weights.clone(),
                config.scoring.roles.clone(),
            )),
        };
        let decider: Arc<dyn Decider> = match self.decider {
            Some(decider) => decider,
            None => Arc::new(DefaultDecider::new(
                config.worker.retry.clone(),
                config.worker.max_block_retries,
            )),
        };

        let producer = Arc::new(Producer::new(
            ctx.clone(),
            scorer,
            config.producer.clone(),
            config.scoring.clone(),
            config.partitions.clone(),
        ));
        let launcher = Arc::new(TokioLauncher::new(
            ctx.clone(),
            self.registry,
            decider,
            config.worker.clone(),
        ));
        let dispatcher = Arc::new(Dispatcher::new(ctx.clone(), &config, launcher.clone()));

        Ok(App {
            status: StatusQuery::new(ctx.clone(), config.partitions.clone()),
            admin: Admin::new(ctx.clone()),
            ctx,
            config,
            producer,
            launcher,
            dispatcher,
        })
    }
}

/// App は組み上がったコンポーネント一式
pub struct App {
    pub ctx: AppContext,
    pub config: ShuttleConfig,
    pub producer: Arc<Producer>,
    pub launcher: Arc<TokioLauncher>,
    pub dispatcher: Arc<Dispatcher>,
    pub status: StatusQuery,
    pub admin: Admin,
}
