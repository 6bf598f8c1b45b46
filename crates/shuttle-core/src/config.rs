//! Configuration - YAML 設定ファイル
//!
//! `ShuttleConfig::load(path)` で読み込み、`validate()` で起動時に検証する（fail-fast）。
//! 時間はすべて秒（小数可）で書く。

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::domain::score::{RoleKeywords, ScoreWeights};
use crate::domain::{Partition, PartitionOrder, RetryPolicy};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Serde helper: `Duration` as (fractional) seconds.
pub mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

/// Serde helper: `Option<Duration>` as (fractional) seconds.
pub mod opt_duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&d.as_secs_f64()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<f64>::deserialize(d)?
            .map(|secs| Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShuttleConfig {
    /// Directory holding the journals.
    pub state_dir: PathBuf,
    pub dispatch: DispatchConfig,
    /// Ordered: earlier partitions win dispatch ties.
    pub partitions: Vec<PartitionConfig>,
    pub producer: ProducerConfig,
    pub scoring: ScoringConfig,
    pub worker: WorkerConfig,
    pub discovery: DiscoveryConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    #[serde(with = "duration_secs")]
    pub tick_interval: Duration,

    /// Serialize ticks across dispatcher instances with the `dispatch` lock.
    pub global_lock: bool,

    #[serde(with = "duration_secs")]
    pub dispatch_lock_ttl: Duration,

    /// A claim older than this whose holder lost the partition lock is abandoned.
    #[serde(with = "duration_secs")]
    pub claim_liveness: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(60),
            global_lock: true,
            dispatch_lock_ttl: Duration::from_secs(30),
            claim_liveness: Duration::from_secs(40 * 60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionConfig {
    pub name: Partition,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Substrings of a URL that select this partition.
    #[serde(default)]
    pub url_patterns: Vec<String>,

    #[serde(default = "default_partition_ttl", with = "duration_secs")]
    pub lock_ttl: Duration,

    /// Hard wall-clock budget of one run; defaults to the lock TTL.
    #[serde(default, with = "opt_duration_secs", skip_serializing_if = "Option::is_none")]
    pub run_budget: Option<Duration>,

    /// External command implementing the submission strategy (argv).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_partition_ttl() -> Duration {
    Duration::from_secs(20 * 60)
}

impl PartitionConfig {
    pub fn new(name: &str, patterns: &[&str], lock_ttl: Duration) -> Self {
        Self {
            name: Partition::new(name),
            enabled: true,
            url_patterns: patterns.iter().map(|p| p.to_string()).collect(),
            lock_ttl,
            run_budget: None,
            command: Vec::new(),
        }
    }

    pub fn run_budget(&self) -> Duration {
        self.run_budget.unwrap_or(self.lock_ttl)
    }

    pub fn matches(&self, url: &str) -> bool {
        let url = url.to_lowercase();
        self.url_patterns
            .iter()
            .any(|p| !p.is_empty() && url.contains(&p.to_lowercase()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProducerConfig {
    /// Reject candidates whose known compensation is below this (annual USD).
    pub compensation_floor: Option<u32>,
    pub min_score: u32,
    /// Lowercased company names that are never queued.
    pub blocked_companies: Vec<String>,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            compensation_floor: Some(150_000),
            min_score: 0,
            blocked_companies: vec!["openai".into(), "databricks".into()],
        }
    }
}

impl ProducerConfig {
    pub fn is_blocked(&self, company: &str) -> bool {
        let company = company.trim().to_lowercase();
        self.blocked_companies
            .iter()
            .any(|b| b.trim().to_lowercase() == company)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: ScoreWeights,
    pub roles: RoleKeywords,
    /// Desirability per source or company name (lowercased), 0..=100.
    pub source_ratings: BTreeMap<String, u32>,
}

impl ScoringConfig {
    pub fn rating_for(&self, names: &[Option<&str>]) -> Option<u32> {
        names
            .iter()
            .flatten()
            .find_map(|n| self.source_ratings.get(&n.trim().to_lowercase()).copied())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub max_block_retries: u32,

    #[serde(with = "duration_secs")]
    pub phase_timeout: Duration,

    /// Backoff between blocked submission attempts within a run.
    pub retry: RetryPolicy,

    /// Backoff of the deferral window, by defer count.
    pub defer_backoff: RetryPolicy,

    /// After this many deferrals a posting stays parked.
    pub max_defers: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_block_retries: 2,
            phase_timeout: Duration::from_secs(10 * 60),
            retry: RetryPolicy::default(),
            defer_backoff: RetryPolicy::new(
                Duration::from_secs(30 * 60),
                2.0,
                Duration::from_secs(24 * 60 * 60),
            ),
            max_defers: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Directory scanned for `*.jsonl` candidate files; relative to `state_dir`.
    pub inbox_dir: PathBuf,
    pub cadence: CadenceConfig,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            inbox_dir: PathBuf::from("inbox"),
            cadence: CadenceConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CadenceConfig {
    /// Average inserts per run at or above which discovery speeds up.
    pub high_yield_avg: f64,
    /// Consecutive zero-yield runs before slowing down.
    pub low_after: u32,
    pub idle_after: u32,
    /// Number of recent runs averaged.
    pub window: usize,

    #[serde(with = "duration_secs")]
    pub high: Duration,
    #[serde(with = "duration_secs")]
    pub normal: Duration,
    #[serde(with = "duration_secs")]
    pub low: Duration,
    #[serde(with = "duration_secs")]
    pub idle: Duration,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            high_yield_avg: 5.0,
            low_after: 3,
            idle_after: 6,
            window: 6,
            high: Duration::from_secs(3 * 60),
            normal: Duration::from_secs(5 * 60),
            low: Duration::from_secs(10 * 60),
            idle: Duration::from_secs(15 * 60),
        }
    }
}

impl Default for ShuttleConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("state"),
            dispatch: DispatchConfig::default(),
            partitions: vec![
                PartitionConfig::new("ashby", &["ashbyhq.com"], Duration::from_secs(15 * 60)),
                PartitionConfig::new(
                    "greenhouse",
                    &["greenhouse.io", "gh_jid="],
                    Duration::from_secs(45 * 60),
                ),
                PartitionConfig::new("lever", &["lever.co"], Duration::from_secs(15 * 60)),
            ],
            producer: ProducerConfig::default(),
            scoring: ScoringConfig::default(),
            worker: WorkerConfig::default(),
            discovery: DiscoveryConfig::default(),
        }
    }
}

impl ShuttleConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.partitions.is_empty() {
            return Err(ConfigError::Invalid("no partitions configured".into()));
        }

        let mut seen = HashSet::new();
        for p in &self.partitions {
            if p.name.as_str().is_empty() {
                return Err(ConfigError::Invalid("partition with empty name".into()));
            }
            if !seen.insert(&p.name) {
                return Err(ConfigError::Invalid(format!("duplicate partition '{}'", p.name)));
            }
            if p.lock_ttl.is_zero() || p.run_budget().is_zero() {
                return Err(ConfigError::Invalid(format!(
                    "partition '{}' has a zero lock ttl or run budget",
                    p.name
                )));
            }
        }

        // 1 phase は renew から次の renew までロックの TTL 内に収まること
        if let Some(p) = self
            .partitions
            .iter()
            .find(|p| p.enabled && self.worker.phase_timeout >= p.lock_ttl)
        {
            return Err(ConfigError::Invalid(format!(
                "worker.phase_timeout ({}s) must be shorter than the lock ttl of partition '{}' ({}s)",
                self.worker.phase_timeout.as_secs(),
                p.name,
                p.lock_ttl.as_secs()
            )));
        }

        let durations = [
            ("dispatch.tick_interval", self.dispatch.tick_interval),
            ("dispatch.dispatch_lock_ttl", self.dispatch.dispatch_lock_ttl),
            ("dispatch.claim_liveness", self.dispatch.claim_liveness),
            ("worker.phase_timeout", self.worker.phase_timeout),
            ("discovery.cadence.high", self.discovery.cadence.high),
            ("discovery.cadence.normal", self.discovery.cadence.normal),
            ("discovery.cadence.low", self.discovery.cadence.low),
            ("discovery.cadence.idle", self.discovery.cadence.idle),
        ];
        if let Some((name, _)) = durations.iter().find(|(_, d)| d.is_zero()) {
            return Err(ConfigError::Invalid(format!("{name} must be positive")));
        }

        for (name, policy) in [
            ("worker.retry", &self.worker.retry),
            ("worker.defer_backoff", &self.worker.defer_backoff),
        ] {
            if policy.multiplier < 1.0 || !policy.multiplier.is_finite() {
                return Err(ConfigError::Invalid(format!(
                    "{name}.multiplier must be a finite value >= 1.0"
                )));
            }
        }
        Ok(())
    }

    pub fn partition_order(&self) -> PartitionOrder {
        PartitionOrder::new(self.partitions.iter().map(|p| p.name.clone()).collect())
    }

    pub fn partition(&self, name: &Partition) -> Option<&PartitionConfig> {
        self.partitions.iter().find(|p| &p.name == name)
    }

    /// First configured partition whose URL patterns match.
    pub fn detect_partition(&self, url: &str) -> Option<Partition> {
        self.partitions
            .iter()
            .find(|p| p.matches(url))
            .map(|p| p.name.clone())
    }

    /// Inbox directory, resolved against `state_dir` when relative.
    pub fn inbox_dir(&self) -> PathBuf {
        if self.discovery.inbox_dir.is_absolute() {
            self.discovery.inbox_dir.clone()
        } else {
            self.state_dir.join(&self.discovery.inbox_dir)
        }
    }
}
