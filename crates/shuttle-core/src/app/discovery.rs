//! DiscoveryLoop - CandidateSource から候補を集めて Producer に流す
//!
//! 1 回の run で全ソースを順に fetch し、まとめて submit する。
//! 次の run までの待ち時間は DiscoveryCadence が収穫量から決める。

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::cadence::DiscoveryCadence;
use super::producer::{BatchReport, Producer};
use super::worker::wait_for_shutdown;
use crate::ports::CandidateSource;

pub struct DiscoveryLoop {
    producer: Arc<Producer>,
    sources: Vec<Arc<dyn CandidateSource>>,
    cadence: DiscoveryCadence,
}

impl DiscoveryLoop {
    pub fn new(
        producer: Arc<Producer>,
        sources: Vec<Arc<dyn CandidateSource>>,
        cadence: DiscoveryCadence,
    ) -> Self {
        Self {
            producer,
            sources,
            cadence,
        }
    }

    pub fn cadence(&self) -> &DiscoveryCadence {
        &self.cadence
    }

    /// One pass over every source. A failing source is logged and counted.
    pub async fn run_once(&mut self) -> BatchReport {
        let mut total = BatchReport::default();
        for source in &self.sources {
            let candidates = match source.fetch().await {
                Ok(candidates) => candidates,
                Err(e) => {
                    warn!(source = source.name(), error = %e, "source fetch failed");
                    total.errors += 1;
                    continue;
                }
            };
            let report = self.producer.submit_batch(candidates).await;
            info!(
                source = source.name(),
                inserted = report.inserted,
                duplicates = report.duplicates,
                rejected = report.rejected,
                "discovery batch"
            );
            total.inserted += report.inserted;
            total.duplicates += report.duplicates;
            total.rejected += report.rejected;
            total.errors += report.errors;
        }
        self.cadence.record(total.inserted);
        total
    }

    /// Run until shutdown, sleeping per the cadence between passes.
    pub fn spawn(mut self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                if *shutdown.borrow() {
                    break;
                }
                self.run_once().await;
                let wait = self.cadence.next_interval();
                info!(tier = ?self.cadence.tier(), next_in = ?wait, "discovery pass done");
                tokio::select! {
                    _ = wait_for_shutdown(&mut shutdown) => break,
                    _ = tokio::time::sleep(wait) => {}
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::cadence::CadenceTier;
    use crate::app::context::AppContext;
    use crate::config::ShuttleConfig;
    use crate::domain::{BucketScorer, Candidate, Result, ShuttleError};
    use crate::ports::SystemClock;
    use async_trait::async_trait;

    struct Fixed(Vec<Candidate>);

    #[async_trait]
    impl CandidateSource for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn fetch(&self) -> Result<Vec<Candidate>> {
            Ok(self.0.clone())
        }
    }

    struct Broken;

    #[async_trait]
    impl CandidateSource for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        async fn fetch(&self) -> Result<Vec<Candidate>> {
            Err(ShuttleError::Unreachable("api down".into()))
        }
    }

    #[tokio::test]
    async fn second_pass_finds_only_duplicates() {
        let cfg = ShuttleConfig::default();
        let ctx = AppContext::in_memory(Arc::new(SystemClock));
        let producer = Arc::new(Producer::new(
            ctx,
            Arc::new(BucketScorer::default()),
            cfg.producer,
            cfg.scoring,
            cfg.partitions,
        ));
        let source = Fixed(vec![
            Candidate::new("https://jobs.lever.co/acme/1"),
            Candidate::new("https://jobs.ashbyhq.com/acme/2"),
        ]);
        let mut discovery = DiscoveryLoop::new(
            producer,
            vec![Arc::new(source), Arc::new(Broken)],
            DiscoveryCadence::new(cfg.discovery.cadence),
        );

        let first = discovery.run_once().await;
        assert_eq!((first.inserted, first.errors), (2, 1));

        let second = discovery.run_once().await;
        assert_eq!((second.inserted, second.duplicates), (0, 2));
        assert_eq!(discovery.cadence().tier(), CadenceTier::Normal);
    }
}
