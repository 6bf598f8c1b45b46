//! Producer - 候補を重複判定・スコアリングしてキューに入れる
//!
//! # フロー
//! 1. canonical key（主キー・副キー）を導出
//! 2. パーティションを決定（明示 or URL パターン）
//! 3. ポリシーで拒否（blocked company、報酬下限）
//! 4. DedupIndex で既知判定（挿入より必ず先）
//! 5. スコアを一度だけ計算し、min_score 未満は拒否
//! 6. Store に upsert（identity 制約が並行 submit の最終防衛線）

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::context::AppContext;
use crate::config::{PartitionConfig, ProducerConfig, ScoringConfig};
use crate::domain::dedup::derive_keys;
use crate::domain::score::parse_compensation;
use crate::domain::{
    Candidate, DedupLookup, DedupOutcome, Partition, Posting, PostingId, Result, ScoreInputs,
    Scorer, ShuttleError,
};
use crate::ports::UpsertResult;

/// Why a candidate was not queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    InvalidUrl { detail: String },
    UnknownPartition { url: String },
    BelowCompensationFloor { compensation: u32, floor: u32 },
    BlockedCompany { company: String },
    BelowMinScore { score: u32, min: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SubmitOutcome {
    Inserted { id: PostingId },
    Duplicate { id: PostingId, outcome: DedupOutcome },
    Rejected(RejectReason),
}

/// Totals of a batch submission (one discovery run).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub inserted: usize,
    pub duplicates: usize,
    pub rejected: usize,
    pub errors: usize,
}

pub struct Producer {
    ctx: AppContext,
    scorer: Arc<dyn Scorer>,
    policy: ProducerConfig,
    scoring: ScoringConfig,
    partitions: Vec<PartitionConfig>,
}

impl Producer {
    pub fn new(
        ctx: AppContext,
        scorer: Arc<dyn Scorer>,
        policy: ProducerConfig,
        scoring: ScoringConfig,
        partitions: Vec<PartitionConfig>,
    ) -> Self {
        Self {
            ctx,
            scorer,
            policy,
            scoring,
            partitions,
        }
    }

    pub async fn submit(&self, candidate: Candidate) -> Result<SubmitOutcome> {
        let keys = match derive_keys(
            &candidate.url,
            candidate.company.as_deref(),
            candidate.title.as_deref(),
        ) {
            Ok(keys) => keys,
            Err(ShuttleError::InvalidCandidate(detail)) => {
                return Ok(self.reject(RejectReason::InvalidUrl { detail }));
            }
            Err(e) => return Err(e),
        };

        let Some(partition) = self.resolve_partition(&candidate, &keys.url) else {
            return Ok(self.reject(RejectReason::UnknownPartition {
                url: keys.url.clone(),
            }));
        };

        if let Some(company) = candidate.company.as_deref()
            && self.policy.is_blocked(company)
        {
            return Ok(self.reject(RejectReason::BlockedCompany {
                company: company.to_string(),
            }));
        }

        let compensation = candidate.compensation.as_deref().and_then(parse_compensation);
        if let (Some(compensation), Some(floor)) = (compensation, self.policy.compensation_floor)
            && compensation < floor
        {
            return Ok(self.reject(RejectReason::BelowCompensationFloor { compensation, floor }));
        }

        let key_refs: Vec<_> = keys.iter().collect();
        if let DedupLookup::Seen(entry) = self.ctx.dedup.lookup_any(&key_refs).await? {
            debug!(key = %entry.key, outcome = %entry.outcome, "duplicate candidate");
            return Ok(SubmitOutcome::Duplicate {
                id: entry.posting,
                outcome: entry.outcome,
            });
        }

        let now = self.ctx.clock.now();
        let inputs = ScoreInputs {
            posted_at: candidate.posted_at,
            compensation,
            source_rating: self
                .scoring
                .rating_for(&[candidate.company.as_deref(), candidate.source.as_deref()]),
            title: candidate.title.clone(),
        };
        let breakdown = self.scorer.score(&inputs, now);
        if breakdown.total < self.policy.min_score {
            return Ok(self.reject(RejectReason::BelowMinScore {
                score: breakdown.total,
                min: self.policy.min_score,
            }));
        }

        let posting = Posting::new(
            keys.primary.clone().into(),
            keys.url.clone(),
            partition,
            breakdown.total,
            now,
        )
        .with_meta(candidate.meta())
        .with_secondary_key(keys.secondary.clone());

        match self.ctx.store.upsert(posting).await? {
            UpsertResult::Inserted(p) => {
                for key in keys.iter() {
                    self.ctx.dedup.record(key, &p.id, DedupOutcome::Pending).await?;
                }
                info!(
                    id = %p.id,
                    partition = %p.partition,
                    score = p.score,
                    breakdown = %breakdown,
                    "posting queued"
                );
                Ok(SubmitOutcome::Inserted { id: p.id })
            }
            UpsertResult::Existing(p) => {
                // 挿入と dedup 記録の間で落ちた場合の修復
                let outcome = DedupOutcome::from(p.state);
                for key in keys.iter() {
                    self.ctx.dedup.record(key, &p.id, outcome).await?;
                }
                debug!(id = %p.id, "candidate already stored");
                Ok(SubmitOutcome::Duplicate { id: p.id, outcome })
            }
        }
    }

    /// Submit every candidate; one failure does not stop the batch.
    pub async fn submit_batch(&self, candidates: Vec<Candidate>) -> BatchReport {
        let mut report = BatchReport::default();
        for candidate in candidates {
            match self.submit(candidate).await {
                Ok(SubmitOutcome::Inserted { .. }) => report.inserted += 1,
                Ok(SubmitOutcome::Duplicate { .. }) => report.duplicates += 1,
                Ok(SubmitOutcome::Rejected(_)) => report.rejected += 1,
                Err(e) => {
                    warn!(error = %e, "candidate submission failed");
                    report.errors += 1;
                }
            }
        }
        report
    }

    fn resolve_partition(&self, candidate: &Candidate, normalized_url: &str) -> Option<Partition> {
        if let Some(explicit) = candidate.partition.as_deref() {
            let explicit = Partition::new(explicit);
            return self
                .partitions
                .iter()
                .any(|p| p.name == explicit)
                .then_some(explicit);
        }
        self.partitions
            .iter()
            .find(|p| p.matches(normalized_url) || p.matches(&candidate.url))
            .map(|p| p.name.clone())
    }

    fn reject(&self, reason: RejectReason) -> SubmitOutcome {
        debug!(?reason, "candidate rejected");
        SubmitOutcome::Rejected(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ShuttleConfig;
    use crate::domain::BucketScorer;
    use crate::ports::FixedClock;
    use chrono::{TimeZone, Utc};
    use rstest::rstest;

    fn producer() -> (Producer, AppContext) {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap(),
        ));
        let ctx = AppContext::in_memory(clock);
        let cfg = ShuttleConfig::default();
        let producer = Producer::new(
            ctx.clone(),
            Arc::new(BucketScorer::default()),
            cfg.producer,
            cfg.scoring,
            cfg.partitions,
        );
        (producer, ctx)
    }

    #[tokio::test]
    async fn inserts_then_reports_duplicate() {
        let (producer, ctx) = producer();
        let c = Candidate::new("https://jobs.lever.co/acme/1").with_company_title("Acme", "SRE");

        let first = producer.submit(c.clone()).await.unwrap();
        let SubmitOutcome::Inserted { id } = first else {
            panic!("expected insert, got {first:?}");
        };
        let p = ctx.store.get(&id).await.unwrap().unwrap();
        assert_eq!(p.partition.as_str(), "lever");

        let again = producer.submit(c).await.unwrap();
        assert_eq!(
            again,
            SubmitOutcome::Duplicate {
                id,
                outcome: DedupOutcome::Pending
            }
        );
    }

    #[tokio::test]
    async fn company_title_duplicate_names_the_stored_posting() {
        let (producer, ctx) = producer();
        let first = producer
            .submit(Candidate::new("https://jobs.lever.co/acme/1").with_company_title("Acme", "SRE"))
            .await
            .unwrap();
        let SubmitOutcome::Inserted { id } = first else {
            panic!("expected insert, got {first:?}");
        };

        // same role reposted under another URL matches only on company+title
        let repost = producer
            .submit(Candidate::new("https://jobs.lever.co/acme/2").with_company_title("ACME", "sre"))
            .await
            .unwrap();
        let SubmitOutcome::Duplicate { id: dup, .. } = repost else {
            panic!("expected duplicate, got {repost:?}");
        };
        assert_eq!(dup, id);
        assert!(ctx.store.get(&dup).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn tracking_variant_is_duplicate() {
        let (producer, _) = producer();
        producer
            .submit(Candidate::new("https://boards.greenhouse.io/acme/jobs/7"))
            .await
            .unwrap();
        let v = producer
            .submit(Candidate::new(
                "https://boards.greenhouse.io/acme/jobs/7/?utm_source=linkedin",
            ))
            .await
            .unwrap();
        assert!(matches!(v, SubmitOutcome::Duplicate { .. }));
    }

    #[tokio::test]
    async fn same_company_title_on_other_url_is_duplicate() {
        let (producer, _) = producer();
        producer
            .submit(Candidate::new("https://jobs.lever.co/acme/1").with_company_title("Acme", "SRE"))
            .await
            .unwrap();
        let v = producer
            .submit(
                Candidate::new("https://jobs.ashbyhq.com/acme/99")
                    .with_company_title("ACME", " sre "),
            )
            .await
            .unwrap();
        assert!(matches!(v, SubmitOutcome::Duplicate { .. }));
    }

    #[rstest]
    #[case::bad_url(Candidate::new("ftp://x/1"), "invalid_url")]
    #[case::unknown_partition(Candidate::new("https://acme.workday.com/job/1"), "unknown_partition")]
    #[case::unconfigured_partition(
        Candidate::new("https://jobs.lever.co/acme/1").with_partition("workday"),
        "unknown_partition"
    )]
    #[case::blocked(
        Candidate::new("https://jobs.lever.co/openai/1").with_company_title("OpenAI", "MTS"),
        "blocked_company"
    )]
    #[case::floor(
        Candidate::new("https://jobs.lever.co/acme/2").with_compensation("$90k - $120k"),
        "below_compensation_floor"
    )]
    #[tokio::test]
    async fn rejections(#[case] candidate: Candidate, #[case] reason: &str) {
        let (producer, _) = producer();
        let outcome = producer.submit(candidate).await.unwrap();
        let SubmitOutcome::Rejected(r) = outcome else {
            panic!("expected rejection, got {outcome:?}");
        };
        assert_eq!(serde_json::to_value(&r).unwrap()["reason"], reason);
    }

    #[tokio::test]
    async fn final_dedup_outcome_is_a_hard_stop() {
        let (producer, ctx) = producer();
        let key = crate::domain::DedupKey::new("https://jobs.lever.co/acme/5");
        let id = PostingId::new("jobs.lever.co/acme/5");
        ctx.dedup.record(&key, &id, DedupOutcome::Applied).await.unwrap();

        let v = producer
            .submit(Candidate::new("https://jobs.lever.co/acme/5/application"))
            .await
            .unwrap();
        assert_eq!(
            v,
            SubmitOutcome::Duplicate {
                id,
                outcome: DedupOutcome::Applied
            }
        );
    }

    #[tokio::test]
    async fn batch_counts_each_outcome() {
        let (producer, _) = producer();
        let report = producer
            .submit_batch(vec![
                Candidate::new("https://jobs.lever.co/acme/1"),
                Candidate::new("https://jobs.lever.co/acme/1?ref=x"),
                Candidate::new("nope"),
            ])
            .await;
        assert_eq!(
            report,
            BatchReport {
                inserted: 1,
                duplicates: 1,
                rejected: 1,
                errors: 0
            }
        );
    }
}
