//! End-to-end tests: producer -> dispatcher -> worker -> store.
//!
//! Everything runs in memory with a FixedClock; worker runs are real tokio tasks.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use shuttle_core::app::{AppBuilder, AppContext, Dispatcher, SubmitOutcome, WorkerLauncher, WorkerTicket};
use shuttle_core::config::{PartitionConfig, ShuttleConfig};
use shuttle_core::domain::{
    Candidate, DedupOutcome, Evidence, Liveness, Partition, PartitionStatus, Posting, PostingId,
    PostingState, Result, SubmissionResult, TickResult,
};
use shuttle_core::ports::{Clock, FixedClock, SubmissionStrategy, TargetHandle};

fn clock() -> FixedClock {
    FixedClock::new(Utc.with_ymd_and_hms(2026, 10, 5, 8, 0, 0).unwrap())
}

/// Submits and reports a confirmation.
struct Confirming;

#[async_trait]
impl SubmissionStrategy for Confirming {
    async fn preflight(&self, _: &TargetHandle) -> Result<Liveness> {
        Ok(Liveness::Alive)
    }

    async fn submit(&self, target: &TargetHandle) -> Result<SubmissionResult> {
        Ok(SubmissionResult::Submitted {
            evidence: Some(Evidence::new(format!("confirmation for {}", target.url()), Utc::now())),
        })
    }
}

/// Claims success without any confirmation.
struct Unconfirmed;

#[async_trait]
impl SubmissionStrategy for Unconfirmed {
    async fn preflight(&self, _: &TargetHandle) -> Result<Liveness> {
        Ok(Liveness::Alive)
    }

    async fn submit(&self, _: &TargetHandle) -> Result<SubmissionResult> {
        Ok(SubmissionResult::Submitted { evidence: None })
    }
}

/// Accepts tickets and never runs them, like a worker process that died.
#[derive(Default)]
struct Crashing {
    tickets: Mutex<Vec<WorkerTicket>>,
}

#[async_trait]
impl WorkerLauncher for Crashing {
    async fn launch(&self, ticket: WorkerTicket) -> Result<()> {
        self.tickets.lock().await.push(ticket);
        Ok(())
    }
}

/// Accepts tickets and gives the partition lock straight back, leaving the claim.
struct Releasing {
    ctx: AppContext,
    tickets: Mutex<Vec<WorkerTicket>>,
}

#[async_trait]
impl WorkerLauncher for Releasing {
    async fn launch(&self, ticket: WorkerTicket) -> Result<()> {
        self.ctx
            .locks
            .release(&ticket.partition.lock_name(), &ticket.holder())
            .await?;
        self.tickets.lock().await.push(ticket);
        Ok(())
    }
}

fn inserted(outcome: SubmitOutcome) -> PostingId {
    match outcome {
        SubmitOutcome::Inserted { id } => id,
        other => panic!("expected insert, got {other:?}"),
    }
}

#[tokio::test]
async fn applied_only_with_evidence() {
    let clock = clock();
    let ctx = AppContext::in_memory(Arc::new(clock.clone()));
    let app = AppBuilder::new(ShuttleConfig::default())
        .register("lever", Arc::new(Confirming))
        .unwrap()
        .register("ashby", Arc::new(Unconfirmed))
        .unwrap()
        .build(ctx.clone())
        .unwrap();

    let lever = inserted(
        app.producer
            .submit(Candidate::new("https://jobs.lever.co/acme/1").with_company_title("Acme", "Platform Engineer"))
            .await
            .unwrap(),
    );
    let ashby = inserted(
        app.producer
            .submit(Candidate::new("https://jobs.ashbyhq.com/initech/2"))
            .await
            .unwrap(),
    );

    for _ in 0..2 {
        let report = app.dispatcher.tick().await;
        assert!(matches!(report.result, TickResult::Dispatched { .. }), "{report:?}");
        let runs = app.launcher.join_all().await;
        assert_eq!(runs.len(), 1);
    }

    let applied = ctx.store.get(&lever).await.unwrap().unwrap();
    assert_eq!(applied.state, PostingState::Applied);
    assert!(applied.evidence.as_ref().is_some_and(Evidence::is_substantive));

    let parked = ctx.store.get(&ashby).await.unwrap().unwrap();
    assert_eq!(parked.state, PostingState::Deferred);
    assert!(parked.evidence.is_none());
    assert!(parked.defer_until.is_none());

    let tracked = ctx.tracker.entries().await.unwrap();
    assert_eq!(tracked.len(), 1);
    assert_eq!(tracked[0].posting, lever);

    // APPLIED and parked postings are never re-queued by discovery
    let again = app
        .producer
        .submit(Candidate::new("https://jobs.lever.co/acme/1"))
        .await
        .unwrap();
    assert!(matches!(again, SubmitOutcome::Duplicate { outcome: DedupOutcome::Applied, .. }));
    assert_eq!(app.dispatcher.tick().await.result, TickResult::Nothing);

    for p in ctx.store.list_by_state(PostingState::Applied).await.unwrap() {
        assert!(p.evidence.is_some(), "{} applied without evidence", p.id);
    }
}

#[tokio::test]
async fn tracking_parameter_variant_is_duplicate() {
    let ctx = AppContext::in_memory(Arc::new(clock()));
    let app = AppBuilder::new(ShuttleConfig::default()).build(ctx.clone()).unwrap();

    let id = inserted(
        app.producer
            .submit(Candidate::new("https://jobs.lever.co/acme/1"))
            .await
            .unwrap(),
    );
    let variant = app
        .producer
        .submit(Candidate::new("https://jobs.lever.co/acme/1?utm_source=linkedin"))
        .await
        .unwrap();
    assert_eq!(
        variant,
        SubmitOutcome::Duplicate {
            id: id.clone(),
            outcome: DedupOutcome::Pending,
        }
    );
    assert_eq!(ctx.store.count_by_state(&"lever".into()).await.unwrap().pending, 1);
}

#[tokio::test]
async fn insertion_is_idempotent() {
    let clock = clock();
    let ctx = AppContext::in_memory(Arc::new(clock.clone()));
    let app = AppBuilder::new(ShuttleConfig::default()).build(ctx.clone()).unwrap();

    let candidate = Candidate::new("https://boards.greenhouse.io/acme/jobs/77")
        .with_company_title("Acme", "Staff SRE");
    let id = inserted(app.producer.submit(candidate.clone()).await.unwrap());
    for _ in 0..3 {
        assert!(matches!(
            app.producer.submit(candidate.clone()).await.unwrap(),
            SubmitOutcome::Duplicate { .. }
        ));
    }

    let original = ctx.store.get(&id).await.unwrap().unwrap();
    let replay = Posting::new(id.clone(), original.url.clone(), "greenhouse".into(), 999, clock.now());
    let result = ctx.store.upsert(replay).await.unwrap();
    assert!(!result.is_inserted());
    assert_eq!(result.posting().score, original.score);
    assert_eq!(ctx.store.count_by_state(&"greenhouse".into()).await.unwrap().total(), 1);
}

#[tokio::test]
async fn dispatch_follows_queue_order() {
    let clock = clock();
    let ctx = AppContext::in_memory(Arc::new(clock.clone()));
    let launcher = Arc::new(Releasing {
        ctx: ctx.clone(),
        tickets: Mutex::new(Vec::new()),
    });
    let dispatcher = Dispatcher::new(ctx.clone(), &ShuttleConfig::default(), launcher.clone());

    let t0 = clock.now();
    let rows = [
        ("low", 40, 0),
        ("late", 80, 5),
        ("early-b", 80, 0),
        ("early-a", 80, 0),
    ];
    for (id, score, minutes) in rows {
        let p = Posting::new(
            id.into(),
            format!("https://jobs.lever.co/acme/{id}"),
            "lever".into(),
            score,
            t0 + chrono::Duration::minutes(minutes),
        );
        ctx.store.upsert(p).await.unwrap();
    }

    let mut order = Vec::new();
    for _ in 0..rows.len() {
        match dispatcher.tick().await.result {
            TickResult::Dispatched { posting, .. } => order.push(posting.to_string()),
            other => panic!("unexpected {other:?}"),
        }
    }
    assert_eq!(order, ["early-a", "early-b", "late", "low"]);
    assert_eq!(dispatcher.tick().await.result, TickResult::Nothing);
    assert_eq!(launcher.tickets.lock().await.len(), 4);
}

#[tokio::test]
async fn crashed_greenhouse_worker_recovers_at_minute_six() {
    let clock = clock();
    let ctx = AppContext::in_memory(Arc::new(clock.clone()));
    let mut config = ShuttleConfig::default();
    config.partitions = vec![PartitionConfig::new(
        "greenhouse",
        &["greenhouse.io"],
        Duration::from_secs(5 * 60),
    )];
    let launcher = Arc::new(Crashing::default());
    let dispatcher = Dispatcher::new(ctx.clone(), &config, launcher.clone());

    let id: PostingId = "boards.greenhouse.io/acme/jobs/1".into();
    ctx.store
        .upsert(Posting::new(
            id.clone(),
            "https://boards.greenhouse.io/acme/jobs/1",
            "greenhouse".into(),
            70,
            clock.now(),
        ))
        .await
        .unwrap();

    // minute 0: claimed, then the worker dies
    let first = dispatcher.tick().await;
    let first_run = first.dispatched_run().unwrap().to_string();

    // minute 2: lock still live, partition busy, claim untouched
    clock.advance(chrono::Duration::minutes(2));
    let busy = dispatcher.tick().await;
    assert_eq!(busy.reaped, 0);
    assert_eq!(busy.result, TickResult::Nothing);
    assert!(matches!(busy.snapshots[0].status, PartitionStatus::Busy));
    assert_eq!(ctx.store.get(&id).await.unwrap().unwrap().state, PostingState::Claimed);

    // minute 6: lock expired, claim reverted and re-dispatched in the same tick
    clock.advance(chrono::Duration::minutes(4));
    let recovered = dispatcher.tick().await;
    assert_eq!(recovered.reaped, 1);
    match &recovered.result {
        TickResult::Dispatched {
            partition,
            posting,
            run_id,
        } => {
            assert_eq!(partition, &Partition::new("greenhouse"));
            assert_eq!(posting, &id);
            assert_ne!(run_id, &first_run);
        }
        other => panic!("unexpected {other:?}"),
    }

    let posting = ctx.store.get(&id).await.unwrap().unwrap();
    assert_eq!(posting.state, PostingState::Claimed);
    assert_eq!(posting.claim.unwrap().holder.as_str(), recovered.dispatched_run().unwrap());
    assert_eq!(launcher.tickets.lock().await.len(), 2);
}
