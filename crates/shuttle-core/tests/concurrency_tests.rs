//! Concurrency tests: uniqueness under concurrent submits and lock mutual exclusion.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

use shuttle_core::app::{AppBuilder, AppContext, Dispatcher, SubmitOutcome, WorkerLauncher, WorkerTicket};
use shuttle_core::config::ShuttleConfig;
use shuttle_core::domain::{Candidate, HolderId, LockName, Posting, PostingState, Result, TickResult};
use shuttle_core::impls::MemoryLockManager;
use shuttle_core::ports::{Clock, FixedClock, LockManager, SystemClock};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submits_insert_once() {
    let ctx = AppContext::in_memory(Arc::new(SystemClock));
    let app = AppBuilder::new(ShuttleConfig::default()).build(ctx.clone()).unwrap();

    let variants = [
        "https://jobs.lever.co/acme/42",
        "https://jobs.lever.co/acme/42?utm_source=linkedin",
        "https://jobs.lever.co/acme/42?utm_medium=email&utm_campaign=fall",
        "https://jobs.lever.co/acme/42?gclid=abc123",
    ];
    let mut handles = Vec::new();
    for i in 0..32 {
        let producer = app.producer.clone();
        let url = variants[i % variants.len()];
        handles.push(tokio::spawn(async move {
            producer.submit(Candidate::new(url)).await.unwrap()
        }));
    }

    let mut inserted = 0;
    let mut ids = HashSet::new();
    for handle in handles {
        match handle.await.unwrap() {
            SubmitOutcome::Inserted { id } => {
                inserted += 1;
                ids.insert(id);
            }
            SubmitOutcome::Duplicate { id, .. } => {
                ids.insert(id);
            }
            SubmitOutcome::Rejected(reason) => panic!("rejected: {reason:?}"),
        }
    }
    assert_eq!(inserted, 1);
    assert_eq!(ids.len(), 1);
    assert_eq!(ctx.store.count_by_state(&"lever".into()).await.unwrap().total(), 1);
}

#[derive(Default)]
struct Recording {
    tickets: Mutex<Vec<WorkerTicket>>,
}

#[async_trait]
impl WorkerLauncher for Recording {
    async fn launch(&self, ticket: WorkerTicket) -> Result<()> {
        self.tickets.lock().await.push(ticket);
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_dispatchers_claim_each_partition_once() {
    let clock = FixedClock::new(Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap());
    let ctx = AppContext::in_memory(Arc::new(clock.clone()));
    let mut config = ShuttleConfig::default();
    config.dispatch.global_lock = false;

    for partition in ["ashby", "greenhouse", "lever"] {
        for n in 0..5 {
            let id = format!("{partition}/{n}");
            let p = Posting::new(id.as_str().into(), format!("https://x/{id}"), partition.into(), 50 + n, clock.now());
            ctx.store.upsert(p).await.unwrap();
        }
    }

    let launcher = Arc::new(Recording::default());
    let mut handles = Vec::new();
    for _ in 0..12 {
        let dispatcher = Dispatcher::new(ctx.clone(), &config, launcher.clone());
        handles.push(tokio::spawn(async move { dispatcher.tick().await }));
    }
    let mut dispatched = 0;
    for handle in handles {
        if matches!(handle.await.unwrap().result, TickResult::Dispatched { .. }) {
            dispatched += 1;
        }
    }

    let tickets = launcher.tickets.lock().await;
    assert_eq!(dispatched, tickets.len());
    assert!(dispatched <= 3);
    let partitions: HashSet<_> = tickets.iter().map(|t| t.partition.clone()).collect();
    assert_eq!(partitions.len(), tickets.len(), "a partition was dispatched twice");

    let claimed = ctx.store.list_by_state(PostingState::Claimed).await.unwrap();
    assert_eq!(claimed.len(), tickets.len());
    for p in &claimed {
        assert!(p.claim.is_some());
    }
}

/// What the lock should look like, tracked alongside the real manager.
struct Model {
    owner: Option<(HolderId, DateTime<Utc>)>,
}

impl Model {
    fn live_owner(&self, now: DateTime<Utc>) -> Option<&HolderId> {
        self.owner
            .as_ref()
            .filter(|(_, expires)| now < *expires)
            .map(|(holder, _)| holder)
    }
}

#[tokio::test]
async fn randomized_lock_history_keeps_one_holder() {
    let clock = FixedClock::new(Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap());
    let locks = MemoryLockManager::new(Arc::new(clock.clone()));
    let name = LockName::new("apply-lever");
    let holders: Vec<HolderId> = (0..4).map(|i| HolderId::new(format!("run-{i}"))).collect();
    let mut model = Model { owner: None };

    for seed in 0..8u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        for step in 0..500 {
            let holder = &holders[rng.gen_range(0..holders.len())];
            let ttl = Duration::from_secs(rng.gen_range(1..=10));
            let now = clock.now();
            match rng.gen_range(0..5) {
                0 => {
                    let got = locks.try_acquire(&name, holder, ttl).await.unwrap();
                    assert_eq!(got, model.live_owner(now).is_none(), "seed {seed} step {step}");
                    if got {
                        model.owner = Some((holder.clone(), now + chrono::Duration::from_std(ttl).unwrap()));
                    }
                }
                1 => {
                    locks.release(&name, holder).await.unwrap();
                    if model.owner.as_ref().is_some_and(|(h, _)| h == holder) {
                        model.owner = None;
                    }
                }
                2 => {
                    let renewed = locks.renew(&name, holder, ttl).await.unwrap();
                    let expected = model.live_owner(now) == Some(holder);
                    assert_eq!(renewed, expected, "seed {seed} step {step}");
                    if renewed {
                        model.owner = Some((holder.clone(), now + chrono::Duration::from_std(ttl).unwrap()));
                    }
                }
                3 => clock.advance(chrono::Duration::seconds(rng.gen_range(0..=6))),
                _ => {
                    if rng.gen_bool(0.1) {
                        locks.force_expire(&name).await.unwrap();
                        model.owner = None;
                    }
                }
            }

            let now = clock.now();
            let actual = locks.holder(&name).await.unwrap().map(|r| r.holder);
            assert_eq!(actual.as_ref(), model.live_owner(now), "seed {seed} step {step}");
            assert!(locks.snapshot().await.unwrap().len() <= 1);
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn contending_tasks_never_overlap() {
    let locks: Arc<dyn LockManager> = Arc::new(MemoryLockManager::new(Arc::new(SystemClock)));
    let name = LockName::new("apply-greenhouse");
    let inside = Arc::new(AtomicUsize::new(0));
    let entered = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for i in 0..16 {
        let (locks, name, inside, entered) = (locks.clone(), name.clone(), inside.clone(), entered.clone());
        handles.push(tokio::spawn(async move {
            let holder = HolderId::new(format!("task-{i}"));
            let mut rng = StdRng::seed_from_u64(i);
            for _ in 0..50 {
                if locks.try_acquire(&name, &holder, Duration::from_secs(60)).await.unwrap() {
                    assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0, "two holders inside");
                    entered.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_micros(rng.gen_range(0..200))).await;
                    inside.fetch_sub(1, Ordering::SeqCst);
                    locks.release(&name, &holder).await.unwrap();
                }
                tokio::task::yield_now().await;
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    assert!(entered.load(Ordering::SeqCst) > 0);
}
