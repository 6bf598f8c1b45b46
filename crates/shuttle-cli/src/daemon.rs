//! daemon - `shuttle run` / `shuttle tick`

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

use shuttle_core::app::{DiscoveryCadence, DiscoveryLoop, TickLoop};
use shuttle_core::config::ShuttleConfig;
use shuttle_core::ports::CandidateSource;

use crate::control::{self, CONTROL_DIR, StateOwner};
use crate::inbox::InboxSource;
use crate::runtime::Runtime;

const CONTROL_POLL: Duration = Duration::from_secs(1);

fn own(config: &ShuttleConfig) -> anyhow::Result<StateOwner> {
    std::fs::create_dir_all(&config.state_dir)
        .with_context(|| format!("failed to create {}", config.state_dir.display()))?;
    StateOwner::acquire(&config.state_dir).with_context(|| {
        format!(
            "state dir {} is owned by another shuttle process",
            config.state_dir.display()
        )
    })
}

/// Dispatcher ticks, inbox discovery and the control loop until Ctrl-C.
pub async fn run(config: ShuttleConfig) -> anyhow::Result<()> {
    let _owner = own(&config)?;
    let runtime = Arc::new(Runtime::open(config.clone(), true).await?);
    let app = &runtime.app;

    let inbox = config.inbox_dir();
    tokio::fs::create_dir_all(&inbox)
        .await
        .with_context(|| format!("failed to create {}", inbox.display()))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let ticks = TickLoop::spawn(app.dispatcher.clone(), config.dispatch.tick_interval);
    let sources: Vec<Arc<dyn CandidateSource>> = vec![Arc::new(InboxSource::new(&inbox))];
    let discovery = DiscoveryLoop::new(
        app.producer.clone(),
        sources,
        DiscoveryCadence::new(config.discovery.cadence.clone()),
    )
    .spawn(shutdown_rx.clone());
    let control = control::serve(
        runtime.clone(),
        config.state_dir.join(CONTROL_DIR),
        CONTROL_POLL,
        shutdown_rx,
    );
    info!(
        state_dir = %config.state_dir.display(),
        inbox = %inbox.display(),
        tick_interval = ?config.dispatch.tick_interval,
        "shuttle running"
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutdown requested");

    shutdown_tx.send_replace(true);
    let ticks = ticks.shutdown_and_join().await;
    let runs = app.launcher.shutdown_and_join().await;
    discovery.await.context("discovery loop panicked")?;
    control.await.context("control loop panicked")?;
    info!(ticks, runs = runs.len(), "shuttle stopped");
    Ok(())
}

/// One dispatcher tick; waits for the launched run to finish.
pub async fn tick(config: ShuttleConfig) -> anyhow::Result<serde_json::Value> {
    let _owner = own(&config)?;
    let runtime = Runtime::open(config, true).await?;
    let report = runtime.app.dispatcher.tick().await;
    let runs = runtime.app.launcher.join_all().await;
    Ok(serde_json::json!({ "tick": report, "runs": runs }))
}
