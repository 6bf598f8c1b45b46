//! TickLoop - Dispatcher::tick() を一定間隔で呼ぶ
//!
//! 再入は想定内（ロックの CAS が最終的な安全装置）。
//! `shutdown_tx` に true を送ると次の待ちで抜ける。

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::dispatcher::Dispatcher;
use super::worker::wait_for_shutdown;
use crate::domain::TickResult;

pub struct TickLoop {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<usize>,
}

impl TickLoop {
    pub fn spawn(dispatcher: Arc<Dispatcher>, every: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut ticks = 0usize;
            loop {
                tokio::select! {
                    _ = wait_for_shutdown(&mut shutdown_rx) => break,
                    _ = interval.tick() => {}
                }
                let report = dispatcher.tick().await;
                ticks += 1;
                match &report.result {
                    TickResult::Dispatched { .. } | TickResult::Aborted { .. } => {}
                    other => debug!(result = ?other, reaped = report.reaped, "tick"),
                }
            }
            info!(ticks, "tick loop stopped");
            ticks
        });
        Self { shutdown_tx, join }
    }

    pub fn request_shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Returns the number of ticks run.
    pub async fn shutdown_and_join(self) -> usize {
        self.request_shutdown();
        self.join.await.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::context::AppContext;
    use crate::app::launcher::WorkerLauncher;
    use crate::app::worker::WorkerTicket;
    use crate::config::ShuttleConfig;
    use crate::domain::Result;
    use crate::ports::SystemClock;
    use async_trait::async_trait;

    struct Never;

    #[async_trait]
    impl WorkerLauncher for Never {
        async fn launch(&self, _: WorkerTicket) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn ticks_until_shutdown() {
        let ctx = AppContext::in_memory(Arc::new(SystemClock));
        let dispatcher = Arc::new(Dispatcher::new(ctx, &ShuttleConfig::default(), Arc::new(Never)));
        let tick_loop = TickLoop::spawn(dispatcher, Duration::from_millis(5));

        tokio::time::sleep(Duration::from_millis(40)).await;
        let ticks = tick_loop.shutdown_and_join().await;
        assert!(ticks >= 2, "ran {ticks} ticks");
    }
}
