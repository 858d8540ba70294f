//! Fixed-interval tick scheduling for the poller

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{MissedTickBehavior, interval};

use crate::ports::{Clock, Dispatcher, FeedClient, LedgerStore};
use crate::usecases::poll::Poller;

/// Drives `Poller::poll_once` on a fixed interval.
///
/// Ticks never overlap: a tick that overruns the interval delays the next
/// one instead of running beside it.
pub struct PollScheduler<F, L, D, Cl>
where
    F: FeedClient + ?Sized,
    L: LedgerStore + ?Sized,
    D: Dispatcher + ?Sized,
    Cl: Clock + ?Sized,
{
    poller: Arc<Poller<F, L, D, Cl>>,
    period: Duration,
}

impl<F, L, D, Cl> PollScheduler<F, L, D, Cl>
where
    F: FeedClient + ?Sized + 'static,
    L: LedgerStore + ?Sized + 'static,
    D: Dispatcher + ?Sized + 'static,
    Cl: Clock + ?Sized + 'static,
{
    pub fn new(poller: Arc<Poller<F, L, D, Cl>>, period: Duration) -> Self {
        Self { poller, period }
    }

    /// Spawn the tick loop. The first tick runs immediately.
    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let Self { poller, period } = self;

        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut ticks = 0u64;

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {
                        ticks += 1;
                        if let Err(e) = poller.poll_once().await {
                            tracing::error!(error = %e, tick = ticks, "Poll tick failed");
                        }
                    }
                }
            }

            tracing::info!(ticks, "Poll scheduler stopped");
            ticks
        });

        tracing::info!(period_secs = period.as_secs(), "Poll scheduler started");
        SchedulerHandle { shutdown_tx, task }
    }
}

/// Handle to a running scheduler
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<u64>,
}

impl SchedulerHandle {
    /// Stop scheduling, wait for an in-flight tick, and return how many ticks ran
    pub async fn shutdown(self) -> Result<u64, JoinError> {
        // The receiver only goes away once the task has already exited
        let _ = self.shutdown_tx.send(true);
        self.task.await
    }
}
