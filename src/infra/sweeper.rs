//! Periodic expiration sweep for a [`ConversationStore`].
//!
//! The store never spawns anything itself. Whoever owns the store decides
//! whether to run a sweeper and is responsible for shutting it down.

use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::history::{ConversationStore, ConversationThread};

/// Shortest interval the sweeper will tick at.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Handle to a running sweeper task. Dropping the handle stops the task.
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
    interval: Duration,
}

impl SweeperHandle {
    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop the sweeper and wait for the task to exit.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            if let Err(error) = task.await {
                tracing::warn!("History sweeper task ended abnormally: {error}");
            }
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

/// Spawn a task on the current Tokio runtime that calls
/// [`ConversationStore::sweep_expired`] every `interval`. The first sweep
/// happens one full interval after spawning. Intervals below one second are
/// raised to one second.
pub fn spawn_sweeper<T: ConversationThread>(
    store: ConversationStore<T>,
    interval: Duration,
) -> SweeperHandle {
    let interval = if interval < MIN_SWEEP_INTERVAL {
        tracing::warn!(
            requested_ms = interval.as_millis() as u64,
            "Sweep interval too short, using {}s",
            MIN_SWEEP_INTERVAL.as_secs()
        );
        MIN_SWEEP_INTERVAL
    } else {
        interval
    };

    let (shutdown, mut shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        tracing::debug!(interval_secs = interval.as_secs(), "History sweeper started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = store.sweep_expired();
                    tracing::debug!(removed, remaining = store.len(), "History sweep finished");
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("History sweeper stopped");
    });

    SweeperHandle {
        shutdown,
        task: Some(task),
        interval,
    }
}
