//! Periodic background ticks.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::Indexer;

struct Running {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Drives [`Indexer::run_once`] on a fixed cadence until stopped.
///
/// The first tick runs one interval after `start`; callers run the startup
/// index themselves. The sleep between ticks is `interval - elapsed`, so slow
/// ticks do not push the schedule back. Stopping interrupts the sleep but
/// never a tick.
pub struct RefreshLoop {
    indexer: Arc<Indexer>,
    interval: Duration,
    running: Mutex<Option<Running>>,
}

impl RefreshLoop {
    pub fn new(indexer: Arc<Indexer>, interval: Duration) -> Self {
        Self { indexer, interval, running: Mutex::new(None) }
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.as_ref().is_some_and(|r| !r.task.is_finished())
    }

    /// Spawn the loop. Returns `false` if it is already running.
    pub async fn start(&self) -> bool {
        let mut running = self.running.lock().await;
        if running.as_ref().is_some_and(|r| !r.task.is_finished()) {
            return false;
        }

        let (stop, stop_rx) = watch::channel(false);
        let task = tokio::spawn(run_loop(self.indexer.clone(), self.interval, stop_rx));
        *running = Some(Running { stop, task });
        true
    }

    /// Signal the loop to exit and wait for the current tick to finish.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };
        let _ = running.stop.send(true);
        if let Err(e) = running.task.await {
            tracing::error!(error = %e, "refresh loop task failed");
        }
    }
}

async fn run_loop(indexer: Arc<Indexer>, interval: Duration, mut stop: watch::Receiver<bool>) {
    tracing::info!(interval_secs = interval.as_secs_f64(), "refresh loop started");
    let mut next_tick = Instant::now() + interval;
    loop {
        if *stop.borrow() {
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep_until(next_tick) => {}
            result = stop.changed() => {
                if result.is_err() || *stop.borrow() {
                    break;
                }
                continue;
            }
        }

        let started = Instant::now();
        if let Err(e) = indexer.run_once().await {
            tracing::error!(error = %e, "refresh tick failed");
        }
        next_tick = started + interval;
    }
    tracing::info!("refresh loop stopped");
}
