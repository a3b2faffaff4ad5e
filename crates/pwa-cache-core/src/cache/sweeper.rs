//! Debounced expiry sweeper
//!
//! One background task owns the single pending timer. `trigger()` only posts
//! to that task; every trigger pushes the deadline back by the quiet window,
//! and the sweep runs once the window passes without a new trigger.

use futures::future::join_all;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::expiry::is_expired;
use super::storage::Partition;

/// Debounced sweeper over one partition
///
/// The background task stops once the sweeper is dropped or shut down.
pub struct DebouncedSweeper {
    triggers: mpsc::UnboundedSender<()>,
    sweeps: watch::Receiver<u64>,
    stop: CancellationToken,
    task: TaskTracker,
}

impl DebouncedSweeper {
    /// Spawn the sweeper task on the current tokio runtime
    pub fn spawn(partition: Partition, max_age: Duration, quiet_window: Duration) -> Self {
        let (triggers, rx) = mpsc::unbounded_channel();
        let (sweeps_tx, sweeps) = watch::channel(0);
        let stop = CancellationToken::new();

        info!(
            "Starting expiry sweeper for {} (max age: {:?}, quiet window: {:?})",
            partition.name(),
            max_age,
            quiet_window
        );

        let task = TaskTracker::new();
        task.spawn(run(
            rx,
            sweeps_tx,
            stop.clone(),
            partition,
            max_age,
            quiet_window,
        ));
        task.close();

        Self {
            triggers,
            sweeps,
            stop,
            task,
        }
    }

    /// Request a sweep once the quiet window elapses
    pub fn trigger(&self) {
        // Fails only after the task is gone, when there is nothing left to sweep
        let _ = self.triggers.send(());
    }

    /// Number of completed sweep passes
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.sweeps.clone()
    }

    /// Stop the sweeper
    ///
    /// A pending quiet window is abandoned; a sweep already running is
    /// awaited.
    pub async fn shutdown(&self) {
        self.stop.cancel();
        self.task.wait().await;
    }
}

async fn run(
    mut triggers: mpsc::UnboundedReceiver<()>,
    sweeps: watch::Sender<u64>,
    stop: CancellationToken,
    partition: Partition,
    max_age: Duration,
    quiet_window: Duration,
) {
    'run: loop {
        tokio::select! {
            _ = stop.cancelled() => break 'run,
            trigger = triggers.recv() => if trigger.is_none() {
                break 'run;
            },
        }

        let deadline = sleep(quiet_window);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = stop.cancelled() => {
                    debug!("Abandoning pending sweep of {}", partition.name());
                    break 'run;
                }
                _ = &mut deadline => break,
                trigger = triggers.recv() => match trigger {
                    Some(()) => deadline.as_mut().reset(Instant::now() + quiet_window),
                    None => break 'run,
                },
            }
        }

        sweep_expired(&partition, max_age).await;
        sweeps.send_modify(|count| *count += 1);
    }

    debug!("Expiry sweeper for {} stopped", partition.name());
}

/// Delete every expired entry of `partition`, returning how many went
///
/// Entries are evaluated concurrently. Failures are logged and skipped.
pub async fn sweep_expired(partition: &Partition, max_age: Duration) -> u64 {
    let keys = match partition.keys().await {
        Ok(keys) => keys,
        Err(e) => {
            warn!("Failed to list {} for expiry sweep: {}", partition.name(), e);
            return 0;
        }
    };

    let evictions = join_all(keys.iter().map(|key| async move {
        match partition.get(key).await {
            Ok(Some(response)) if is_expired(&response, max_age) => {
                match partition.delete(key).await {
                    Ok(deleted) => {
                        debug!("Evicted expired entry {}", key);
                        deleted
                    }
                    Err(e) => {
                        warn!("Failed to evict {}: {}", key, e);
                        false
                    }
                }
            }
            Ok(_) => false,
            Err(e) => {
                warn!("Failed to read {} during sweep: {}", key, e);
                false
            }
        }
    }))
    .await;

    let evicted = evictions.into_iter().filter(|deleted| *deleted).count() as u64;
    metrics::counter!("pwa_cache_sweep_evictions_total").increment(evicted);

    if evicted > 0 {
        info!(
            "Expiry sweep removed {} of {} entries from {}",
            evicted,
            keys.len(),
            partition.name()
        );
    }
    evicted
}
