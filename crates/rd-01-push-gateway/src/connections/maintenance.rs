//! Background maintenance: the cleanup sweep and server keep-alives.
//!
//! Both loops run on their own timer, independent of any connection, and
//! stop when the shutdown channel flips to `true` or its sender is dropped.

use super::manager::ConnectionManager;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Periodically close stale connections and prune rate-limit windows.
pub async fn cleanup_task(
    manager: Arc<ConnectionManager>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                manager.sweep().await;
            }
            _ = wait_for_shutdown(&mut shutdown) => break,
        }
    }
    debug!("Cleanup task stopped");
}

/// Periodically write a heartbeat record to every connection.
pub async fn heartbeat_task(
    manager: Arc<ConnectionManager>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = manager.send_heartbeat_pings().await;
                if report.pruned > 0 {
                    debug!(pruned = report.pruned, "Heartbeat pruned dead connections");
                }
            }
            _ = wait_for_shutdown(&mut shutdown) => break,
        }
    }
    debug!("Heartbeat task stopped");
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    // A dropped sender counts as shutdown
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Handles of the running maintenance loops.
pub struct Maintenance {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Maintenance {
    /// Spawn the cleanup sweep and the heartbeat loop.
    pub fn spawn(
        manager: Arc<ConnectionManager>,
        cleanup_interval: Duration,
        heartbeat_interval: Duration,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handles = vec![
            tokio::spawn(cleanup_task(
                Arc::clone(&manager),
                cleanup_interval,
                shutdown_rx.clone(),
            )),
            tokio::spawn(heartbeat_task(manager, heartbeat_interval, shutdown_rx)),
        ];
        Self {
            shutdown_tx,
            handles,
        }
    }

    /// Signal both loops and wait for them to finish.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}
