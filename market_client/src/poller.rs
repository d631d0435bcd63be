//! Fixed-interval refresh loops feeding `SnapshotSlot`s

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::snapshot::SnapshotSlot;

/// Owns the refresh loops; dropping it stops them
pub struct Poller {
    shutdown: watch::Sender<bool>,
    loops: Vec<JoinHandle<()>>,
}

impl Poller {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shutdown,
            loops: Vec::new(),
        }
    }

    /// Run `refresh` every `period`, publishing `Some` results into `slot`.
    ///
    /// Ticks do not wait for the previous refresh; each one runs as its own
    /// task and the slot drops whatever a newer tick has superseded. Refreshes
    /// still in flight at shutdown are aborted and never publish.
    pub fn spawn<T, F, Fut>(
        &mut self,
        name: &'static str,
        period: Duration,
        slot: Arc<SnapshotSlot<T>>,
        refresh: F,
    ) where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<T>> + Send + 'static,
    {
        let mut shutdown = self.shutdown.subscribe();
        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut refreshes = JoinSet::new();
            info!(poller = name, period = ?period, "Poller started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let generation = slot.begin();
                        let pending = refresh();
                        let slot = slot.clone();
                        refreshes.spawn(async move {
                            if let Some(value) = pending.await {
                                if !slot.publish(generation, value) {
                                    debug!(poller = name, generation = generation.value(), "Discarded superseded refresh");
                                }
                            }
                        });
                    }
                    Some(_) = refreshes.join_next(), if !refreshes.is_empty() => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            refreshes.shutdown().await;
            info!(poller = name, "Poller stopped");
        });
        self.loops.push(handle);
    }

    /// Signal every loop and wait for them to exit
    pub async fn shutdown(mut self) {
        self.shutdown.send_replace(true);
        for handle in self.loops.drain(..) {
            let _ = handle.await;
        }
    }
}

impl Default for Poller {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}
