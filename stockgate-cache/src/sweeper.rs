//! Background cleanup task. Runs `sweep_expired` on a fixed interval and
//! stops on an explicit shutdown signal — not a fire-and-forget timer.

use crate::cache::EdgeCache;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub struct CacheSweeper {
    shutdown: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

impl CacheSweeper {
    pub fn start(cache: Arc<EdgeCache>, interval: Duration) -> Self {
        let (shutdown, mut shutdown_rx) = broadcast::channel::<()>(1);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick fires immediately; consume it so the initial
            // sweep happens one interval after startup.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match cache.sweep_expired().await {
                            Ok(0) => {}
                            Ok(removed) => {
                                debug!("Swept {} expired cache entries", removed);
                            }
                            Err(e) => warn!("Cache sweep failed: {}", e),
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Cache sweeper stopping");
                        break;
                    }
                }
            }
        });

        Self { shutdown, handle }
    }

    /// Signal the task and wait for it to exit.
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.handle.await {
            warn!("Cache sweeper task panicked: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
