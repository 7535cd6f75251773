use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use strata_config::MemoryConfig;

use crate::store::HybridStore;

/// Handle to a background TTL sweeper. Dropping it stops the task.
pub struct SweepHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SweepHandle {
    /// Signal the sweeper to stop without waiting for it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Stop the sweeper and wait for the task to finish.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "sweeper task ended abnormally");
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(|t| t.is_finished())
    }
}

impl Drop for SweepHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl HybridStore {
    /// Spawn a tokio task that runs [`HybridStore::sweep_expired`] every `every`.
    ///
    /// The task holds only a weak reference and exits once the store is dropped.
    /// Must be called from within a tokio runtime.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> SweepHandle {
        let token = CancellationToken::new();
        let store = Arc::downgrade(self);
        let task = tokio::spawn(sweep_loop(store, every, token.clone()));
        info!(interval_secs = every.as_secs_f64(), "TTL sweeper started");
        SweepHandle {
            token,
            task: Some(task),
        }
    }

    /// Spawn the sweeper at the configured `sweep_interval_secs`.
    /// Returns `None` when the interval is 0 (background sweep disabled).
    pub fn spawn_sweeper_from_config(self: &Arc<Self>, config: &MemoryConfig) -> Option<SweepHandle> {
        match config.sweep_interval() {
            Some(every) => Some(self.spawn_sweeper(every)),
            None => {
                info!("TTL sweeper disabled by config");
                None
            }
        }
    }
}

async fn sweep_loop(store: Weak<HybridStore>, every: Duration, token: CancellationToken) {
    // tokio rejects a zero period.
    let mut interval = tokio::time::interval(every.max(Duration::from_millis(1)));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // First tick completes immediately.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                debug!("TTL sweeper cancelled");
                break;
            }
            _ = interval.tick() => {
                let Some(store) = store.upgrade() else {
                    debug!("store dropped, TTL sweeper exiting");
                    break;
                };
                match store.sweep_expired() {
                    Ok(0) => {}
                    Ok(n) => debug!(evicted = n, "TTL sweep"),
                    Err(e) => warn!(error = %e, "TTL sweep failed"),
                }
            }
        }
    }
}
