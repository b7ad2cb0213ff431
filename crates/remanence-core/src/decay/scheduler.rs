//! Background decay scheduler
//!
//! Runs decay cycles on a fixed interval over every organization in the
//! store, one tenant at a time. Cycles execute on the blocking pool so the
//! async runtime is never stalled by SQLite work.

use std::sync::Arc;
use std::time::Duration;

use crate::cancel::CancelToken;
use crate::clock::Clock;
use crate::config::TemporalConfig;
use crate::decay::DecayTask;
use crate::storage::MemoryStore;

/// Scheduler parameters
#[derive(Debug, Clone)]
pub struct DecaySchedulerConfig {
    /// Time between cycles
    pub interval: Duration,
    /// Batch size forwarded to each cycle
    pub batch_size: usize,
}

impl Default for DecaySchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
            batch_size: 500,
        }
    }
}

/// Spawns and owns the background decay worker
pub struct DecayScheduler;

impl DecayScheduler {
    /// Start the worker on the current tokio runtime
    pub fn spawn(
        store: Arc<MemoryStore>,
        config: Arc<TemporalConfig>,
        clock: Arc<dyn Clock>,
        scheduler_config: DecaySchedulerConfig,
    ) -> DecaySchedulerHandle {
        let cancel = CancelToken::new();
        let worker_cancel = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(scheduler_config.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it so spawn does not
            // race the caller's setup writes
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if worker_cancel.is_cancelled() {
                    break;
                }

                let task = DecayTask::new(store.clone(), config.clone(), clock.clone());
                let cycle_cancel = worker_cancel.clone();
                let batch_size = scheduler_config.batch_size;
                let outcome = tokio::task::spawn_blocking(move || {
                    task.run_all_organizations(batch_size, &cycle_cancel)
                })
                .await;

                match outcome {
                    Ok(Ok(reports)) => {
                        for (organization_id, report) in reports {
                            tracing::info!(
                                "Scheduled decay for {}: deleted {} of {} scanned",
                                organization_id,
                                report.total_deleted(),
                                report.total_scanned(),
                            );
                        }
                    }
                    Ok(Err(e)) => {
                        tracing::warn!("Scheduled decay cycle failed: {}", e);
                    }
                    Err(e) => {
                        tracing::warn!("Decay worker panicked: {}", e);
                    }
                }

                if worker_cancel.is_cancelled() {
                    break;
                }
            }
        });

        DecaySchedulerHandle { cancel, handle }
    }
}

/// Handle to a running scheduler; cancel and await to stop it
pub struct DecaySchedulerHandle {
    cancel: CancelToken,
    handle: tokio::task::JoinHandle<()>,
}

impl DecaySchedulerHandle {
    /// Request the worker to stop after its current cycle
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancel and wait for the worker to exit
    pub async fn shutdown(self) {
        self.cancel.cancel();
        self.handle.abort();
        let _ = self.handle.await;
    }
}

// ============================================================================
// TESTS
// ============================================================================
