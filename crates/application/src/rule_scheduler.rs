use std::sync::Arc;
use std::time::Duration;

use peerwarden_core::{AppError, AppResult};
use tokio::sync::{Mutex, RwLock, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::rule_engine_ports::{SchedulerStatus, TickSummary};
use crate::rule_engine_service::RuleEngineService;

/// Interval used when the scheduler is started without an explicit value.
pub const DEFAULT_RULE_INTERVAL_MS: u64 = 300_000;

struct ScheduledJob {
    interval_ms: u64,
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Recurring job that runs every active rule once per interval.
///
/// At most one job exists at a time. Stopping only prevents future ticks; an
/// in-flight tick runs to completion.
pub struct RuleScheduler {
    engine: RuleEngineService,
    job: Mutex<Option<ScheduledJob>>,
    last_tick: Arc<RwLock<Option<TickSummary>>>,
}

impl RuleScheduler {
    /// Creates a stopped scheduler.
    #[must_use]
    pub fn new(engine: RuleEngineService) -> Self {
        Self {
            engine,
            job: Mutex::new(None),
            last_tick: Arc::new(RwLock::new(None)),
        }
    }

    /// Starts the recurring job, replacing any job already running.
    ///
    /// The first tick fires one interval after the call.
    pub async fn start(&self, interval_ms: u64) -> AppResult<()> {
        if interval_ms == 0 {
            return Err(AppError::Validation(
                "scheduler interval must be greater than zero".to_owned(),
            ));
        }

        let mut job = self.job.lock().await;
        if let Some(previous) = job.take() {
            info!(
                interval_ms = previous.interval_ms,
                "replacing running rule scheduler"
            );
            let _ = previous.shutdown_tx.send(true);
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_schedule(
            self.engine.clone(),
            Duration::from_millis(interval_ms),
            shutdown_rx,
            Arc::clone(&self.last_tick),
        ));

        info!(interval_ms, "rule scheduler started");
        *job = Some(ScheduledJob {
            interval_ms,
            shutdown_tx,
            handle,
        });

        Ok(())
    }

    /// Stops the recurring job. Calling it while stopped is a no-op.
    pub async fn stop(&self) {
        if let Some(job) = self.job.lock().await.take() {
            let _ = job.shutdown_tx.send(true);
            info!(interval_ms = job.interval_ms, "rule scheduler stopped");
        }
    }

    /// Returns whether a recurring job is active.
    pub async fn is_running(&self) -> bool {
        self.job
            .lock()
            .await
            .as_ref()
            .is_some_and(|job| !job.handle.is_finished())
    }

    /// Returns the current scheduler state.
    pub async fn status(&self) -> SchedulerStatus {
        let job = self.job.lock().await;
        let active = job.as_ref().filter(|job| !job.handle.is_finished());

        SchedulerStatus {
            running: active.is_some(),
            interval_ms: active.map(|job| job.interval_ms),
            last_tick: self.last_tick.read().await.clone(),
        }
    }
}

async fn run_schedule(
    engine: RuleEngineService,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
    last_tick: Arc<RwLock<Option<TickSummary>>>,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // Skip the first immediate tick
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Some(summary) = engine.run_scheduled_tick().await {
                    if let Some(error) = &summary.error {
                        warn!(error = %error, "scheduled rule tick failed");
                    }
                    *last_tick.write().await = Some(summary);
                }
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
}
