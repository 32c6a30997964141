// Scheduler - periodic main job driving aggregation sessions
//
// Every `main_job_interval_ms` the job runs one session while the display is
// on. A display wake triggers an immediate one-shot session; the next
// periodic run is then pushed back so it lands a full interval after the
// wake. All sessions go through the SessionManager and never overlap.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::{SchedulerConfig, SessionConfig};
use crate::error::{log_session_error, SessionError};
use crate::managers::SessionManager;
use crate::profile::ProfileCurve;

use super::core::{SessionTrigger, TelemetryEventKind, TelemetrySink};
use super::session::{AggregationMode, SessionOutcome};

struct SchedulerShared {
    sessions: Arc<SessionManager>,
    profile: Arc<ProfileCurve>,
    session_config: SessionConfig,
    config: SchedulerConfig,
    telemetry: TelemetrySink,
    display_on: AtomicBool,
    last_wake: Mutex<Option<Instant>>,
}

impl SchedulerShared {
    fn mode(&self) -> AggregationMode {
        if self.config.aggregate_sensor_values {
            AggregationMode::Average
        } else {
            AggregationMode::OneShot
        }
    }

    fn lock_last_wake(&self) -> MutexGuard<'_, Option<Instant>> {
        self.last_wake.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remaining delay before a periodic run may follow the last wake
    fn wake_offset(&self) -> Option<Duration> {
        let interval = self.config.main_job_interval();
        let last_wake = (*self.lock_last_wake())?;
        let since_wake = last_wake.elapsed();
        (since_wake < interval).then(|| interval - since_wake)
    }

    async fn run_session(
        &self,
        mode: AggregationMode,
        trigger: SessionTrigger,
    ) -> Result<SessionOutcome, SessionError> {
        let result = self
            .sessions
            .run_session(mode, &self.session_config, Arc::clone(&self.profile))
            .await;
        match &result {
            Ok(outcome) => self.telemetry.emit(
                TelemetryEventKind::SessionFinished {
                    trigger,
                    state: outcome.state(),
                    brightness: outcome.committed_brightness(),
                },
                None,
            ),
            Err(err) => {
                log_session_error(err, "scheduler_session");
                self.telemetry
                    .emit(TelemetryEventKind::Warning, Some(err.to_string()));
            }
        }
        result
    }
}

/// Handle to a running main job
pub struct Scheduler {
    shared: Arc<SchedulerShared>,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Scheduler {
    /// Start the main job on the current tokio runtime
    ///
    /// The display is assumed on until told otherwise.
    pub fn spawn(
        sessions: Arc<SessionManager>,
        profile: Arc<ProfileCurve>,
        session_config: SessionConfig,
        config: SchedulerConfig,
        telemetry: TelemetrySink,
    ) -> Self {
        let shared = Arc::new(SchedulerShared {
            sessions,
            profile,
            session_config,
            config,
            telemetry,
            display_on: AtomicBool::new(true),
            last_wake: Mutex::new(None),
        });
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(main_job(Arc::clone(&shared), shutdown_rx));

        Self {
            shared,
            shutdown_tx,
            task,
        }
    }

    /// Gate periodic sessions on the display state
    pub fn set_display_on(&self, on: bool) {
        if self.shared.display_on.swap(on, Ordering::SeqCst) != on {
            log::info!("[Scheduler] Display {}", if on { "on" } else { "off" });
        }
    }

    pub fn is_display_on(&self) -> bool {
        self.shared.display_on.load(Ordering::SeqCst)
    }

    /// Display woke up: mark it on and run a one-shot session right away
    pub fn notify_wake(&self) -> JoinHandle<Result<SessionOutcome, SessionError>> {
        self.set_display_on(true);
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            log::info!("[Scheduler] Wake one-shot");
            let result = shared
                .run_session(AggregationMode::OneShot, SessionTrigger::Wake)
                .await;
            *shared.lock_last_wake() = Some(Instant::now());
            result
        })
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop the main job, cancelling any session in flight
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        self.shared.sessions.cancel();
        if let Err(err) = self.task.await {
            log::warn!("[Scheduler] Main job ended abnormally: {}", err);
        }
    }
}

/// Sleep unless shutdown is requested first
///
/// # Returns
/// `true` when the job must stop
async fn pause(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => *shutdown.borrow(),
        _ = shutdown.changed() => true,
    }
}

async fn main_job(shared: Arc<SchedulerShared>, mut shutdown: watch::Receiver<bool>) {
    let interval = shared.config.main_job_interval();
    let mode = shared.mode();
    log::info!(
        "[Scheduler] Main job started: every {}ms, {:?} sessions",
        interval.as_millis(),
        mode
    );

    loop {
        if let Some(offset) = shared.wake_offset() {
            log::info!(
                "[Scheduler] Offsetting run by {}ms after wake",
                offset.as_millis()
            );
            if pause(offset, &mut shutdown).await {
                break;
            }
        }

        if *shutdown.borrow() {
            break;
        }
        if shared.display_on.load(Ordering::SeqCst) {
            let _ = shared.run_session(mode, SessionTrigger::Periodic).await;
        }

        if pause(interval, &mut shutdown).await {
            break;
        }
    }

    log::info!("[Scheduler] Main job stopped");
}
