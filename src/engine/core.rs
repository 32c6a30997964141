//! EngineHandle: orchestration layer shared by the CLI entry points.
//!
//! Ties the configuration, the active profile, serialized sessions and the
//! periodic scheduler together, and reports lifecycle events on a telemetry
//! broadcast channel.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::AppConfig;
use crate::engine::backend::{
    BrightnessActuator, IioLightSensor, LightSensor, SysfsBacklight,
};
use crate::engine::scheduler::Scheduler;
use crate::engine::session::{AggregationMode, SessionOutcome, SessionProgress, SessionState};
use crate::error::{log_profile_error, DeviceError, ProfileError, SessionError};
use crate::managers::{ProfileManager, SessionManager};
use crate::profile::{ProfileCurve, ProfileStore};

/// Buffer of the telemetry broadcast channel
const TELEMETRY_CHANNEL_CAPACITY: usize = 128;

/// What started a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionTrigger {
    Manual,
    Periodic,
    Wake,
}

/// Telemetry event emitted by the engine core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub timestamp_ms: u64,
    pub kind: TelemetryEventKind,
    pub detail: Option<String>,
}

/// Types of telemetry events supported by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TelemetryEventKind {
    SchedulerStarted {
        interval_ms: u64,
        mode: AggregationMode,
    },
    SchedulerStopped,
    ProfileActivated {
        name: String,
    },
    SessionFinished {
        trigger: SessionTrigger,
        state: SessionState,
        brightness: Option<u8>,
    },
    Warning,
}

/// Cloneable publisher stamping events relative to engine start
#[derive(Debug, Clone)]
pub struct TelemetrySink {
    tx: broadcast::Sender<TelemetryEvent>,
    start_instant: Instant,
}

impl TelemetrySink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            start_instant: Instant::now(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TelemetryEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, kind: TelemetryEventKind, detail: Option<String>) {
        let timestamp_ms = self.start_instant.elapsed().as_millis() as u64;
        let _ = self.tx.send(TelemetryEvent {
            timestamp_ms,
            kind,
            detail,
        });
    }
}

/// EngineHandle orchestrates profiles, sessions and the main job.
pub struct EngineHandle {
    config: Arc<RwLock<AppConfig>>,
    profiles: ProfileManager,
    sessions: Arc<SessionManager>,
    scheduler: Mutex<Option<Scheduler>>,
    telemetry: TelemetrySink,
}

impl EngineHandle {
    /// Create an engine over explicit collaborators
    pub fn new(
        config: AppConfig,
        sensor: Box<dyn LightSensor>,
        actuator: Box<dyn BrightnessActuator>,
    ) -> Self {
        let profiles = ProfileManager::new(ProfileStore::new(config.profiles.directory.clone()));
        Self {
            config: Arc::new(RwLock::new(config)),
            profiles,
            sessions: Arc::new(SessionManager::new(sensor, actuator)),
            scheduler: Mutex::new(None),
            telemetry: TelemetrySink::new(TELEMETRY_CHANNEL_CAPACITY),
        }
    }

    /// Create an engine on the IIO sensor and backlight named in `config.sensor`
    pub fn with_linux_devices(config: AppConfig) -> Result<Self, DeviceError> {
        let sensor = IioLightSensor::new(
            config.sensor.iio_device.clone(),
            Duration::from_millis(config.sensor.poll_interval_ms),
        );
        sensor.read_once()?;
        let backlight = SysfsBacklight::open(&config.sensor.backlight_device)?;
        Ok(Self::new(config, Box::new(sensor), Box::new(backlight)))
    }

    /// Snapshot of the current configuration
    pub fn config(&self) -> AppConfig {
        self.config
            .read()
            .map(|config| config.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn profiles(&self) -> &ProfileManager {
        &self.profiles
    }

    pub fn subscribe_progress(&self) -> broadcast::Receiver<SessionProgress> {
        self.sessions.subscribe_progress()
    }

    pub fn subscribe_telemetry(&self) -> broadcast::Receiver<TelemetryEvent> {
        self.telemetry.subscribe()
    }

    // ========================================================================
    // PROFILE METHODS
    // ========================================================================

    /// Activate a stored profile for subsequent sessions
    pub fn activate_profile(&self, name: &str) -> Result<Arc<ProfileCurve>, ProfileError> {
        let curve = self.profiles.activate(name)?;
        self.telemetry.emit(
            TelemetryEventKind::ProfileActivated {
                name: name.to_string(),
            },
            None,
        );
        Ok(curve)
    }

    /// Activate the profile named in `profiles.active_profile`
    pub fn activate_configured_profile(&self) -> Result<Arc<ProfileCurve>, ProfileError> {
        let name = self
            .config()
            .profiles
            .active_profile
            .ok_or(ProfileError::NoActiveProfile)
            .inspect_err(|err| log_profile_error(err, "activate_configured_profile"))?;
        self.activate_profile(&name)
    }

    // ========================================================================
    // SESSION METHODS
    // ========================================================================

    /// Run one session with the active profile
    ///
    /// # Errors
    /// - No active profile (`SessionError::NoProfile`)
    /// - Session failures from the convergence loop
    pub async fn run_session(&self, mode: AggregationMode) -> Result<SessionOutcome, SessionError> {
        let profile = self.active_curve()?;
        let config = self.config().session;
        let result = self.sessions.run_session(mode, &config, profile).await;
        if let Ok(outcome) = &result {
            self.telemetry.emit(
                TelemetryEventKind::SessionFinished {
                    trigger: SessionTrigger::Manual,
                    state: outcome.state(),
                    brightness: outcome.committed_brightness(),
                },
                None,
            );
        }
        result
    }

    /// Cancel the session in flight, if any
    pub fn cancel_session(&self) -> bool {
        self.sessions.cancel()
    }

    fn active_curve(&self) -> Result<Arc<ProfileCurve>, SessionError> {
        self.profiles.active().map_err(|err| {
            log_profile_error(&err, "run_session");
            SessionError::NoProfile
        })
    }

    // ========================================================================
    // SCHEDULER METHODS
    // ========================================================================

    /// Start the periodic main job with the active profile
    ///
    /// # Errors
    /// - Main job already running
    /// - No active profile
    pub async fn start_scheduler(&self) -> Result<(), SessionError> {
        let mut guard = self.scheduler.lock().await;
        if guard.is_some() {
            return Err(SessionError::AlreadyRunning);
        }

        let profile = self.active_curve()?;
        let config = self.config();
        let interval_ms = config.scheduler.main_job_interval_ms;
        let mode = if config.scheduler.aggregate_sensor_values {
            AggregationMode::Average
        } else {
            AggregationMode::OneShot
        };

        *guard = Some(Scheduler::spawn(
            Arc::clone(&self.sessions),
            profile,
            config.session,
            config.scheduler,
            self.telemetry.clone(),
        ));
        self.telemetry
            .emit(TelemetryEventKind::SchedulerStarted { interval_ms, mode }, None);
        Ok(())
    }

    /// Stop the main job and cancel its session
    ///
    /// # Returns
    /// `true` if the main job was running
    pub async fn stop_scheduler(&self) -> bool {
        let Some(scheduler) = self.scheduler.lock().await.take() else {
            return false;
        };
        scheduler.shutdown().await;
        self.telemetry
            .emit(TelemetryEventKind::SchedulerStopped, None);
        true
    }

    pub async fn is_scheduler_running(&self) -> bool {
        self.scheduler
            .lock()
            .await
            .as_ref()
            .is_some_and(Scheduler::is_running)
    }

    /// Forward a display state change to the main job
    pub async fn set_display_on(&self, on: bool) {
        if let Some(scheduler) = self.scheduler.lock().await.as_ref() {
            scheduler.set_display_on(on);
        }
    }

    /// Display woke up: one-shot session through the main job
    ///
    /// # Returns
    /// The wake session task, or `None` when the main job is not running
    pub async fn notify_wake(&self) -> Option<JoinHandle<Result<SessionOutcome, SessionError>>> {
        self.scheduler
            .lock()
            .await
            .as_ref()
            .map(Scheduler::notify_wake)
    }

    /// Replace the configuration and restart the main job if it was running
    ///
    /// The configured active profile is re-activated when one is named. The
    /// profile directory stays the one the engine was created with.
    pub async fn reload(&self, config: AppConfig) -> Result<(), SessionError> {
        let was_running = self.stop_scheduler().await;
        let named_profile = config.profiles.active_profile.clone();
        match self.config.write() {
            Ok(mut guard) => *guard = config,
            Err(poisoned) => *poisoned.into_inner() = config,
        }
        log::info!("[EngineHandle] Configuration reloaded");

        if let Some(name) = named_profile {
            if let Err(err) = self.activate_profile(&name) {
                log_profile_error(&err, "reload");
            }
        }
        if was_running {
            self.start_scheduler().await?;
        }
        Ok(())
    }
}
