// SessionManager: Focused manager for session serialization
//
// Single Responsibility: at most one aggregation session at a time.
// Sensor and actuator live inside one ConvergenceLoop behind an async mutex.
// Starting a session signals the previous one to cancel, then waits for the
// loop to be released, so actuation calls never interleave.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;

use crate::config::SessionConfig;
use crate::engine::backend::{BrightnessActuator, LightSensor};
use crate::engine::session::{
    AggregationMode, CancelHandle, ConvergenceLoop, SessionOutcome, SessionProgress,
};
use crate::error::SessionError;
use crate::profile::ProfileCurve;

/// Buffer of the progress broadcast channel
const PROGRESS_CHANNEL_CAPACITY: usize = 32;

/// Loop over boxed collaborators, as chosen at runtime
pub type DynConvergenceLoop = ConvergenceLoop<Box<dyn LightSensor>, Box<dyn BrightnessActuator>>;

struct ActiveSession {
    id: u64,
    cancel: CancelHandle,
}

/// Serializes sessions over one sensor/actuator pair
///
/// # Example
/// ```ignore
/// let manager = SessionManager::new(Box::new(sensor), Box::new(backlight));
/// let outcome = manager
///     .run_session(AggregationMode::Average, &config, profile)
///     .await?;
/// ```
pub struct SessionManager {
    session: tokio::sync::Mutex<DynConvergenceLoop>,
    active: Mutex<Option<ActiveSession>>,
    next_id: AtomicU64,
    progress_tx: broadcast::Sender<SessionProgress>,
}

impl SessionManager {
    pub fn new(sensor: Box<dyn LightSensor>, actuator: Box<dyn BrightnessActuator>) -> Self {
        let (progress_tx, _) = broadcast::channel(PROGRESS_CHANNEL_CAPACITY);
        let session = ConvergenceLoop::new(sensor, actuator).with_progress(progress_tx.clone());
        Self {
            session: tokio::sync::Mutex::new(session),
            active: Mutex::new(None),
            next_id: AtomicU64::new(1),
            progress_tx,
        }
    }

    /// Receive per-tick progress of every session run through this manager
    pub fn subscribe_progress(&self) -> broadcast::Receiver<SessionProgress> {
        self.progress_tx.subscribe()
    }

    /// Run a session, cancelling and awaiting any session still active
    ///
    /// A session superseded while waiting for the loop returns
    /// `SessionOutcome::Cancelled` without touching the actuator.
    ///
    /// # Arguments
    /// * `mode` - Stopping policy
    /// * `config` - Session parameters
    /// * `profile` - Calibration curve for this session
    ///
    /// # Errors
    /// Propagates `ConvergenceLoop::run` errors
    pub async fn run_session(
        &self,
        mode: AggregationMode,
        config: &SessionConfig,
        profile: Arc<ProfileCurve>,
    ) -> Result<SessionOutcome, SessionError> {
        let cancel = CancelHandle::new();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        let previous = self.lock_active().replace(ActiveSession {
            id,
            cancel: cancel.clone(),
        });
        if let Some(previous) = previous {
            log::info!(
                "[SessionManager] Session {} supersedes session {}",
                id,
                previous.id
            );
            previous.cancel.cancel();
        }

        let result = {
            let mut session = self.session.lock().await;
            log::debug!("[SessionManager] Session {} started ({:?})", id, mode);
            session.run(mode, config, profile, &cancel).await
        };

        let mut active = self.lock_active();
        if active.as_ref().is_some_and(|current| current.id == id) {
            *active = None;
        }
        result
    }

    /// Signal the active session to cancel
    ///
    /// # Returns
    /// `true` if a session was active
    pub fn cancel(&self) -> bool {
        match self.lock_active().take() {
            Some(active) => {
                log::info!("[SessionManager] Cancelling session {}", active.id);
                active.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.lock_active().is_some()
    }

    // The guarded value is a plain handle swap, so a poisoned lock is still
    // consistent and recovered.
    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveSession>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
