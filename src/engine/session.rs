//! ConvergenceLoop: one aggregation session from sensor start to actuation.
//!
//! A session resets the sample buffer, starts the sensor feed and spawns an
//! ingest task moving readings into the buffer. The loop then polls the
//! buffer until its stopping policy is met:
//!
//! - one-shot: the first available sample wins;
//! - average: the buffer must be stable within an adaptive deviation
//!   threshold, and either full or past the minimum dwell time.
//!
//! The sensor is always stopped before the loop returns. The actuator is
//! called at most once, and never for a cancelled or timed-out session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::SessionConfig;
use crate::error::{log_device_error, log_session_error, DeviceError, SessionError};
use crate::profile::ProfileCurve;
use crate::sampling::aggregate::{self, AggregateSnapshot};
use crate::sampling::{
    lock_buffer, IngestStats, ReadingQueue, Sample, SampleBuffer, SampleIngestor,
    SharedSampleBuffer,
};

use super::backend::{BrightnessActuator, LightSensor};

/// How a session decides it has seen enough readings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMode {
    /// Commit on the first available sample
    OneShot,
    /// Commit once readings converge
    Average,
}

/// Lifecycle of the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Aggregating,
    Converged,
    TimedOut,
    Cancelled,
}

/// Statistics published at every evaluated poll tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionProgress {
    pub mode: AggregationMode,
    pub count: usize,
    pub capacity: usize,
    /// `None` until the buffer holds a sample
    pub stddev: Option<f32>,
    pub threshold: Option<f32>,
    pub elapsed_ms: u64,
}

/// Result of a finished session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    /// Brightness applied through the actuator
    Committed {
        brightness: u8,
        snapshot: AggregateSnapshot,
    },
    /// Converged without any sample to commit
    Skipped,
    /// Converged, but the actuator rejected the value
    ActuationFailed { brightness: u8, error: DeviceError },
    /// Ceiling reached before convergence
    TimedOut { count: usize },
    /// Cancelled before actuation
    Cancelled,
}

impl SessionOutcome {
    /// Terminal state this outcome corresponds to
    pub fn state(&self) -> SessionState {
        match self {
            SessionOutcome::Committed { .. }
            | SessionOutcome::Skipped
            | SessionOutcome::ActuationFailed { .. } => SessionState::Converged,
            SessionOutcome::TimedOut { .. } => SessionState::TimedOut,
            SessionOutcome::Cancelled => SessionState::Cancelled,
        }
    }

    /// Brightness actually applied, if any
    pub fn committed_brightness(&self) -> Option<u8> {
        match self {
            SessionOutcome::Committed { brightness, .. } => Some(*brightness),
            _ => None,
        }
    }
}

/// Shared cancel signal, sampled once per poll iteration and after each delay
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// How the poll phase ended
enum PollEnd {
    Converged(Vec<Sample>),
    TimedOut(usize),
    Cancelled,
}

/// Orchestrates a sensor, a sample buffer and an actuator
pub struct ConvergenceLoop<S: LightSensor, A: BrightnessActuator> {
    sensor: S,
    actuator: A,
    buffer: Option<SharedSampleBuffer>,
    state: SessionState,
    progress_tx: Option<broadcast::Sender<SessionProgress>>,
}

impl<S: LightSensor, A: BrightnessActuator> ConvergenceLoop<S, A> {
    pub fn new(sensor: S, actuator: A) -> Self {
        Self {
            sensor,
            actuator,
            buffer: None,
            state: SessionState::Idle,
            progress_tx: None,
        }
    }

    /// Publish per-tick progress on a broadcast channel
    pub fn with_progress(mut self, tx: broadcast::Sender<SessionProgress>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn sensor(&self) -> &S {
        &self.sensor
    }

    /// Samples of the most recent session, newest first
    pub fn last_snapshot(&self) -> Vec<Sample> {
        self.buffer
            .as_ref()
            .and_then(|buffer| lock_buffer(buffer).ok().map(|b| b.snapshot()))
            .unwrap_or_default()
    }

    /// Run one session to completion
    ///
    /// # Arguments
    /// * `mode` - Stopping policy
    /// * `config` - Session parameters, read once here
    /// * `profile` - Calibration curve mapping readings to brightness
    /// * `cancel` - Cancel signal checked every iteration
    ///
    /// # Errors
    /// - Sensor failed to start
    /// - Sample buffer lock poisoned
    pub async fn run(
        &mut self,
        mode: AggregationMode,
        config: &SessionConfig,
        profile: Arc<ProfileCurve>,
        cancel: &CancelHandle,
    ) -> Result<SessionOutcome, SessionError> {
        let config = config.validate();
        let buffer = self.prepare_buffer(config.buffer_capacity)?;
        if cancel.is_cancelled() {
            log::info!("[Session] Cancelled before start, sensor left idle");
            self.transition(SessionState::Cancelled);
            self.transition(SessionState::Idle);
            return Ok(SessionOutcome::Cancelled);
        }
        let (sink, source) = ReadingQueue::new(config.queue_capacity);

        self.transition(SessionState::Aggregating);
        if let Err(err) = self.sensor.start(sink) {
            log_device_error(&err, "session_start");
            self.transition(SessionState::Idle);
            return Err(SessionError::SensorStart {
                reason: err.to_string(),
            });
        }

        let stop = Arc::new(AtomicBool::new(false));
        let ingest = tokio::spawn(
            SampleIngestor::new(source, Arc::clone(&buffer), profile, Arc::clone(&stop)).run(),
        );

        let started = Instant::now();
        let progress = self.progress_tx.clone();
        let polled = match mode {
            AggregationMode::OneShot => {
                Self::poll_one_shot(&config, &buffer, cancel, started, progress.as_ref()).await
            }
            AggregationMode::Average => {
                Self::poll_average(&config, &buffer, cancel, started, progress.as_ref()).await
            }
        };

        self.stop_feed(&stop, ingest).await;

        let outcome = match polled {
            Ok(PollEnd::Converged(_)) if cancel.is_cancelled() => {
                log::info!("[Session] Cancelled while stopping the feed, no actuation");
                SessionOutcome::Cancelled
            }
            Ok(PollEnd::Converged(samples)) => self.commit(&samples, started),
            Ok(PollEnd::TimedOut(count)) => {
                log::warn!(
                    "[Session] Timed out after {}ms with {} samples, no actuation",
                    started.elapsed().as_millis(),
                    count
                );
                SessionOutcome::TimedOut { count }
            }
            Ok(PollEnd::Cancelled) => {
                log::info!("[Session] Cancelled, no actuation");
                SessionOutcome::Cancelled
            }
            Err(err) => {
                log_session_error(&err, "session_poll");
                self.transition(SessionState::Idle);
                return Err(err);
            }
        };

        self.transition(outcome.state());
        self.transition(SessionState::Idle);
        Ok(outcome)
    }

    fn prepare_buffer(&mut self, capacity: usize) -> Result<SharedSampleBuffer, SessionError> {
        if let Some(buffer) = &self.buffer {
            let mut guard = lock_buffer(buffer)?;
            if guard.capacity() == capacity {
                guard.reset();
                return Ok(Arc::clone(buffer));
            }
        }
        let buffer = SampleBuffer::shared(capacity);
        self.buffer = Some(Arc::clone(&buffer));
        Ok(buffer)
    }

    async fn poll_one_shot(
        config: &SessionConfig,
        buffer: &SharedSampleBuffer,
        cancel: &CancelHandle,
        started: Instant,
        progress: Option<&broadcast::Sender<SessionProgress>>,
    ) -> Result<PollEnd, SessionError> {
        loop {
            if cancel.is_cancelled() {
                return Ok(PollEnd::Cancelled);
            }

            let snapshot = lock_buffer(buffer)?.snapshot();
            if !snapshot.is_empty() {
                publish(progress, AggregationMode::OneShot, &snapshot, config, started);
                return Ok(PollEnd::Converged(snapshot));
            }
            if Self::ceiling_reached(config, started) {
                return Ok(PollEnd::TimedOut(0));
            }

            tokio::time::sleep(config.one_shot_poll()).await;
        }
    }

    async fn poll_average(
        config: &SessionConfig,
        buffer: &SharedSampleBuffer,
        cancel: &CancelHandle,
        started: Instant,
        progress: Option<&broadcast::Sender<SessionProgress>>,
    ) -> Result<PollEnd, SessionError> {
        let capacity = config.buffer_capacity;
        let mut count = 0usize;
        let mut stddev = f32::INFINITY;
        let mut threshold = 0.0f32;
        let mut last = Vec::new();

        loop {
            if cancel.is_cancelled() {
                return Ok(PollEnd::Cancelled);
            }
            if Self::ceiling_reached(config, started) {
                return Ok(PollEnd::TimedOut(count));
            }

            tokio::time::sleep(config.average_poll()).await;
            if cancel.is_cancelled() {
                return Ok(PollEnd::Cancelled);
            }

            let snapshot = lock_buffer(buffer)?.snapshot();
            if let Some(stats) = AggregateSnapshot::from_samples(&snapshot) {
                count = stats.count;
                stddev = stats.stddev;
                threshold = stats.threshold(config.base_std_dev, config.fluctuation_margin);
                last = snapshot;
            }
            let elapsed = started.elapsed();
            publish(progress, AggregationMode::Average, &last, config, started);

            let unstable = stddev > threshold;
            let keep_polling =
                (count < capacity || unstable) && (elapsed <= config.min_dwell() || unstable);
            if !keep_polling {
                return Ok(PollEnd::Converged(last));
            }
        }
    }

    fn ceiling_reached(config: &SessionConfig, started: Instant) -> bool {
        config
            .max_session()
            .is_some_and(|ceiling| started.elapsed() >= ceiling)
    }

    async fn stop_feed(
        &mut self,
        stop: &AtomicBool,
        ingest: JoinHandle<Result<IngestStats, SessionError>>,
    ) {
        if let Err(err) = self.sensor.stop() {
            log_device_error(&err, "session_stop");
        }
        stop.store(true, Ordering::SeqCst);

        match ingest.await {
            Ok(Ok(stats)) => tracing::debug!(
                "[Session] Ingest finished: accepted={}, uncovered={}, dropped={}",
                stats.accepted,
                stats.uncovered,
                stats.dropped
            ),
            Ok(Err(err)) => log_session_error(&err, "session_ingest"),
            Err(err) => tracing::warn!("[Session] Ingest task failed: {}", err),
        }
    }

    fn commit(&mut self, samples: &[Sample], started: Instant) -> SessionOutcome {
        let (Some(median), Some(snapshot)) = (
            aggregate::median(samples),
            AggregateSnapshot::from_samples(samples),
        ) else {
            log::info!("[Session] No sample collected, skipping actuation");
            return SessionOutcome::Skipped;
        };

        let brightness = median.brightness;
        log::info!(
            "[Session] Converged after {}ms: count={}, stddev={:.2}, committing brightness {}",
            started.elapsed().as_millis(),
            snapshot.count,
            snapshot.stddev,
            brightness
        );
        match self.actuator.apply(brightness) {
            Ok(()) => SessionOutcome::Committed {
                brightness,
                snapshot,
            },
            Err(error) => {
                log_device_error(&error, "session_commit");
                SessionOutcome::ActuationFailed { brightness, error }
            }
        }
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            log::debug!("[Session] {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }
}

/// Log one poll tick and forward it to subscribers, if any
fn publish(
    progress: Option<&broadcast::Sender<SessionProgress>>,
    mode: AggregationMode,
    samples: &[Sample],
    config: &SessionConfig,
    started: Instant,
) {
    let stats = AggregateSnapshot::from_samples(samples);
    let tick = SessionProgress {
        mode,
        count: samples.len(),
        capacity: config.buffer_capacity,
        stddev: stats.map(|s| s.stddev),
        threshold: stats.map(|s| s.threshold(config.base_std_dev, config.fluctuation_margin)),
        elapsed_ms: started.elapsed().as_millis() as u64,
    };
    tracing::debug!(
        "[Session] count={}/{}, stddev={:?} (max {:?}), elapsed={}ms",
        tick.count,
        tick.capacity,
        tick.stddev,
        tick.threshold,
        tick.elapsed_ms
    );
    if let Some(tx) = progress {
        let _ = tx.send(tick);
    }
}

#[cfg(test)]
mod tests;
