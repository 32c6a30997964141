use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rand::Rng;

use crate::error::DeviceError;
use crate::sampling::ReadingSink;

use super::{BrightnessActuator, LightSensor, PollingWorker};

/// Desktop stub sensor replaying a fixed lux trace.
///
/// With a non-zero period a thread emits one reading per period, like a real
/// interrupt-driven sensor. A zero period delivers the trace synchronously
/// inside `start()`, which keeps tests deterministic: a one-pass trace stops
/// at the end or when the queue is full, a looping trace repeats until the
/// queue is full.
pub struct ReplaySensor {
    readings: Vec<f32>,
    period: Duration,
    looping: bool,
    jitter: f32,
    worker: Option<PollingWorker>,
    sink: Option<ReadingSink>,
    epoch: Instant,
}

impl ReplaySensor {
    pub fn new(readings: Vec<f32>, period: Duration) -> Self {
        Self {
            readings,
            period,
            looping: false,
            jitter: 0.0,
            worker: None,
            sink: None,
            epoch: Instant::now(),
        }
    }

    /// Sensor repeating one value forever
    pub fn constant(illuminance: f32, period: Duration) -> Self {
        Self::new(vec![illuminance], period).looping(true)
    }

    /// Restart the trace from the beginning once exhausted
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    /// Add uniform noise of +/- `jitter` lux to every reading
    pub fn with_jitter(mut self, jitter: f32) -> Self {
        self.jitter = jitter.abs();
        self
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some() || self.sink.is_some()
    }

    /// Push the trace into the queue without blocking
    fn fill(&self, sink: &mut ReadingSink) {
        let mut timestamp = 0u64;
        loop {
            for &lux in &self.readings {
                if sink.slots() == 0 {
                    return;
                }
                sink.push(Self::jittered(lux, self.jitter), timestamp);
                timestamp += 1;
            }
            if !self.looping || self.readings.is_empty() {
                return;
            }
        }
    }

    fn jittered(value: f32, jitter: f32) -> f32 {
        if jitter > 0.0 {
            (value + rand::thread_rng().gen_range(-jitter..=jitter)).max(0.0)
        } else {
            value
        }
    }
}

impl LightSensor for ReplaySensor {
    fn start(&mut self, mut sink: ReadingSink) -> Result<(), DeviceError> {
        if self.is_running() {
            return Err(DeviceError::AlreadyRunning);
        }

        if self.period.is_zero() {
            self.fill(&mut sink);
            self.sink = Some(sink);
            return Ok(());
        }

        let readings = self.readings.clone();
        let looping = self.looping;
        let jitter = self.jitter;
        let epoch = self.epoch;
        let mut index = 0;

        self.worker = Some(PollingWorker::spawn(self.period, move || {
            if index == readings.len() && looping {
                index = 0;
            }
            let Some(&lux) = readings.get(index) else {
                return false;
            };
            index += 1;

            let timestamp = epoch.elapsed().as_nanos() as u64;
            if !sink.push(Self::jittered(lux, jitter), timestamp) {
                log::warn!("[ReplaySensor] Reading queue full, dropping {:.1} lux", lux);
            }
            true
        }));
        Ok(())
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        if let Some(sink) = self.sink.take() {
            drop(sink);
            return Ok(());
        }
        let worker = self.worker.take().ok_or(DeviceError::NotRunning)?;
        worker.stop("replay")
    }
}

/// Actuator recording every applied value, for tests and dry runs.
#[derive(Clone, Default)]
pub struct RecordingActuator {
    applied: Arc<Mutex<Vec<u8>>>,
}

impl RecordingActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Values applied so far, oldest first
    pub fn applied(&self) -> Vec<u8> {
        self.applied
            .lock()
            .map(|values| values.clone())
            .unwrap_or_default()
    }
}

impl BrightnessActuator for RecordingActuator {
    fn apply(&mut self, brightness: u8) -> Result<(), DeviceError> {
        log::info!("[RecordingActuator] Brightness set to {}", brightness);
        self.applied
            .lock()
            .map_err(|_| DeviceError::Io {
                details: "recording lock poisoned".to_string(),
            })?
            .push(brightness);
        Ok(())
    }
}
