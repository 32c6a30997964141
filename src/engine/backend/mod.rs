//! Collaborator abstractions for the convergence loop.
//!
//! A session only talks to the outside world through these two traits: a
//! light sensor that pushes readings into a [ReadingSink] while started, and
//! an actuator that receives at most one brightness value per session.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::error::DeviceError;
use crate::sampling::ReadingSink;

/// Ambient light source delivering readings via callback while started.
///
/// `start` hands the sensor ownership of the queue producer; `stop` must
/// release it so the session's ingest task can observe the end of the feed.
pub trait LightSensor: Send {
    fn start(&mut self, sink: ReadingSink) -> Result<(), DeviceError>;
    fn stop(&mut self) -> Result<(), DeviceError>;
}

/// Backlight control receiving committed brightness values (0-255).
pub trait BrightnessActuator: Send {
    fn apply(&mut self, brightness: u8) -> Result<(), DeviceError>;
}

impl<T: LightSensor + ?Sized> LightSensor for Box<T> {
    fn start(&mut self, sink: ReadingSink) -> Result<(), DeviceError> {
        (**self).start(sink)
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        (**self).stop()
    }
}

impl<T: BrightnessActuator + ?Sized> BrightnessActuator for Box<T> {
    fn apply(&mut self, brightness: u8) -> Result<(), DeviceError> {
        (**self).apply(brightness)
    }
}

/// Polling thread shared by the threaded sensors.
///
/// Between two ticks the thread waits on a stop channel rather than sleeping,
/// so `stop` wakes it at once and the join returns without waiting out the
/// sensor period.
pub(crate) struct PollingWorker {
    stop_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl PollingWorker {
    /// Run `tick` once per period until it returns `false` or `stop` is called
    pub(crate) fn spawn<F>(period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::channel();
        let handle = std::thread::spawn(move || {
            while tick() {
                match stop_rx.recv_timeout(period) {
                    Err(RecvTimeoutError::Timeout) => {}
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        });
        Self { stop_tx, handle }
    }

    pub(crate) fn stop(self, label: &str) -> Result<(), DeviceError> {
        // The thread may already have finished its trace
        let _ = self.stop_tx.send(());
        self.handle.join().map_err(|_| DeviceError::Io {
            details: format!("{} thread panicked", label),
        })
    }
}


mod replay;
pub use replay::{RecordingActuator, ReplaySensor};

mod sysfs;
pub use sysfs::{IioLightSensor, SysfsBacklight};
