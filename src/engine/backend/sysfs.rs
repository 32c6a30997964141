//! Linux sysfs backends: IIO ambient light sensors and backlight class devices.
//!
//! The IIO sensor is polled on its own thread, mirroring the callback style of
//! interrupt-driven sensors. The backlight scales the 0-255 brightness range to
//! the device's `max_brightness`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::error::{log_device_error, DeviceError};
use crate::profile::MAX_BRIGHTNESS;
use crate::sampling::ReadingSink;

use super::{BrightnessActuator, LightSensor, PollingWorker};

fn read_value(path: &Path) -> Result<f32, DeviceError> {
    let raw = fs::read_to_string(path)?;
    raw.trim()
        .parse::<f32>()
        .map_err(|_| DeviceError::InvalidValue {
            path: path.display().to_string(),
            value: raw.trim().to_string(),
        })
}

/// How lux is exposed by an IIO device
#[derive(Debug, Clone, PartialEq)]
enum IlluminanceChannel {
    /// `in_illuminance_input`, already in lux
    Processed(PathBuf),
    /// `in_illuminance_raw` times `in_illuminance_scale`
    Raw { raw: PathBuf, scale: f32 },
}

impl IlluminanceChannel {
    fn detect(device: &Path) -> Result<Self, DeviceError> {
        let input = device.join("in_illuminance_input");
        if input.is_file() {
            return Ok(Self::Processed(input));
        }
        let raw = device.join("in_illuminance_raw");
        if raw.is_file() {
            let scale_path = device.join("in_illuminance_scale");
            let scale = if scale_path.is_file() {
                read_value(&scale_path)?
            } else {
                1.0
            };
            return Ok(Self::Raw { raw, scale });
        }
        Err(DeviceError::NotFound {
            path: device.display().to_string(),
        })
    }

    fn read(&self) -> Result<f32, DeviceError> {
        match self {
            Self::Processed(path) => read_value(path),
            Self::Raw { raw, scale } => Ok(read_value(raw)? * scale),
        }
    }
}

/// Ambient light sensor exposed through the Linux IIO subsystem
pub struct IioLightSensor {
    device: PathBuf,
    period: Duration,
    worker: Option<PollingWorker>,
}

impl IioLightSensor {
    pub fn new<P: Into<PathBuf>>(device: P, period: Duration) -> Self {
        Self {
            device: device.into(),
            period,
            worker: None,
        }
    }

    /// Read one value synchronously
    pub fn read_once(&self) -> Result<f32, DeviceError> {
        IlluminanceChannel::detect(&self.device)?.read()
    }
}

impl LightSensor for IioLightSensor {
    fn start(&mut self, mut sink: ReadingSink) -> Result<(), DeviceError> {
        if self.worker.is_some() {
            return Err(DeviceError::AlreadyRunning);
        }
        let channel = IlluminanceChannel::detect(&self.device)?;

        log::info!("[IioLightSensor] Start polling {:?}", self.device);
        let epoch = Instant::now();
        self.worker = Some(PollingWorker::spawn(self.period, move || {
            match channel.read() {
                Ok(lux) => {
                    sink.push(lux, epoch.elapsed().as_nanos() as u64);
                }
                Err(err) => log_device_error(&err, "iio_poll"),
            }
            true
        }));
        Ok(())
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        let worker = self.worker.take().ok_or(DeviceError::NotRunning)?;
        worker.stop("iio polling")?;
        log::info!("[IioLightSensor] Stopped polling {:?}", self.device);
        Ok(())
    }
}

/// Backlight class device (`/sys/class/backlight/<name>`)
pub struct SysfsBacklight {
    brightness_path: PathBuf,
    max_brightness: u32,
}

impl SysfsBacklight {
    pub fn open<P: AsRef<Path>>(device: P) -> Result<Self, DeviceError> {
        let device = device.as_ref();
        let max_path = device.join("max_brightness");
        if !max_path.is_file() {
            return Err(DeviceError::NotFound {
                path: device.display().to_string(),
            });
        }
        let max_brightness = read_value(&max_path)?.max(0.0) as u32;
        Ok(Self {
            brightness_path: device.join("brightness"),
            max_brightness,
        })
    }

    /// Device level for a 0-255 brightness
    pub fn scale(&self, brightness: u8) -> u32 {
        (brightness as f32 / MAX_BRIGHTNESS as f32 * self.max_brightness as f32).round() as u32
    }
}

impl BrightnessActuator for SysfsBacklight {
    fn apply(&mut self, brightness: u8) -> Result<(), DeviceError> {
        let level = self.scale(brightness);
        fs::write(&self.brightness_path, level.to_string())?;
        log::info!(
            "[SysfsBacklight] Brightness {} written as {}/{}",
            brightness,
            level,
            self.max_brightness
        );
        Ok(())
    }
}
