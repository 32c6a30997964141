//! Configuration management for session tuning
//!
//! This module provides runtime configuration loading from JSON files, so
//! the convergence thresholds, buffer size and scheduling cadence can be
//! tuned without recompilation. Every field has a default; a missing or
//! invalid file falls back to defaults with a warning.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub profiles: ProfilesConfig,
    #[serde(default)]
    pub sensor: SensorConfig,
}

/// Aggregation session parameters, read once per session start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Sample buffer capacity
    pub buffer_capacity: usize,
    /// Minimum time an average-mode session keeps polling
    pub min_dwell_ms: u64,
    /// Standard deviation tolerated at zero brightness
    pub base_std_dev: f32,
    /// Extra tolerance scaled by the noise ratio
    pub fluctuation_margin: f32,
    /// Poll period while waiting for the first one-shot sample
    pub one_shot_poll_ms: u64,
    /// Poll period of the average-mode convergence check
    pub average_poll_ms: u64,
    /// Hard ceiling on session duration; `None` polls until convergence
    pub max_session_ms: Option<u64>,
    /// Capacity of the sensor-to-buffer reading queue
    pub queue_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 6,
            min_dwell_ms: 1000,
            base_std_dev: 1.5,
            fluctuation_margin: 4.0,
            one_shot_poll_ms: 100,
            average_poll_ms: 1200,
            max_session_ms: Some(30_000),
            queue_capacity: 64,
        }
    }
}

impl SessionConfig {
    /// Return a copy with degenerate sizes raised to usable minimums
    pub fn validate(&self) -> Self {
        let mut config = self.clone();
        if config.buffer_capacity == 0 {
            log::warn!("[Config] buffer_capacity of 0 raised to 1");
            config.buffer_capacity = 1;
        }
        if config.queue_capacity == 0 {
            log::warn!("[Config] queue_capacity of 0 raised to 1");
            config.queue_capacity = 1;
        }
        config
    }

    pub fn min_dwell(&self) -> Duration {
        Duration::from_millis(self.min_dwell_ms)
    }

    pub fn one_shot_poll(&self) -> Duration {
        Duration::from_millis(self.one_shot_poll_ms)
    }

    pub fn average_poll(&self) -> Duration {
        Duration::from_millis(self.average_poll_ms)
    }

    pub fn max_session(&self) -> Option<Duration> {
        self.max_session_ms.map(Duration::from_millis)
    }
}

/// Periodic main job configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Delay between two periodic sessions
    pub main_job_interval_ms: u64,
    /// Use average mode for periodic sessions (one-shot otherwise)
    pub aggregate_sensor_values: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            main_job_interval_ms: 5000,
            aggregate_sensor_values: true,
        }
    }
}

impl SchedulerConfig {
    pub fn main_job_interval(&self) -> Duration {
        Duration::from_millis(self.main_job_interval_ms)
    }
}

/// Profile store location and active profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilesConfig {
    pub directory: PathBuf,
    pub active_profile: Option<String>,
}

impl Default for ProfilesConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("profiles"),
            active_profile: None,
        }
    }
}

/// Linux device paths used by the `run` command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// IIO device directory exposing `in_illuminance_*`
    pub iio_device: PathBuf,
    /// Sensor polling period
    pub poll_interval_ms: u64,
    /// Backlight class directory exposing `brightness` and `max_brightness`
    pub backlight_device: PathBuf,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            iio_device: PathBuf::from("/sys/bus/iio/devices/iio:device0"),
            poll_interval_ms: 200,
            backlight_device: PathBuf::from("/sys/class/backlight/intel_backlight"),
        }
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// The parsed configuration, or defaults if the file is missing or invalid
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Load configuration from the working directory
    pub fn load() -> Self {
        Self::load_from_file("ambient_config.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.session.buffer_capacity, 6);
        assert_eq!(config.session.min_dwell_ms, 1000);
        assert_eq!(config.session.base_std_dev, 1.5);
        assert_eq!(config.session.fluctuation_margin, 4.0);
        assert_eq!(config.scheduler.main_job_interval_ms, 5000);
        assert!(config.scheduler.aggregate_sensor_values);
        assert!(config.profiles.active_profile.is_none());
    }

    #[test]
    fn test_json_roundtrip() {
        let config = AppConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.session, config.session);
        assert_eq!(parsed.scheduler, config.scheduler);
    }

    #[test]
    fn test_partial_json_uses_field_defaults() {
        let json = r#"{ "session": { "buffer_capacity": 11 }, "scheduler": { "aggregate_sensor_values": false } }"#;
        let parsed: AppConfig = serde_json::from_str(json).unwrap();

        assert_eq!(parsed.session.buffer_capacity, 11);
        assert_eq!(parsed.session.average_poll_ms, 1200);
        assert!(!parsed.scheduler.aggregate_sensor_values);
        assert_eq!(parsed.scheduler.main_job_interval_ms, 5000);
        assert_eq!(parsed.profiles, ProfilesConfig::default());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = AppConfig::load_from_file("/nonexistent/ambient_config.json");
        assert_eq!(config.session, SessionConfig::default());
    }

    #[test]
    fn test_validate_raises_zero_capacity() {
        let config = SessionConfig {
            buffer_capacity: 0,
            queue_capacity: 0,
            ..SessionConfig::default()
        };
        let validated = config.validate();
        assert_eq!(validated.buffer_capacity, 1);
        assert_eq!(validated.queue_capacity, 1);
    }
}
