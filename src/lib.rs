// Ambient Brightness Core - adaptive backlight engine
// Maps ambient light readings through a calibration profile and commits one
// brightness value per converged aggregation session.

// Module declarations
pub mod config;
pub mod engine;
pub mod error;
pub mod managers;
pub mod profile;
pub mod sampling;

// Re-exports for convenience
pub use config::{AppConfig, SchedulerConfig, SessionConfig};
pub use engine::{AggregationMode, EngineHandle, SessionOutcome};
pub use profile::{CalibrationPoint, ProfileCurve, ProfileStore};

use tracing::Level;

/// Environment variable selecting the log level
pub const LOG_ENV: &str = "AMBIENT_LOG";

fn log_level() -> Level {
    std::env::var(LOG_ENV)
        .ok()
        .and_then(|value| value.trim().parse::<Level>().ok())
        .unwrap_or(Level::INFO)
}

/// Install the fmt subscriber on stderr, bridging `log` records.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(log_level())
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging();
        init_logging();
        log::info!("[Test] logging initialized");
    }
}
