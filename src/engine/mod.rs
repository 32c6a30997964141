//! Engine module housing the brightness control core.
//!
//! This module exposes the sensor/actuator abstractions (`backend`), the
//! per-session convergence loop (`session`), the periodic main job
//! (`scheduler`) and the `EngineHandle` orchestration layer (`core`).

pub mod backend;
pub mod core;
pub mod scheduler;
pub mod session;

pub use backend::{
    BrightnessActuator, IioLightSensor, LightSensor, RecordingActuator, ReplaySensor,
    SysfsBacklight,
};
pub use core::{EngineHandle, SessionTrigger, TelemetryEvent, TelemetryEventKind, TelemetrySink};
pub use scheduler::Scheduler;
pub use session::{
    AggregationMode, CancelHandle, ConvergenceLoop, SessionOutcome, SessionProgress, SessionState,
};
