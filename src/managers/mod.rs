// Managers Module
//
// Focused managers owned by EngineHandle, one concern each:
// - ProfileManager: profile persistence and the active calibration curve
// - SessionManager: serialized aggregation sessions over one sensor/actuator

pub mod profile_manager;
pub mod session_manager;

pub use profile_manager::{ActiveProfile, ProfileManager};
pub use session_manager::{DynConvergenceLoop, SessionManager};
