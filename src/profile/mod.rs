// Profile module - calibration curves and their on-disk store
//
// This module provides two components:
// 1. ProfileCurve: piecewise-linear illuminance -> brightness mapping
// 2. ProfileStore: named profile files in the "<lux> <brightness>" text format

pub mod curve;
pub mod store;

pub use curve::{CalibrationPoint, ProfileCurve, MAX_BRIGHTNESS, MAX_ILLUMINANCE, MIN_ILLUMINANCE};
pub use store::{format_profile, parse_profile, ParsedProfile, ProfileStore, SkippedLine};
