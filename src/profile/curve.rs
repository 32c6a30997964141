// ProfileCurve - illuminance to brightness mapping
//
// A profile is an ordered list of calibration points. Readings between two
// points are linearly interpolated; readings at a point map exactly to that
// point's brightness. Readings outside the covered range produce no result.

use serde::{Deserialize, Serialize};

/// Lowest illuminance considered, in lux
pub const MIN_ILLUMINANCE: f32 = 0.0;
/// Highest illuminance considered, in lux
pub const MAX_ILLUMINANCE: f32 = 15_000.0;
/// Brightness ceiling of the actuator scale
pub const MAX_BRIGHTNESS: u8 = 255;

/// One calibration anchor of a profile
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPoint {
    /// Ambient illuminance in lux (>= 0)
    pub illuminance: f32,
    /// Target backlight level
    pub brightness: u8,
}

impl CalibrationPoint {
    pub fn new(illuminance: f32, brightness: u8) -> Self {
        Self {
            illuminance,
            brightness,
        }
    }
}

/// Immutable calibration curve, ascending by illuminance
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProfileCurve {
    points: Vec<CalibrationPoint>,
}

impl ProfileCurve {
    /// Create a curve; points are sorted by illuminance (stable, so
    /// duplicate knots keep their file order)
    pub fn new(mut points: Vec<CalibrationPoint>) -> Self {
        points.sort_by(|a, b| a.illuminance.total_cmp(&b.illuminance));
        Self { points }
    }

    pub fn points(&self) -> &[CalibrationPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// A curve needs two anchors before it can interpolate anything
    pub fn is_usable(&self) -> bool {
        self.points.len() >= 2
    }

    /// Map an illuminance reading to a brightness level
    ///
    /// # Returns
    /// * `Some(brightness)` - Interpolated, clamped and rounded level
    /// * `None` - Curve has fewer than 2 points or does not cover the reading
    pub fn interpolate(&self, illuminance: f32) -> Option<u8> {
        if !self.is_usable() || illuminance.is_nan() {
            return None;
        }

        let value = illuminance.clamp(MIN_ILLUMINANCE, MAX_ILLUMINANCE);
        let lower_idx = self.points.iter().rposition(|p| p.illuminance <= value)?;
        let upper_idx = self.points.iter().position(|p| p.illuminance >= value)?;
        let lower = self.points[lower_idx];
        let upper = self.points[upper_idx];

        let span = upper.illuminance - lower.illuminance;
        let fraction = if lower_idx == upper_idx || span <= 0.0 {
            0.0
        } else {
            (value - lower.illuminance) / span
        };

        let projection = lower.brightness as f32
            + (upper.brightness as f32 - lower.brightness as f32) * fraction;
        Some(projection.clamp(0.0, MAX_BRIGHTNESS as f32).round() as u8)
    }
}

impl From<Vec<CalibrationPoint>> for ProfileCurve {
    fn from(points: Vec<CalibrationPoint>) -> Self {
        Self::new(points)
    }
}
