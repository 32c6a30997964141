//! Stateless statistics over a buffer snapshot.
//!
//! All functions return `None` on an empty slice. The median uses the
//! lower-middle element for even counts, so it is always an observed sample.

use serde::{Deserialize, Serialize};

use super::buffer::Sample;
use crate::profile::MAX_BRIGHTNESS;

/// Arithmetic mean of brightness values
pub fn mean(samples: &[Sample]) -> Option<f32> {
    if samples.is_empty() {
        return None;
    }
    let sum: u32 = samples.iter().map(|s| s.brightness as u32).sum();
    Some(sum as f32 / samples.len() as f32)
}

/// Sample with the median brightness (lower-middle for even counts)
pub fn median(samples: &[Sample]) -> Option<Sample> {
    if samples.is_empty() {
        return None;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by_key(|s| s.brightness);
    let n = sorted.len();
    let index = if n % 2 == 0 { n / 2 - 1 } else { n / 2 };
    Some(sorted[index])
}

/// Population standard deviation of brightness values
pub fn standard_deviation(samples: &[Sample]) -> Option<f32> {
    let mean = mean(samples)?;
    let sum_of_squares: f32 = samples
        .iter()
        .map(|s| (s.brightness as f32 - mean).powi(2))
        .sum();
    Some((sum_of_squares / samples.len() as f32).sqrt())
}

/// How close the samples sit to full brightness, in [0, 1]
pub fn noise_ratio(samples: &[Sample]) -> Option<f32> {
    if samples.is_empty() {
        return None;
    }
    let sum: u32 = samples.iter().map(|s| s.brightness as u32).sum();
    Some(sum as f32 / (MAX_BRIGHTNESS as f32 * samples.len() as f32))
}

/// All statistics of one snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregateSnapshot {
    pub count: usize,
    pub mean: f32,
    pub median: u8,
    pub stddev: f32,
    pub noise_ratio: f32,
}

impl AggregateSnapshot {
    pub fn from_samples(samples: &[Sample]) -> Option<Self> {
        Some(Self {
            count: samples.len(),
            mean: mean(samples)?,
            median: median(samples)?.brightness,
            stddev: standard_deviation(samples)?,
            noise_ratio: noise_ratio(samples)?,
        })
    }

    /// Deviation tolerated for this snapshot: widens as brightness rises
    pub fn threshold(&self, base_std_dev: f32, fluctuation_margin: f32) -> f32 {
        base_std_dev + self.noise_ratio * fluctuation_margin
    }
}
