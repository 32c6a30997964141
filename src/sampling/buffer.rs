// SampleBuffer - fixed-capacity, most-recent-first sample ring
//
// The buffer is the single source of truth for the readings of the current
// session. Index 0 is always the newest sample; once full, each push evicts
// the oldest one.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// One interpolated sensor reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Brightness mapped from the reading by the active profile
    pub brightness: u8,
    /// Raw illuminance in lux
    pub illuminance: f32,
    /// Monotonic sensor timestamp
    pub timestamp: u64,
}

impl Sample {
    pub fn new(brightness: u8, illuminance: f32, timestamp: u64) -> Self {
        Self {
            brightness,
            illuminance,
            timestamp,
        }
    }
}

/// Fixed-capacity ring, newest first
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    samples: VecDeque<Sample>,
    capacity: usize,
}

/// Buffer shared between the ingest task (writer) and the poll loop (reader)
pub type SharedSampleBuffer = Arc<Mutex<SampleBuffer>>;

impl SampleBuffer {
    /// # Panics
    /// Panics if capacity is 0
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be greater than 0");
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn shared(capacity: usize) -> SharedSampleBuffer {
        Arc::new(Mutex::new(Self::new(capacity)))
    }

    /// Insert at the front, evicting the oldest sample when full
    pub fn push(&mut self, sample: Sample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_back();
        }
        self.samples.push_front(sample);
    }

    /// Drop every sample, e.g. stale data from a previous session
    pub fn reset(&mut self) {
        self.samples.clear();
    }

    /// Filled entries, newest first
    pub fn snapshot(&self) -> Vec<Sample> {
        self.samples.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Safely acquire the shared buffer lock
pub fn lock_buffer(
    buffer: &SharedSampleBuffer,
) -> Result<MutexGuard<'_, SampleBuffer>, SessionError> {
    buffer.lock().map_err(|_| SessionError::BufferPoisoned)
}
