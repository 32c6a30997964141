// SampleIngestor - moves sensor readings into the session sample buffer
//
// Runs as its own task for the lifetime of one session. Each pass pops every
// pending reading, maps it through the active profile and pushes the result
// into the shared buffer under one lock acquisition. Readings the profile does
// not cover are skipped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::profile::ProfileCurve;

use super::buffer::{lock_buffer, Sample, SharedSampleBuffer};
use super::feed::ReadingSource;

/// Idle delay between two passes over an empty queue
pub const DEFAULT_INGEST_INTERVAL: Duration = Duration::from_millis(10);

/// Counters reported when the ingest task finishes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStats {
    /// Readings mapped and pushed into the buffer
    pub accepted: u64,
    /// Readings outside the profile's coverage
    pub uncovered: u64,
    /// Readings lost to a full queue
    pub dropped: u64,
}

pub struct SampleIngestor {
    source: ReadingSource,
    buffer: SharedSampleBuffer,
    profile: Arc<ProfileCurve>,
    stop: Arc<AtomicBool>,
    stats: IngestStats,
}

impl SampleIngestor {
    pub fn new(
        source: ReadingSource,
        buffer: SharedSampleBuffer,
        profile: Arc<ProfileCurve>,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            source,
            buffer,
            profile,
            stop,
            stats: IngestStats::default(),
        }
    }

    /// Move every pending reading into the buffer
    ///
    /// # Returns
    /// Number of samples pushed during this pass
    pub fn drain(&mut self) -> Result<usize, SessionError> {
        let mut pushed = 0;
        let mut guard = None;

        while let Some(reading) = self.source.pop() {
            let Some(brightness) = self.profile.interpolate(reading.illuminance) else {
                self.stats.uncovered += 1;
                tracing::debug!(
                    "[Ingest] {:.1} lux outside profile coverage, skipping",
                    reading.illuminance
                );
                continue;
            };

            if guard.is_none() {
                guard = Some(lock_buffer(&self.buffer)?);
            }
            if let Some(buffer) = guard.as_mut() {
                buffer.push(Sample::new(
                    brightness,
                    reading.illuminance,
                    reading.timestamp,
                ));
            }
            self.stats.accepted += 1;
            pushed += 1;
        }

        Ok(pushed)
    }

    /// Drain until the session stops the feed or the sensor drops its sink
    pub async fn run(mut self) -> Result<IngestStats, SessionError> {
        loop {
            let abandoned = self.source.is_abandoned();
            self.drain()?;
            if abandoned || self.stop.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(DEFAULT_INGEST_INTERVAL).await;
        }

        self.stats.dropped = self.source.dropped();
        if self.stats.dropped > 0 {
            tracing::warn!(
                "[Ingest] {} readings dropped on a full queue",
                self.stats.dropped
            );
        }
        Ok(self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::CalibrationPoint;
    use crate::sampling::buffer::SampleBuffer;
    use crate::sampling::feed::ReadingQueue;

    fn linear_profile() -> Arc<ProfileCurve> {
        Arc::new(ProfileCurve::new(vec![
            CalibrationPoint::new(0.0, 0),
            CalibrationPoint::new(1000.0, 255),
        ]))
    }

    #[test]
    fn test_drain_maps_and_skips_uncovered() {
        let (mut sink, source) = ReadingQueue::new(8);
        let buffer = SampleBuffer::shared(4);
        let profile = Arc::new(ProfileCurve::new(vec![
            CalibrationPoint::new(100.0, 10),
            CalibrationPoint::new(200.0, 20),
        ]));
        let mut ingestor = SampleIngestor::new(
            source,
            Arc::clone(&buffer),
            profile,
            Arc::new(AtomicBool::new(false)),
        );

        sink.push(150.0, 1);
        sink.push(5000.0, 2);
        sink.push(50.0, 3);
        assert_eq!(ingestor.drain().unwrap(), 1);

        let snapshot = lock_buffer(&buffer).unwrap().snapshot();
        assert_eq!(snapshot, vec![Sample::new(15, 150.0, 1)]);
        assert_eq!(ingestor.stats.uncovered, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_exits_when_sink_dropped() {
        let (mut sink, source) = ReadingQueue::new(8);
        let buffer = SampleBuffer::shared(6);
        let ingestor = SampleIngestor::new(
            source,
            Arc::clone(&buffer),
            linear_profile(),
            Arc::new(AtomicBool::new(false)),
        );
        let task = tokio::spawn(ingestor.run());

        sink.push(500.0, 1);
        sink.push(500.0, 2);
        drop(sink);

        let stats = task.await.unwrap().unwrap();
        assert_eq!(stats.accepted, 2);
        assert_eq!(lock_buffer(&buffer).unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_exits_on_stop_flag() {
        let (_sink, source) = ReadingQueue::new(8);
        let stop = Arc::new(AtomicBool::new(false));
        let ingestor = SampleIngestor::new(
            source,
            SampleBuffer::shared(6),
            linear_profile(),
            Arc::clone(&stop),
        );
        let task = tokio::spawn(ingestor.run());

        tokio::time::sleep(Duration::from_millis(50)).await;
        stop.store(true, Ordering::SeqCst);

        let stats = task.await.unwrap().unwrap();
        assert_eq!(stats, IngestStats::default());
    }
}
