// ReadingQueue - bounded lock-free queue between sensor and session
//
// Sensor callbacks run on the sensor's own thread at their own pace. They hand
// raw readings to a single-producer single-consumer ring buffer, so the
// callback never blocks and never allocates. The session's ingest task is the
// only consumer.
//
// Reading flow:
// 1. Sensor thread pushes (illuminance, timestamp) into the ReadingSink
// 2. Ingest task pops readings from the ReadingSource
// 3. Ingest task interpolates and pushes samples into the SampleBuffer
//
// Dropping the sink (sensor stopped) abandons the queue; the source drains
// what is left and then reports itself abandoned.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rtrb::{Consumer, Producer};

/// Default queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Raw event delivered by a light sensor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    /// Illuminance in lux
    pub illuminance: f32,
    /// Monotonic timestamp from the sensor clock
    pub timestamp: u64,
}

/// Producer half, owned by the sensor while it is started
pub struct ReadingSink {
    producer: Producer<SensorReading>,
    dropped: Arc<AtomicU64>,
}

impl ReadingSink {
    /// Push a reading without blocking
    ///
    /// # Returns
    /// `false` if the queue was full and the reading was dropped
    pub fn push(&mut self, illuminance: f32, timestamp: u64) -> bool {
        let reading = SensorReading {
            illuminance,
            timestamp,
        };
        if self.producer.push(reading).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        true
    }

    /// Free slots left in the queue
    pub fn slots(&self) -> usize {
        self.producer.slots()
    }
}

/// Consumer half, owned by the session ingest task
pub struct ReadingSource {
    consumer: Consumer<SensorReading>,
    dropped: Arc<AtomicU64>,
}

impl ReadingSource {
    /// Pop the next pending reading, if any
    pub fn pop(&mut self) -> Option<SensorReading> {
        self.consumer.pop().ok()
    }

    /// Sink has been dropped: no further readings can arrive
    pub fn is_abandoned(&self) -> bool {
        self.consumer.is_abandoned()
    }

    /// Readings lost to a full queue so far
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Bounded reading queue
pub struct ReadingQueue;

impl ReadingQueue {
    /// Create a connected sink/source pair
    ///
    /// # Panics
    /// Panics if capacity is 0
    #[allow(clippy::new_ret_no_self)]
    pub fn new(capacity: usize) -> (ReadingSink, ReadingSource) {
        assert!(capacity > 0, "capacity must be greater than 0");
        let (producer, consumer) = rtrb::RingBuffer::new(capacity);
        let dropped = Arc::new(AtomicU64::new(0));
        (
            ReadingSink {
                producer,
                dropped: Arc::clone(&dropped),
            },
            ReadingSource { consumer, dropped },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readings_arrive_in_order() {
        let (mut sink, mut source) = ReadingQueue::new(4);
        assert!(sink.push(10.0, 1));
        assert!(sink.push(20.0, 2));

        assert_eq!(source.pop().unwrap().timestamp, 1);
        assert_eq!(source.pop().unwrap().illuminance, 20.0);
        assert!(source.pop().is_none());
    }

    #[test]
    fn test_full_queue_drops_reading() {
        let (mut sink, mut source) = ReadingQueue::new(2);
        assert!(sink.push(1.0, 1));
        assert!(sink.push(2.0, 2));
        assert!(!sink.push(3.0, 3));

        assert_eq!(source.dropped(), 1);
        assert_eq!(source.pop().unwrap().timestamp, 1);
    }

    #[test]
    fn test_slots_track_free_space() {
        let (mut sink, mut source) = ReadingQueue::new(3);
        assert_eq!(sink.slots(), 3);
        sink.push(1.0, 1);
        sink.push(2.0, 2);
        assert_eq!(sink.slots(), 1);
        source.pop();
        assert_eq!(sink.slots(), 2);
    }

    #[test]
    fn test_dropping_sink_abandons_source() {
        let (mut sink, mut source) = ReadingQueue::new(2);
        sink.push(5.0, 9);
        assert!(!source.is_abandoned());

        drop(sink);
        assert!(source.is_abandoned());
        // Pending readings remain available after abandonment
        assert_eq!(source.pop().unwrap().timestamp, 9);
    }

    #[test]
    fn test_sink_moves_across_threads() {
        let (mut sink, mut source) = ReadingQueue::new(8);
        let handle = std::thread::spawn(move || {
            for t in 0..5 {
                sink.push(100.0, t);
            }
        });
        handle.join().unwrap();

        let mut count = 0;
        while source.pop().is_some() {
            count += 1;
        }
        assert_eq!(count, 5);
        assert!(source.is_abandoned());
    }

    #[test]
    #[should_panic(expected = "capacity must be greater than 0")]
    fn test_zero_capacity_panics() {
        let _ = ReadingQueue::new(0);
    }
}
