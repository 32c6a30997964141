// Sampling module - from raw sensor readings to aggregate statistics
//
// Pipeline: ReadingSink (sensor thread) -> ReadingSource -> SampleIngestor
// -> SampleBuffer -> aggregate::* over a snapshot.

pub mod aggregate;
pub mod buffer;
pub mod feed;
pub mod ingest;

pub use aggregate::AggregateSnapshot;
pub use buffer::{lock_buffer, Sample, SampleBuffer, SharedSampleBuffer};
pub use feed::{ReadingQueue, ReadingSink, ReadingSource, SensorReading, DEFAULT_QUEUE_CAPACITY};
pub use ingest::{IngestStats, SampleIngestor};
