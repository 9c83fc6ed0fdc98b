//! Contracts of the transport clients a [StreamTask](crate::task::StreamTask) talks to. The
//! implementations (network protocol, batching, retries) live outside this crate.

use std::collections::HashMap;

use crate::error::Result;
use crate::record::{ConsumerRecord, OffsetAndMetadata, ProducerRecord, RecordMetadata, TopicPartition};

/// Input side of the transport. One instance may be shared by many tasks, so it has to serialize
/// the calls of the tasks on its own.
pub trait Consumer: Send + Sync {
    /// Stops fetching records for the partition.
    fn pause(&self, partition: &TopicPartition);

    /// Restarts fetching records for a paused partition.
    fn resume(&self, partition: &TopicPartition);

    /// Synchronously commits the offsets. Not retried by the task, a failure surfaces to the
    /// caller of [StreamTask::commit](crate::task::StreamTask::commit).
    fn commit_sync(&self, offsets: &HashMap<TopicPartition, OffsetAndMetadata>) -> Result<()>;
}

/// Output side of the transport.
pub trait Producer: Send {
    fn send(&mut self, record: ProducerRecord) -> Result<()>;

    /// Blocks until every sent record is acknowledged and returns the acknowledgements received
    /// since the previous flush.
    fn flush(&mut self) -> Result<Vec<RecordMetadata>>;
}

/// Reads changelog partitions back when the state of a task is restored.
pub trait RestoreConsumer: Send {
    /// Offset that the next record written to the partition will get.
    fn end_offset(&mut self, partition: &TopicPartition) -> Result<i64>;

    /// Fetches the records of the partition starting at `offset`.
    fn fetch(&mut self, partition: &TopicPartition, offset: i64) -> Result<Vec<ConsumerRecord>>;
}
