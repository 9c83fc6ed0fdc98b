//! Records as they move through a [StreamTask](crate::task::StreamTask): raw [ConsumerRecord]s
//! arrive from the transport, are deserialized and stamped into [StampedRecord]s by the
//! [RecordQueue](crate::partition_group::RecordQueue) and leave the task as [ProducerRecord]s
//! through the [RecordCollector](crate::collector::RecordCollector).

use std::fmt;

use bytes::Bytes;

/// An independently sequenced source of records. Ordered by topic and then partition number,
/// which is the tie-break used when two partitions have records with the same timestamp.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct TopicPartition {
    pub topic: String,
    pub partition: i32,
}

impl TopicPartition {
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }
}

impl fmt::Display for TopicPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.topic, self.partition)
    }
}

/// Raw record handed over by the transport client.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumerRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    /// Timestamp carried by the record in epoch millis, used by
    /// [RecordTimestampExtractor](crate::timestamp::RecordTimestampExtractor).
    pub timestamp: i64,
    pub key: Bytes,
    pub value: Bytes,
}

/// Metadata of the record currently being processed, exposed to the stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordContext {
    pub partition: TopicPartition,
    pub offset: i64,
    pub timestamp: i64,
}

/// A deserialized record stamped with its extracted event time. It is immutable once stamped.
#[derive(Debug, Clone, PartialEq)]
pub struct StampedRecord<K, V> {
    pub key: K,
    pub value: V,
    pub timestamp: i64,
    pub offset: i64,
}

impl<K, V> StampedRecord<K, V> {
    pub(crate) fn context(&self, partition: &TopicPartition) -> RecordContext {
        RecordContext {
            partition: partition.clone(),
            offset: self.offset,
            timestamp: self.timestamp,
        }
    }
}

/// Serialized output record destined to a downstream or changelog topic.
#[derive(Debug, Clone, PartialEq)]
pub struct ProducerRecord {
    pub topic: String,
    /// Target partition, None lets the producer pick one.
    pub partition: Option<i32>,
    pub key: Bytes,
    pub value: Bytes,
}

/// Acknowledgement from the producer for a record that reached its topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordMetadata {
    pub partition: TopicPartition,
    pub offset: i64,
}

/// Offset and optional metadata committed to the transport's offset storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetAndMetadata {
    pub offset: i64,
    pub metadata: String,
}

impl OffsetAndMetadata {
    pub fn new(offset: i64) -> Self {
        Self {
            offset,
            metadata: String::new(),
        }
    }
}
