use std::collections::VecDeque;

use crate::error::{Error, Result};
use crate::record::{ConsumerRecord, StampedRecord, TopicPartition};
use crate::timestamp::TimestampExtractor;
use crate::topology::{NodeId, Source};

/// FIFO of the deserialized records of one partition, bound to the source node that consumes
/// them. Records keep their arrival order, which is also their offset order.
pub struct RecordQueue<K, V> {
    partition: TopicPartition,
    source: Source<K, V>,
    fifo: VecDeque<StampedRecord<K, V>>,
}

impl<K, V> RecordQueue<K, V> {
    pub fn new(partition: TopicPartition, source: Source<K, V>) -> Self {
        Self {
            partition,
            source,
            fifo: VecDeque::new(),
        }
    }

    pub fn partition(&self) -> &TopicPartition {
        &self.partition
    }

    pub fn source(&self) -> NodeId {
        self.source.node
    }

    /// Deserializes and stamps the raw records and appends them. The batch is all or nothing, a
    /// record that cannot be deserialized or whose offset is behind the buffered tail leaves the
    /// queue untouched.
    ///
    /// Only buffered records are checked, so a record that failed processing can be added again
    /// once it has been polled.
    pub(crate) fn add_raw_records(
        &mut self,
        records: impl IntoIterator<Item = ConsumerRecord>,
        extractor: &dyn TimestampExtractor,
    ) -> Result<usize> {
        let mut stamped = Vec::new();
        let mut last_offset = self.fifo.back().map(|record| record.offset);

        for raw in records {
            if raw.topic != self.partition.topic || raw.partition != self.partition.partition {
                return Err(Error::IllegalState(format!(
                    "record of {}-{} added to the queue of {}",
                    raw.topic, raw.partition, self.partition
                )));
            }
            if last_offset.is_some_and(|last| raw.offset < last) {
                return Err(Error::IllegalState(format!(
                    "offset {} of {} is behind the last buffered offset {:?}",
                    raw.offset, self.partition, last_offset
                )));
            }

            let key = self.source.key_deserializer.deserialize(&raw.topic, &raw.key)?;
            let value = self
                .source
                .value_deserializer
                .deserialize(&raw.topic, &raw.value)?;
            let timestamp = extractor.extract(&raw);

            last_offset = Some(raw.offset);
            stamped.push(StampedRecord {
                key,
                value,
                timestamp,
                offset: raw.offset,
            });
        }

        let added = stamped.len();
        self.fifo.extend(stamped);
        Ok(added)
    }

    pub(crate) fn poll(&mut self) -> Option<StampedRecord<K, V>> {
        self.fifo.pop_front()
    }

    /// Timestamp of the record that will be polled next.
    pub fn head_timestamp(&self) -> Option<i64> {
        self.fifo.front().map(|record| record.timestamp)
    }

    pub fn len(&self) -> usize {
        self.fifo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fifo.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.fifo.clear();
    }
}
