//! Merges the records of all partitions of a task into one stream ordered by event time.
//!
//! Each partition has its own [RecordQueue] which keeps arrival order. The group keeps a min-heap
//! of the head timestamp of every non-empty queue; the next record is always taken from the queue
//! whose head is the earliest, ties going to the smaller [TopicPartition]. A queue's head only
//! changes when it is polled or when it goes from empty to non-empty, which are the only two
//! places the heap is updated.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::record::{ConsumerRecord, StampedRecord, TopicPartition};
use crate::timestamp::TimestampExtractor;
use crate::topology::NodeId;

mod record_queue;
pub use record_queue::RecordQueue;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct QueueHead {
    timestamp: i64,
    partition: TopicPartition,
}

/// The record selected by [PartitionGroup::next_record] with where it came from.
#[derive(Debug)]
pub struct NextRecord<K, V> {
    pub record: StampedRecord<K, V>,
    pub node: NodeId,
    pub partition: TopicPartition,
}

pub struct PartitionGroup<K, V> {
    queues: HashMap<TopicPartition, RecordQueue<K, V>>,
    queues_by_time: BinaryHeap<Reverse<QueueHead>>,
    extractor: Arc<dyn TimestampExtractor>,
    total_buffered: usize,
}

impl<K, V> PartitionGroup<K, V> {
    pub fn new(
        queues: impl IntoIterator<Item = RecordQueue<K, V>>,
        extractor: Arc<dyn TimestampExtractor>,
    ) -> Self {
        Self {
            queues: queues
                .into_iter()
                .map(|queue| (queue.partition().clone(), queue))
                .collect(),
            queues_by_time: BinaryHeap::new(),
            extractor,
            total_buffered: 0,
        }
    }

    /// Appends the raw records to the queue of `partition` and returns its new size.
    pub fn add_raw_records(
        &mut self,
        partition: &TopicPartition,
        records: impl IntoIterator<Item = ConsumerRecord>,
    ) -> Result<usize> {
        let queue = self.queues.get_mut(partition).ok_or_else(|| {
            Error::IllegalState(format!("partition {partition} is not assigned to this group"))
        })?;

        let was_empty = queue.is_empty();
        let added = queue.add_raw_records(records, self.extractor.as_ref())?;
        self.total_buffered += added;

        if was_empty {
            if let Some(timestamp) = queue.head_timestamp() {
                self.queues_by_time.push(Reverse(QueueHead {
                    timestamp,
                    partition: partition.clone(),
                }));
            }
        }
        Ok(queue.len())
    }

    /// Removes and returns the earliest record across all partitions.
    pub fn next_record(&mut self) -> Option<NextRecord<K, V>> {
        let Reverse(head) = self.queues_by_time.pop()?;
        let queue = self.queues.get_mut(&head.partition)?;
        let record = queue.poll()?;
        self.total_buffered -= 1;

        if let Some(timestamp) = queue.head_timestamp() {
            self.queues_by_time.push(Reverse(QueueHead {
                timestamp,
                partition: head.partition.clone(),
            }));
        }

        Some(NextRecord {
            record,
            node: queue.source(),
            partition: head.partition,
        })
    }

    pub fn num_buffered(&self, partition: &TopicPartition) -> usize {
        self.queues.get(partition).map_or(0, RecordQueue::len)
    }

    pub fn num_buffered_total(&self) -> usize {
        self.total_buffered
    }

    /// Assigned partitions in their tie-break order.
    pub fn partitions(&self) -> Vec<TopicPartition> {
        let mut partitions: Vec<_> = self.queues.keys().cloned().collect();
        partitions.sort();
        partitions
    }

    /// Drops every buffered record.
    pub fn close(&mut self) {
        self.queues.values_mut().for_each(RecordQueue::clear);
        self.queues_by_time.clear();
        self.total_buffered = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::StringCodec;
    use crate::timestamp::RecordTimestampExtractor;
    use crate::topology::TopologyBuilder;
    use bytes::Bytes;

    fn group(partitions: &[TopicPartition]) -> PartitionGroup<String, String> {
        let mut builder = TopologyBuilder::new();
        builder
            .add_source("source", &["a", "b"], StringCodec, StringCodec)
            .unwrap();
        let topology = builder.build();
        let queues = partitions.iter().map(|p| {
            RecordQueue::new(p.clone(), topology.source(&p.topic).unwrap().clone())
        });
        PartitionGroup::new(queues, Arc::new(RecordTimestampExtractor))
    }

    fn raw(partition: &TopicPartition, offset: i64, timestamp: i64) -> ConsumerRecord {
        ConsumerRecord {
            topic: partition.topic.clone(),
            partition: partition.partition,
            offset,
            timestamp,
            key: Bytes::new(),
            value: Bytes::from(format!("{partition}@{timestamp}")),
        }
    }

    fn drain(group: &mut PartitionGroup<String, String>) -> Vec<(TopicPartition, i64)> {
        std::iter::from_fn(|| group.next_record())
            .map(|next| (next.partition, next.record.timestamp))
            .collect()
    }

    #[test]
    fn test_merge_by_timestamp() {
        let p0 = TopicPartition::new("a", 0);
        let p1 = TopicPartition::new("a", 1);
        let mut group = group(&[p0.clone(), p1.clone()]);

        assert_eq!(
            group
                .add_raw_records(&p0, vec![raw(&p0, 0, 5), raw(&p0, 1, 15)])
                .unwrap(),
            2
        );
        assert_eq!(group.add_raw_records(&p1, vec![raw(&p1, 0, 10)]).unwrap(), 1);
        assert_eq!(group.num_buffered_total(), 3);
        assert_eq!(group.num_buffered(&p0), 2);

        let next = group.next_record().unwrap();
        assert_eq!(next.record.value, "a-0@5");
        assert_eq!(next.record.offset, 0);
        assert_eq!(group.num_buffered_total(), 2);

        assert_eq!(drain(&mut group), vec![(p1, 10), (p0, 15)]);
        assert_eq!(group.num_buffered_total(), 0);
        assert!(group.next_record().is_none());
    }

    #[test]
    fn test_ties_go_to_smaller_partition() {
        let a1 = TopicPartition::new("a", 1);
        let a0 = TopicPartition::new("a", 0);
        let b0 = TopicPartition::new("b", 0);
        let mut group = group(&[b0.clone(), a1.clone(), a0.clone()]);

        group.add_raw_records(&b0, vec![raw(&b0, 0, 7)]).unwrap();
        group.add_raw_records(&a1, vec![raw(&a1, 0, 7)]).unwrap();
        group.add_raw_records(&a0, vec![raw(&a0, 0, 7)]).unwrap();

        assert_eq!(drain(&mut group), vec![(a0, 7), (a1, 7), (b0, 7)]);
    }

    #[test]
    fn test_out_of_order_within_partition_keeps_fifo() {
        let p0 = TopicPartition::new("a", 0);
        let p1 = TopicPartition::new("a", 1);
        let mut group = group(&[p0.clone(), p1.clone()]);

        // p0 head is 20, so p1's 15 goes first even though p0 also holds a 1
        group
            .add_raw_records(&p0, vec![raw(&p0, 0, 20), raw(&p0, 1, 1)])
            .unwrap();
        group.add_raw_records(&p1, vec![raw(&p1, 0, 15)]).unwrap();

        assert_eq!(
            drain(&mut group),
            vec![(p1.clone(), 15), (p0.clone(), 20), (p0, 1)]
        );
    }

    #[test]
    fn test_refill_after_drain() {
        let p0 = TopicPartition::new("a", 0);
        let p1 = TopicPartition::new("a", 1);
        let mut group = group(&[p0.clone(), p1.clone()]);

        group.add_raw_records(&p0, vec![raw(&p0, 0, 50)]).unwrap();
        assert_eq!(drain(&mut group), vec![(p0.clone(), 50)]);

        group.add_raw_records(&p1, vec![raw(&p1, 0, 40)]).unwrap();
        group.add_raw_records(&p0, vec![raw(&p0, 1, 30)]).unwrap();
        assert_eq!(drain(&mut group), vec![(p0, 30), (p1, 40)]);
    }

    #[test]
    fn test_unknown_partition_and_close() {
        let p0 = TopicPartition::new("a", 0);
        let mut group = group(&[p0.clone()]);

        let unknown = TopicPartition::new("a", 9);
        assert!(matches!(
            group.add_raw_records(&unknown, vec![raw(&unknown, 0, 1)]),
            Err(Error::IllegalState(_))
        ));
        assert_eq!(group.num_buffered(&unknown), 0);

        group
            .add_raw_records(&p0, vec![raw(&p0, 0, 1), raw(&p0, 1, 2)])
            .unwrap();
        group.close();
        assert_eq!(group.num_buffered_total(), 0);
        assert!(group.next_record().is_none());
        assert_eq!(group.partitions(), vec![p0]);
    }
}
