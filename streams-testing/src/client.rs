use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::warn;

use streams_core::client::{Consumer, Producer, RestoreConsumer};
use streams_core::record::{
    ConsumerRecord, OffsetAndMetadata, ProducerRecord, RecordMetadata, TopicPartition,
};

use crate::call_log::CallLog;
use crate::error::TestingError;
use crate::error_injector::ErrorInjector;

/// Consumer that tracks paused partitions and keeps every successful commit.
///
/// Calls are logged as `consumer.pause:<partition>`, `consumer.resume:<partition>` and
/// `consumer.commit`.
#[derive(Debug, Default)]
pub struct MockConsumer {
    log: CallLog,
    injector: Arc<ErrorInjector>,
    paused: Mutex<BTreeSet<TopicPartition>>,
    pause_calls: Mutex<Vec<TopicPartition>>,
    resume_calls: Mutex<Vec<TopicPartition>>,
    commits: Mutex<Vec<HashMap<TopicPartition, OffsetAndMetadata>>>,
}

impl MockConsumer {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            ..Default::default()
        }
    }

    pub fn injector(&self) -> &ErrorInjector {
        &self.injector
    }

    /// Partitions currently paused, sorted.
    pub fn paused(&self) -> Vec<TopicPartition> {
        self.paused.lock().iter().cloned().collect()
    }

    pub fn pause_calls(&self) -> Vec<TopicPartition> {
        self.pause_calls.lock().clone()
    }

    pub fn resume_calls(&self) -> Vec<TopicPartition> {
        self.resume_calls.lock().clone()
    }

    /// Every successful commit, oldest first.
    pub fn commits(&self) -> Vec<HashMap<TopicPartition, OffsetAndMetadata>> {
        self.commits.lock().clone()
    }

    /// Offset of `partition` in the last successful commit.
    pub fn committed_offset(&self, partition: &TopicPartition) -> Option<i64> {
        self.commits
            .lock()
            .last()
            .and_then(|commit| commit.get(partition))
            .map(|offset| offset.offset)
    }
}

impl Consumer for MockConsumer {
    fn pause(&self, partition: &TopicPartition) {
        self.log.record(format!("consumer.pause:{partition}"));
        self.pause_calls.lock().push(partition.clone());
        self.paused.lock().insert(partition.clone());
    }

    fn resume(&self, partition: &TopicPartition) {
        self.log.record(format!("consumer.resume:{partition}"));
        self.resume_calls.lock().push(partition.clone());
        self.paused.lock().remove(partition);
    }

    fn commit_sync(
        &self,
        offsets: &HashMap<TopicPartition, OffsetAndMetadata>,
    ) -> streams_core::Result<()> {
        self.log.record("consumer.commit");
        if self.injector.should_fail_commit() {
            warn!(partitions = offsets.len(), "Injecting commit failure");
            return Err(TestingError::Commit(format!("{} partitions", offsets.len())).into());
        }
        self.commits.lock().push(offsets.clone());
        Ok(())
    }
}

#[derive(Debug, Default)]
struct ProducerState {
    sent: Vec<ProducerRecord>,
    /// Number of records of `sent` already acknowledged.
    acked: usize,
    next_offsets: HashMap<TopicPartition, i64>,
}

/// Producer acknowledging records on flush with consecutive offsets per partition. Records
/// without a partition go to partition 0.
///
/// Clones share the same records, so a test keeps one clone while the task owns the other.
/// Calls are logged as `producer.send:<topic>` and `producer.flush`.
#[derive(Debug, Clone, Default)]
pub struct MockProducer {
    log: CallLog,
    injector: Arc<ErrorInjector>,
    state: Arc<Mutex<ProducerState>>,
}

impl MockProducer {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            ..Default::default()
        }
    }

    pub fn injector(&self) -> &ErrorInjector {
        &self.injector
    }

    /// Every record sent, acknowledged or not.
    pub fn sent(&self) -> Vec<ProducerRecord> {
        self.state.lock().sent.clone()
    }

    /// Values sent to `topic` as strings.
    pub fn sent_values(&self, topic: &str) -> Vec<String> {
        self.state
            .lock()
            .sent
            .iter()
            .filter(|record| record.topic == topic)
            .map(|record| String::from_utf8_lossy(&record.value).into_owned())
            .collect()
    }

    pub fn unacked(&self) -> usize {
        let state = self.state.lock();
        state.sent.len() - state.acked
    }
}

impl Producer for MockProducer {
    fn send(&mut self, record: ProducerRecord) -> streams_core::Result<()> {
        self.log.record(format!("producer.send:{}", record.topic));
        if self.injector.should_fail_send() {
            return Err(TestingError::Producer(format!("send to {}", record.topic)).into());
        }
        self.state.lock().sent.push(record);
        Ok(())
    }

    fn flush(&mut self) -> streams_core::Result<Vec<RecordMetadata>> {
        self.log.record("producer.flush");
        if self.injector.should_fail_flush() {
            warn!("Injecting producer flush failure");
            return Err(TestingError::Producer("flush".to_string()).into());
        }

        let mut state = self.state.lock();
        let state = &mut *state;
        let mut acks = Vec::new();
        for record in state.sent.iter().skip(state.acked) {
            let partition = TopicPartition::new(record.topic.clone(), record.partition.unwrap_or(0));
            let next_offset = state.next_offsets.entry(partition.clone()).or_insert(0);
            acks.push(RecordMetadata {
                partition,
                offset: *next_offset,
            });
            *next_offset += 1;
        }
        state.acked = state.sent.len();
        Ok(acks)
    }
}

/// Changelog topics kept in memory, served `batch_size` records per fetch.
///
/// Clones share the same changelogs.
#[derive(Debug, Clone)]
pub struct MockRestoreConsumer {
    injector: Arc<ErrorInjector>,
    changelogs: Arc<Mutex<HashMap<TopicPartition, Vec<ConsumerRecord>>>>,
    batch_size: usize,
}

impl Default for MockRestoreConsumer {
    fn default() -> Self {
        Self {
            injector: Arc::default(),
            changelogs: Arc::default(),
            batch_size: 100,
        }
    }
}

impl MockRestoreConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn injector(&self) -> &ErrorInjector {
        &self.injector
    }

    /// Appends a record to the changelog partition, an empty value is a delete.
    pub fn append(&self, partition: &TopicPartition, key: &str, value: &str) {
        let mut changelogs = self.changelogs.lock();
        let records = changelogs.entry(partition.clone()).or_default();
        records.push(ConsumerRecord {
            topic: partition.topic.clone(),
            partition: partition.partition,
            offset: records.len() as i64,
            timestamp: 0,
            key: Bytes::copy_from_slice(key.as_bytes()),
            value: Bytes::copy_from_slice(value.as_bytes()),
        });
    }
}

impl RestoreConsumer for MockRestoreConsumer {
    fn end_offset(&mut self, partition: &TopicPartition) -> streams_core::Result<i64> {
        Ok(self
            .changelogs
            .lock()
            .get(partition)
            .map_or(0, |records| records.len() as i64))
    }

    fn fetch(
        &mut self,
        partition: &TopicPartition,
        offset: i64,
    ) -> streams_core::Result<Vec<ConsumerRecord>> {
        if self.injector.should_fail_fetch() {
            return Err(TestingError::Restore(format!("fetch {partition} at {offset}")).into());
        }
        Ok(self
            .changelogs
            .lock()
            .get(partition)
            .map(|records| {
                records
                    .iter()
                    .filter(|record| record.offset >= offset)
                    .take(self.batch_size)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(topic: &str, partition: Option<i32>) -> ProducerRecord {
        ProducerRecord {
            topic: topic.to_string(),
            partition,
            key: Bytes::from_static(b"k"),
            value: Bytes::from_static(b"v"),
        }
    }

    #[test]
    fn test_consumer_pause_resume_commit() {
        let log = CallLog::new();
        let consumer = MockConsumer::new(log.clone());
        let p0 = TopicPartition::new("in", 0);

        consumer.pause(&p0);
        assert_eq!(consumer.paused(), vec![p0.clone()]);
        consumer.resume(&p0);
        assert!(consumer.paused().is_empty());

        consumer.injector().fail_commits(1);
        let offsets = HashMap::from([(p0.clone(), OffsetAndMetadata::new(4))]);
        assert!(matches!(
            consumer.commit_sync(&offsets),
            Err(streams_core::Error::Commit(_))
        ));
        assert!(consumer.commits().is_empty());
        consumer.commit_sync(&offsets).unwrap();
        assert_eq!(consumer.committed_offset(&p0), Some(4));

        assert_eq!(
            log.entries(),
            vec![
                "consumer.pause:in-0",
                "consumer.resume:in-0",
                "consumer.commit",
                "consumer.commit"
            ]
        );
    }

    #[test]
    fn test_producer_acks_on_flush() {
        let mut producer = MockProducer::new(CallLog::new());
        let handle = producer.clone();

        producer.send(record("out", None)).unwrap();
        producer.send(record("out", Some(1))).unwrap();
        producer.send(record("out", None)).unwrap();
        assert_eq!(handle.unacked(), 3);

        producer.injector().fail_flushes(1);
        assert!(producer.flush().is_err());
        assert_eq!(handle.unacked(), 3);

        let acks = producer.flush().unwrap();
        let offsets: Vec<_> = acks
            .iter()
            .map(|ack| (ack.partition.partition, ack.offset))
            .collect();
        assert_eq!(offsets, vec![(0, 0), (1, 0), (0, 1)]);
        assert_eq!(handle.unacked(), 0);
        assert!(producer.flush().unwrap().is_empty());
        assert_eq!(handle.sent_values("out"), vec!["v", "v", "v"]);
    }

    #[test]
    fn test_restore_consumer_batches() {
        let partition = TopicPartition::new("counts", 0);
        let changelog = MockRestoreConsumer::new().with_batch_size(2);
        changelog.append(&partition, "a", "1");
        changelog.append(&partition, "b", "2");
        changelog.append(&partition, "a", "3");

        let mut reader = changelog.clone();
        assert_eq!(reader.end_offset(&partition).unwrap(), 3);
        assert_eq!(reader.fetch(&partition, 0).unwrap().len(), 2);
        let tail = reader.fetch(&partition, 2).unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail.first().map(|r| r.offset), Some(2));

        let other = TopicPartition::new("counts", 1);
        assert_eq!(reader.end_offset(&other).unwrap(), 0);
        assert!(reader.fetch(&other, 0).unwrap().is_empty());
    }
}
