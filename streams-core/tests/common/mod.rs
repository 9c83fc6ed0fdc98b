#![allow(dead_code)]
//! Wiring shared by the integration tests: a task built on top of the in-memory collaborators.

use std::sync::Arc;

use bytes::Bytes;
use tempfile::TempDir;

use streams_core::codec::StringCodec;
use streams_core::{
    ConsumerRecord, Result, StreamTask, StreamsConfig, TaskId, TopicPartition, Topology,
    TopologyBuilder,
};
use streams_testing::{CallLog, MockConsumer, MockProducer, MockRestoreConsumer};

pub const INPUT: &str = "in";

pub struct Harness {
    pub log: CallLog,
    pub consumer: Arc<MockConsumer>,
    pub producer: MockProducer,
    pub changelog: MockRestoreConsumer,
    pub dir: TempDir,
    pub max_buffered: usize,
}

impl Harness {
    pub fn new() -> Self {
        let log = CallLog::new();
        Self {
            consumer: Arc::new(MockConsumer::new(log.clone())),
            producer: MockProducer::new(log.clone()),
            changelog: MockRestoreConsumer::new(),
            dir: tempfile::tempdir().unwrap(),
            max_buffered: 1000,
            log,
        }
    }

    pub fn with_max_buffered(mut self, max_buffered: usize) -> Self {
        self.max_buffered = max_buffered;
        self
    }

    pub fn config(&self) -> StreamsConfig {
        let mut config = StreamsConfig::new("streams-test");
        config.buffered_records_per_partition = self.max_buffered;
        config.state_dir = self.dir.path().to_path_buf();
        config
    }

    /// Task 0 over the given partitions.
    pub fn task(
        &self,
        topology: Topology<String, String>,
        partitions: &[TopicPartition],
    ) -> Result<StreamTask<String, String>> {
        let consumer = Arc::clone(&self.consumer);
        StreamTask::new(
            TaskId(0),
            partitions.iter().cloned(),
            topology,
            consumer,
            Box::new(self.producer.clone()),
            Box::new(self.changelog.clone()),
            &self.config(),
        )
    }
}

/// Builder with a source named `source` reading the input topic.
pub fn builder() -> TopologyBuilder<String, String> {
    let mut builder = TopologyBuilder::new();
    builder
        .add_source("source", &[INPUT], StringCodec, StringCodec)
        .unwrap();
    builder
}

pub fn partition(partition: i32) -> TopicPartition {
    TopicPartition::new(INPUT, partition)
}

/// Raw record keyed by its partition, e.g. `in-0`.
pub fn record(partition: &TopicPartition, offset: i64, timestamp: i64, value: &str) -> ConsumerRecord {
    ConsumerRecord {
        topic: partition.topic.clone(),
        partition: partition.partition,
        offset,
        timestamp,
        key: Bytes::from(partition.to_string()),
        value: Bytes::copy_from_slice(value.as_bytes()),
    }
}

/// Values seen by the stage `name`, in processing order.
pub fn processed_values(log: &CallLog, name: &str) -> Vec<String> {
    log.matching(&format!("{name}.process:"))
        .into_iter()
        .filter_map(|entry| entry.rsplit(':').next().map(str::to_string))
        .collect()
}
