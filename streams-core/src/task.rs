//! The unit of execution: one [StreamTask] owns the processing graph of a group of partitions,
//! the buffered input of those partitions, the task's state stores and its output collector.
//!
//! An external loop drives the task by calling [StreamTask::add_records] with what the transport
//! fetched, [StreamTask::process] to push one record through the graph,
//! [StreamTask::maybe_punctuate] with the current stream time and [StreamTask::commit] when
//! [StreamTask::commit_needed] says so. All of them serialize on one task-wide lock, so records
//! can be added from the polling thread while another thread is processing.

use std::collections::HashMap;
use std::fmt;
use std::mem;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::client::{Consumer, Producer, RestoreConsumer};
use crate::collector::RecordCollector;
use crate::config::StreamsConfig;
use crate::error::{Error, Result};
use crate::partition_group::{NextRecord, PartitionGroup, RecordQueue};
use crate::processor::{Cursor, ProcessorContext};
use crate::punctuation::{PunctuationQueue, Punctuator};
use crate::record::{ConsumerRecord, OffsetAndMetadata, TopicPartition};
use crate::state::ProcessorStateManager;
use crate::topology::{NodeId, Topology};

/// Identifies a task. It is also the partition of the changelog topics of the task's stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub i32);

impl TaskId {
    pub fn partition(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Stages initialized and stores restored, `new` only returns a running task.
    Running,
    Closed,
}

/// Everything guarded by the task lock.
struct TaskState<K, V> {
    status: TaskStatus,
    task_id: TaskId,
    topology: Topology<K, V>,
    partition_group: PartitionGroup<K, V>,
    punctuation_queue: PunctuationQueue,
    cursor: Cursor,
    collector: RecordCollector,
    state_manager: ProcessorStateManager,
    /// Offset of the last fully processed record per input partition.
    consumed_offsets: HashMap<TopicPartition, i64>,
    commit_offset_needed: bool,
    stream_time: Option<i64>,
    initialized: bool,
}

impl<K, V> TaskState<K, V> {
    fn context(&mut self) -> ProcessorContext<'_, K, V> {
        ProcessorContext {
            task_id: self.task_id,
            topology: &self.topology,
            cursor: &mut self.cursor,
            collector: &mut self.collector,
            state: &mut self.state_manager,
            punctuations: &mut self.punctuation_queue,
            stream_time: self.stream_time,
            initialized: self.initialized,
        }
    }

    /// Initializes every stage in topological order.
    fn init(&mut self) -> Result<()> {
        let nodes: Vec<NodeId> = self.topology.node_ids().collect();
        let mut ctx = self.context();
        for node in nodes {
            ctx.run_node(node, |processor, ctx| processor.init(ctx))?;
        }
        self.initialized = true;
        Ok(())
    }

    fn ensure_running(&self) -> Result<()> {
        match self.status {
            TaskStatus::Running => Ok(()),
            status => Err(Error::IllegalState(format!(
                "task {} is not running, status {status:?}",
                self.task_id
            ))),
        }
    }

    /// Polls the punctuation queue. The queue is taken out of the state while it fires so that
    /// the stages can schedule new punctuations, those are merged back afterwards.
    fn maybe_punctuate(&mut self, timestamp: i64) -> Result<bool> {
        let mut queue = mem::take(&mut self.punctuation_queue);
        let result = queue.may_punctuate(timestamp, self);
        queue.merge(mem::take(&mut self.punctuation_queue));
        self.punctuation_queue = queue;
        result
    }

    /// Closes every stage even if some fail, returns the last failure.
    fn close_topology(&mut self) -> Option<Error> {
        let mut last_error = None;
        for node in self.topology.node_ids() {
            let result = self.topology.node(node).and_then(|processor_node| {
                let mut processor = processor_node.processor.try_borrow_mut().map_err(|_| {
                    Error::IllegalState(format!("{} is still executing", processor_node.name))
                })?;
                processor.close()
            });
            if let Err(e) = result {
                error!(
                    task_id = %self.task_id,
                    node = self.topology.name(node).unwrap_or_default(),
                    ?e,
                    "Failed to close processor"
                );
                last_error = Some(e);
            }
        }
        last_error
    }
}

impl<K, V> Punctuator for TaskState<K, V> {
    fn punctuate(&mut self, node: NodeId, timestamp: i64) -> Result<()> {
        if let Some(current) = self.cursor.node {
            return Err(Error::IllegalState(format!(
                "cannot punctuate {node} while {current} is executing"
            )));
        }
        if self.cursor.record.is_some() {
            return Err(Error::IllegalState(format!(
                "cannot punctuate {node} while a record is in flight"
            )));
        }
        debug!(task_id = %self.task_id, %node, timestamp, "Punctuating");
        self.context()
            .run_node(node, |processor, ctx| processor.punctuate(ctx, timestamp))
    }
}

/// A task processing the records of a fixed set of partitions through its own [Topology].
pub struct StreamTask<K, V> {
    id: TaskId,
    partitions: Vec<TopicPartition>,
    max_buffered: usize,
    consumer: Arc<dyn Consumer>,
    commit_requested: AtomicBool,
    state: Mutex<TaskState<K, V>>,
}

impl<K, V> StreamTask<K, V> {
    /// Creates the task, restores its state stores and initializes its stages. Every partition
    /// must belong to a topic bound to a source of the topology.
    pub fn new(
        id: TaskId,
        partitions: impl IntoIterator<Item = TopicPartition>,
        topology: Topology<K, V>,
        consumer: Arc<dyn Consumer>,
        producer: Box<dyn Producer>,
        restore_consumer: Box<dyn RestoreConsumer>,
        config: &StreamsConfig,
    ) -> Result<Self> {
        config.validate()?;

        let mut partitions: Vec<_> = partitions.into_iter().collect();
        partitions.sort();
        partitions.dedup();

        let queues = partitions
            .iter()
            .map(|partition| {
                let source = topology.source(&partition.topic).ok_or_else(|| {
                    Error::Topology(format!("no source consumes the topic of {partition}"))
                })?;
                Ok(RecordQueue::new(partition.clone(), source.clone()))
            })
            .collect::<Result<Vec<_>>>()?;
        let partition_group =
            PartitionGroup::new(queues, config.timestamp_extractor.extractor());

        let state_dir = config.state_dir.join(id.to_string());
        let state_manager = ProcessorStateManager::new(id, state_dir, restore_consumer)?;

        let mut state = TaskState {
            status: TaskStatus::Running,
            task_id: id,
            topology,
            partition_group,
            punctuation_queue: PunctuationQueue::default(),
            cursor: Cursor::default(),
            collector: RecordCollector::new(producer),
            state_manager,
            consumed_offsets: HashMap::new(),
            commit_offset_needed: false,
            stream_time: None,
            initialized: false,
        };
        state.init().inspect_err(|e| {
            error!(task_id = %id, ?e, "Failed to initialize the topology");
        })?;

        info!(
            task_id = %id,
            partitions = ?partitions,
            nodes = state.topology.len(),
            schedules = state.punctuation_queue.len(),
            "Created stream task"
        );

        Ok(Self {
            id,
            partitions,
            max_buffered: config.buffered_records_per_partition,
            consumer,
            commit_requested: AtomicBool::new(false),
            state: Mutex::new(state),
        })
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Assigned partitions, sorted.
    pub fn partitions(&self) -> &[TopicPartition] {
        &self.partitions
    }

    pub fn status(&self) -> TaskStatus {
        self.state.lock().status
    }

    /// Highest timestamp of the records processed so far.
    pub fn stream_time(&self) -> Option<i64> {
        self.state.lock().stream_time
    }

    /// Stage being executed. Always None between two calls into the task.
    pub fn current_node(&self) -> Option<NodeId> {
        self.state.lock().cursor.node
    }

    /// Directory of the task's state stores and checkpoint, `<stateDir>/<taskId>`.
    pub fn state_dir(&self) -> PathBuf {
        self.state.lock().state_manager.base_dir().to_path_buf()
    }

    pub fn buffered(&self, partition: &TopicPartition) -> usize {
        self.state.lock().partition_group.num_buffered(partition)
    }

    pub fn buffered_total(&self) -> usize {
        self.state.lock().partition_group.num_buffered_total()
    }

    /// Buffers raw records of one partition and returns how many records of that partition are
    /// now buffered. Fetching of the partition is paused when this add takes it over the buffer
    /// limit.
    pub fn add_records(
        &self,
        partition: &TopicPartition,
        records: impl IntoIterator<Item = ConsumerRecord>,
    ) -> Result<usize> {
        let mut state = self.state.lock();
        state.ensure_running()?;

        let before = state.partition_group.num_buffered(partition);
        let after = state.partition_group.add_raw_records(partition, records)?;
        debug!(task_id = %self.id, %partition, added = after - before, buffered = after, "Added records");

        if before <= self.max_buffered && after > self.max_buffered {
            warn!(
                task_id = %self.id,
                %partition,
                buffered = after,
                limit = self.max_buffered,
                "Pausing partition, buffer limit exceeded"
            );
            self.consumer.pause(partition);
        }
        Ok(after)
    }

    /// Processes the earliest buffered record and returns the number of records still buffered.
    /// Returns 0 right away when nothing is buffered.
    ///
    /// When a stage fails the error is returned and the record is not considered consumed.
    pub fn process(&self) -> Result<usize> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.ensure_running()?;

        let Some(NextRecord {
            record,
            node,
            partition,
        }) = state.partition_group.next_record()
        else {
            return Ok(0);
        };

        let offset = record.offset;
        let timestamp = record.timestamp;
        debug!(task_id = %self.id, %partition, offset, timestamp, %node, "Processing record");

        state.cursor.record = Some(record.context(&partition));
        let result = state
            .context()
            .run_node(node, |processor, ctx| {
                processor.process(ctx, record.key, record.value)
            });
        state.cursor.clear();

        // checked whatever the outcome so that a partition never stays paused
        if state.partition_group.num_buffered(&partition) == self.max_buffered {
            warn!(
                task_id = %self.id,
                %partition,
                limit = self.max_buffered,
                "Resuming partition, buffer drained to the limit"
            );
            self.consumer.resume(&partition);
        }

        if let Err(e) = result {
            error!(task_id = %self.id, %partition, offset, ?e, "Failed to process record");
            return Err(e);
        }

        state.consumed_offsets.insert(partition.clone(), offset);
        state.commit_offset_needed = true;
        state.stream_time = Some(state.stream_time.map_or(timestamp, |t| t.max(timestamp)));
        debug!(task_id = %self.id, %partition, offset, "Processed record");

        Ok(state.partition_group.num_buffered_total())
    }

    /// Fires the punctuations due at `timestamp`, returns whether any fired.
    pub fn maybe_punctuate(&self, timestamp: i64) -> Result<bool> {
        let mut state = self.state.lock();
        state.ensure_running()?;
        state.maybe_punctuate(timestamp)
    }

    /// Flushes the produced records, then the state stores, then commits the consumed offsets.
    /// On failure nothing is reset, so calling commit again retries the whole sequence.
    pub fn commit(&self) -> Result<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.ensure_running()?;

        state.collector.flush().inspect_err(|e| {
            error!(task_id = %self.id, ?e, "Failed to flush the record collector");
        })?;
        state.state_manager.flush().inspect_err(|e| {
            error!(task_id = %self.id, ?e, "Failed to flush the state stores");
        })?;

        if state.commit_offset_needed {
            let offsets: HashMap<_, _> = state
                .consumed_offsets
                .iter()
                .map(|(partition, offset)| (partition.clone(), OffsetAndMetadata::new(*offset)))
                .collect();
            self.consumer.commit_sync(&offsets).inspect_err(|e| {
                error!(task_id = %self.id, ?e, "Failed to commit offsets");
            })?;
            state.commit_offset_needed = false;
            info!(task_id = %self.id, partitions = offsets.len(), "Committed offsets");
        }

        self.commit_requested.store(false, Ordering::Release);
        Ok(())
    }

    /// Whether a commit was requested through [StreamTask::need_commit].
    pub fn commit_needed(&self) -> bool {
        self.commit_requested.load(Ordering::Acquire)
    }

    pub fn need_commit(&self) {
        self.commit_requested.store(true, Ordering::Release);
    }

    /// Drops the buffered records, closes every stage and then the state stores. Every close is
    /// attempted even when an earlier one fails; the last failure is returned.
    pub fn close(&self) -> Result<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.status == TaskStatus::Closed {
            return Err(Error::IllegalState(format!(
                "task {} is already closed",
                self.id
            )));
        }
        state.status = TaskStatus::Closed;

        state.partition_group.close();
        state.consumed_offsets.clear();
        state.commit_offset_needed = false;
        state.punctuation_queue.clear();

        let mut last_error = state.close_topology();
        if let Err(e) = state.state_manager.close(state.collector.offsets()) {
            error!(task_id = %self.id, ?e, "Failed to close the state manager");
            last_error = Some(e);
        }

        match last_error {
            Some(e) => Err(e),
            None => {
                info!(task_id = %self.id, "Closed stream task");
                Ok(())
            }
        }
    }
}

impl<K, V> fmt::Debug for StreamTask<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamTask")
            .field("id", &self.id)
            .field("partitions", &self.partitions)
            .field("max_buffered", &self.max_buffered)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::StringCodec;
    use crate::processor::Processor;
    use crate::record::{ProducerRecord, RecordMetadata};
    use crate::topology::TopologyBuilder;
    use bytes::Bytes;
    use std::path::Path;

    struct NoopClient;

    impl Consumer for NoopClient {
        fn pause(&self, _partition: &TopicPartition) {}
        fn resume(&self, _partition: &TopicPartition) {}
        fn commit_sync(&self, _offsets: &HashMap<TopicPartition, OffsetAndMetadata>) -> Result<()> {
            Ok(())
        }
    }

    impl Producer for NoopClient {
        fn send(&mut self, _record: ProducerRecord) -> Result<()> {
            Ok(())
        }
        fn flush(&mut self) -> Result<Vec<RecordMetadata>> {
            Ok(Vec::new())
        }
    }

    impl RestoreConsumer for NoopClient {
        fn end_offset(&mut self, _partition: &TopicPartition) -> Result<i64> {
            Ok(0)
        }
        fn fetch(&mut self, _partition: &TopicPartition, _offset: i64) -> Result<Vec<ConsumerRecord>> {
            Ok(Vec::new())
        }
    }

    /// Schedules every 10ms on init and counts its punctuations.
    struct Ticker;

    impl Processor<String, String> for Ticker {
        fn init(&mut self, ctx: &mut ProcessorContext<'_, String, String>) -> Result<()> {
            ctx.schedule(std::time::Duration::from_millis(10))
        }

        fn process(
            &mut self,
            _ctx: &mut ProcessorContext<'_, String, String>,
            _key: String,
            _value: String,
        ) -> Result<()> {
            Ok(())
        }
    }

    fn task(dir: &Path) -> StreamTask<String, String> {
        let mut builder = TopologyBuilder::new();
        builder
            .add_source("source", &["in"], StringCodec, StringCodec)
            .unwrap()
            .add_processor("ticker", Ticker, &["source"])
            .unwrap();
        let mut config = StreamsConfig::new("task-test");
        config.state_dir = dir.to_path_buf();
        StreamTask::new(
            TaskId(0),
            [TopicPartition::new("in", 0)],
            builder.build(),
            Arc::new(NoopClient),
            Box::new(NoopClient),
            Box::new(NoopClient),
            &config,
        )
        .unwrap()
    }

    #[test]
    fn test_punctuate_rejected_while_a_node_is_active() {
        let dir = tempfile::tempdir().unwrap();
        let task = task(dir.path());
        let mut state = task.state.lock();
        let ticker = state.topology.node_ids().nth(1).unwrap();

        state.cursor.node = Some(ticker);
        assert!(matches!(
            state.punctuate(ticker, 10),
            Err(Error::IllegalState(_))
        ));

        state.cursor.clear();
        state.cursor.record = Some(crate::record::RecordContext {
            partition: TopicPartition::new("in", 0),
            offset: 0,
            timestamp: 0,
        });
        assert!(matches!(
            state.punctuate(ticker, 10),
            Err(Error::IllegalState(_))
        ));

        state.cursor.clear();
        assert!(state.punctuate(ticker, 10).is_ok());
        assert_eq!(state.cursor.node, None);
    }

    #[test]
    fn test_context_calls_with_no_active_node_fail() {
        let dir = tempfile::tempdir().unwrap();
        let task = task(dir.path());
        let mut state = task.state.lock();
        let mut ctx = state.context();

        assert_eq!(ctx.current_node(), None);
        assert!(matches!(
            ctx.schedule(std::time::Duration::from_millis(10)),
            Err(Error::IllegalState(_))
        ));
        assert!(matches!(
            ctx.forward("k".to_string(), "v".to_string()),
            Err(Error::IllegalState(_))
        ));
        assert!(matches!(
            ctx.forward_to("k".to_string(), "v".to_string(), 0),
            Err(Error::IllegalState(_))
        ));
        assert_eq!(state.punctuation_queue.len(), 1);
    }

    #[test]
    fn test_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let task = task(dir.path());
        assert_eq!(task.status(), TaskStatus::Running);
        assert_eq!(task.state_dir(), dir.path().join("0"));
        assert_eq!(task.partitions(), &[TopicPartition::new("in", 0)]);

        let record = ConsumerRecord {
            topic: "in".to_string(),
            partition: 0,
            offset: 0,
            timestamp: 3,
            key: Bytes::from_static(b"k"),
            value: Bytes::from_static(b"v"),
        };
        task.add_records(&TopicPartition::new("in", 0), [record])
            .unwrap();
        assert_eq!(task.process().unwrap(), 0);
        assert_eq!(task.stream_time(), Some(3));

        task.close().unwrap();
        assert_eq!(task.status(), TaskStatus::Closed);
        assert!(matches!(task.process(), Err(Error::IllegalState(_))));
        assert!(matches!(task.commit(), Err(Error::IllegalState(_))));
        assert!(matches!(task.close(), Err(Error::IllegalState(_))));
    }
}
