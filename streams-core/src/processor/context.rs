use std::time::Duration;

use crate::collector::RecordCollector;
use crate::error::{Error, Result};
use crate::processor::Processor;
use crate::punctuation::PunctuationQueue;
use crate::record::{ProducerRecord, RecordContext};
use crate::state::{ProcessorStateManager, StateStore};
use crate::task::TaskId;
use crate::topology::{NodeId, Topology};

/// The stage and record the task is currently working on.
#[derive(Debug, Default)]
pub(crate) struct Cursor {
    pub(crate) node: Option<NodeId>,
    pub(crate) record: Option<RecordContext>,
}

impl Cursor {
    pub(crate) fn clear(&mut self) {
        self.node = None;
        self.record = None;
    }
}

/// Handle given to a [Processor] for the duration of one call into it.
///
/// Every call into a stage goes through [ProcessorContext::run_node], which makes that stage the
/// active node and restores the previous one afterwards, whether the stage succeeded or not.
/// Nested forwarding therefore always unwinds back to the stage that started it.
pub struct ProcessorContext<'a, K, V> {
    pub(crate) task_id: TaskId,
    pub(crate) topology: &'a Topology<K, V>,
    pub(crate) cursor: &'a mut Cursor,
    pub(crate) collector: &'a mut RecordCollector,
    pub(crate) state: &'a mut ProcessorStateManager,
    pub(crate) punctuations: &'a mut PunctuationQueue,
    pub(crate) stream_time: Option<i64>,
    pub(crate) initialized: bool,
}

impl<K, V> ProcessorContext<'_, K, V> {
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// The stage being executed, None outside of a stage call.
    pub fn current_node(&self) -> Option<NodeId> {
        self.cursor.node
    }

    pub fn current_node_name(&self) -> Option<&str> {
        self.cursor.node.and_then(|node| self.topology.name(node))
    }

    /// Metadata of the record in flight. None during init and punctuation.
    pub fn record(&self) -> Option<&RecordContext> {
        self.cursor.record.as_ref()
    }

    /// Highest record timestamp processed by the task so far.
    pub fn stream_time(&self) -> Option<i64> {
        self.stream_time
    }

    /// Forwards the key and value to every child of the active stage, in the order the children
    /// were added.
    pub fn forward(&mut self, key: K, value: V) -> Result<()>
    where
        K: Clone,
        V: Clone,
    {
        let current = self.active_node("forward")?;
        let topology = self.topology;
        for &child in topology.children(current)? {
            self.run_node(child, |processor, ctx| {
                processor.process(ctx, key.clone(), value.clone())
            })?;
        }
        Ok(())
    }

    /// Forwards the key and value to the child at `child_index` of the active stage.
    pub fn forward_to(&mut self, key: K, value: V, child_index: usize) -> Result<()> {
        let current = self.active_node("forward")?;
        let topology = self.topology;
        let child = topology
            .children(current)?
            .get(child_index)
            .copied()
            .ok_or_else(|| {
                Error::IllegalState(format!(
                    "{} has no child at index {child_index}",
                    topology.name(current).unwrap_or_default()
                ))
            })?;
        self.run_node(child, |processor, ctx| processor.process(ctx, key, value))
    }

    /// Registers a recurring punctuation of the active stage.
    pub fn schedule(&mut self, interval: Duration) -> Result<()> {
        let node = self.active_node("schedule")?;
        let anchor = self
            .cursor
            .record
            .as_ref()
            .map(|record| record.timestamp)
            .or(self.stream_time);
        self.punctuations.schedule(node, interval, anchor)
    }

    /// Sends a record through the task's [RecordCollector].
    pub fn send(&mut self, record: ProducerRecord) -> Result<()> {
        self.collector.send(record)
    }

    /// Registers a state store with the task, restoring it from its changelog when `logged`.
    /// Only allowed while the stages are initialized.
    pub fn register_store(&mut self, store: Box<dyn StateStore>, logged: bool) -> Result<()> {
        if self.initialized {
            return Err(Error::IllegalState(
                "state stores can only be registered during init".to_string(),
            ));
        }
        self.state.register(store, logged)
    }

    /// Looks up a registered store by name and type.
    pub fn state_store<S: StateStore>(&mut self, name: &str) -> Option<&mut S> {
        self.state
            .store_mut(name)
            .and_then(|store| store.as_any_mut().downcast_mut::<S>())
    }

    /// Makes `node` the active stage for the duration of `f`.
    pub(crate) fn run_node<F>(&mut self, node: NodeId, f: F) -> Result<()>
    where
        F: FnOnce(&mut dyn Processor<K, V>, &mut Self) -> Result<()>,
    {
        let topology = self.topology;
        let processor_node = topology.node(node)?;
        let mut processor = processor_node.processor.try_borrow_mut().map_err(|_| {
            Error::IllegalState(format!("{} is already executing", processor_node.name))
        })?;

        let previous = self.cursor.node.replace(node);
        let result = f(&mut **processor, self);
        self.cursor.node = previous;
        result
    }

    fn active_node(&self, operation: &str) -> Result<NodeId> {
        self.cursor
            .node
            .ok_or_else(|| Error::IllegalState(format!("{operation} called with no active node")))
    }
}
