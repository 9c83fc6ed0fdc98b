//! The processing graph of a task. Nodes live in an arena and are addressed by [NodeId]; every
//! node only knows the ids of its children. A node can only be added after its parents, so the
//! arena order is a topological order and the graph cannot have cycles. Stages are initialized
//! and closed in that order.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::codec::{Deserializer, Serializer};
use crate::error::{Error, Result};
use crate::processor::Processor;
use crate::processor::sink::SinkProcessor;
use crate::processor::source::SourceProcessor;

/// Stable index of a node in the [Topology] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

pub(crate) struct ProcessorNode<K, V> {
    pub(crate) name: String,
    /// Only one call into a stage can be active at a time, the graph being acyclic guarantees that
    /// forwarding never re-enters a stage that is already running.
    pub(crate) processor: RefCell<Box<dyn Processor<K, V>>>,
    children: Vec<NodeId>,
}

/// Binding of an input topic to its source node and the deserializers that turn raw records
/// into the key and value types of the topology.
pub struct Source<K, V> {
    pub(crate) node: NodeId,
    pub(crate) key_deserializer: Arc<dyn Deserializer<K>>,
    pub(crate) value_deserializer: Arc<dyn Deserializer<V>>,
}

impl<K, V> Source<K, V> {
    pub fn node(&self) -> NodeId {
        self.node
    }
}

impl<K, V> Clone for Source<K, V> {
    fn clone(&self) -> Self {
        Self {
            node: self.node,
            key_deserializer: Arc::clone(&self.key_deserializer),
            value_deserializer: Arc::clone(&self.value_deserializer),
        }
    }
}

pub struct Topology<K, V> {
    nodes: Vec<ProcessorNode<K, V>>,
    sources: HashMap<String, Source<K, V>>,
}

impl<K, V> Topology<K, V> {
    /// All nodes in initialization order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    pub fn source(&self, topic: &str) -> Option<&Source<K, V>> {
        self.sources.get(topic)
    }

    pub fn name(&self, node: NodeId) -> Option<&str> {
        self.nodes.get(node.0).map(|n| n.name.as_str())
    }

    pub fn children(&self, node: NodeId) -> Result<&[NodeId]> {
        Ok(&self.node(node)?.children)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub(crate) fn node(&self, node: NodeId) -> Result<&ProcessorNode<K, V>> {
        self.nodes
            .get(node.0)
            .ok_or_else(|| Error::IllegalState(format!("{node} is not part of the topology")))
    }
}

impl<K, V> fmt::Debug for Topology<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nodes: Vec<_> = self
            .nodes
            .iter()
            .map(|n| (n.name.as_str(), &n.children))
            .collect();
        f.debug_struct("Topology")
            .field("nodes", &nodes)
            .field("sources", &self.sources.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Builds a [Topology]. Every task owns its stage instances, so a topology is built per task.
pub struct TopologyBuilder<K, V> {
    nodes: Vec<ProcessorNode<K, V>>,
    names: HashMap<String, NodeId>,
    sources: HashMap<String, Source<K, V>>,
}

impl<K, V> Default for TopologyBuilder<K, V> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            names: HashMap::new(),
            sources: HashMap::new(),
        }
    }
}

impl<K, V> TopologyBuilder<K, V>
where
    K: Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a source node which forwards every record of the given topics to its children.
    pub fn add_source(
        &mut self,
        name: &str,
        topics: &[&str],
        key_deserializer: impl Deserializer<K> + 'static,
        value_deserializer: impl Deserializer<V> + 'static,
    ) -> Result<&mut Self> {
        if topics.is_empty() {
            return Err(Error::Topology(format!("source {name} has no topics")));
        }
        if let Some(topic) = topics.iter().find(|t| self.sources.contains_key(**t)) {
            return Err(Error::Topology(format!(
                "topic {topic} is already bound to another source"
            )));
        }

        let node = self.add_node(name, Box::new(SourceProcessor), &[])?;
        let key_deserializer: Arc<dyn Deserializer<K>> = Arc::new(key_deserializer);
        let value_deserializer: Arc<dyn Deserializer<V>> = Arc::new(value_deserializer);
        for topic in topics {
            self.sources.insert(
                topic.to_string(),
                Source {
                    node,
                    key_deserializer: Arc::clone(&key_deserializer),
                    value_deserializer: Arc::clone(&value_deserializer),
                },
            );
        }
        Ok(self)
    }

    pub fn add_processor(
        &mut self,
        name: &str,
        processor: impl Processor<K, V> + 'static,
        parents: &[&str],
    ) -> Result<&mut Self> {
        self.add_node(name, Box::new(processor), parents)?;
        Ok(self)
    }

    /// Adds a sink node which serializes the records it receives and sends them to `topic`.
    pub fn add_sink(
        &mut self,
        name: &str,
        topic: &str,
        key_serializer: impl Serializer<K> + 'static,
        value_serializer: impl Serializer<V> + 'static,
        parents: &[&str],
    ) -> Result<&mut Self> {
        let sink = SinkProcessor::new(topic, Box::new(key_serializer), Box::new(value_serializer));
        self.add_node(name, Box::new(sink), parents)?;
        Ok(self)
    }

    pub fn build(self) -> Topology<K, V> {
        Topology {
            nodes: self.nodes,
            sources: self.sources,
        }
    }

    fn add_node(
        &mut self,
        name: &str,
        processor: Box<dyn Processor<K, V>>,
        parents: &[&str],
    ) -> Result<NodeId> {
        if self.names.contains_key(name) {
            return Err(Error::Topology(format!("node {name} is already added")));
        }
        let parent_ids = parents
            .iter()
            .map(|parent| {
                self.names.get(*parent).copied().ok_or_else(|| {
                    Error::Topology(format!("parent {parent} of node {name} is not added yet"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let id = NodeId(self.nodes.len());
        for parent in parent_ids {
            if let Some(parent) = self.nodes.get_mut(parent.0) {
                parent.children.push(id);
            }
        }
        self.nodes.push(ProcessorNode {
            name: name.to_string(),
            processor: RefCell::new(processor),
            children: Vec::new(),
        });
        self.names.insert(name.to_string(), id);
        Ok(id)
    }
}
