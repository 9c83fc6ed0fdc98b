//! Execution unit of a record-at-a-time stream processor.
//!
//! A [StreamTask] owns the processing graph ([Topology]) for a group of input partitions. It
//! merges the buffered records of those partitions in timestamp order, pushes them one at a time
//! through the graph, fires stream-time punctuations, throttles the transport when its buffers
//! fill up and commits in an order that never lets input offsets get ahead of the output.

mod error;
pub use crate::error::{Error, Result};

/// Transport client contracts the task talks to.
pub mod client;

/// Key and value (de)serializers.
pub mod codec;

pub mod collector;

/// Configuration loaded from a base64 encoded JSON object.
pub mod config;

pub mod partition_group;

pub mod processor;

pub(crate) mod punctuation;

pub mod record;

pub mod state;

pub mod task;

pub mod timestamp;

pub mod topology;

pub use crate::config::StreamsConfig;
pub use crate::processor::{Processor, ProcessorContext};
pub use crate::record::{ConsumerRecord, TopicPartition};
pub use crate::task::{StreamTask, TaskId, TaskStatus};
pub use crate::topology::{NodeId, Topology, TopologyBuilder};
