use std::collections::HashMap;

use tracing::debug;

use crate::client::Producer;
use crate::error::Result;
use crate::record::{ProducerRecord, TopicPartition};

/// RecordCollector ships the records produced by the sink stages (and the changelog writes of the
/// state stores) and remembers the highest acknowledged offset per output partition.
pub struct RecordCollector {
    producer: Box<dyn Producer>,
    offsets: HashMap<TopicPartition, i64>,
}

impl RecordCollector {
    pub fn new(producer: Box<dyn Producer>) -> Self {
        Self {
            producer,
            offsets: HashMap::new(),
        }
    }

    pub fn send(&mut self, record: ProducerRecord) -> Result<()> {
        self.producer.send(record)
    }

    /// Waits until everything sent so far has been acknowledged.
    pub fn flush(&mut self) -> Result<()> {
        let acks = self.producer.flush()?;
        debug!(acks = acks.len(), "Flushed record collector");
        for ack in acks {
            self.offsets
                .entry(ack.partition)
                .and_modify(|offset| *offset = (*offset).max(ack.offset))
                .or_insert(ack.offset);
        }
        Ok(())
    }

    /// Highest acknowledged offset per output partition.
    pub fn offsets(&self) -> &HashMap<TopicPartition, i64> {
        &self.offsets
    }
}
