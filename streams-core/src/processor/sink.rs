use crate::codec::Serializer;
use crate::error::Result;
use crate::processor::{Processor, ProcessorContext};
use crate::record::ProducerRecord;

/// Leaf of the graph that writes the records it receives to an output topic.
pub(crate) struct SinkProcessor<K, V> {
    topic: String,
    key_serializer: Box<dyn Serializer<K>>,
    value_serializer: Box<dyn Serializer<V>>,
}

impl<K, V> SinkProcessor<K, V> {
    pub(crate) fn new(
        topic: &str,
        key_serializer: Box<dyn Serializer<K>>,
        value_serializer: Box<dyn Serializer<V>>,
    ) -> Self {
        Self {
            topic: topic.to_string(),
            key_serializer,
            value_serializer,
        }
    }
}

impl<K, V> Processor<K, V> for SinkProcessor<K, V> {
    fn process(&mut self, ctx: &mut ProcessorContext<'_, K, V>, key: K, value: V) -> Result<()> {
        let key = self.key_serializer.serialize(&self.topic, &key)?;
        let value = self.value_serializer.serialize(&self.topic, &value)?;
        ctx.send(ProducerRecord {
            topic: self.topic.clone(),
            partition: None,
            key,
            value,
        })
    }
}
