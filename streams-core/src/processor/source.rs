use crate::error::Result;
use crate::processor::{Processor, ProcessorContext};

/// Root of the graph for a set of input topics. Records reach it already deserialized by the
/// [RecordQueue](crate::partition_group::RecordQueue), so it only hands them to its children.
pub(crate) struct SourceProcessor;

impl<K: Clone, V: Clone> Processor<K, V> for SourceProcessor {
    fn process(&mut self, ctx: &mut ProcessorContext<'_, K, V>, key: K, value: V) -> Result<()> {
        ctx.forward(key, value)
    }
}
