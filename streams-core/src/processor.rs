//! User-defined stages of the processing graph.
//!
//! A [Processor] is driven by the task with a [ProcessorContext], a scope token borrowed for the
//! duration of one call. Through the context a stage forwards its output to its children,
//! schedules punctuation, sends records downstream and reaches its state stores.

use crate::error::Result;

mod context;
pub use context::ProcessorContext;
pub(crate) use context::Cursor;

pub(crate) mod sink;
pub(crate) mod source;

pub trait Processor<K, V>: Send {
    /// Called once when the task is created, in topological order. Stores must be registered
    /// here.
    fn init(&mut self, _ctx: &mut ProcessorContext<'_, K, V>) -> Result<()> {
        Ok(())
    }

    fn process(&mut self, ctx: &mut ProcessorContext<'_, K, V>, key: K, value: V) -> Result<()>;

    /// Called when a schedule registered through [ProcessorContext::schedule] is due.
    fn punctuate(&mut self, _ctx: &mut ProcessorContext<'_, K, V>, _timestamp: i64) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
