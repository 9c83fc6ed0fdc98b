use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use streams_core::processor::{Processor, ProcessorContext};

use crate::call_log::CallLog;
use crate::error::TestingError;
use crate::error_injector::ErrorInjector;
use crate::store::MockStateStore;

/// What a [RecordingProcessor] does with the records it receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Forwarding {
    /// Swallows the record.
    Drop,
    /// Forwards to every child.
    All,
    /// Forwards to the child at the index.
    ToChild(usize),
}

/// Stage that logs every call into it as `<name>.init`, `<name>.process:<key>:<value>`,
/// `<name>.punctuate:<timestamp>` and `<name>.close`.
///
/// After forwarding it logs `<name>.active:<node name>` with the stage the context reports as
/// active, which must be the stage itself whether the children succeeded or not.
pub struct RecordingProcessor {
    name: String,
    log: CallLog,
    injector: Arc<ErrorInjector>,
    forwarding: Forwarding,
    interval: Option<Duration>,
    store: Option<(MockStateStore, bool)>,
}

impl RecordingProcessor {
    pub fn new(name: impl Into<String>, log: CallLog) -> Self {
        Self {
            name: name.into(),
            log,
            injector: Arc::default(),
            forwarding: Forwarding::Drop,
            interval: None,
            store: None,
        }
    }

    pub fn forwarding(mut self, forwarding: Forwarding) -> Self {
        self.forwarding = forwarding;
        self
    }

    /// Schedules a punctuation every `interval` when initialized.
    pub fn scheduling(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Registers the store when initialized.
    pub fn with_store(mut self, store: MockStateStore, logged: bool) -> Self {
        self.store = Some((store, logged));
        self
    }

    /// Shares `injector` with the test so failures can be injected after the stage was handed
    /// to the topology.
    pub fn with_injector(mut self, injector: Arc<ErrorInjector>) -> Self {
        self.injector = injector;
        self
    }

    fn failure(&self, operation: &str) -> streams_core::Error {
        TestingError::Processor(format!("{} {operation}", self.name)).into()
    }
}

impl<K, V> Processor<K, V> for RecordingProcessor
where
    K: Display + Clone + Send,
    V: Display + Clone + Send,
{
    fn init(&mut self, ctx: &mut ProcessorContext<'_, K, V>) -> streams_core::Result<()> {
        self.log.record(format!("{}.init", self.name));
        if self.injector.should_fail_init() {
            return Err(self.failure("init"));
        }
        if let Some(interval) = self.interval {
            ctx.schedule(interval)?;
        }
        if let Some((store, logged)) = &self.store {
            ctx.register_store(Box::new(store.clone()), *logged)?;
        }
        Ok(())
    }

    fn process(
        &mut self,
        ctx: &mut ProcessorContext<'_, K, V>,
        key: K,
        value: V,
    ) -> streams_core::Result<()> {
        self.log
            .record(format!("{}.process:{key}:{value}", self.name));
        if self.injector.should_fail_process() {
            return Err(self.failure("process"));
        }

        let result = match self.forwarding {
            Forwarding::Drop => return Ok(()),
            Forwarding::All => ctx.forward(key, value),
            Forwarding::ToChild(index) => ctx.forward_to(key, value, index),
        };
        self.log.record(format!(
            "{}.active:{}",
            self.name,
            ctx.current_node_name().unwrap_or("none")
        ));
        result
    }

    fn punctuate(
        &mut self,
        _ctx: &mut ProcessorContext<'_, K, V>,
        timestamp: i64,
    ) -> streams_core::Result<()> {
        self.log
            .record(format!("{}.punctuate:{timestamp}", self.name));
        if self.injector.should_fail_punctuate() {
            return Err(self.failure("punctuate"));
        }
        Ok(())
    }

    fn close(&mut self) -> streams_core::Result<()> {
        self.log.record(format!("{}.close", self.name));
        if self.injector.should_fail_close() {
            return Err(self.failure("close"));
        }
        Ok(())
    }
}
