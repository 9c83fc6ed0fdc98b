//! In-memory collaborators of a [StreamTask](streams_core::StreamTask) for tests.
//!
//! Every mock records what it was asked to do in a shared [CallLog], so a test can assert on the
//! order of calls across collaborators, and can be told to fail through an [ErrorInjector].

/// Ordered record of the calls made into the mocks.
pub mod call_log;
pub use call_log::CallLog;

/// Transport consumer, producer and changelog reader.
pub mod client;
pub use client::{MockConsumer, MockProducer, MockRestoreConsumer};

pub mod error;
pub use error::{Result, TestingError};

pub mod error_injector;
pub use error_injector::ErrorInjector;

/// Stage that logs every call and forwards what it receives.
pub mod processor;
pub use processor::{Forwarding, RecordingProcessor};

/// State store keeping its entries in shared memory.
pub mod store;
pub use store::MockStateStore;
