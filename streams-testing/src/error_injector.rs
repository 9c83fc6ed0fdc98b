//! Error injection controller for testing.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Makes the next N calls of an operation fail. Shared through an `Arc` between the test and the
/// mock that consults it.
#[derive(Debug, Default)]
pub struct ErrorInjector {
    /// Fail the next N offset commits.
    fail_next_commits: AtomicUsize,
    /// Fail the next N producer sends.
    fail_next_sends: AtomicUsize,
    /// Fail the next N producer or store flushes.
    fail_next_flushes: AtomicUsize,
    /// Fail the next N changelog fetches.
    fail_next_fetches: AtomicUsize,
    /// Fail the next N processor inits.
    fail_next_inits: AtomicUsize,
    /// Fail the next N processor process calls.
    fail_next_processes: AtomicUsize,
    /// Fail the next N punctuations.
    fail_next_punctuates: AtomicUsize,
    /// Fail the next N processor or store closes.
    fail_next_closes: AtomicUsize,
}

impl ErrorInjector {
    /// Create a new error injector with all errors disabled.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_commits(&self, count: usize) {
        self.fail_next_commits.store(count, Ordering::Relaxed);
    }

    pub fn fail_sends(&self, count: usize) {
        self.fail_next_sends.store(count, Ordering::Relaxed);
    }

    pub fn fail_flushes(&self, count: usize) {
        self.fail_next_flushes.store(count, Ordering::Relaxed);
    }

    pub fn fail_fetches(&self, count: usize) {
        self.fail_next_fetches.store(count, Ordering::Relaxed);
    }

    pub fn fail_inits(&self, count: usize) {
        self.fail_next_inits.store(count, Ordering::Relaxed);
    }

    pub fn fail_processes(&self, count: usize) {
        self.fail_next_processes.store(count, Ordering::Relaxed);
    }

    pub fn fail_punctuates(&self, count: usize) {
        self.fail_next_punctuates.store(count, Ordering::Relaxed);
    }

    pub fn fail_closes(&self, count: usize) {
        self.fail_next_closes.store(count, Ordering::Relaxed);
    }

    pub(crate) fn should_fail_commit(&self) -> bool {
        Self::decrement_counter(&self.fail_next_commits)
    }

    pub(crate) fn should_fail_send(&self) -> bool {
        Self::decrement_counter(&self.fail_next_sends)
    }

    pub(crate) fn should_fail_flush(&self) -> bool {
        Self::decrement_counter(&self.fail_next_flushes)
    }

    pub(crate) fn should_fail_fetch(&self) -> bool {
        Self::decrement_counter(&self.fail_next_fetches)
    }

    pub(crate) fn should_fail_init(&self) -> bool {
        Self::decrement_counter(&self.fail_next_inits)
    }

    pub(crate) fn should_fail_process(&self) -> bool {
        Self::decrement_counter(&self.fail_next_processes)
    }

    pub(crate) fn should_fail_punctuate(&self) -> bool {
        Self::decrement_counter(&self.fail_next_punctuates)
    }

    pub(crate) fn should_fail_close(&self) -> bool {
        Self::decrement_counter(&self.fail_next_closes)
    }

    /// Decrements the counter if it is positive, returns whether it was.
    fn decrement_counter(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |c| {
                if c > 0 { Some(c - 1) } else { None }
            })
            .is_ok()
    }
}
