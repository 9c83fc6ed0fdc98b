//! Recurring, stream-time driven callbacks into the stages. A schedule is polled with the task's
//! notion of stream time, so punctuation fires deterministically relative to the records that
//! were processed rather than to the wall clock.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::topology::NodeId;

/// Invoked by the [PunctuationQueue] for every due schedule.
pub(crate) trait Punctuator {
    fn punctuate(&mut self, node: NodeId, timestamp: i64) -> Result<()>;
}

/// Ordered by due time, then by node so that stages due at the same time fire in topological
/// order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct PunctuationSchedule {
    next_due: i64,
    node: NodeId,
    interval: i64,
}

impl PunctuationSchedule {
    fn next(self) -> Self {
        Self {
            next_due: self.next_due.saturating_add(self.interval),
            ..self
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct PunctuationQueue {
    pq: BinaryHeap<Reverse<PunctuationSchedule>>,
    /// Schedules registered before any stream time was known. They get their first due time
    /// when the queue is polled for the first time.
    unanchored: Vec<(NodeId, i64)>,
}

impl PunctuationQueue {
    /// Schedules `node` every `interval`, starting one interval after `anchor`.
    pub(crate) fn schedule(
        &mut self,
        node: NodeId,
        interval: Duration,
        anchor: Option<i64>,
    ) -> Result<()> {
        let interval = i64::try_from(interval.as_millis()).unwrap_or(i64::MAX);
        if interval <= 0 {
            return Err(Error::IllegalState(format!(
                "punctuation interval of {node} must be at least one millisecond"
            )));
        }
        match anchor {
            Some(anchor) => self.pq.push(Reverse(PunctuationSchedule {
                next_due: anchor.saturating_add(interval),
                node,
                interval,
            })),
            None => self.unanchored.push((node, interval)),
        }
        Ok(())
    }

    /// Fires every schedule due at `timestamp` exactly once and moves it one interval ahead.
    /// Returns whether anything fired. On error the schedules that did not get their turn are
    /// kept unchanged.
    pub(crate) fn may_punctuate(
        &mut self,
        timestamp: i64,
        punctuator: &mut impl Punctuator,
    ) -> Result<bool> {
        for (node, interval) in self.unanchored.drain(..) {
            self.pq.push(Reverse(PunctuationSchedule {
                next_due: timestamp.saturating_add(interval),
                node,
                interval,
            }));
        }

        let mut due = Vec::new();
        while self
            .pq
            .peek()
            .is_some_and(|Reverse(top)| top.next_due <= timestamp)
        {
            if let Some(Reverse(schedule)) = self.pq.pop() {
                due.push(schedule);
            }
        }

        let punctuated = !due.is_empty();
        let mut result = Ok(());
        for schedule in due {
            if result.is_err() {
                self.pq.push(Reverse(schedule));
                continue;
            }
            result = punctuator.punctuate(schedule.node, timestamp);
            self.pq.push(Reverse(schedule.next()));
        }
        result.map(|_| punctuated)
    }

    /// Moves the schedules of `other` into this queue.
    pub(crate) fn merge(&mut self, other: PunctuationQueue) {
        self.pq.extend(other.pq);
        self.unanchored.extend(other.unanchored);
    }

    pub(crate) fn len(&self) -> usize {
        self.pq.len() + self.unanchored.len()
    }

    pub(crate) fn clear(&mut self) {
        self.pq.clear();
        self.unanchored.clear();
    }
}
