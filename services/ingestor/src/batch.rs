//! Pending-batch bookkeeping
//!
//! `TickBatcher` is the pure core of the batch writer: a pending
//! sequence bounded by two independent triggers, a maximum count and a
//! maximum wait since the first enqueue. The first push into an empty
//! batch arms a deadline; the push that reaches the size bound drains
//! the batch immediately and clears the deadline, so a size-triggered
//! flush always cancels the pending timer.
//!
//! Draining is swap-and-clear: callers never observe a partially
//! drained batch.

use std::time::Duration;
use tokio::time::Instant;
use types::tick::Tick;

/// Flush-trigger thresholds.
#[derive(Debug, Clone)]
pub struct BatcherConfig {
    /// Flush as soon as this many ticks are pending.
    pub max_size: usize,
    /// Flush whatever is pending this long after the first enqueue.
    pub max_wait: Duration,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            max_size: 100,
            max_wait: Duration::from_secs(5),
        }
    }
}

/// Outcome of pushing one tick.
#[derive(Debug)]
pub enum PushOutcome {
    /// Appended; a deadline was already armed.
    Queued,
    /// First tick of a new batch; the caller should wait until the
    /// returned deadline.
    DeadlineArmed(Instant),
    /// The push reached the size bound; the drained batch must be
    /// flushed now and no deadline remains.
    SizeTriggered(Vec<Tick>),
}

/// Pending ticks plus the armed deadline, if any.
#[derive(Debug)]
pub struct TickBatcher {
    pending: Vec<Tick>,
    deadline: Option<Instant>,
    config: BatcherConfig,
}

impl TickBatcher {
    pub fn new(config: BatcherConfig) -> Self {
        Self {
            pending: Vec::with_capacity(config.max_size),
            deadline: None,
            config,
        }
    }

    /// Append a tick, arming or firing triggers as needed.
    pub fn push(&mut self, tick: Tick, now: Instant) -> PushOutcome {
        self.pending.push(tick);

        if self.pending.len() >= self.config.max_size {
            return PushOutcome::SizeTriggered(self.take());
        }

        if self.deadline.is_none() {
            let deadline = now + self.config.max_wait;
            self.deadline = Some(deadline);
            return PushOutcome::DeadlineArmed(deadline);
        }

        PushOutcome::Queued
    }

    /// Swap-and-clear the pending batch and disarm the deadline.
    pub fn take(&mut self) -> Vec<Tick> {
        self.deadline = None;
        std::mem::take(&mut self.pending)
    }

    /// The armed deadline, if a batch is pending.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
