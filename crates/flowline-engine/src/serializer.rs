//! Serializes `on_next` with terminal signals raised from other threads.
//!
//! `on_next` calls are already serial. What can race with them is a terminal
//! signal coming from elsewhere (an invalid `request`, an error from a
//! different upstream). The terminal is parked and delivered by whoever
//! currently holds the loop, so it never overlaps an item.

use flowline_types::{DrainLoop, ErrorCollector, FlowError, Subscriber};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Default)]
pub(crate) struct HalfSerializer {
    drain: DrainLoop,
    error: ErrorCollector,
    terminal_raised: AtomicBool,
}

impl HalfSerializer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn on_next<R>(&self, downstream: &dyn Subscriber<R>, item: R) {
        if self.drain.is_terminated() {
            return;
        }
        if self.drain.try_claim() {
            downstream.on_next(item);
            if self.drain.leave(1) != 0 {
                self.deliver_terminal(downstream);
            }
        }
    }

    /// Returns `false` when the stream was already over.
    pub(crate) fn on_error<R>(&self, downstream: &dyn Subscriber<R>, error: FlowError) -> bool {
        if self.drain.is_terminated() || self.terminal_raised.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.error.add(error);
        if self.drain.enter() {
            self.deliver_terminal(downstream);
        }
        true
    }

    pub(crate) fn on_complete<R>(&self, downstream: &dyn Subscriber<R>) {
        if self.terminal_raised.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.drain.enter() {
            self.deliver_terminal(downstream);
        }
    }

    /// Suppress everything from now on.
    pub(crate) fn cancel(&self) -> bool {
        self.drain.cancel()
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.drain.is_terminated()
    }

    fn deliver_terminal<R>(&self, downstream: &dyn Subscriber<R>) {
        if !self.drain.finish() {
            return;
        }
        match self.error.take() {
            Some(error) => downstream.on_error(error),
            None => downstream.on_complete(),
        }
    }
}
