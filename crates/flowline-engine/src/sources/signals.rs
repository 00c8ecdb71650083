//! Sources that only signal: no items, or a terminal straight away.

use crate::metrics;
use flowline_types::{
    noop_subscription, validate_request, DrainLoop, FlowError, Publisher, Subscriber,
    Subscription,
};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Completes immediately after `on_subscribe`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyPublisher;

impl<T: Send + 'static> Publisher<T> for EmptyPublisher {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        subscriber.on_subscribe(noop_subscription());
        subscriber.on_complete();
    }
}

/// Fails every subscriber with a clone of the same error.
#[derive(Debug, Clone)]
pub struct ErrorPublisher {
    error: FlowError,
}

impl ErrorPublisher {
    pub fn new(error: FlowError) -> Self {
        Self { error }
    }
}

impl<T: Send + 'static> Publisher<T> for ErrorPublisher {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        debug!(kind = self.error.kind(), "error source subscribed");
        subscriber.on_subscribe(noop_subscription());
        subscriber.on_error(self.error.clone());
    }
}

/// Never emits and never terminates on its own. A non-positive request
/// still fails the stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverPublisher;

impl<T: Send + 'static> Publisher<T> for NeverPublisher {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        metrics::record_subscription();
        let subscription = Arc::new(NeverSubscription {
            downstream: Arc::downgrade(&subscriber),
            drain: DrainLoop::new(),
        });
        subscriber.on_subscribe(subscription);
    }
}

struct NeverSubscription<T> {
    // weak: an unreferenced subscriber has to drop so collect resolves
    downstream: Weak<dyn Subscriber<T>>,
    drain: DrainLoop,
}

impl<T: Send> Subscription for NeverSubscription<T> {
    fn request(&self, n: i64) {
        if let Err(error) = validate_request(n) {
            if !self.drain.finish() {
                return;
            }
            warn!(requested = n, "non-positive request, failing the stream");
            metrics::record_error(error.kind());
            if let Some(downstream) = self.downstream.upgrade() {
                downstream.on_error(error);
            }
        }
    }

    fn cancel(&self) {
        if self.drain.cancel() {
            metrics::record_cancellation();
        }
    }
}
