//! Terminals that stop early: take the first item, or cancel right away.

use super::completion::{promise, Completion, Promise};
use flowline_types::{FlowError, Subscriber, Subscription, UpstreamSlot};
use std::sync::Arc;
use tracing::debug;

/// Requests one item and cancels upstream once it arrives.
pub(crate) struct FirstSubscriber<T> {
    upstream: UpstreamSlot,
    promise: Promise<Option<T>>,
}

impl<T: Send + 'static> FirstSubscriber<T> {
    pub(crate) fn new() -> (Arc<Self>, Completion<Option<T>>) {
        let (promise, completion) = promise();
        let subscriber = Arc::new(Self {
            upstream: UpstreamSlot::new(),
            promise,
        });
        (subscriber, completion)
    }
}

impl<T: Send + 'static> Subscriber<T> for FirstSubscriber<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        if self.upstream.set(subscription) {
            self.upstream.request(1);
        }
    }

    fn on_next(&self, item: T) {
        if self.promise.complete(Ok(Some(item))) {
            self.upstream.cancel();
        }
    }

    fn on_error(&self, error: FlowError) {
        self.upstream.release();
        self.promise.complete(Err(error));
    }

    fn on_complete(&self) {
        self.upstream.release();
        self.promise.complete(Ok(None));
    }
}

/// Cancels the subscription as soon as it arrives.
pub(crate) struct CancelSubscriber {
    promise: Promise<()>,
}

impl CancelSubscriber {
    pub(crate) fn new() -> (Arc<Self>, Completion<()>) {
        let (promise, completion) = promise();
        (Arc::new(Self { promise }), completion)
    }
}

impl<T> Subscriber<T> for CancelSubscriber {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        subscription.cancel();
        debug!("stream cancelled by terminal");
        self.promise.complete(Ok(()));
    }

    fn on_next(&self, _item: T) {}

    fn on_error(&self, _error: FlowError) {}

    fn on_complete(&self) {}
}
