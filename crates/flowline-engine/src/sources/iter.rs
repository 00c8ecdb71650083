//! Iterator-backed sources.
//!
//! Each subscriber gets a fresh iterator. Items are pulled only against
//! outstanding demand, inside a drain loop, so a downstream that requests
//! more from inside `on_next` extends the running loop instead of recursing.

use crate::metrics;
use flowline_types::{
    noop_subscription, validate_request, Demand, DrainLoop, ErrorCollector, FlowError, Publisher,
    Subscriber, Subscription,
};
use parking_lot::Mutex;
use std::iter::Peekable;
use std::sync::Arc;
use tracing::{debug, warn};

/// Emits the items of a cloneable iterable.
pub struct IterPublisher<I> {
    source: I,
}

impl<I> IterPublisher<I> {
    pub fn new(source: I) -> Self {
        Self { source }
    }
}

impl<I> Publisher<I::Item> for IterPublisher<I>
where
    I: IntoIterator + Clone + Send + Sync + 'static,
    I::IntoIter: Send + 'static,
    I::Item: Send + 'static,
{
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<I::Item>>) {
        start(self.source.clone().into_iter().map(Some), subscriber);
    }
}

/// Emits the items of an iterable of optional values. A `None` fails the
/// stream with [`FlowError::NullElement`] and stops iteration.
pub struct NullablePublisher<I> {
    source: I,
}

impl<I> NullablePublisher<I> {
    pub fn new(source: I) -> Self {
        Self { source }
    }
}

impl<I, T> Publisher<T> for NullablePublisher<I>
where
    I: IntoIterator<Item = Option<T>> + Clone + Send + Sync + 'static,
    I::IntoIter: Send + 'static,
    T: Send + 'static,
{
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        start(self.source.clone().into_iter(), subscriber);
    }
}

/// Emits one value to its first subscriber. Later subscribers fail.
pub(crate) struct SinglePublisher<T> {
    item: Mutex<Option<T>>,
}

impl<T> SinglePublisher<T> {
    pub(crate) fn new(item: T) -> Self {
        Self {
            item: Mutex::new(Some(item)),
        }
    }
}

impl<T: Send + 'static> Publisher<T> for SinglePublisher<T> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        let item = self.item.lock().take();
        match item {
            Some(item) => start(std::iter::once(Some(item)), subscriber),
            None => {
                subscriber.on_subscribe(noop_subscription());
                subscriber.on_error(FlowError::IllegalState(
                    "single-value publisher subscribed twice",
                ));
            }
        }
    }
}

fn start<It, T>(iter: It, subscriber: Arc<dyn Subscriber<T>>)
where
    It: Iterator<Item = Option<T>> + Send + 'static,
    T: Send + 'static,
{
    metrics::record_subscription();
    let mut iter = iter.peekable();
    if iter.peek().is_none() {
        subscriber.on_subscribe(noop_subscription());
        subscriber.on_complete();
        return;
    }
    let subscription = Arc::new(IterSubscription {
        iter: Mutex::new(iter),
        downstream: Arc::clone(&subscriber),
        demand: Demand::new(),
        drain: DrainLoop::new(),
        bad_request: ErrorCollector::new(),
    });
    subscriber.on_subscribe(subscription);
}

struct IterSubscription<It: Iterator, T> {
    // only touched by the drain owner
    iter: Mutex<Peekable<It>>,
    downstream: Arc<dyn Subscriber<T>>,
    demand: Demand,
    drain: DrainLoop,
    bad_request: ErrorCollector,
}

impl<It, T> IterSubscription<It, T>
where
    It: Iterator<Item = Option<T>> + Send,
    T: Send,
{
    fn drain(&self) {
        if !self.drain.enter() {
            return;
        }
        let mut missed = 1;
        loop {
            if self.drain.is_terminated() {
                return;
            }
            if let Some(error) = self.bad_request.take() {
                self.fail(error);
                return;
            }
            while self.demand.try_take_one() {
                if self.drain.is_terminated() {
                    return;
                }
                let next = self.iter.lock().next();
                match next {
                    Some(Some(item)) => self.downstream.on_next(item),
                    Some(None) => {
                        self.fail(FlowError::NullElement);
                        return;
                    }
                    None => {
                        self.complete();
                        return;
                    }
                }
                let exhausted = self.iter.lock().peek().is_none();
                if exhausted {
                    self.complete();
                    return;
                }
                if self.bad_request.is_set() {
                    break;
                }
            }
            missed = self.drain.leave(missed);
            if missed == 0 {
                break;
            }
        }
    }

    fn complete(&self) {
        if self.drain.finish() {
            debug!("iterator exhausted, completing");
            self.downstream.on_complete();
        }
    }

    fn fail(&self, error: FlowError) {
        if self.drain.finish() {
            metrics::record_error(error.kind());
            self.downstream.on_error(error);
        }
    }
}

impl<It, T> Subscription for IterSubscription<It, T>
where
    It: Iterator<Item = Option<T>> + Send,
    T: Send,
{
    fn request(&self, n: i64) {
        match validate_request(n) {
            Ok(n) => {
                self.demand.add(n);
            }
            Err(error) => {
                warn!(requested = n, "non-positive request, failing the stream");
                self.bad_request.add(error);
            }
        }
        self.drain();
    }

    fn cancel(&self) {
        if self.drain.cancel() {
            metrics::record_cancellation();
            debug!("iterator source cancelled");
        }
    }
}
