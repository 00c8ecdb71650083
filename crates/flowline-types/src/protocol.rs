//! # Protocol Traits
//!
//! The four-signal subscriber, the two-operation subscription and the
//! publisher that binds them.
//!
//! All methods take `&self`: a subscriber may be shared between the thread
//! that subscribed it and the threads its upstream emits on, so every
//! implementation keeps its state behind atomics.

use crate::errors::FlowError;
use std::sync::Arc;

/// Demand and cancellation handle handed to a subscriber.
pub trait Subscription: Send + Sync {
    /// Authorize `n` more items. `n <= 0` fails the stream with
    /// [`FlowError::IllegalArgument`].
    fn request(&self, n: i64);

    /// Stop the stream. Idempotent.
    fn cancel(&self);
}

/// Receiver of stream signals.
///
/// `on_next` calls are never concurrent and never follow a terminal signal.
pub trait Subscriber<T>: Send + Sync {
    /// Receives the one subscription of this subscriber's lifetime.
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>);

    fn on_next(&self, item: T);

    fn on_error(&self, error: FlowError);

    fn on_complete(&self);
}

/// Lazy source of items.
pub trait Publisher<T>: Send + Sync {
    /// Attach `subscriber`. Items flow only after it requests them.
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>);
}

/// A stage that is both a subscriber of `T` and a publisher of `R`.
pub trait Processor<T, R>: Subscriber<T> + Publisher<R> {}

impl<T, R, P> Processor<T, R> for P where P: Subscriber<T> + Publisher<R> + ?Sized {}

/// Subscription that ignores every call. Used by sources that terminate
/// before any demand matters.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSubscription;

impl Subscription for NoopSubscription {
    fn request(&self, _n: i64) {}

    fn cancel(&self) {}
}

#[must_use]
pub fn noop_subscription() -> Arc<dyn Subscription> {
    Arc::new(NoopSubscription)
}
