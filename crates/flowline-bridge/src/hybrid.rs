//! # Hybrid Wrappers
//!
//! Each wrapper holds a value of one family and implements both. Signals are
//! forwarded 1:1 as they arrive; nothing is buffered, reordered or
//! validated here. Values handed across in a signal (the subscription in
//! `on_subscribe`, the error in `on_error`) are converted to the receiving
//! family on the way. A subscription coming back to the Flowline side is
//! unwrapped to the Flowline subscription it started as.

use crate::spi::{self, from_throwable, to_throwable, Throwable};
use flowline_types::{FlowError, Publisher, Subscriber, Subscription};
use std::sync::Arc;

enum Side<F: ?Sized, S: ?Sized> {
    Flow(Arc<F>),
    Spi(Arc<S>),
}

/// Subscription usable from both families.
pub struct HybridSubscription {
    target: Side<dyn Subscription, dyn spi::Subscription>,
}

impl HybridSubscription {
    pub fn from_flow(subscription: Arc<dyn Subscription>) -> Self {
        Self {
            target: Side::Flow(subscription),
        }
    }

    pub fn from_spi(subscription: Arc<dyn spi::Subscription>) -> Self {
        Self {
            target: Side::Spi(subscription),
        }
    }

    pub(crate) fn into_flow(self: Arc<Self>) -> Arc<dyn Subscription> {
        if let Side::Flow(subscription) = &self.target {
            return Arc::clone(subscription);
        }
        self
    }

    pub(crate) fn into_spi(self: Arc<Self>) -> Arc<dyn spi::Subscription> {
        if let Side::Spi(subscription) = &self.target {
            return Arc::clone(subscription);
        }
        self
    }
}

impl Subscription for HybridSubscription {
    fn request(&self, n: i64) {
        match &self.target {
            Side::Flow(subscription) => subscription.request(n),
            Side::Spi(subscription) => subscription.request(n),
        }
    }

    fn cancel(&self) {
        match &self.target {
            Side::Flow(subscription) => subscription.cancel(),
            Side::Spi(subscription) => subscription.cancel(),
        }
    }
}

impl spi::Subscription for HybridSubscription {
    fn request(&self, n: i64) {
        Subscription::request(self, n);
    }

    fn cancel(&self) {
        Subscription::cancel(self);
    }

    fn flow_subscription(&self) -> Option<Arc<dyn Subscription>> {
        match &self.target {
            Side::Flow(subscription) => Some(Arc::clone(subscription)),
            Side::Spi(subscription) => subscription.flow_subscription(),
        }
    }
}

/// Subscriber usable from both families.
pub struct HybridSubscriber<T> {
    target: Side<dyn Subscriber<T>, dyn spi::Subscriber<T>>,
}

impl<T: Send + 'static> HybridSubscriber<T> {
    pub fn from_flow(subscriber: Arc<dyn Subscriber<T>>) -> Self {
        Self {
            target: Side::Flow(subscriber),
        }
    }

    pub fn from_spi(subscriber: Arc<dyn spi::Subscriber<T>>) -> Self {
        Self {
            target: Side::Spi(subscriber),
        }
    }

    pub(crate) fn into_flow(self: Arc<Self>) -> Arc<dyn Subscriber<T>> {
        if let Side::Flow(subscriber) = &self.target {
            return Arc::clone(subscriber);
        }
        self
    }

    pub(crate) fn into_spi(self: Arc<Self>) -> Arc<dyn spi::Subscriber<T>> {
        if let Side::Spi(subscriber) = &self.target {
            return Arc::clone(subscriber);
        }
        self
    }
}

impl<T: Send + 'static> Subscriber<T> for HybridSubscriber<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        match &self.target {
            Side::Flow(subscriber) => subscriber.on_subscribe(subscription),
            Side::Spi(subscriber) => {
                let wrapped = Arc::new(HybridSubscription::from_flow(subscription));
                subscriber.on_subscribe(wrapped);
            }
        }
    }

    fn on_next(&self, item: T) {
        match &self.target {
            Side::Flow(subscriber) => subscriber.on_next(item),
            Side::Spi(subscriber) => subscriber.on_next(item),
        }
    }

    fn on_error(&self, error: FlowError) {
        match &self.target {
            Side::Flow(subscriber) => subscriber.on_error(error),
            Side::Spi(subscriber) => subscriber.on_error(to_throwable(error)),
        }
    }

    fn on_complete(&self) {
        match &self.target {
            Side::Flow(subscriber) => subscriber.on_complete(),
            Side::Spi(subscriber) => subscriber.on_complete(),
        }
    }
}

impl<T: Send + 'static> spi::Subscriber<T> for HybridSubscriber<T> {
    fn on_subscribe(&self, subscription: Arc<dyn spi::Subscription>) {
        match &self.target {
            Side::Spi(subscriber) => subscriber.on_subscribe(subscription),
            Side::Flow(subscriber) => {
                let unwrapped = subscription.flow_subscription();
                let subscription: Arc<dyn Subscription> = match unwrapped {
                    Some(flow) => flow,
                    None => Arc::new(HybridSubscription::from_spi(subscription)),
                };
                subscriber.on_subscribe(subscription);
            }
        }
    }

    fn on_next(&self, item: T) {
        Subscriber::on_next(self, item);
    }

    fn on_error(&self, error: Throwable) {
        match &self.target {
            Side::Spi(subscriber) => subscriber.on_error(error),
            Side::Flow(subscriber) => subscriber.on_error(from_throwable(error)),
        }
    }

    fn on_complete(&self) {
        Subscriber::on_complete(self);
    }
}

/// Publisher usable from both families.
pub struct HybridPublisher<T> {
    target: Side<dyn Publisher<T>, dyn spi::Publisher<T>>,
}

impl<T: Send + 'static> HybridPublisher<T> {
    pub fn from_flow(publisher: Arc<dyn Publisher<T>>) -> Self {
        Self {
            target: Side::Flow(publisher),
        }
    }

    pub fn from_spi(publisher: Arc<dyn spi::Publisher<T>>) -> Self {
        Self {
            target: Side::Spi(publisher),
        }
    }

    pub(crate) fn into_flow(self: Arc<Self>) -> Arc<dyn Publisher<T>> {
        if let Side::Flow(publisher) = &self.target {
            return Arc::clone(publisher);
        }
        self
    }

    pub(crate) fn into_spi(self: Arc<Self>) -> Arc<dyn spi::Publisher<T>> {
        if let Side::Spi(publisher) = &self.target {
            return Arc::clone(publisher);
        }
        self
    }
}

impl<T: Send + 'static> Publisher<T> for HybridPublisher<T> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        match &self.target {
            Side::Flow(publisher) => publisher.subscribe(subscriber),
            Side::Spi(publisher) => {
                publisher.subscribe(Arc::new(HybridSubscriber::from_flow(subscriber)));
            }
        }
    }
}

impl<T: Send + 'static> spi::Publisher<T> for HybridPublisher<T> {
    fn subscribe(&self, subscriber: Arc<dyn spi::Subscriber<T>>) {
        match &self.target {
            Side::Spi(publisher) => publisher.subscribe(subscriber),
            Side::Flow(publisher) => {
                publisher.subscribe(Arc::new(HybridSubscriber::from_spi(subscriber)));
            }
        }
    }
}
