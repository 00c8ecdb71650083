//! # Flowline Bridge
//!
//! Lets Flowline stages and code written against the external
//! reactive-streams SPI ([`spi`]) subscribe to each other.
//!
//! ```text
//!   flowline_types::Publisher ◄──┐        ┌──► spi::Publisher
//!                                 HybridPublisher
//!   flowline_types::Subscriber ◄─┐        ┌──► spi::Subscriber
//!                                 HybridSubscriber
//!   flowline_types::Subscription ◄┐       ┌──► spi::Subscription
//!                                 HybridSubscription
//! ```
//!
//! The `to_spi_*` / `from_spi_*` functions are the only entry points
//! needed. Converting a value that is already a hybrid never nests: the
//! hybrid is returned as is, or the value it wraps if that value already
//! belongs to the requested family.
//!
//! Subscriptions passed along in `on_subscribe` follow the same rule when
//! they return to the Flowline side. An SPI subscription that crossed into
//! Flowline and back arrives wrapped, since a Flowline subscription carries
//! nothing the bridge could unwrap.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod hybrid;
pub mod spi;

pub use hybrid::{HybridPublisher, HybridSubscriber, HybridSubscription};

use flowline_types::{Publisher, Subscriber, Subscription};
use std::any::Any;
use std::sync::Arc;
use tracing::trace;

/// `Ok` with the value as `H` if it is one, `Err` with it unchanged
/// otherwise.
fn as_hybrid<V, H>(value: Arc<V>) -> Result<Arc<H>, Arc<V>>
where
    V: Send + Sync + 'static,
    H: Send + Sync + 'static,
{
    let any: Arc<dyn Any + Send + Sync> = value.clone();
    match any.downcast::<H>() {
        Ok(hybrid) => {
            trace!("value is already a hybrid, unwrapping");
            Ok(hybrid)
        }
        Err(_) => Err(value),
    }
}

pub fn to_spi_publisher<T, P>(publisher: Arc<P>) -> Arc<dyn spi::Publisher<T>>
where
    T: Send + 'static,
    P: Publisher<T> + 'static,
{
    match as_hybrid::<P, HybridPublisher<T>>(publisher) {
        Ok(hybrid) => hybrid.into_spi(),
        Err(publisher) => Arc::new(HybridPublisher::from_flow(publisher)),
    }
}

pub fn from_spi_publisher<T, P>(publisher: Arc<P>) -> Arc<dyn Publisher<T>>
where
    T: Send + 'static,
    P: spi::Publisher<T> + 'static,
{
    match as_hybrid::<P, HybridPublisher<T>>(publisher) {
        Ok(hybrid) => hybrid.into_flow(),
        Err(publisher) => Arc::new(HybridPublisher::from_spi(publisher)),
    }
}

pub fn to_spi_subscriber<T, S>(subscriber: Arc<S>) -> Arc<dyn spi::Subscriber<T>>
where
    T: Send + 'static,
    S: Subscriber<T> + 'static,
{
    match as_hybrid::<S, HybridSubscriber<T>>(subscriber) {
        Ok(hybrid) => hybrid.into_spi(),
        Err(subscriber) => Arc::new(HybridSubscriber::from_flow(subscriber)),
    }
}

pub fn from_spi_subscriber<T, S>(subscriber: Arc<S>) -> Arc<dyn Subscriber<T>>
where
    T: Send + 'static,
    S: spi::Subscriber<T> + 'static,
{
    match as_hybrid::<S, HybridSubscriber<T>>(subscriber) {
        Ok(hybrid) => hybrid.into_flow(),
        Err(subscriber) => Arc::new(HybridSubscriber::from_spi(subscriber)),
    }
}

pub fn to_spi_subscription<S>(subscription: Arc<S>) -> Arc<dyn spi::Subscription>
where
    S: Subscription + 'static,
{
    match as_hybrid::<S, HybridSubscription>(subscription) {
        Ok(hybrid) => hybrid.into_spi(),
        Err(subscription) => Arc::new(HybridSubscription::from_flow(subscription)),
    }
}

pub fn from_spi_subscription<S>(subscription: Arc<S>) -> Arc<dyn Subscription>
where
    S: spi::Subscription + 'static,
{
    match as_hybrid::<S, HybridSubscription>(subscription) {
        Ok(hybrid) => hybrid.into_flow(),
        Err(subscription) => Arc::new(HybridSubscription::from_spi(subscription)),
    }
}
