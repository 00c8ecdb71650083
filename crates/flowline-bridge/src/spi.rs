//! # External SPI
//!
//! The reactive-streams interface family used by code outside Flowline.
//! It has the same shape as the internal protocol in `flowline-types`; the
//! only structural difference is the error channel, which carries any
//! `std::error::Error` instead of a [`FlowError`].

use flowline_types::FlowError;
use std::sync::Arc;

/// Error value of the external family.
pub type Throwable = Arc<dyn std::error::Error + Send + Sync + 'static>;

pub trait Subscription: Send + Sync {
    fn request(&self, n: i64);

    fn cancel(&self);

    /// The Flowline subscription this value forwards to unchanged, if any.
    /// Lets the bridge hand it back instead of wrapping it again.
    #[doc(hidden)]
    fn flow_subscription(&self) -> Option<Arc<dyn flowline_types::Subscription>> {
        None
    }
}

pub trait Subscriber<T>: Send + Sync {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>);

    fn on_next(&self, item: T);

    fn on_error(&self, error: Throwable);

    fn on_complete(&self);
}

pub trait Publisher<T>: Send + Sync {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>);
}

/// Convert an internal error for the external family.
#[must_use]
pub fn to_throwable(error: FlowError) -> Throwable {
    Arc::new(error)
}

/// Convert an external error for the internal family. A [`FlowError`] that
/// crossed over earlier comes back unchanged; anything else becomes
/// [`FlowError::Upstream`].
#[must_use]
pub fn from_throwable(error: Throwable) -> FlowError {
    match error.downcast_ref::<FlowError>() {
        Some(flow) => flow.clone(),
        None => FlowError::upstream(error.to_string()),
    }
}
