//! Lazy processor wiring.
//!
//! Nothing is connected when the stage is declared. The first subscriber
//! attaches to the processor, and only then is the processor subscribed to
//! upstream, so a chain of `via` stages is wired in declaration order ahead
//! of the real upstream subscription.

use flowline_types::{Processor, Publisher, Subscriber};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

pub(crate) struct ViaPublisher<T, R, P> {
    upstream: Arc<dyn Publisher<T>>,
    processor: Arc<P>,
    wired: AtomicBool,
    _output: PhantomData<fn() -> R>,
}

impl<T, R, P> ViaPublisher<T, R, P> {
    pub(crate) fn new(upstream: Arc<dyn Publisher<T>>, processor: Arc<P>) -> Self {
        Self {
            upstream,
            processor,
            wired: AtomicBool::new(false),
            _output: PhantomData,
        }
    }
}

impl<T, R, P> Publisher<R> for ViaPublisher<T, R, P>
where
    T: Send + 'static,
    R: Send + 'static,
    P: Processor<T, R> + 'static,
{
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<R>>) {
        self.processor.subscribe(subscriber);
        if !self.wired.swap(true, Ordering::AcqRel) {
            debug!("wiring processor to upstream");
            let processor: Arc<dyn Subscriber<T>> = self.processor.clone();
            self.upstream.subscribe(processor);
        }
    }
}
