//! Error recovery: switch to a fallback publisher when upstream fails.
//!
//! Demand the failed upstream left unserved carries over to the fallback.
//! The fallback function runs at most once per subscription; an error from
//! the fallback stream itself is delivered as is.

use crate::arbiter::SubscriptionArbiter;
use crate::serializer::HalfSerializer;
use flowline_types::{
    validate_request, FlowError, FlowResult, Publisher, Subscriber, Subscription,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

pub(crate) type FallbackFn<T> =
    Arc<dyn Fn(FlowError) -> FlowResult<Arc<dyn Publisher<T>>> + Send + Sync>;

pub(crate) struct ResumePublisher<T> {
    upstream: Arc<dyn Publisher<T>>,
    fallback: FallbackFn<T>,
}

impl<T> ResumePublisher<T> {
    pub(crate) fn new(upstream: Arc<dyn Publisher<T>>, fallback: FallbackFn<T>) -> Self {
        Self { upstream, fallback }
    }
}

impl<T: Send + 'static> Publisher<T> for ResumePublisher<T> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        let resume = Arc::new_cyclic(|this| ResumeSubscriber {
            this: this.clone(),
            downstream: subscriber,
            fallback: Arc::clone(&self.fallback),
            arbiter: SubscriptionArbiter::new(),
            serializer: HalfSerializer::new(),
            switched: AtomicBool::new(false),
        });
        resume.downstream.on_subscribe(resume.clone());
        self.upstream.subscribe(resume);
    }
}

struct ResumeSubscriber<T> {
    this: Weak<Self>,
    downstream: Arc<dyn Subscriber<T>>,
    fallback: FallbackFn<T>,
    arbiter: SubscriptionArbiter,
    serializer: HalfSerializer,
    switched: AtomicBool,
}

impl<T: Send + 'static> Subscriber<T> for ResumeSubscriber<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        self.arbiter.set(subscription);
    }

    fn on_next(&self, item: T) {
        self.arbiter.produced(1);
        self.serializer.on_next(&*self.downstream, item);
    }

    fn on_error(&self, error: FlowError) {
        if self.switched.swap(true, Ordering::AcqRel) || self.serializer.is_terminated() {
            self.arbiter.release();
            self.serializer.on_error(&*self.downstream, error);
            return;
        }
        debug!(kind = error.kind(), "upstream failed, switching to fallback");
        match (self.fallback)(error) {
            Ok(fallback) => {
                if let Some(this) = self.this.upgrade() {
                    fallback.subscribe(this);
                }
            }
            Err(error) => {
                self.arbiter.release();
                self.serializer.on_error(&*self.downstream, error);
            }
        }
    }

    fn on_complete(&self) {
        self.arbiter.release();
        self.serializer.on_complete(&*self.downstream);
    }
}

impl<T: Send + 'static> Subscription for ResumeSubscriber<T> {
    fn request(&self, n: i64) {
        match validate_request(n) {
            Ok(n) => self.arbiter.request(n),
            Err(error) => {
                warn!(requested = n, "non-positive request, failing the stream");
                self.arbiter.cancel();
                // no fallback for a protocol violation
                self.switched.store(true, Ordering::Release);
                self.serializer.on_error(&*self.downstream, error);
            }
        }
    }

    fn cancel(&self) {
        self.serializer.cancel();
        self.arbiter.cancel();
    }
}
