//! # Sequential Flat-Map
//!
//! Maps each upstream item to an inner publisher and drains the inners
//! strictly one after another. The outer stream is asked for one item at a
//! time: the first on subscribe, the next when the active inner completes.
//!
//! ```text
//! outer ──item──► mapper ──► inner₁ ──items──┐
//!   ▲                                        ├──► arbiter ──► downstream
//!   └──── request(1) on inner completion ────┘
//! ```
//!
//! `active` counts the outer stream plus the running inner; the downstream
//! completes when it drops to zero.

use super::InnerMapper;
use crate::arbiter::SubscriptionArbiter;
use crate::serializer::HalfSerializer;
use flowline_types::{
    validate_request, FlowError, Publisher, Subscriber, Subscription, UpstreamSlot,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

pub(crate) struct ConcatMapPublisher<T, R> {
    upstream: Arc<dyn Publisher<T>>,
    mapper: InnerMapper<T, R>,
}

impl<T, R> ConcatMapPublisher<T, R> {
    pub(crate) fn new(upstream: Arc<dyn Publisher<T>>, mapper: InnerMapper<T, R>) -> Self {
        Self { upstream, mapper }
    }
}

impl<T: Send + 'static, R: Send + 'static> Publisher<R> for ConcatMapPublisher<T, R> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<R>>) {
        let outer = Arc::new_cyclic(|this| ConcatMapSubscriber {
            this: this.clone(),
            downstream: subscriber,
            mapper: Arc::clone(&self.mapper),
            upstream: UpstreamSlot::new(),
            arbiter: SubscriptionArbiter::new(),
            serializer: HalfSerializer::new(),
            active: AtomicUsize::new(1),
        });
        self.upstream.subscribe(outer);
    }
}

struct ConcatMapSubscriber<T, R> {
    this: Weak<Self>,
    downstream: Arc<dyn Subscriber<R>>,
    mapper: InnerMapper<T, R>,
    upstream: UpstreamSlot,
    arbiter: SubscriptionArbiter,
    serializer: HalfSerializer,
    active: AtomicUsize,
}

impl<T: Send + 'static, R: Send + 'static> ConcatMapSubscriber<T, R> {
    fn fail(&self, error: FlowError) {
        self.upstream.cancel();
        self.arbiter.cancel();
        self.serializer.on_error(&*self.downstream, error);
    }

    /// The outer stream or an inner finished. The last one out completes
    /// the downstream; a finished inner otherwise pulls the next outer item.
    fn leave(&self, pull_next: bool) {
        if self.active.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.upstream.release();
            self.arbiter.release();
            self.serializer.on_complete(&*self.downstream);
        } else if pull_next {
            self.upstream.request(1);
        }
    }
}

impl<T: Send + 'static, R: Send + 'static> Subscriber<T> for ConcatMapSubscriber<T, R> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        if !self.upstream.set(subscription) {
            return;
        }
        if let Some(this) = self.this.upgrade() {
            self.downstream.on_subscribe(this);
        }
        self.upstream.request(1);
    }

    fn on_next(&self, item: T) {
        if self.serializer.is_terminated() {
            return;
        }
        match (self.mapper)(item) {
            Ok(inner) => {
                let Some(parent) = self.this.upgrade() else {
                    return;
                };
                self.active.fetch_add(1, Ordering::AcqRel);
                inner.subscribe(Arc::new(ConcatInner { parent }));
            }
            Err(error) => {
                debug!(kind = error.kind(), "concat-map mapper failed");
                self.fail(error);
            }
        }
    }

    fn on_error(&self, error: FlowError) {
        self.upstream.release();
        self.arbiter.cancel();
        self.serializer.on_error(&*self.downstream, error);
    }

    fn on_complete(&self) {
        self.leave(false);
    }
}

impl<T: Send + 'static, R: Send + 'static> Subscription for ConcatMapSubscriber<T, R> {
    fn request(&self, n: i64) {
        match validate_request(n) {
            Ok(n) => self.arbiter.request(n),
            Err(error) => {
                warn!(requested = n, "non-positive request, failing the stream");
                self.fail(error);
            }
        }
    }

    fn cancel(&self) {
        if self.serializer.cancel() {
            debug!("concat-map cancelled");
        }
        self.upstream.cancel();
        self.arbiter.cancel();
    }
}

/// Subscriber attached to the active inner publisher.
struct ConcatInner<T, R> {
    parent: Arc<ConcatMapSubscriber<T, R>>,
}

impl<T: Send + 'static, R: Send + 'static> Subscriber<R> for ConcatInner<T, R> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        self.parent.arbiter.set(subscription);
    }

    fn on_next(&self, item: R) {
        self.parent.arbiter.produced(1);
        self.parent.serializer.on_next(&*self.parent.downstream, item);
    }

    fn on_error(&self, error: FlowError) {
        self.parent.upstream.cancel();
        self.parent.arbiter.release();
        self.parent.serializer.on_error(&*self.parent.downstream, error);
    }

    fn on_complete(&self) {
        self.parent.leave(true);
    }
}
