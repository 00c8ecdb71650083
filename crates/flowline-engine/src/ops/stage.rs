//! # Item Stages
//!
//! One subscriber type carries every operator that looks at items one at a
//! time (map, filter, take/drop-while, limit, skip). The operator itself is
//! a [`StageLogic`] deciding what each item turns into; the stage handles
//! the protocol around it.
//!
//! ```text
//! upstream ──on_next(t)──► StageSubscriber ──logic.on_item(t)──► Step
//!                              │                                   │
//!                              │◄── Skip: request(1) upstream ─────┤
//!                              └── Emit / Complete / Fail ──► downstream
//! ```

use flowline_types::{
    validate_request, FlowError, Publisher, Subscriber, Subscription, UpstreamSlot,
};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

/// What a stage does with one upstream item.
pub(crate) enum Step<R> {
    Emit(R),
    /// Drop the item and ask upstream for a replacement.
    Skip,
    /// Drop the item; its replacement was already requested.
    Discard,
    /// Emit the item, then cancel upstream and complete.
    EmitAndComplete(R),
    /// Cancel upstream and complete without emitting.
    Complete,
    /// Cancel upstream and fail.
    Fail(FlowError),
}

/// Per-subscription behaviour of an item stage.
pub(crate) trait StageLogic<T, R>: Send + Sync + 'static {
    fn on_item(&self, item: T) -> Step<R>;

    /// Amount actually forwarded upstream for a downstream `request(n)`.
    fn forward_request(&self, n: u64) -> u64 {
        n
    }

    /// The stage is over before its first item.
    fn completes_immediately(&self) -> bool {
        false
    }
}

type LogicFactory<L> = Arc<dyn Fn() -> L + Send + Sync>;

/// Publisher applying a fresh `L` to each subscription of `upstream`.
pub(crate) struct StagePublisher<T, R, L> {
    upstream: Arc<dyn Publisher<T>>,
    factory: LogicFactory<L>,
    _output: PhantomData<fn() -> R>,
}

impl<T, R, L> StagePublisher<T, R, L> {
    pub(crate) fn new(
        upstream: Arc<dyn Publisher<T>>,
        factory: impl Fn() -> L + Send + Sync + 'static,
    ) -> Self {
        Self {
            upstream,
            factory: Arc::new(factory),
            _output: PhantomData,
        }
    }
}

impl<T, R, L> Publisher<R> for StagePublisher<T, R, L>
where
    T: Send + 'static,
    R: Send + 'static,
    L: StageLogic<T, R>,
{
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<R>>) {
        let stage = StageSubscriber::new(subscriber, (self.factory)());
        self.upstream.subscribe(stage);
    }
}

struct StageSubscriber<T, R, L> {
    this: Weak<Self>,
    downstream: Arc<dyn Subscriber<R>>,
    logic: L,
    upstream: UpstreamSlot,
    done: AtomicBool,
    _input: PhantomData<fn(T)>,
}

impl<T, R, L> StageSubscriber<T, R, L>
where
    T: Send + 'static,
    R: Send + 'static,
    L: StageLogic<T, R>,
{
    fn new(downstream: Arc<dyn Subscriber<R>>, logic: L) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            downstream,
            logic,
            upstream: UpstreamSlot::new(),
            done: AtomicBool::new(false),
            _input: PhantomData,
        })
    }

    fn complete(&self) {
        if !self.done.swap(true, Ordering::AcqRel) {
            self.upstream.release();
            self.downstream.on_complete();
        }
    }

    fn fail(&self, error: FlowError) {
        if !self.done.swap(true, Ordering::AcqRel) {
            self.upstream.release();
            self.downstream.on_error(error);
        }
    }
}

impl<T, R, L> Subscriber<T> for StageSubscriber<T, R, L>
where
    T: Send + 'static,
    R: Send + 'static,
    L: StageLogic<T, R>,
{
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        if !self.upstream.set(subscription) {
            return;
        }
        let Some(this) = self.this.upgrade() else {
            return;
        };
        self.downstream.on_subscribe(this);
        if self.logic.completes_immediately() {
            self.upstream.cancel();
            self.complete();
        }
    }

    fn on_next(&self, item: T) {
        if self.done.load(Ordering::Acquire) {
            return;
        }
        match self.logic.on_item(item) {
            Step::Emit(value) => self.downstream.on_next(value),
            Step::Skip => self.upstream.request(1),
            Step::Discard => {}
            Step::EmitAndComplete(value) => {
                self.downstream.on_next(value);
                self.upstream.cancel();
                self.complete();
            }
            Step::Complete => {
                self.upstream.cancel();
                self.complete();
            }
            Step::Fail(error) => {
                debug!(kind = error.kind(), "stage callback failed, cancelling upstream");
                self.upstream.cancel();
                self.fail(error);
            }
        }
    }

    fn on_error(&self, error: FlowError) {
        self.fail(error);
    }

    fn on_complete(&self) {
        self.complete();
    }
}

impl<T, R, L> Subscription for StageSubscriber<T, R, L>
where
    T: Send + 'static,
    R: Send + 'static,
    L: StageLogic<T, R>,
{
    fn request(&self, n: i64) {
        match validate_request(n) {
            Ok(n) => {
                let forward = self.logic.forward_request(n);
                if forward > 0 {
                    self.upstream.request(forward);
                }
            }
            // the source reports the violation through the serialized path
            Err(_) => self.upstream.request_raw(n),
        }
    }

    fn cancel(&self) {
        self.upstream.cancel();
    }
}
