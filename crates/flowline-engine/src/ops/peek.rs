//! Side-effect hooks that observe signals without changing them.
//!
//! Each hook runs before the signal is forwarded. `on_terminate` fires once
//! for whichever of complete, error or cancel ends the stream first.

use flowline_types::{FlowError, Publisher, Subscriber, Subscription, UpstreamSlot};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

type ItemHook<T> = Arc<dyn Fn(&T) + Send + Sync>;
type ErrorHook = Arc<dyn Fn(&FlowError) + Send + Sync>;
type SignalHook = Arc<dyn Fn() + Send + Sync>;

/// Callbacks attached by a peek stage.
pub(crate) struct Hooks<T> {
    on_next: Option<ItemHook<T>>,
    on_error: Option<ErrorHook>,
    on_complete: Option<SignalHook>,
    on_cancel: Option<SignalHook>,
    on_terminate: Option<SignalHook>,
}

impl<T> Default for Hooks<T> {
    fn default() -> Self {
        Self {
            on_next: None,
            on_error: None,
            on_complete: None,
            on_cancel: None,
            on_terminate: None,
        }
    }
}

impl<T> Hooks<T> {
    pub(crate) fn next(hook: impl Fn(&T) + Send + Sync + 'static) -> Self {
        Self {
            on_next: Some(Arc::new(hook)),
            ..Self::default()
        }
    }

    pub(crate) fn error(hook: impl Fn(&FlowError) + Send + Sync + 'static) -> Self {
        Self {
            on_error: Some(Arc::new(hook)),
            ..Self::default()
        }
    }

    pub(crate) fn complete(hook: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            on_complete: Some(Arc::new(hook)),
            ..Self::default()
        }
    }

    pub(crate) fn cancel(hook: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            on_cancel: Some(Arc::new(hook)),
            ..Self::default()
        }
    }

    pub(crate) fn terminate(hook: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            on_terminate: Some(Arc::new(hook)),
            ..Self::default()
        }
    }
}

pub(crate) struct PeekPublisher<T> {
    upstream: Arc<dyn Publisher<T>>,
    hooks: Arc<Hooks<T>>,
}

impl<T> PeekPublisher<T> {
    pub(crate) fn new(upstream: Arc<dyn Publisher<T>>, hooks: Hooks<T>) -> Self {
        Self {
            upstream,
            hooks: Arc::new(hooks),
        }
    }
}

impl<T: Send + 'static> Publisher<T> for PeekPublisher<T> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        let peek = Arc::new_cyclic(|this| PeekSubscriber {
            this: this.clone(),
            downstream: subscriber,
            hooks: Arc::clone(&self.hooks),
            upstream: UpstreamSlot::new(),
            done: AtomicBool::new(false),
        });
        self.upstream.subscribe(peek);
    }
}

struct PeekSubscriber<T> {
    this: Weak<Self>,
    downstream: Arc<dyn Subscriber<T>>,
    hooks: Arc<Hooks<T>>,
    upstream: UpstreamSlot,
    done: AtomicBool,
}

impl<T> PeekSubscriber<T> {
    fn terminate(&self) {
        if let Some(hook) = &self.hooks.on_terminate {
            hook();
        }
    }
}

impl<T: Send + 'static> Subscriber<T> for PeekSubscriber<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        if !self.upstream.set(subscription) {
            return;
        }
        if let Some(this) = self.this.upgrade() {
            self.downstream.on_subscribe(this);
        }
    }

    fn on_next(&self, item: T) {
        if self.done.load(Ordering::Acquire) {
            return;
        }
        if let Some(hook) = &self.hooks.on_next {
            hook(&item);
        }
        self.downstream.on_next(item);
    }

    fn on_error(&self, error: FlowError) {
        if self.done.swap(true, Ordering::AcqRel) {
            return;
        }
        self.upstream.release();
        if let Some(hook) = &self.hooks.on_error {
            hook(&error);
        }
        self.terminate();
        self.downstream.on_error(error);
    }

    fn on_complete(&self) {
        if self.done.swap(true, Ordering::AcqRel) {
            return;
        }
        self.upstream.release();
        if let Some(hook) = &self.hooks.on_complete {
            hook();
        }
        self.terminate();
        self.downstream.on_complete();
    }
}

impl<T: Send + 'static> Subscription for PeekSubscriber<T> {
    fn request(&self, n: i64) {
        self.upstream.request_raw(n);
    }

    fn cancel(&self) {
        self.upstream.cancel();
        if self.done.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(hook) = &self.hooks.on_cancel {
            hook();
        }
        self.terminate();
    }
}
