//! Identity processor whose two ends can be connected in either order.
//!
//! Demand from the downstream is held until the upstream subscription
//! arrives. A terminal signal that arrives before the downstream is
//! replayed once the downstream subscribes. Only one downstream is
//! accepted.

use flowline_types::{
    noop_subscription, validate_request, FlowError, FlowResult, Publisher, Subscriber,
    Subscription, UpstreamSlot,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

/// Pass-through processor used as the inlet of a pre-built chain.
pub struct DeferredProcessor<T> {
    link: Arc<Link<T>>,
}

impl<T: Send + 'static> DeferredProcessor<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            link: Arc::new(Link {
                upstream: UpstreamSlot::new(),
                downstream: OnceLock::new(),
                gate: Mutex::new(Gate::default()),
                done: AtomicBool::new(false),
            }),
        }
    }
}

impl<T: Send + 'static> Default for DeferredProcessor<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct Gate {
    /// The downstream received `on_subscribe`.
    open: bool,
    pending: Option<FlowResult<()>>,
}

struct Link<T> {
    upstream: UpstreamSlot,
    downstream: OnceLock<Arc<dyn Subscriber<T>>>,
    gate: Mutex<Gate>,
    done: AtomicBool,
}

impl<T: Send + 'static> Link<T> {
    fn terminate(&self, signal: FlowResult<()>) {
        if self.done.swap(true, Ordering::AcqRel) {
            return;
        }
        self.upstream.release();
        {
            let mut gate = self.gate.lock();
            if !gate.open {
                debug!("terminal signal held until a downstream subscribes");
                gate.pending = Some(signal);
                return;
            }
        }
        self.deliver(signal);
    }

    fn deliver(&self, signal: FlowResult<()>) {
        if let Some(downstream) = self.downstream.get() {
            match signal {
                Ok(()) => downstream.on_complete(),
                Err(error) => downstream.on_error(error),
            }
        }
    }
}

impl<T: Send + 'static> Subscription for Link<T> {
    fn request(&self, n: i64) {
        match validate_request(n) {
            Ok(n) => self.upstream.request(n),
            Err(_) if self.upstream.is_set() && !self.upstream.is_cancelled() => {
                self.upstream.request_raw(n);
            }
            Err(error) => {
                warn!(requested = n, "non-positive request before upstream arrived");
                self.upstream.cancel();
                self.terminate(Err(error));
            }
        }
    }

    fn cancel(&self) {
        if self.upstream.cancel() {
            debug!("deferred processor cancelled");
        }
    }
}

impl<T: Send + 'static> Subscriber<T> for DeferredProcessor<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        self.link.upstream.set(subscription);
    }

    fn on_next(&self, item: T) {
        if self.link.done.load(Ordering::Acquire) {
            return;
        }
        if let Some(downstream) = self.link.downstream.get() {
            downstream.on_next(item);
        }
    }

    fn on_error(&self, error: FlowError) {
        self.link.terminate(Err(error));
    }

    fn on_complete(&self) {
        self.link.terminate(Ok(()));
    }
}

impl<T: Send + 'static> Publisher<T> for DeferredProcessor<T> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        if self.link.downstream.set(Arc::clone(&subscriber)).is_err() {
            warn!("deferred processor accepts a single subscriber");
            subscriber.on_subscribe(noop_subscription());
            subscriber.on_error(FlowError::IllegalState(
                "processor already has a subscriber",
            ));
            return;
        }
        let link: Arc<dyn Subscription> = self.link.clone();
        subscriber.on_subscribe(link);
        let pending = {
            let mut gate = self.link.gate.lock();
            gate.open = true;
            gate.pending.take()
        };
        if let Some(signal) = pending {
            self.link.deliver(signal);
        }
    }
}
