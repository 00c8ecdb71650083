//! # Coupled Processor
//!
//! Joins an independent subscriber and publisher into one processor. Items
//! from upstream go to the subscriber; the downstream receives what the
//! publisher emits. The two halves share their fate:
//!
//! ```text
//! upstream ───► inlet ───► subscriber
//!                 ▲
//!                 │ cross-termination
//!                 ▼
//! downstream ◄── outlet ◄── publisher
//! ```
//!
//! | Event | Inlet (subscriber) | Outlet (downstream) |
//! |-------|--------------------|---------------------|
//! | upstream completes / fails | same signal | same signal, publisher cancelled |
//! | subscriber cancels | upstream cancelled | completes, publisher cancelled |
//! | publisher completes / fails | same signal, upstream cancelled | same signal |
//! | downstream cancels | completes, upstream cancelled | publisher cancelled |
//!
//! A half that ends before its receiver got `on_subscribe` is opened first,
//! then terminated.

use crate::serializer::HalfSerializer;
use flowline_types::{
    noop_subscription, validate_request, FlowError, FlowResult, Publisher, Subscriber,
    Subscription, UpstreamSlot,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use tracing::{debug, warn};

/// Processor routing upstream into `subscriber` and `publisher` into the
/// downstream, with termination and cancellation crossing over.
pub struct CoupledProcessor<T, R> {
    coupling: Arc<Coupling<T, R>>,
}

impl<T: Send + 'static, R: Send + 'static> CoupledProcessor<T, R> {
    pub fn new(subscriber: Arc<dyn Subscriber<T>>, publisher: Arc<dyn Publisher<R>>) -> Self {
        let coupling = Arc::new_cyclic(|this| Coupling {
            this: this.clone(),
            publisher,
            upstream: UpstreamSlot::new(),
            inlet: End::with_receiver(subscriber),
            source: UpstreamSlot::new(),
            outlet: End::new(),
        });
        Self { coupling }
    }
}

#[derive(Default, Clone, Copy, PartialEq, Eq)]
enum GateState {
    #[default]
    Closed,
    Opening,
    Open,
}

#[derive(Default)]
struct Gate {
    state: GateState,
    pending: Option<FlowResult<()>>,
}

/// One receiving half: its subscriber, plus ordering of `on_subscribe`
/// ahead of everything else.
struct End<X> {
    receiver: OnceLock<Arc<dyn Subscriber<X>>>,
    serializer: HalfSerializer,
    gate: Mutex<Gate>,
    ended: AtomicBool,
}

impl<X: Send + 'static> End<X> {
    fn new() -> Self {
        Self {
            receiver: OnceLock::new(),
            serializer: HalfSerializer::new(),
            gate: Mutex::new(Gate::default()),
            ended: AtomicBool::new(false),
        }
    }

    fn with_receiver(receiver: Arc<dyn Subscriber<X>>) -> Self {
        let end = Self::new();
        let _ = end.receiver.set(receiver);
        end
    }

    /// Hand `subscription` to the receiver unless that already happened,
    /// then flush a terminal that arrived meanwhile.
    fn open(&self, subscription: Arc<dyn Subscription>) {
        let Some(receiver) = self.receiver.get() else {
            return;
        };
        {
            let mut gate = self.gate.lock();
            if gate.state != GateState::Closed {
                return;
            }
            gate.state = GateState::Opening;
        }
        receiver.on_subscribe(subscription);
        let pending = {
            let mut gate = self.gate.lock();
            gate.state = GateState::Open;
            gate.pending.take()
        };
        if let Some(signal) = pending {
            self.deliver(signal);
        }
    }

    fn next(&self, item: X) {
        if let Some(receiver) = self.receiver.get() {
            self.serializer.on_next(receiver.as_ref(), item);
        }
    }

    /// Returns `true` for the first call.
    fn end(&self) -> bool {
        !self.ended.swap(true, Ordering::AcqRel)
    }

    /// Deliver `signal`, or park it until the receiver is open. A closed
    /// half with a receiver is opened with `subscription` first.
    fn terminate<F>(&self, signal: FlowResult<()>, subscription: F)
    where
        F: FnOnce() -> Arc<dyn Subscription>,
    {
        {
            let mut gate = self.gate.lock();
            if gate.state != GateState::Open {
                let closed = gate.state == GateState::Closed;
                gate.pending.get_or_insert(signal);
                drop(gate);
                if closed {
                    self.open(subscription());
                }
                return;
            }
        }
        self.deliver(signal);
    }

    fn cancel(&self) -> bool {
        self.serializer.cancel()
    }

    fn deliver(&self, signal: FlowResult<()>) {
        let Some(receiver) = self.receiver.get() else {
            return;
        };
        match signal {
            Ok(()) => self.serializer.on_complete(receiver.as_ref()),
            Err(error) => {
                self.serializer.on_error(receiver.as_ref(), error);
            }
        }
    }
}

struct Coupling<T, R> {
    this: Weak<Self>,
    publisher: Arc<dyn Publisher<R>>,
    // upstream ──► subscriber
    upstream: UpstreamSlot,
    inlet: End<T>,
    // publisher ──► downstream
    source: UpstreamSlot,
    outlet: End<R>,
}

impl<T: Send + 'static, R: Send + 'static> Coupling<T, R> {
    fn inlet_subscription(&self) -> Arc<dyn Subscription> {
        Arc::new(InletSubscription {
            coupling: self.this.clone(),
        })
    }

    fn outlet_subscription(&self) -> Arc<dyn Subscription> {
        Arc::new(OutletSubscription {
            coupling: self.this.clone(),
        })
    }

    /// End the inlet with `signal`, cancelling upstream.
    fn close_inlet(&self, signal: FlowResult<()>) {
        self.upstream.cancel();
        if self.inlet.end() {
            debug!(failed = signal.is_err(), "coupled outlet ended, closing inlet");
            self.inlet.terminate(signal, || self.inlet_subscription());
        }
    }

    /// End the outlet with `signal`, cancelling the publisher.
    fn close_outlet(&self, signal: FlowResult<()>) {
        self.source.cancel();
        if self.outlet.end() {
            debug!(failed = signal.is_err(), "coupled inlet ended, closing outlet");
            self.outlet.terminate(signal, || self.outlet_subscription());
        }
    }

    fn upstream_terminated(&self, signal: FlowResult<()>) {
        self.upstream.release();
        if self.inlet.end() {
            self.inlet.terminate(signal.clone(), || self.inlet_subscription());
        }
        self.close_outlet(signal);
    }

    fn publisher_terminated(&self, signal: FlowResult<()>) {
        self.source.release();
        if self.outlet.end() {
            self.outlet.terminate(signal.clone(), || self.outlet_subscription());
        }
        self.close_inlet(signal);
    }
}

impl<T: Send + 'static, R: Send + 'static> Subscriber<T> for CoupledProcessor<T, R> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        if self.coupling.upstream.set(subscription) {
            self.coupling.inlet.open(self.coupling.inlet_subscription());
        }
    }

    fn on_next(&self, item: T) {
        self.coupling.inlet.next(item);
    }

    fn on_error(&self, error: FlowError) {
        self.coupling.upstream_terminated(Err(error));
    }

    fn on_complete(&self) {
        self.coupling.upstream_terminated(Ok(()));
    }
}

impl<T: Send + 'static, R: Send + 'static> Publisher<R> for CoupledProcessor<T, R> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<R>>) {
        let coupling = &self.coupling;
        if coupling.outlet.receiver.set(Arc::clone(&subscriber)).is_err() {
            warn!("coupled processor accepts a single subscriber");
            subscriber.on_subscribe(noop_subscription());
            subscriber.on_error(FlowError::IllegalState(
                "processor already has a subscriber",
            ));
            return;
        }
        coupling.outlet.open(coupling.outlet_subscription());
        if coupling.source.is_cancelled() {
            return;
        }
        let outlet: Arc<dyn Subscriber<R>> = Arc::new(OutletSubscriber {
            coupling: Arc::clone(coupling),
        });
        coupling.publisher.subscribe(outlet);
    }
}

/// Handed to the inner subscriber.
struct InletSubscription<T, R> {
    coupling: Weak<Coupling<T, R>>,
}

impl<T: Send + 'static, R: Send + 'static> Subscription for InletSubscription<T, R> {
    fn request(&self, n: i64) {
        let Some(coupling) = self.coupling.upgrade() else {
            return;
        };
        match validate_request(n) {
            Ok(n) => coupling.upstream.request(n),
            Err(_) => coupling.upstream.request_raw(n),
        }
    }

    fn cancel(&self) {
        let Some(coupling) = self.coupling.upgrade() else {
            return;
        };
        coupling.inlet.end();
        if coupling.inlet.cancel() {
            debug!("coupled subscriber cancelled");
        }
        coupling.upstream.cancel();
        coupling.close_outlet(Ok(()));
    }
}

/// Subscribed to the inner publisher.
struct OutletSubscriber<T, R> {
    coupling: Arc<Coupling<T, R>>,
}

impl<T: Send + 'static, R: Send + 'static> Subscriber<R> for OutletSubscriber<T, R> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        self.coupling.source.set(subscription);
    }

    fn on_next(&self, item: R) {
        self.coupling.outlet.next(item);
    }

    fn on_error(&self, error: FlowError) {
        self.coupling.publisher_terminated(Err(error));
    }

    fn on_complete(&self) {
        self.coupling.publisher_terminated(Ok(()));
    }
}

/// Handed to the downstream.
struct OutletSubscription<T, R> {
    coupling: Weak<Coupling<T, R>>,
}

impl<T: Send + 'static, R: Send + 'static> Subscription for OutletSubscription<T, R> {
    fn request(&self, n: i64) {
        let Some(coupling) = self.coupling.upgrade() else {
            return;
        };
        match validate_request(n) {
            Ok(n) => coupling.source.request(n),
            Err(_) => coupling.source.request_raw(n),
        }
    }

    fn cancel(&self) {
        let Some(coupling) = self.coupling.upgrade() else {
            return;
        };
        coupling.outlet.end();
        if coupling.outlet.cancel() {
            debug!("coupled downstream cancelled");
        }
        coupling.source.cancel();
        coupling.close_inlet(Ok(()));
    }
}
