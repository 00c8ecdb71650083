//! # Multicast
//!
//! One upstream subscription shared by any number of subscribers. Items go
//! out in lockstep: the head item is emitted only once every current
//! subscriber has demand for it, so the slowest subscriber paces upstream.
//!
//! ```text
//!                          ┌──► subscriber₁ (demand d₁)
//! upstream ──► queue ──────┼──► subscriber₂ (demand d₂)   emit while min(dᵢ) > 0
//!  ▲ prefetch              └──► subscriberₖ (demand dₖ)
//!  └── request(limit) after limit = prefetch - prefetch / 4 items went out
//! ```
//!
//! - Items arriving while nobody is subscribed wait in the queue; upstream
//!   is never asked for more than `prefetch` unsent items.
//! - A subscriber joining mid-stream starts at the queue head.
//! - The upstream terminal is replayed to every subscriber, including ones
//!   arriving after it. Completion waits for the queue to empty; an error
//!   drops whatever is queued.
//! - A cancelled or failed subscriber just leaves; the others go on.

use crate::config::DEFAULT_PREFETCH;
use crate::metrics;
use crossbeam_channel::{unbounded, Receiver, Sender};
use dashmap::DashMap;
use flowline_types::{
    validate_request, Demand, DrainLoop, ErrorCollector, FlowError, FlowResult, Publisher,
    Subscriber, Subscription, UpstreamSlot,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Processor fanning one upstream out to many subscribers.
pub struct MulticastProcessor<T> {
    this: Weak<Self>,
    upstream: UpstreamSlot,
    prefetch: u64,
    limit: u64,
    /// Items sent since the last replenish; touched by the drain owner only.
    sent: AtomicU64,
    queue_tx: Sender<T>,
    queue_rx: Receiver<T>,
    subscribers: DashMap<u64, Arc<MulticastSubscription<T>>>,
    next_id: AtomicU64,
    terminal: Mutex<Option<FlowResult<()>>>,
    drain: DrainLoop,
}

impl<T: Clone + Send + 'static> MulticastProcessor<T> {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::with_prefetch(DEFAULT_PREFETCH)
    }

    /// `prefetch` is clamped to at least 1.
    #[must_use]
    pub fn with_prefetch(prefetch: usize) -> Arc<Self> {
        let prefetch = (prefetch.max(1) as u64).min(i64::MAX as u64);
        let (queue_tx, queue_rx) = unbounded();
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            upstream: UpstreamSlot::new(),
            prefetch,
            limit: (prefetch - prefetch / 4).max(1),
            sent: AtomicU64::new(0),
            queue_tx,
            queue_rx,
            subscribers: DashMap::new(),
            next_id: AtomicU64::new(0),
            terminal: Mutex::new(None),
            drain: DrainLoop::new(),
        })
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    fn schedule(&self) {
        if self.drain.enter() {
            self.run();
        }
    }

    fn run(&self) {
        let mut missed = 1;
        loop {
            self.drop_failed();
            self.emit_ready();

            let terminal = self.terminal.lock().clone();
            if let Some(signal) = terminal {
                if signal.is_err() || self.queue_rx.is_empty() {
                    self.finish_all(signal);
                }
            }

            missed = self.drain.leave(missed);
            if missed == 0 {
                return;
            }
        }
    }

    /// Fail subscribers that made an invalid request.
    fn drop_failed(&self) {
        let failed: Vec<_> = self
            .subscribers
            .iter()
            .filter(|entry| entry.value().bad_request.is_set())
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for subscription in failed {
            self.subscribers.remove(&subscription.id);
            if let Some(error) = subscription.bad_request.take() {
                metrics::record_error(error.kind());
                subscription.finish(Err(error));
            }
        }
    }

    /// Emit queued items for as long as every subscriber can take one.
    fn emit_ready(&self) {
        loop {
            if self.queue_rx.is_empty() {
                return;
            }
            // collect first: on_next may re-enter and touch the registry
            let targets: Vec<_> = self
                .subscribers
                .iter()
                .map(|entry| Arc::clone(entry.value()))
                .collect();
            if targets.is_empty() || targets.iter().any(|s| s.demand.get() == 0) {
                return;
            }
            let Ok(item) = self.queue_rx.try_recv() else {
                return;
            };
            for target in &targets {
                if target.demand.try_take_one() {
                    target.emit(item.clone());
                }
            }
            let sent = self.sent.load(Ordering::Relaxed) + 1;
            if sent == self.limit {
                self.sent.store(0, Ordering::Relaxed);
                self.upstream.request(self.limit);
            } else {
                self.sent.store(sent, Ordering::Relaxed);
            }
        }
    }

    fn finish_all(&self, signal: FlowResult<()>) {
        if signal.is_err() {
            while self.queue_rx.try_recv().is_ok() {}
        }
        let targets: Vec<_> = self
            .subscribers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for target in targets {
            self.subscribers.remove(&target.id);
            target.finish(signal.clone());
        }
    }

    fn terminate(&self, signal: FlowResult<()>) {
        {
            let mut terminal = self.terminal.lock();
            if terminal.is_some() {
                return;
            }
            debug!(failed = signal.is_err(), "multicast upstream terminated");
            *terminal = Some(signal);
        }
        self.upstream.release();
        self.schedule();
    }
}

impl<T: Clone + Send + 'static> Subscriber<T> for MulticastProcessor<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        if self.upstream.set(subscription) {
            self.upstream.request(self.prefetch);
        }
    }

    fn on_next(&self, item: T) {
        if self.terminal.lock().is_some() {
            return;
        }
        // the receiver lives as long as `self`, so the send cannot fail
        let _ = self.queue_tx.send(item);
        self.schedule();
    }

    fn on_error(&self, error: FlowError) {
        self.terminate(Err(error));
    }

    fn on_complete(&self) {
        self.terminate(Ok(()));
    }
}

impl<T: Clone + Send + 'static> Publisher<T> for MulticastProcessor<T> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        let Some(parent) = self.this.upgrade() else {
            return;
        };
        metrics::record_subscription();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let subscription = Arc::new(MulticastSubscription {
            id,
            parent,
            downstream: Arc::clone(&subscriber),
            demand: Demand::new(),
            bad_request: ErrorCollector::new(),
            done: AtomicBool::new(false),
        });
        subscriber.on_subscribe(subscription.clone());
        if subscription.done.load(Ordering::Acquire) {
            return;
        }
        self.subscribers.insert(id, subscription);
        debug!(subscriber = id, "multicast subscriber joined");
        self.schedule();
    }
}

/// One subscriber's view of the shared stream.
struct MulticastSubscription<T> {
    id: u64,
    parent: Arc<MulticastProcessor<T>>,
    downstream: Arc<dyn Subscriber<T>>,
    demand: Demand,
    bad_request: ErrorCollector,
    done: AtomicBool,
}

impl<T: Clone + Send + 'static> MulticastSubscription<T> {
    fn emit(&self, item: T) {
        if !self.done.load(Ordering::Acquire) {
            self.downstream.on_next(item);
        }
    }

    fn finish(&self, signal: FlowResult<()>) {
        if self.done.swap(true, Ordering::AcqRel) {
            return;
        }
        match signal {
            Ok(()) => self.downstream.on_complete(),
            Err(error) => self.downstream.on_error(error),
        }
    }
}

impl<T: Clone + Send + 'static> Subscription for MulticastSubscription<T> {
    fn request(&self, n: i64) {
        match validate_request(n) {
            Ok(n) => {
                self.demand.add(n);
            }
            Err(error) => {
                warn!(requested = n, "non-positive request, failing the subscriber");
                self.bad_request.add(error);
            }
        }
        self.parent.schedule();
    }

    fn cancel(&self) {
        if self.done.swap(true, Ordering::AcqRel) {
            return;
        }
        metrics::record_cancellation();
        debug!(subscriber = self.id, "multicast subscriber left");
        self.parent.subscribers.remove(&self.id);
        self.parent.schedule();
    }
}
