//! # Bounded-Concurrency Flat-Map
//!
//! Maps each outer item to an inner publisher and merges up to
//! `max_concurrency` inners into one downstream.
//!
//! ## Flow
//!
//! ```text
//!                 ┌─ inner₁ ─ queue₁ ─┐
//! outer ─mapper──►├─ inner₂ ─ queue₂ ─┼──► ready queue ──► drain loop ──► downstream
//!   ▲             └─ innerₖ ─ queueₖ ─┘                        │
//!   └──────────── request(1) when an inner retires ────────────┘
//! ```
//!
//! - Only the drain-loop owner calls downstream `on_next`. When nobody owns
//!   the loop, a downstream with demand and an empty inner queue is fed
//!   directly (fast path).
//! - Every queued item has exactly one entry in the ready queue naming its
//!   inner, so the drain consumes items in arrival order across inners.
//! - An inner is retired once it completed and its queue is empty. Retiring
//!   frees its concurrency slot and pulls one more outer item.
//! - Each inner is asked for `prefetch` items and topped up after
//!   `prefetch - prefetch / 4` of them were consumed, so no inner ever has
//!   more than `prefetch` items buffered.
//!
//! ## Errors
//!
//! Fail-fast (default) cancels the outer and every inner on the first error.
//! With `delay_errors` the error is collected and every other inner keeps
//! draining; the aggregate is delivered once everything finished. A failing
//! mapper cancels the outer stream and goes through the same path. A
//! non-positive downstream request always fails fast, and its error replaces
//! whatever was collected so far.

use super::InnerMapper;
use crate::config::FlatMapConfig;
use crate::metrics;
use crossbeam_channel::{unbounded, Receiver, Sender};
use dashmap::DashMap;
use flowline_types::{
    validate_request, Demand, DrainLoop, ErrorCollector, FlowError, Publisher, Subscriber,
    Subscription, UpstreamSlot, UNBOUNDED,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

pub(crate) struct FlatMapPublisher<T, R> {
    upstream: Arc<dyn Publisher<T>>,
    mapper: InnerMapper<T, R>,
    config: FlatMapConfig,
}

impl<T, R> FlatMapPublisher<T, R> {
    pub(crate) fn new(
        upstream: Arc<dyn Publisher<T>>,
        mapper: InnerMapper<T, R>,
        config: FlatMapConfig,
    ) -> Self {
        Self {
            upstream,
            mapper,
            config,
        }
    }
}

impl<T: Send + 'static, R: Send + 'static> Publisher<R> for FlatMapPublisher<T, R> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<R>>) {
        let merge = MergeSubscriber::new(subscriber, Arc::clone(&self.mapper), self.config);
        self.upstream.subscribe(merge);
    }
}

fn as_demand(n: usize) -> u64 {
    if n == usize::MAX {
        UNBOUNDED
    } else {
        (n as u64).min(UNBOUNDED)
    }
}

struct MergeSubscriber<T, R> {
    this: Weak<Self>,
    downstream: Arc<dyn Subscriber<R>>,
    mapper: InnerMapper<T, R>,
    config: FlatMapConfig,
    upstream: UpstreamSlot,
    requested: Demand,
    drain: DrainLoop,
    errors: ErrorCollector,
    /// Downstream protocol violation; delivered instead of `errors`.
    violation: Mutex<Option<FlowError>>,
    /// Set once `violation` holds an error. Ends the stream even when errors
    /// are delayed.
    fatal: AtomicBool,
    outer_done: AtomicBool,
    inners: DashMap<u64, Arc<InnerSubscriber<T, R>>>,
    next_id: AtomicU64,
    ready_tx: Sender<Arc<InnerSubscriber<T, R>>>,
    ready_rx: Receiver<Arc<InnerSubscriber<T, R>>>,
    finished_tx: Sender<Arc<InnerSubscriber<T, R>>>,
    finished_rx: Receiver<Arc<InnerSubscriber<T, R>>>,
}

impl<T: Send + 'static, R: Send + 'static> MergeSubscriber<T, R> {
    fn new(
        downstream: Arc<dyn Subscriber<R>>,
        mapper: InnerMapper<T, R>,
        config: FlatMapConfig,
    ) -> Arc<Self> {
        let (ready_tx, ready_rx) = unbounded();
        let (finished_tx, finished_rx) = unbounded();
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            downstream,
            mapper,
            config,
            upstream: UpstreamSlot::new(),
            requested: Demand::new(),
            drain: DrainLoop::new(),
            errors: ErrorCollector::new(),
            violation: Mutex::new(None),
            fatal: AtomicBool::new(false),
            outer_done: AtomicBool::new(false),
            inners: DashMap::new(),
            next_id: AtomicU64::new(0),
            ready_tx,
            ready_rx,
            finished_tx,
            finished_rx,
        })
    }

    fn fails_fast(&self) -> bool {
        !self.config.delay_errors || self.fatal.load(Ordering::Acquire)
    }

    fn has_error(&self) -> bool {
        self.fatal.load(Ordering::Acquire) || self.errors.is_set()
    }

    /// Record an error and stop whatever it stops.
    fn raise(&self, error: FlowError) {
        metrics::record_error(error.kind());
        self.errors.add(error);
        if self.fails_fast() {
            self.stop_sources();
        }
        self.schedule();
    }

    /// Fail with `error` alone, dropping any delayed errors.
    fn violate(&self, error: FlowError) {
        metrics::record_error(error.kind());
        {
            let mut violation = self.violation.lock();
            if violation.is_none() {
                *violation = Some(error);
            }
        }
        self.fatal.store(true, Ordering::Release);
        self.stop_sources();
        self.schedule();
    }

    fn stop_sources(&self) {
        self.outer_done.store(true, Ordering::Release);
        self.cancel_sources();
    }

    fn cancel_sources(&self) {
        self.upstream.cancel();
        // collect first: cancelling may re-enter and touch the registry
        let active: Vec<_> = self.inners.iter().map(|e| Arc::clone(e.value())).collect();
        for inner in active {
            inner.upstream.cancel();
        }
    }

    fn clear(&self) {
        self.inners.clear();
        while self.ready_rx.try_recv().is_ok() {}
        while self.finished_rx.try_recv().is_ok() {}
        self.upstream.release();
    }

    fn schedule(&self) {
        if self.drain.enter() {
            self.run(1);
        }
    }

    fn inner_next(&self, inner: &Arc<InnerSubscriber<T, R>>, item: R) {
        if self.drain.is_terminated() {
            return;
        }
        if self.drain.try_claim() {
            if inner.queue_rx.is_empty() && self.requested.try_take_one() {
                self.downstream.on_next(item);
                inner.consumed_one();
            } else {
                self.enqueue(inner, item);
            }
            let missed = self.drain.leave(1);
            if missed != 0 {
                self.run(missed);
            }
        } else {
            self.enqueue(inner, item);
            self.schedule();
        }
    }

    fn enqueue(&self, inner: &Arc<InnerSubscriber<T, R>>, item: R) {
        // both channels are owned by live receivers, so sends cannot fail
        let _ = inner.queue_tx.send(item);
        let _ = self.ready_tx.send(Arc::clone(inner));
    }

    fn inner_error(&self, inner: &Arc<InnerSubscriber<T, R>>, error: FlowError) {
        inner.done.store(true, Ordering::Release);
        let _ = self.finished_tx.send(Arc::clone(inner));
        self.raise(error);
    }

    fn inner_complete(&self, inner: &Arc<InnerSubscriber<T, R>>) {
        inner.done.store(true, Ordering::Release);
        let _ = self.finished_tx.send(Arc::clone(inner));
        self.schedule();
    }

    fn retire(&self, inner: &InnerSubscriber<T, R>) {
        if inner.retired.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inners.remove(&inner.id);
        inner.upstream.release();
        debug!(inner = inner.id, "inner stream retired");
        if !self.outer_done.load(Ordering::Acquire) && self.config.max_concurrency != usize::MAX {
            self.upstream.request(1);
        }
    }

    fn terminate(&self) {
        if !self.drain.finish() {
            self.clear();
            return;
        }
        self.cancel_sources();
        self.clear();
        let violation = self.violation.lock().take();
        match violation.or_else(|| self.errors.take()) {
            Some(error) => {
                debug!(kind = error.kind(), "flat-map failed");
                self.downstream.on_error(error);
            }
            None => {
                debug!("flat-map completed");
                self.downstream.on_complete();
            }
        }
    }

    /// Drain loop body. The caller owns the loop with `missed` pending
    /// entries.
    fn run(&self, mut missed: usize) {
        loop {
            if self.drain.is_terminated() {
                self.clear();
                return;
            }
            if self.fails_fast() && self.has_error() {
                self.terminate();
                return;
            }

            while let Ok(inner) = self.finished_rx.try_recv() {
                if inner.queue_rx.is_empty() {
                    self.retire(&inner);
                }
            }

            let requested = self.requested.get();
            let mut emitted: u64 = 0;
            while emitted != requested {
                if self.drain.is_terminated() {
                    self.clear();
                    return;
                }
                if self.fails_fast() && self.has_error() {
                    self.terminate();
                    return;
                }
                let Ok(inner) = self.ready_rx.try_recv() else {
                    break;
                };
                let Ok(item) = inner.queue_rx.try_recv() else {
                    continue;
                };
                self.downstream.on_next(item);
                emitted += 1;
                inner.consumed_one();
                if inner.done.load(Ordering::Acquire) && inner.queue_rx.is_empty() {
                    self.retire(&inner);
                }
            }
            if emitted > 0 {
                self.requested.produced(emitted);
            }

            // outer_done first: once it is set every inner is registered
            if self.outer_done.load(Ordering::Acquire) && self.inners.is_empty() {
                self.terminate();
                return;
            }

            missed = self.drain.leave(missed);
            if missed == 0 {
                return;
            }
        }
    }
}

impl<T: Send + 'static, R: Send + 'static> Subscriber<T> for MergeSubscriber<T, R> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        if !self.upstream.set(subscription) {
            return;
        }
        if let Some(this) = self.this.upgrade() {
            self.downstream.on_subscribe(this);
        }
        self.upstream.request(as_demand(self.config.max_concurrency));
    }

    fn on_next(&self, item: T) {
        if self.drain.is_terminated() || self.outer_done.load(Ordering::Acquire) {
            return;
        }
        match (self.mapper)(item) {
            Ok(publisher) => {
                let Some(parent) = self.this.upgrade() else {
                    return;
                };
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let inner = InnerSubscriber::new(id, parent, self.config.prefetch);
                self.inners.insert(id, Arc::clone(&inner));
                metrics::record_inner_stream();
                publisher.subscribe(inner);
            }
            Err(error) => {
                debug!(kind = error.kind(), "flat-map mapper failed, cancelling outer");
                self.upstream.cancel();
                self.outer_done.store(true, Ordering::Release);
                self.raise(error);
            }
        }
    }

    fn on_error(&self, error: FlowError) {
        self.outer_done.store(true, Ordering::Release);
        self.upstream.release();
        self.raise(error);
    }

    fn on_complete(&self) {
        self.outer_done.store(true, Ordering::Release);
        self.upstream.release();
        self.schedule();
    }
}

impl<T: Send + 'static, R: Send + 'static> Subscription for MergeSubscriber<T, R> {
    fn request(&self, n: i64) {
        match validate_request(n) {
            Ok(n) => {
                self.requested.add(n);
                self.schedule();
            }
            Err(error) => {
                warn!(requested = n, "non-positive request, failing the stream");
                self.violate(error);
            }
        }
    }

    fn cancel(&self) {
        if self.drain.cancel() {
            debug!("flat-map cancelled");
            self.cancel_sources();
            self.schedule();
        }
    }
}

/// One subscribed inner publisher.
struct InnerSubscriber<T, R> {
    id: u64,
    parent: Arc<MergeSubscriber<T, R>>,
    this: Weak<Self>,
    upstream: UpstreamSlot,
    queue_tx: Sender<R>,
    queue_rx: Receiver<R>,
    done: AtomicBool,
    retired: AtomicBool,
    prefetch: u64,
    /// Replenish threshold, zero when the inner is unbounded.
    limit: u64,
    /// Consumed since the last replenish. Only the drain owner touches it.
    produced: AtomicU64,
}

impl<T: Send + 'static, R: Send + 'static> InnerSubscriber<T, R> {
    fn new(id: u64, parent: Arc<MergeSubscriber<T, R>>, prefetch: usize) -> Arc<Self> {
        let prefetch = as_demand(prefetch);
        let limit = if prefetch == UNBOUNDED {
            0
        } else {
            prefetch - prefetch / 4
        };
        let (queue_tx, queue_rx) = unbounded();
        Arc::new_cyclic(|this| Self {
            id,
            parent,
            this: this.clone(),
            upstream: UpstreamSlot::new(),
            queue_tx,
            queue_rx,
            done: AtomicBool::new(false),
            retired: AtomicBool::new(false),
            prefetch,
            limit,
            produced: AtomicU64::new(0),
        })
    }

    fn consumed_one(&self) {
        if self.limit == 0 {
            return;
        }
        let produced = self.produced.load(Ordering::Relaxed) + 1;
        if produced == self.limit {
            self.produced.store(0, Ordering::Relaxed);
            self.upstream.request(produced);
        } else {
            self.produced.store(produced, Ordering::Relaxed);
        }
    }
}

impl<T: Send + 'static, R: Send + 'static> Subscriber<R> for InnerSubscriber<T, R> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        if !self.upstream.set(subscription) {
            return;
        }
        if self.parent.drain.is_terminated() {
            self.upstream.cancel();
            return;
        }
        self.upstream.request(self.prefetch);
    }

    fn on_next(&self, item: R) {
        if let Some(this) = self.this.upgrade() {
            self.parent.inner_next(&this, item);
        }
    }

    fn on_error(&self, error: FlowError) {
        if let Some(this) = self.this.upgrade() {
            self.parent.inner_error(&this, error);
        }
    }

    fn on_complete(&self) {
        if let Some(this) = self.this.upgrade() {
            self.parent.inner_complete(&this);
        }
    }
}
