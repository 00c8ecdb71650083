//! # Subscription Arbiter
//!
//! Lets one downstream talk to a sequence of upstreams (the inners of a
//! concat-map, the sources of a concat, the fallback of an error resume)
//! while carrying outstanding demand from one to the next.
//!
//! Requests, produced counts and new subscriptions from any thread are parked
//! in `missed_*` fields and folded in by whichever thread wins the drain
//! loop. `requested` and `current` are only written by that owner.

use arc_swap::ArcSwapOption;
use flowline_types::{as_request, Demand, DrainLoop, Subscription, UNBOUNDED};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

struct Upstream(Arc<dyn Subscription>);

#[derive(Default)]
pub(crate) struct SubscriptionArbiter {
    drain: DrainLoop,
    requested: AtomicU64,
    current: ArcSwapOption<Upstream>,
    missed_requested: Demand,
    missed_produced: AtomicU64,
    missed_subscription: ArcSwapOption<Upstream>,
    cancelled: AtomicBool,
}

impl SubscriptionArbiter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Switch to `subscription`, handing it whatever demand is outstanding.
    pub(crate) fn set(&self, subscription: Arc<dyn Subscription>) {
        if self.cancelled.load(Ordering::Acquire) {
            subscription.cancel();
            return;
        }
        if let Some(replaced) = self
            .missed_subscription
            .swap(Some(Arc::new(Upstream(subscription))))
        {
            replaced.0.cancel();
        }
        self.drain();
    }

    pub(crate) fn request(&self, n: u64) {
        self.missed_requested.add(n);
        self.drain();
    }

    /// Account for items delivered by the current upstream.
    pub(crate) fn produced(&self, n: u64) {
        self.missed_produced.fetch_add(n, Ordering::AcqRel);
        self.drain();
    }

    /// Cancel the current upstream and any that arrives later.
    pub(crate) fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(current) = self.current.swap(None) {
            current.0.cancel();
        }
        if let Some(missed) = self.missed_subscription.swap(None) {
            missed.0.cancel();
        }
    }

    /// Drop upstream references once the stream is over.
    pub(crate) fn release(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.current.store(None);
        self.missed_subscription.store(None);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn drain(&self) {
        if !self.drain.enter() {
            return;
        }

        let mut missed = 1;
        let mut to_request: u64 = 0;
        let mut target: Option<Arc<Upstream>> = None;

        loop {
            let missed_requested = self.missed_requested.take();
            let missed_produced = self.missed_produced.swap(0, Ordering::AcqRel);
            let missed_subscription = self.missed_subscription.swap(None);

            let mut requested = self.requested.load(Ordering::Acquire);
            if requested != UNBOUNDED {
                requested = requested.saturating_add(missed_requested).min(UNBOUNDED);
                if requested != UNBOUNDED {
                    requested = requested.saturating_sub(missed_produced);
                }
                self.requested.store(requested, Ordering::Release);
            }

            if let Some(next) = missed_subscription {
                if self.cancelled.load(Ordering::Acquire) {
                    next.0.cancel();
                } else {
                    self.current.store(Some(Arc::clone(&next)));
                    // whatever was aimed at the previous upstream is void
                    to_request = requested;
                    target = Some(next);
                }
            } else if missed_requested > 0 {
                if let Some(current) = self.current.load_full() {
                    to_request = to_request.saturating_add(missed_requested).min(UNBOUNDED);
                    target = Some(current);
                }
            }

            missed = self.drain.leave(missed);
            if missed == 0 {
                break;
            }
        }

        if to_request > 0 {
            if let Some(target) = target {
                target.0.request(as_request(to_request));
            }
        }
    }
}
