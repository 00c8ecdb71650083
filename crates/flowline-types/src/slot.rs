//! # Upstream Slot
//!
//! Set-once holder of an upstream [`Subscription`].
//!
//! ```text
//! [Empty] ──set──→ [Set] ──cancel──→ [Cancelled]
//!    │                                   ▲
//!    └──────────────cancel───────────────┘
//! ```
//!
//! Requests made while the slot is empty are accumulated and flushed when the
//! subscription arrives. A subscription arriving after `cancel` is cancelled
//! on arrival, and so is a second subscription.

use crate::demand::{as_request, Demand};
use crate::protocol::Subscription;
use arc_swap::ArcSwapOption;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::warn;

const EMPTY: u8 = 0;
const SET: u8 = 1;
const CANCELLED: u8 = 2;

struct Upstream(Arc<dyn Subscription>);

#[derive(Default)]
pub struct UpstreamSlot {
    current: ArcSwapOption<Upstream>,
    state: AtomicU8,
    deferred: Demand,
}

impl UpstreamSlot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the upstream subscription.
    ///
    /// Returns `false` when the subscription was rejected (duplicate or
    /// already cancelled); the rejected subscription has been cancelled.
    pub fn set(&self, subscription: Arc<dyn Subscription>) -> bool {
        match self
            .state
            .compare_exchange(EMPTY, SET, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                self.current
                    .store(Some(Arc::new(Upstream(Arc::clone(&subscription)))));
                if self.state.load(Ordering::Acquire) == CANCELLED {
                    if let Some(upstream) = self.current.swap(None) {
                        upstream.0.cancel();
                    }
                    return true;
                }
                let pending = self.deferred.take();
                if pending > 0 {
                    subscription.request(as_request(pending));
                }
                true
            }
            Err(CANCELLED) => {
                subscription.cancel();
                false
            }
            Err(_) => {
                warn!("on_subscribe called twice; cancelling the superfluous subscription");
                subscription.cancel();
                false
            }
        }
    }

    /// Forward `n` to the upstream, or hold it until the upstream arrives.
    pub fn request(&self, n: u64) {
        if let Some(upstream) = self.current.load_full() {
            upstream.0.request(as_request(n));
            return;
        }
        if self.state.load(Ordering::Acquire) == CANCELLED {
            return;
        }
        self.deferred.add(n);
        // the subscription may have landed between the load and the add
        if let Some(upstream) = self.current.load_full() {
            let pending = self.deferred.take();
            if pending > 0 {
                upstream.0.request(as_request(pending));
            }
        }
    }

    /// Forward a raw request argument, including invalid ones, so the
    /// upstream can report the violation itself.
    pub fn request_raw(&self, n: i64) {
        match self.current.load_full() {
            Some(upstream) => upstream.0.request(n),
            None if n > 0 => self.request(n as u64),
            None => {}
        }
    }

    /// Cancel the upstream. Returns `true` for the call that actually
    /// cancelled.
    pub fn cancel(&self) -> bool {
        if self.state.swap(CANCELLED, Ordering::AcqRel) == CANCELLED {
            return false;
        }
        if let Some(upstream) = self.current.swap(None) {
            upstream.0.cancel();
        }
        true
    }

    /// Drop the upstream reference after a terminal signal. Later requests
    /// are ignored.
    pub fn release(&self) {
        self.current.store(None);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::Acquire) == CANCELLED
    }

    #[must_use]
    pub fn is_set(&self) -> bool {
        self.state.load(Ordering::Acquire) != EMPTY
    }
}

impl fmt::Debug for UpstreamSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state.load(Ordering::Acquire) {
            EMPTY => "empty",
            SET => "set",
            _ => "cancelled",
        };
        f.debug_struct("UpstreamSlot")
            .field("state", &state)
            .field("deferred", &self.deferred.get())
            .finish()
    }
}
