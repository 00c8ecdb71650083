//! # Test Subscriber
//!
//! Records every signal it receives and lets a test drive demand by hand.
//! Protocol violations it observes (a signal after a terminal, a second
//! subscription, overlapping `on_next` calls) are counted instead of
//! panicking so assertions can report them.

use flowline_types::{FlowError, Subscriber, Subscription};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

/// Signal recorder.
pub struct TestSubscriber<T> {
    subscription: OnceLock<Arc<dyn Subscription>>,
    initial_request: i64,
    items: Mutex<Vec<T>>,
    errors: Mutex<Vec<FlowError>>,
    completions: AtomicUsize,
    subscriptions: AtomicUsize,
    violations: AtomicUsize,
    in_on_next: AtomicBool,
    signal: Condvar,
    signal_lock: Mutex<()>,
}

impl<T: Send + 'static> TestSubscriber<T> {
    /// Recorder that requests nothing on subscribe.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::with_request(0)
    }

    /// Recorder that issues `request(n)` from `on_subscribe`; `0` skips it.
    #[must_use]
    pub fn with_request(n: i64) -> Arc<Self> {
        Arc::new(Self {
            subscription: OnceLock::new(),
            initial_request: n,
            items: Mutex::new(Vec::new()),
            errors: Mutex::new(Vec::new()),
            completions: AtomicUsize::new(0),
            subscriptions: AtomicUsize::new(0),
            violations: AtomicUsize::new(0),
            in_on_next: AtomicBool::new(false),
            signal: Condvar::new(),
            signal_lock: Mutex::new(()),
        })
    }

    /// Recorder that requests without bound.
    #[must_use]
    pub fn unbounded() -> Arc<Self> {
        Self::with_request(i64::MAX)
    }

    /// Issue `request(n)` on the received subscription.
    ///
    /// # Panics
    ///
    /// When no subscription has been received yet.
    pub fn request(&self, n: i64) {
        self.subscription
            .get()
            .expect("request before on_subscribe")
            .request(n);
    }

    /// Cancel the received subscription, if any.
    pub fn cancel(&self) {
        if let Some(subscription) = self.subscription.get() {
            subscription.cancel();
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.get().is_some()
    }

    pub fn item_count(&self) -> usize {
        self.items.lock().len()
    }

    pub fn take_items(&self) -> Vec<T> {
        std::mem::take(&mut *self.items.lock())
    }

    pub fn errors(&self) -> Vec<FlowError> {
        self.errors.lock().clone()
    }

    /// The first error received.
    pub fn error(&self) -> Option<FlowError> {
        self.errors.lock().first().cloned()
    }

    pub fn completions(&self) -> usize {
        self.completions.load(Ordering::SeqCst)
    }

    pub fn is_complete(&self) -> bool {
        self.completions() > 0
    }

    /// Completions plus errors.
    pub fn terminal_count(&self) -> usize {
        self.completions() + self.errors.lock().len()
    }

    /// Signals that broke the protocol.
    pub fn violations(&self) -> usize {
        self.violations.load(Ordering::SeqCst)
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }

    /// Block until a terminal signal arrives or `timeout` elapses.
    pub fn await_terminal(&self, timeout: Duration) -> bool {
        self.await_until(timeout, || self.terminal_count() > 0)
    }

    /// Block until at least `count` items arrived or `timeout` elapses.
    pub fn await_items(&self, count: usize, timeout: Duration) -> bool {
        self.await_until(timeout, || self.item_count() >= count)
    }

    fn await_until(&self, timeout: Duration, done: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.signal_lock.lock();
        while !done() {
            if self.signal.wait_until(&mut guard, deadline).timed_out() {
                return done();
            }
        }
        true
    }

    fn notify(&self) {
        let _guard = self.signal_lock.lock();
        self.signal.notify_all();
    }

    fn terminated(&self) -> bool {
        self.terminal_count() > 0
    }
}

impl<T: Clone + Send + 'static> TestSubscriber<T> {
    pub fn items(&self) -> Vec<T> {
        self.items.lock().clone()
    }
}

impl<T: Send + 'static> Subscriber<T> for TestSubscriber<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        if self.subscription.set(Arc::clone(&subscription)).is_err() {
            self.violations.fetch_add(1, Ordering::SeqCst);
            subscription.cancel();
            return;
        }
        if self.initial_request != 0 {
            subscription.request(self.initial_request);
        }
    }

    fn on_next(&self, item: T) {
        if self.terminated() || self.in_on_next.swap(true, Ordering::SeqCst) {
            self.violations.fetch_add(1, Ordering::SeqCst);
        }
        self.items.lock().push(item);
        self.in_on_next.store(false, Ordering::SeqCst);
        self.notify();
    }

    fn on_error(&self, error: FlowError) {
        if self.terminated() {
            self.violations.fetch_add(1, Ordering::SeqCst);
        }
        self.errors.lock().push(error);
        self.notify();
    }

    fn on_complete(&self) {
        if self.terminated() {
            self.violations.fetch_add(1, Ordering::SeqCst);
        }
        self.completions.fetch_add(1, Ordering::SeqCst);
        self.notify();
    }
}
