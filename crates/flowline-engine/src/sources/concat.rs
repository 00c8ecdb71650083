//! Sequential concatenation of publishers.
//!
//! The next source is subscribed only after the previous one completed and
//! receives whatever demand the previous one left unserved. Sources that
//! complete synchronously are chained by a trampoline, not by recursion.

use crate::arbiter::SubscriptionArbiter;
use crate::serializer::HalfSerializer;
use flowline_types::{
    validate_request, DrainLoop, FlowError, Publisher, Subscriber, Subscription,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Emits all items of each source in turn.
pub struct ConcatPublisher<T> {
    sources: Arc<[Arc<dyn Publisher<T>>]>,
}

impl<T> ConcatPublisher<T> {
    pub fn new(sources: Vec<Arc<dyn Publisher<T>>>) -> Self {
        Self {
            sources: sources.into(),
        }
    }
}

impl<T: Send + 'static> Publisher<T> for ConcatPublisher<T> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        let concat = ConcatSubscriber::new(subscriber, Arc::clone(&self.sources));
        concat.downstream.on_subscribe(concat.clone());
        concat.subscribe_next();
    }
}

struct ConcatSubscriber<T> {
    this: Weak<Self>,
    downstream: Arc<dyn Subscriber<T>>,
    sources: Arc<[Arc<dyn Publisher<T>>]>,
    index: AtomicUsize,
    arbiter: SubscriptionArbiter,
    serializer: HalfSerializer,
    trampoline: DrainLoop,
}

impl<T: Send + 'static> ConcatSubscriber<T> {
    fn new(downstream: Arc<dyn Subscriber<T>>, sources: Arc<[Arc<dyn Publisher<T>>]>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            downstream,
            sources,
            index: AtomicUsize::new(0),
            arbiter: SubscriptionArbiter::new(),
            serializer: HalfSerializer::new(),
            trampoline: DrainLoop::new(),
        })
    }

    fn subscribe_next(&self) {
        if !self.trampoline.enter() {
            return;
        }
        let mut missed = 1;
        loop {
            if self.serializer.is_terminated() || self.arbiter.is_cancelled() {
                return;
            }
            let index = self.index.fetch_add(1, Ordering::AcqRel);
            match self.sources.get(index) {
                Some(source) => {
                    debug!(index, "concat switching to next source");
                    if let Some(this) = self.this.upgrade() {
                        source.subscribe(this);
                    }
                }
                None => {
                    self.arbiter.release();
                    self.serializer.on_complete(&*self.downstream);
                    return;
                }
            }
            missed = self.trampoline.leave(missed);
            if missed == 0 {
                break;
            }
        }
    }
}

impl<T: Send + 'static> Subscriber<T> for ConcatSubscriber<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        self.arbiter.set(subscription);
    }

    fn on_next(&self, item: T) {
        self.arbiter.produced(1);
        self.serializer.on_next(&*self.downstream, item);
    }

    fn on_error(&self, error: FlowError) {
        self.arbiter.release();
        self.serializer.on_error(&*self.downstream, error);
    }

    fn on_complete(&self) {
        self.subscribe_next();
    }
}

impl<T: Send + 'static> Subscription for ConcatSubscriber<T> {
    fn request(&self, n: i64) {
        match validate_request(n) {
            Ok(n) => self.arbiter.request(n),
            Err(error) => {
                warn!(requested = n, "non-positive request, failing the stream");
                self.arbiter.cancel();
                self.serializer.on_error(&*self.downstream, error);
            }
        }
    }

    fn cancel(&self) {
        self.serializer.cancel();
        self.arbiter.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{EmptyPublisher, ErrorPublisher, IterPublisher};
    use crate::testing::TestSubscriber;

    fn concat(sources: Vec<Arc<dyn Publisher<i32>>>) -> ConcatPublisher<i32> {
        ConcatPublisher::new(sources)
    }

    #[test]
    fn test_sources_run_in_order() {
        let publisher = concat(vec![
            Arc::new(IterPublisher::new(vec![1, 2])),
            Arc::new(EmptyPublisher),
            Arc::new(IterPublisher::new(vec![3])),
        ]);
        let recorder = TestSubscriber::<i32>::unbounded();
        publisher.subscribe(recorder.clone());

        assert_eq!(recorder.items(), vec![1, 2, 3]);
        assert_eq!(recorder.completions(), 1);
    }

    #[test]
    fn test_leftover_demand_carries_over() {
        let publisher = concat(vec![
            Arc::new(IterPublisher::new(vec![1, 2])),
            Arc::new(IterPublisher::new(vec![3, 4, 5])),
        ]);
        let recorder = TestSubscriber::<i32>::with_request(3);
        publisher.subscribe(recorder.clone());

        assert_eq!(recorder.items(), vec![1, 2, 3]);
        assert!(!recorder.is_complete());
        recorder.request(2);
        assert_eq!(recorder.items(), vec![1, 2, 3, 4, 5]);
        assert_eq!(recorder.completions(), 1);
    }

    #[test]
    fn test_error_stops_the_chain() {
        let publisher = concat(vec![
            Arc::new(IterPublisher::new(vec![1])),
            Arc::new(ErrorPublisher::new(FlowError::upstream("second"))),
            Arc::new(IterPublisher::new(vec![2])),
        ]);
        let recorder = TestSubscriber::<i32>::unbounded();
        publisher.subscribe(recorder.clone());

        assert_eq!(recorder.items(), vec![1]);
        assert_eq!(recorder.terminal_count(), 1);
        assert!(recorder.error().is_some());
    }

    #[test]
    fn test_many_synchronous_sources_do_not_recurse() {
        let sources: Vec<Arc<dyn Publisher<i32>>> = (0..10_000)
            .map(|_| Arc::new(EmptyPublisher) as Arc<dyn Publisher<i32>>)
            .collect();
        let recorder = TestSubscriber::<i32>::unbounded();
        concat(sources).subscribe(recorder.clone());

        assert_eq!(recorder.completions(), 1);
    }

    #[test]
    fn test_invalid_request_fails_once() {
        let publisher = concat(vec![Arc::new(IterPublisher::new(vec![1, 2]))]);
        let recorder = TestSubscriber::<i32>::new();
        publisher.subscribe(recorder.clone());

        recorder.request(-1);
        recorder.request(1);
        assert_eq!(recorder.terminal_count(), 1);
        assert!(recorder.error().unwrap().is_illegal_argument());
        assert_eq!(recorder.item_count(), 0);
    }
}
