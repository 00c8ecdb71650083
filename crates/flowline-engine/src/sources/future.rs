//! Future-backed source.
//!
//! The future is spawned on the ambient tokio runtime when the subscriber
//! arrives. Its value is held until the subscriber has requested it; a
//! `None` value or a failure is delivered without demand. Cancelling aborts
//! the task.

use crate::metrics;
use flowline_types::{
    noop_subscription, validate_request, DrainLoop, ErrorCollector, FlowError, FlowResult,
    Publisher, Subscriber, Subscription,
};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Emits the value of a future, or completes empty on `Ok(None)`.
///
/// A future runs once, so only the first subscriber is served; later ones
/// fail with [`FlowError::IllegalState`].
pub struct FuturePublisher<F> {
    future: Mutex<Option<F>>,
}

impl<F> FuturePublisher<F> {
    pub fn new(future: F) -> Self {
        Self {
            future: Mutex::new(Some(future)),
        }
    }
}

impl<F, T> Publisher<T> for FuturePublisher<F>
where
    F: Future<Output = FlowResult<Option<T>>> + Send + 'static,
    T: Send + 'static,
{
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        let Ok(runtime) = Handle::try_current() else {
            warn!("future source subscribed outside a tokio runtime");
            subscriber.on_subscribe(noop_subscription());
            subscriber.on_error(FlowError::IllegalState(
                "future source needs a tokio runtime",
            ));
            return;
        };
        let Some(future) = self.future.lock().take() else {
            subscriber.on_subscribe(noop_subscription());
            subscriber.on_error(FlowError::IllegalState("future source subscribed twice"));
            return;
        };

        metrics::record_subscription();
        let subscription = Arc::new(FutureSubscription {
            downstream: Arc::clone(&subscriber),
            outcome: Mutex::new(None),
            requested: AtomicBool::new(false),
            drain: DrainLoop::new(),
            bad_request: ErrorCollector::new(),
            task: Mutex::new(None),
        });
        subscriber.on_subscribe(subscription.clone());
        if subscription.drain.is_terminated() {
            return;
        }

        let target = Arc::clone(&subscription);
        let task = runtime.spawn(async move {
            let outcome = future.await;
            *target.outcome.lock() = Some(outcome);
            target.drain();
        });
        *subscription.task.lock() = Some(task);
    }
}

struct FutureSubscription<T> {
    downstream: Arc<dyn Subscriber<T>>,
    outcome: Mutex<Option<FlowResult<Option<T>>>>,
    requested: AtomicBool,
    drain: DrainLoop,
    bad_request: ErrorCollector,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send> FutureSubscription<T> {
    /// The outcome can go out now.
    fn ready(&self) -> bool {
        match &*self.outcome.lock() {
            Some(Ok(Some(_))) => self.requested.load(Ordering::Acquire),
            Some(_) => true,
            None => false,
        }
    }

    fn drain(&self) {
        if !self.drain.enter() {
            return;
        }
        let mut missed = 1;
        loop {
            if self.drain.is_terminated() {
                return;
            }
            if let Some(error) = self.bad_request.take() {
                self.fail(error);
                return;
            }
            if self.ready() {
                let outcome = self.outcome.lock().take();
                match outcome {
                    Some(Ok(Some(item))) => {
                        self.downstream.on_next(item);
                        self.complete();
                    }
                    Some(Ok(None)) => self.complete(),
                    Some(Err(error)) => self.fail(error),
                    None => {}
                }
                return;
            }
            missed = self.drain.leave(missed);
            if missed == 0 {
                break;
            }
        }
    }

    fn complete(&self) {
        if self.drain.finish() {
            debug!("future resolved, completing");
            self.downstream.on_complete();
        }
    }

    fn fail(&self, error: FlowError) {
        if self.drain.finish() {
            metrics::record_error(error.kind());
            self.downstream.on_error(error);
        }
    }
}

impl<T: Send> Subscription for FutureSubscription<T> {
    fn request(&self, n: i64) {
        match validate_request(n) {
            Ok(_) => self.requested.store(true, Ordering::Release),
            Err(error) => {
                warn!(requested = n, "non-positive request, failing the stream");
                self.bad_request.add(error);
            }
        }
        self.drain();
    }

    fn cancel(&self) {
        if self.drain.cancel() {
            metrics::record_cancellation();
            if let Some(task) = self.task.lock().take() {
                task.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestSubscriber;
    use std::time::Duration;
    use tokio::sync::oneshot;

    const WAIT: Duration = Duration::from_secs(5);

    fn publisher<T: Send + 'static>(
        rx: oneshot::Receiver<FlowResult<Option<T>>>,
    ) -> FuturePublisher<impl Future<Output = FlowResult<Option<T>>> + Send + 'static> {
        FuturePublisher::new(async move { rx.await.unwrap_or(Err(FlowError::Abandoned)) })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_value_waits_for_demand() {
        let (tx, rx) = oneshot::channel();
        let source = publisher::<u32>(rx);
        let recorder = TestSubscriber::<u32>::new();
        source.subscribe(recorder.clone());

        tx.send(Ok(Some(9))).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(recorder.item_count(), 0);
        assert_eq!(recorder.terminal_count(), 0);

        recorder.request(1);
        assert!(recorder.await_terminal(WAIT));
        assert_eq!(recorder.items(), vec![9]);
        assert_eq!(recorder.completions(), 1);
        assert_eq!(recorder.violations(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_empty_and_failed_outcomes_need_no_demand() {
        let (tx, rx) = oneshot::channel();
        let empty = TestSubscriber::<u32>::new();
        publisher::<u32>(rx).subscribe(empty.clone());
        tx.send(Ok(None)).unwrap();
        assert!(empty.await_terminal(WAIT));
        assert_eq!(empty.completions(), 1);
        assert_eq!(empty.item_count(), 0);

        let (tx, rx) = oneshot::channel();
        let failed = TestSubscriber::<u32>::new();
        publisher::<u32>(rx).subscribe(failed.clone());
        tx.send(Err(FlowError::upstream("lookup failed"))).unwrap();
        assert!(failed.await_terminal(WAIT));
        assert_eq!(failed.error().unwrap().kind(), "upstream");
    }

    #[tokio::test]
    async fn test_second_subscriber_fails() {
        let source = FuturePublisher::new(async { Ok::<_, FlowError>(Some(1u8)) });
        let first = TestSubscriber::<u8>::new();
        let second = TestSubscriber::<u8>::new();
        source.subscribe(first.clone());
        source.subscribe(second.clone());

        assert!(first.is_subscribed());
        assert_eq!(second.error().unwrap().kind(), "illegal_state");
    }

    #[tokio::test]
    async fn test_bad_request_fails_before_resolution() {
        let (_tx, rx) = oneshot::channel();
        let recorder = TestSubscriber::<u32>::new();
        publisher::<u32>(rx).subscribe(recorder.clone());

        recorder.request(0);
        recorder.request(-1);
        assert_eq!(recorder.terminal_count(), 1);
        assert!(recorder.error().unwrap().is_illegal_argument());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_aborts_pending_future() {
        let (mut tx, rx) = oneshot::channel::<FlowResult<Option<u32>>>();
        let recorder = TestSubscriber::<u32>::unbounded();
        publisher::<u32>(rx).subscribe(recorder.clone());

        recorder.cancel();
        // the aborted task drops its receiver
        tokio::time::timeout(WAIT, tx.closed()).await.unwrap();
        assert_eq!(recorder.terminal_count(), 0);
    }

    #[test]
    fn test_outside_runtime_fails() {
        let source = FuturePublisher::new(async { Ok::<_, FlowError>(Some(1u8)) });
        let recorder = TestSubscriber::<u8>::unbounded();
        source.subscribe(recorder.clone());
        assert_eq!(recorder.error().unwrap().kind(), "illegal_state");
    }
}
