//! # Collect
//!
//! Folds a stream into a single value. A [`Collector`] supplies the
//! accumulator, folds each item into it and finishes it into the result,
//! which is published through a [`Completion`].
//!
//! The collecting subscriber requests without bound. If the accumulator or
//! the finisher fails, upstream is cancelled, the completion fails and the
//! partial accumulator is dropped. The accumulator is never called again
//! after a failure.

use super::completion::{promise, Completion, Promise};
use flowline_types::{
    FlowError, FlowResult, Publisher, Subscriber, Subscription, UpstreamSlot, UNBOUNDED,
};
use parking_lot::Mutex;
use std::fmt::{Display, Write};
use std::sync::Arc;
use tracing::debug;

type SupplierFn<A> = Arc<dyn Fn() -> A + Send + Sync>;
type AccumulatorFn<T, A> = Arc<dyn Fn(&mut A, T) -> FlowResult<()> + Send + Sync>;
type FinisherFn<A, R> = Arc<dyn Fn(A) -> FlowResult<R> + Send + Sync>;

/// Reduction recipe: `supplier` creates the accumulator, `accumulator`
/// folds an item into it and `finisher` turns it into the result.
pub struct Collector<T, A, R> {
    supplier: SupplierFn<A>,
    accumulator: AccumulatorFn<T, A>,
    finisher: FinisherFn<A, R>,
}

impl<T, A, R> Clone for Collector<T, A, R> {
    fn clone(&self) -> Self {
        Self {
            supplier: Arc::clone(&self.supplier),
            accumulator: Arc::clone(&self.accumulator),
            finisher: Arc::clone(&self.finisher),
        }
    }
}

impl<T, A, R> Collector<T, A, R> {
    pub fn new(
        supplier: impl Fn() -> A + Send + Sync + 'static,
        accumulator: impl Fn(&mut A, T) -> FlowResult<()> + Send + Sync + 'static,
        finisher: impl Fn(A) -> FlowResult<R> + Send + Sync + 'static,
    ) -> Self {
        Self {
            supplier: Arc::new(supplier),
            accumulator: Arc::new(accumulator),
            finisher: Arc::new(finisher),
        }
    }
}

impl<T: 'static, A: 'static> Collector<T, A, A> {
    /// Collector whose accumulator is the result.
    pub fn of(
        supplier: impl Fn() -> A + Send + Sync + 'static,
        accumulator: impl Fn(&mut A, T) -> FlowResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self::new(supplier, accumulator, Ok)
    }
}

impl<T: 'static> Collector<T, Vec<T>, Vec<T>> {
    pub fn to_vec() -> Self {
        Self::of(Vec::new, |items, item| {
            items.push(item);
            Ok(())
        })
    }
}

impl<T: 'static> Collector<T, u64, u64> {
    pub fn counting() -> Self {
        Self::of(
            || 0,
            |count, _| {
                *count += 1;
                Ok(())
            },
        )
    }
}

impl<T: 'static> Collector<T, Option<T>, Option<T>> {
    /// Combines items pairwise with `reducer`; `None` for an empty stream.
    pub fn reducing(reducer: impl Fn(T, T) -> FlowResult<T> + Send + Sync + 'static) -> Self {
        Self::of(
            || None,
            move |current, item| {
                let next = match current.take() {
                    Some(previous) => reducer(previous, item)?,
                    None => item,
                };
                *current = Some(next);
                Ok(())
            },
        )
    }
}

impl<T: Display + 'static> Collector<T, Option<String>, String> {
    /// Concatenates the display form of every item with `separator`.
    pub fn joining(separator: impl Into<String>) -> Self {
        let separator = separator.into();
        Self::new(
            || None,
            move |joined: &mut Option<String>, item: T| match joined {
                Some(buffer) => write!(buffer, "{separator}{item}").map_err(FlowError::callback),
                None => {
                    *joined = Some(item.to_string());
                    Ok(())
                }
            },
            |joined| Ok(joined.unwrap_or_default()),
        )
    }
}

/// Terminal subscriber driving a [`Collector`].
pub(crate) struct CollectSubscriber<T, A, R> {
    collector: Collector<T, A, R>,
    accumulator: Mutex<Option<A>>,
    upstream: UpstreamSlot,
    promise: Promise<R>,
}

impl<T, A, R> CollectSubscriber<T, A, R>
where
    T: Send + 'static,
    A: Send + 'static,
    R: Send + 'static,
{
    pub(crate) fn new(collector: Collector<T, A, R>) -> (Arc<Self>, Completion<R>) {
        let (promise, completion) = promise();
        let accumulator = (collector.supplier)();
        let subscriber = Arc::new(Self {
            collector,
            accumulator: Mutex::new(Some(accumulator)),
            upstream: UpstreamSlot::new(),
            promise,
        });
        (subscriber, completion)
    }

    /// Subscribe a fresh collecting subscriber to `publisher`.
    pub(crate) fn collect(
        publisher: &dyn Publisher<T>,
        collector: Collector<T, A, R>,
    ) -> Completion<R> {
        let (subscriber, completion) = Self::new(collector);
        publisher.subscribe(subscriber);
        completion
    }
}

impl<T, A, R> Subscriber<T> for CollectSubscriber<T, A, R>
where
    T: Send + 'static,
    A: Send + 'static,
    R: Send + 'static,
{
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        if self.upstream.set(subscription) {
            self.upstream.request(UNBOUNDED);
        }
    }

    fn on_next(&self, item: T) {
        let failure = {
            let mut slot = self.accumulator.lock();
            let Some(accumulator) = slot.as_mut() else {
                return;
            };
            match (self.collector.accumulator)(accumulator, item) {
                Ok(()) => return,
                Err(error) => {
                    slot.take();
                    error
                }
            }
        };
        debug!(kind = failure.kind(), "accumulator failed, cancelling upstream");
        self.upstream.cancel();
        self.promise.complete(Err(failure));
    }

    fn on_error(&self, error: FlowError) {
        self.upstream.release();
        if self.accumulator.lock().take().is_some() {
            self.promise.complete(Err(error));
        }
    }

    fn on_complete(&self) {
        self.upstream.release();
        let Some(accumulator) = self.accumulator.lock().take() else {
            return;
        };
        let result = (self.collector.finisher)(accumulator);
        if let Err(error) = &result {
            debug!(kind = error.kind(), "finisher failed");
        }
        self.promise.complete(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{ConcatPublisher, ErrorPublisher, IterPublisher, NeverPublisher};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn collect<A, R>(items: Vec<i32>, collector: Collector<i32, A, R>) -> Completion<R>
    where
        A: Send + 'static,
        R: Send + 'static,
    {
        let publisher: Arc<dyn Publisher<i32>> = Arc::new(IterPublisher::new(items));
        CollectSubscriber::collect(&*publisher, collector)
    }

    #[tokio::test]
    async fn test_to_vec_collects_in_order() {
        let result = collect(vec![3, 1, 2], Collector::to_vec());
        assert_eq!(result.await.unwrap(), vec![3, 1, 2]);
    }

    #[tokio::test]
    async fn test_counting_and_reducing() {
        assert_eq!(collect(vec![5, 6, 7], Collector::counting()).await.unwrap(), 3);

        let sum = collect(vec![1, 2, 3, 4], Collector::reducing(|a, b| Ok(a + b)));
        assert_eq!(sum.await.unwrap(), Some(10));

        let empty = collect(vec![], Collector::reducing(|a, b| Ok(a + b)));
        assert_eq!(empty.await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_joining() {
        let joined = collect(vec![1, 2, 3], Collector::joining(", "));
        assert_eq!(joined.await.unwrap(), "1, 2, 3");

        let empty = collect(vec![], Collector::joining("-"));
        assert_eq!(empty.await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_stock_collectors_over_owned_items() {
        let words: Arc<dyn Publisher<String>> =
            Arc::new(IterPublisher::new(vec!["ab".to_string(), "cd".to_string()]));
        let joined = Collector::<String, _, _>::joining("+");

        let first = CollectSubscriber::collect(&*words, joined.clone());
        let second = CollectSubscriber::collect(&*words, joined);
        assert_eq!(first.await.unwrap(), "ab+cd");
        assert_eq!(second.await.unwrap(), "ab+cd");

        let count = CollectSubscriber::collect(&*words, Collector::counting());
        assert_eq!(count.await.unwrap(), 2);
        let longest = Collector::reducing(|a: String, b: String| {
            Ok(if b.len() > a.len() { b } else { a })
        });
        let longest = CollectSubscriber::collect(&*words, longest);
        assert_eq!(longest.await.unwrap().as_deref(), Some("ab"));
    }

    #[tokio::test]
    async fn test_accumulator_failure_stops_folding() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let collector = Collector::of(Vec::new, move |items: &mut Vec<i32>, item| {
            if seen.fetch_add(1, Ordering::SeqCst) == 1 {
                return Err(FlowError::callback("second item rejected"));
            }
            items.push(item);
            Ok(())
        });

        let result = collect(vec![1, 2, 3, 4], collector);
        assert_eq!(result.await.unwrap_err().kind(), "callback");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_finisher_failure_fails_completion() {
        let collector = Collector::new(
            || 0,
            |sum: &mut i32, item: i32| {
                *sum += item;
                Ok(())
            },
            |sum| {
                if sum > 5 {
                    Err(FlowError::callback("too large"))
                } else {
                    Ok(sum)
                }
            },
        );
        let result = collect(vec![3, 4], collector);
        assert!(result.await.is_err());
    }

    #[tokio::test]
    async fn test_upstream_error_fails_completion() {
        let publisher: Arc<dyn Publisher<i32>> = Arc::new(ConcatPublisher::<i32>::new(vec![
            Arc::new(IterPublisher::new(vec![1])),
            Arc::new(ErrorPublisher::new(FlowError::upstream("gone"))),
        ]));
        let result = CollectSubscriber::collect(&*publisher, Collector::to_vec());
        assert_eq!(result.await.unwrap_err().kind(), "upstream");
    }

    #[tokio::test]
    async fn test_silent_stream_is_abandoned() {
        let publisher: Arc<dyn Publisher<i32>> = Arc::new(NeverPublisher);
        let result = CollectSubscriber::collect(&*publisher, Collector::to_vec());
        assert!(matches!(result.await, Err(FlowError::Abandoned)));
    }
}
