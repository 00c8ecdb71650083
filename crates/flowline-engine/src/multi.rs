//! # Multi
//!
//! Fluent, cloneable handle over a publisher of zero or more items. Every
//! operator returns a new `Multi` wrapping the previous one; nothing runs
//! until a terminal (`collect`, `first`, `for_each`, ...) subscribes.
//!
//! ```rust
//! use flowline_engine::{Collector, Multi};
//!
//! let total = Multi::from_iterable(vec![1, 2, 3])
//!     .map(|x| x * 10)
//!     .collect(Collector::reducing(|a, b| Ok(a + b)))
//!     .blocking_get();
//! assert_eq!(total.unwrap(), Some(60));
//! ```

use crate::config::{EngineConfig, FlatMapConfig};
use crate::ops::{
    ConcatMapPublisher, CoupledProcessor, DistinctLogic, DropWhileLogic, FallbackFn,
    FilterLogic, FlatMapPublisher, Hooks, InnerMapper, LimitLogic, MapFn, MapLogic,
    MulticastProcessor, PeekPublisher, PredicateFn, ResumePublisher, SkipLogic, StagePublisher,
    TakeWhileLogic, ViaPublisher,
};
use crate::sources::{
    ConcatPublisher, EmptyPublisher, ErrorPublisher, FuturePublisher, IterPublisher,
    NeverPublisher, NullablePublisher, SinglePublisher,
};
use crate::terminal::{
    CancelSubscriber, CollectSubscriber, Collector, Completion, FirstSubscriber,
};
use flowline_types::{FlowError, FlowResult, Processor, Publisher, Subscriber};
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

fn lift<T, P>(publisher: P) -> Multi<T>
where
    P: Publisher<T> + 'static,
{
    Multi {
        publisher: Arc::new(publisher),
    }
}

/// A stream of items of type `T`.
pub struct Multi<T> {
    publisher: Arc<dyn Publisher<T>>,
}

impl<T> Clone for Multi<T> {
    fn clone(&self) -> Self {
        Self {
            publisher: Arc::clone(&self.publisher),
        }
    }
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

impl<T: Send + 'static> Multi<T> {
    pub fn from_publisher(publisher: Arc<dyn Publisher<T>>) -> Self {
        Self { publisher }
    }

    pub fn into_publisher(self) -> Arc<dyn Publisher<T>> {
        self.publisher
    }

    /// Emits the items of `source`; each subscriber iterates a fresh clone.
    pub fn from_iterable<I>(source: I) -> Self
    where
        I: IntoIterator<Item = T> + Clone + Send + Sync + 'static,
        I::IntoIter: Send + 'static,
    {
        lift(IterPublisher::new(source))
    }

    /// Like [`Multi::from_iterable`], failing with [`FlowError::NullElement`]
    /// at the first `None`.
    pub fn from_nullable<I>(source: I) -> Self
    where
        I: IntoIterator<Item = Option<T>> + Clone + Send + Sync + 'static,
        I::IntoIter: Send + 'static,
    {
        lift(NullablePublisher::new(source))
    }

    pub fn just(item: T) -> Self
    where
        T: Clone + Sync,
    {
        Self::from_iterable(std::iter::once(item))
    }

    pub fn empty() -> Self {
        lift(EmptyPublisher)
    }

    pub fn error(error: FlowError) -> Self {
        lift(ErrorPublisher::new(error))
    }

    pub fn never() -> Self {
        lift(NeverPublisher)
    }

    /// Emits `first`, then `second` with whatever demand is left.
    pub fn concat(first: Multi<T>, second: Multi<T>) -> Self {
        Self::concat_all(vec![first, second])
    }

    pub fn concat_all(sources: Vec<Multi<T>>) -> Self {
        lift(ConcatPublisher::new(
            sources.into_iter().map(Multi::into_publisher).collect(),
        ))
    }

    /// Emits the value `future` resolves to. The future is spawned on the
    /// ambient tokio runtime when the first subscriber arrives, and only that
    /// subscriber is served.
    pub fn from_future<F>(future: F) -> Self
    where
        F: Future<Output = FlowResult<T>> + Send + 'static,
    {
        lift(FuturePublisher::new(async move { future.await.map(Some) }))
    }

    /// Like [`Multi::from_future`], completing empty on `Ok(None)`.
    pub fn from_future_nullable<F>(future: F) -> Self
    where
        F: Future<Output = FlowResult<Option<T>>> + Send + 'static,
    {
        lift(FuturePublisher::new(future))
    }
}

impl Multi<i64> {
    /// `count` consecutive integers starting at `start`.
    pub fn range(start: i64, count: i64) -> Self {
        let end = start.saturating_add(count.max(0));
        Self::from_iterable(start..end)
    }
}

impl<T> FromIterator<T> for Multi<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from_iterable(iter.into_iter().collect::<Vec<_>>())
    }
}

// ---------------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------------

impl<T: Send + 'static> Multi<T> {
    pub fn map<R: Send + 'static>(
        self,
        mapper: impl Fn(T) -> R + Send + Sync + 'static,
    ) -> Multi<R> {
        self.try_map(move |item| Ok(mapper(item)))
    }

    /// Map with a fallible function. An `Err` cancels upstream and fails the
    /// stream.
    pub fn try_map<R: Send + 'static>(
        self,
        mapper: impl Fn(T) -> FlowResult<R> + Send + Sync + 'static,
    ) -> Multi<R> {
        let mapper: MapFn<T, R> = Arc::new(mapper);
        lift(StagePublisher::<T, R, _>::new(self.publisher, move || MapLogic {
            mapper: Arc::clone(&mapper),
        }))
    }

    pub fn filter(self, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        let predicate = Self::predicate(predicate);
        lift(StagePublisher::<T, T, _>::new(self.publisher, move || FilterLogic {
            predicate: Arc::clone(&predicate),
        }))
    }

    /// Emits items while `predicate` holds, then cancels upstream and
    /// completes.
    pub fn take_while(self, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        let predicate = Self::predicate(predicate);
        lift(StagePublisher::<T, T, _>::new(self.publisher, move || TakeWhileLogic {
            predicate: Arc::clone(&predicate),
        }))
    }

    pub fn drop_while(self, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        let predicate = Self::predicate(predicate);
        lift(StagePublisher::<T, T, _>::new(self.publisher, move || {
            DropWhileLogic::new(Arc::clone(&predicate))
        }))
    }

    /// At most `count` items. `limit(0)` completes without requesting.
    pub fn limit(self, count: u64) -> Self {
        lift(StagePublisher::<T, T, _>::new(self.publisher, move || {
            LimitLogic::new(count)
        }))
    }

    pub fn skip(self, count: u64) -> Self {
        lift(StagePublisher::<T, T, _>::new(self.publisher, move || {
            SkipLogic::new(count)
        }))
    }

    /// Drops items equal to one already emitted. Every subscription keeps
    /// its own set of seen items.
    pub fn distinct(self) -> Self
    where
        T: Eq + Hash + Clone,
    {
        lift(StagePublisher::<T, T, _>::new(self.publisher, DistinctLogic::<T>::new))
    }

    fn predicate(predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> PredicateFn<T> {
        Arc::new(move |item| Ok(predicate(item)))
    }

    fn hooked(self, hooks: Hooks<T>) -> Self {
        lift(PeekPublisher::new(self.publisher, hooks))
    }

    /// Observe every item before it is forwarded.
    pub fn peek(self, hook: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.hooked(Hooks::next(hook))
    }

    pub fn on_complete(self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.hooked(Hooks::complete(hook))
    }

    pub fn on_error(self, hook: impl Fn(&FlowError) + Send + Sync + 'static) -> Self {
        self.hooked(Hooks::error(hook))
    }

    pub fn on_cancel(self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.hooked(Hooks::cancel(hook))
    }

    /// Runs once on completion, failure or cancellation, whichever is first.
    pub fn on_terminate(self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.hooked(Hooks::terminate(hook))
    }

    /// On failure, emit the single item `fallback` returns and complete.
    pub fn on_error_resume(
        self,
        fallback: impl Fn(FlowError) -> T + Send + Sync + 'static,
    ) -> Self {
        let fallback: FallbackFn<T> = Arc::new(move |error| {
            let item: Arc<dyn Publisher<T>> = Arc::new(SinglePublisher::new(fallback(error)));
            Ok(item)
        });
        lift(ResumePublisher::new(self.publisher, fallback))
    }

    /// On failure, continue with the stream `fallback` returns. Demand the
    /// failed stream left unserved carries over.
    pub fn on_error_resume_with(
        self,
        fallback: impl Fn(FlowError) -> Multi<T> + Send + Sync + 'static,
    ) -> Self {
        let fallback: FallbackFn<T> = Arc::new(move |error| Ok(fallback(error).into_publisher()));
        lift(ResumePublisher::new(self.publisher, fallback))
    }

    /// Flatten with the process-wide flat-map settings
    /// ([`EngineConfig::global`]).
    pub fn flat_map<R: Send + 'static>(
        self,
        mapper: impl Fn(T) -> Multi<R> + Send + Sync + 'static,
    ) -> Multi<R> {
        self.flat_map_with(mapper, EngineConfig::global().flat_map())
    }

    pub fn flat_map_with<R: Send + 'static>(
        self,
        mapper: impl Fn(T) -> Multi<R> + Send + Sync + 'static,
        config: FlatMapConfig,
    ) -> Multi<R> {
        self.try_flat_map_with(move |item| Ok(mapper(item)), config)
    }

    /// Flatten with a fallible mapper. A mapper error cancels upstream and
    /// takes the same path as an inner failure.
    pub fn try_flat_map_with<R: Send + 'static>(
        self,
        mapper: impl Fn(T) -> FlowResult<Multi<R>> + Send + Sync + 'static,
        config: FlatMapConfig,
    ) -> Multi<R> {
        let mapper: InnerMapper<T, R> =
            Arc::new(move |item| mapper(item).map(Multi::into_publisher));
        lift(FlatMapPublisher::new(self.publisher, mapper, config))
    }

    /// Flatten one inner stream at a time, preserving order.
    pub fn concat_map<R: Send + 'static>(
        self,
        mapper: impl Fn(T) -> Multi<R> + Send + Sync + 'static,
    ) -> Multi<R> {
        self.try_concat_map(move |item| Ok(mapper(item)))
    }

    pub fn try_concat_map<R: Send + 'static>(
        self,
        mapper: impl Fn(T) -> FlowResult<Multi<R>> + Send + Sync + 'static,
    ) -> Multi<R> {
        let mapper: InnerMapper<T, R> =
            Arc::new(move |item| mapper(item).map(Multi::into_publisher));
        lift(ConcatMapPublisher::new(self.publisher, mapper))
    }

    /// Emit the items of the iterable each item maps to, in order.
    pub fn flat_map_iterable<I>(
        self,
        mapper: impl Fn(T) -> I + Send + Sync + 'static,
    ) -> Multi<I::Item>
    where
        I: IntoIterator + Clone + Send + Sync + 'static,
        I::IntoIter: Send + 'static,
        I::Item: Send + 'static,
    {
        self.concat_map(move |item| Multi::from_iterable(mapper(item)))
    }

    /// Map each item to a future and emit the results in upstream order.
    /// The next future is created only after the previous one resolved.
    pub fn flat_map_future<R, F>(self, mapper: impl Fn(T) -> F + Send + Sync + 'static) -> Multi<R>
    where
        R: Send + 'static,
        F: Future<Output = FlowResult<R>> + Send + 'static,
    {
        self.concat_map(move |item| Multi::from_future(mapper(item)))
    }

    /// Route the stream through `processor`. Wiring happens when the first
    /// subscriber arrives.
    pub fn via<R, P>(self, processor: Arc<P>) -> Multi<R>
    where
        R: Send + 'static,
        P: Processor<T, R> + 'static,
    {
        lift(ViaPublisher::<T, R, P>::new(self.publisher, processor))
    }

    /// Feed this stream into `subscriber` and emit what `publisher` emits.
    /// Whichever side ends first ends the other; see [`CoupledProcessor`].
    pub fn coupled<R: Send + 'static>(
        self,
        subscriber: Arc<dyn Subscriber<T>>,
        publisher: Arc<dyn Publisher<R>>,
    ) -> Multi<R> {
        self.via::<R, _>(Arc::new(CoupledProcessor::new(subscriber, publisher)))
    }

    /// Share a single upstream subscription among every subscriber of the
    /// returned stream. Items go out once all of them have demand.
    pub fn multicast(self) -> Self
    where
        T: Clone,
    {
        self.via::<T, _>(MulticastProcessor::new())
    }
}

// ---------------------------------------------------------------------------
// Terminals
// ---------------------------------------------------------------------------

impl<T: Send + 'static> Multi<T> {
    pub fn collect<A, R>(&self, collector: Collector<T, A, R>) -> Completion<R>
    where
        A: Send + 'static,
        R: Send + 'static,
    {
        CollectSubscriber::collect(&*self.publisher, collector)
    }

    pub fn to_vec(&self) -> Completion<Vec<T>> {
        self.collect(Collector::to_vec())
    }

    pub fn reduce(
        &self,
        reducer: impl Fn(T, T) -> T + Send + Sync + 'static,
    ) -> Completion<Option<T>> {
        self.collect(Collector::reducing(move |a, b| Ok(reducer(a, b))))
    }

    /// The first item, or `None` for an empty stream. Upstream is cancelled
    /// after the first item.
    pub fn first(&self) -> Completion<Option<T>> {
        let (subscriber, completion) = FirstSubscriber::new();
        self.publisher.subscribe(subscriber);
        completion
    }

    pub fn for_each(&self, consumer: impl Fn(T) + Send + Sync + 'static) -> Completion<()> {
        self.collect(Collector::new(
            || (),
            move |_: &mut (), item: T| {
                consumer(item);
                Ok(())
            },
            Ok,
        ))
    }

    /// Drain the stream, keeping only its terminal signal.
    pub fn ignore_elements(&self) -> Completion<()> {
        self.collect(Collector::new(|| (), |_: &mut (), _: T| Ok(()), Ok))
    }

    /// Subscribe and cancel immediately.
    pub fn cancel(&self) -> Completion<()> {
        let (subscriber, completion) = CancelSubscriber::new();
        self.publisher.subscribe(subscriber);
        completion
    }

    pub fn subscribe_with(&self, subscriber: Arc<dyn Subscriber<T>>) {
        self.publisher.subscribe(subscriber);
    }
}

impl<T: Send + 'static> Publisher<T> for Multi<T> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        self.publisher.subscribe(subscriber);
    }
}
