//! Pre-built subscriber chains.
//!
//! A [`SubscriberBuilder`] declares the stages a stream will pass through
//! before there is a stream. Building it wires every stage and the terminal
//! collector behind an inlet, and hands back the inlet as a plain
//! subscriber together with the completion. Subscribing the inlet to a
//! publisher is the last step, so all processors are connected before the
//! upstream subscription arrives.
//!
//! ```rust,ignore
//! let built = SubscriberBuilder::<i32>::new()
//!     .then(|m| m.map(|x| x * 2))
//!     .collect(Collector::to_vec());
//! let (inlet, completion) = built.into_parts();
//! source.subscribe(inlet);
//! assert_eq!(completion.await?, vec![2, 4, 6]);
//! ```

use super::collect::Collector;
use super::completion::Completion;
use crate::multi::Multi;
use crate::ops::DeferredProcessor;
use flowline_types::{Processor, Subscriber};
use std::sync::Arc;

/// Declares a chain from `In` items to `Out` items.
pub struct SubscriberBuilder<In, Out = In> {
    inlet: Arc<DeferredProcessor<In>>,
    chain: Multi<Out>,
}

impl<In: Send + 'static> SubscriberBuilder<In, In> {
    #[must_use]
    pub fn new() -> Self {
        let inlet = Arc::new(DeferredProcessor::<In>::new());
        let chain = Multi::<In>::from_publisher(inlet.clone());
        Self { inlet, chain }
    }
}

impl<In: Send + 'static> Default for SubscriberBuilder<In, In> {
    fn default() -> Self {
        Self::new()
    }
}

impl<In, Out> SubscriberBuilder<In, Out>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    /// Append stages using the [`Multi`] operators.
    pub fn then<Next: Send + 'static>(
        self,
        stage: impl FnOnce(Multi<Out>) -> Multi<Next>,
    ) -> SubscriberBuilder<In, Next> {
        SubscriberBuilder {
            inlet: self.inlet,
            chain: stage(self.chain),
        }
    }

    pub fn via<Next, P>(self, processor: Arc<P>) -> SubscriberBuilder<In, Next>
    where
        Next: Send + 'static,
        P: Processor<Out, Next> + 'static,
    {
        self.then(|chain| chain.via(processor))
    }

    /// Wire the chain into `collector`.
    pub fn collect<A, R>(
        self,
        collector: Collector<Out, A, R>,
    ) -> SubscriberWithCompletion<In, R>
    where
        A: Send + 'static,
        R: Send + 'static,
    {
        let completion = self.chain.collect(collector);
        SubscriberWithCompletion {
            inlet: self.inlet,
            completion,
        }
    }
}

/// A wired chain: subscribe [`SubscriberWithCompletion::subscriber`] to a
/// publisher and await the completion.
pub struct SubscriberWithCompletion<In, R> {
    inlet: Arc<DeferredProcessor<In>>,
    completion: Completion<R>,
}

impl<In: Send + 'static, R> SubscriberWithCompletion<In, R> {
    pub fn subscriber(&self) -> Arc<dyn Subscriber<In>> {
        self.inlet.clone()
    }

    pub fn into_parts(self) -> (Arc<dyn Subscriber<In>>, Completion<R>) {
        let inlet: Arc<dyn Subscriber<In>> = self.inlet;
        (inlet, self.completion)
    }

    pub fn completion(self) -> Completion<R> {
        self.completion
    }
}
