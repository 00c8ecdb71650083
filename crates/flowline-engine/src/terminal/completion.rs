//! Deferred result of a terminal stage.

use flowline_types::{FlowError, FlowResult};
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

/// Creates a connected promise/completion pair.
pub(crate) fn promise<R>() -> (Promise<R>, Completion<R>) {
    let (sender, receiver) = oneshot::channel();
    (
        Promise {
            sender: Mutex::new(Some(sender)),
        },
        Completion { receiver },
    )
}

/// Writing side, held by the terminal subscriber. Completes at most once.
pub(crate) struct Promise<R> {
    sender: Mutex<Option<oneshot::Sender<FlowResult<R>>>>,
}

impl<R> Promise<R> {
    /// Returns `false` if the promise was already completed.
    pub(crate) fn complete(&self, result: FlowResult<R>) -> bool {
        let Some(sender) = self.sender.lock().take() else {
            return false;
        };
        // the caller may have dropped the completion; nothing to report then
        let _ = sender.send(result);
        true
    }
}

/// Result of a stream, available once it terminates.
///
/// Await it from async code or call [`Completion::blocking_get`] from a
/// plain thread. If the stream is dropped without a terminal signal the
/// result is [`FlowError::Abandoned`].
#[must_use = "a completion does nothing unless awaited or queried"]
pub struct Completion<R> {
    receiver: oneshot::Receiver<FlowResult<R>>,
}

impl<R> Completion<R> {
    /// Block the current thread until the stream terminates.
    ///
    /// # Panics
    ///
    /// Panics when called from within an async runtime.
    pub fn blocking_get(self) -> FlowResult<R> {
        self.receiver
            .blocking_recv()
            .unwrap_or(Err(FlowError::Abandoned))
    }

    /// The result if the stream has already terminated.
    pub fn try_get(&mut self) -> Option<FlowResult<R>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(Err(FlowError::Abandoned)),
        }
    }
}

impl<R> Future for Completion<R> {
    type Output = FlowResult<R>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(FlowError::Abandoned)))
    }
}
