//! # Error Types
//!
//! Values delivered through `on_error`. A stream sees at most one of them.

use arc_swap::ArcSwapOption;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Terminal error of a stream.
#[derive(Debug, Clone, Error)]
pub enum FlowError {
    /// `request(n)` was called with `n <= 0`.
    #[error("illegal argument: request({requested}) must be positive")]
    IllegalArgument { requested: i64 },

    /// A nullable source produced a missing element.
    #[error("publisher produced a null element")]
    NullElement,

    /// A user supplied function (mapper, predicate, accumulator, ...) failed.
    #[error("callback failed: {0}")]
    Callback(Arc<anyhow::Error>),

    /// Several failures collected while errors were delayed.
    #[error(transparent)]
    Composite(CompositeError),

    /// The stream was dropped before producing a terminal signal.
    #[error("stream dropped before a terminal signal")]
    Abandoned,

    /// Failure raised by a source.
    #[error("upstream failed: {0}")]
    Upstream(String),

    /// A stage was used in a way its lifecycle does not allow.
    #[error("illegal state: {0}")]
    IllegalState(&'static str),
}

impl FlowError {
    /// Wrap a user-code failure message.
    pub fn callback<M>(message: M) -> Self
    where
        M: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        Self::Callback(Arc::new(anyhow::Error::msg(message)))
    }

    /// Create a source failure.
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream(message.into())
    }

    /// Short label used for logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::IllegalArgument { .. } => "illegal_argument",
            Self::NullElement => "null_element",
            Self::Callback(_) => "callback",
            Self::Composite(_) => "composite",
            Self::Abandoned => "abandoned",
            Self::Upstream(_) => "upstream",
            Self::IllegalState(_) => "illegal_state",
        }
    }

    #[must_use]
    pub fn is_illegal_argument(&self) -> bool {
        matches!(self, Self::IllegalArgument { .. })
    }

    /// Causes held by a composite error, empty for every other kind.
    #[must_use]
    pub fn suppressed(&self) -> &[FlowError] {
        match self {
            Self::Composite(composite) => composite.causes(),
            _ => &[],
        }
    }

    /// Fold `other` into `self`, keeping arrival order.
    ///
    /// A lone error stays unwrapped; the second one turns the pair into a
    /// [`CompositeError`].
    #[must_use]
    pub fn aggregate(self, other: FlowError) -> FlowError {
        match self {
            Self::Composite(mut composite) => {
                composite.causes.push(other);
                Self::Composite(composite)
            }
            first => Self::Composite(CompositeError {
                causes: vec![first, other],
            }),
        }
    }
}

impl From<anyhow::Error> for FlowError {
    fn from(error: anyhow::Error) -> Self {
        Self::Callback(Arc::new(error))
    }
}

/// Pure container for delayed errors. It carries no context of its own.
#[derive(Debug, Clone, Default)]
pub struct CompositeError {
    causes: Vec<FlowError>,
}

impl CompositeError {
    /// Causes in the order they arrived.
    #[must_use]
    pub fn causes(&self) -> &[FlowError] {
        &self.causes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.causes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.causes.is_empty()
    }
}

impl fmt::Display for CompositeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} errors occurred", self.causes.len())?;
        for (index, cause) in self.causes.iter().enumerate() {
            let sep = if index == 0 { ": " } else { "; " };
            write!(f, "{sep}{cause}")?;
        }
        Ok(())
    }
}

impl std::error::Error for CompositeError {}

/// Lock-free slot that accumulates errors in arrival order.
#[derive(Default)]
pub struct ErrorCollector {
    slot: ArcSwapOption<FlowError>,
}

impl ErrorCollector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error.
    pub fn add(&self, error: FlowError) {
        self.slot.rcu(|current| match current {
            None => Some(Arc::new(error.clone())),
            Some(existing) => Some(Arc::new(
                existing.as_ref().clone().aggregate(error.clone()),
            )),
        });
    }

    #[must_use]
    pub fn is_set(&self) -> bool {
        self.slot.load().is_some()
    }

    /// Current value without clearing the slot.
    #[must_use]
    pub fn peek(&self) -> Option<FlowError> {
        self.slot.load_full().map(|error| error.as_ref().clone())
    }

    /// Remove and return the collected error.
    pub fn take(&self) -> Option<FlowError> {
        self.slot
            .swap(None)
            .map(|error| Arc::try_unwrap(error).unwrap_or_else(|shared| shared.as_ref().clone()))
    }
}

impl fmt::Debug for ErrorCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorCollector")
            .field("error", &self.peek())
            .finish()
    }
}
