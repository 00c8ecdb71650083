//! # Sources
//!
//! Publishers that originate items: iterables, single values, futures, bare
//! terminal signals and the concatenation of other publishers.

mod concat;
mod future;
mod iter;
mod signals;

pub use concat::ConcatPublisher;
pub use future::FuturePublisher;
pub(crate) use iter::SinglePublisher;
pub use iter::{IterPublisher, NullablePublisher};
pub use signals::{EmptyPublisher, ErrorPublisher, NeverPublisher};
