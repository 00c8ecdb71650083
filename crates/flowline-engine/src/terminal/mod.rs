//! # Terminal Stages
//!
//! Subscribers that end a chain and expose its outcome as a [`Completion`]:
//! collecting reductions, first-item, cancel, and pre-built subscriber
//! chains.

mod builder;
mod collect;
mod completion;
mod first;

pub use builder::{SubscriberBuilder, SubscriberWithCompletion};
pub(crate) use collect::CollectSubscriber;
pub use collect::Collector;
pub use completion::Completion;
pub(crate) use first::{CancelSubscriber, FirstSubscriber};
