//! # Flowline Engine
//!
//! Back-pressured, cancelable stream operators built on the
//! `flowline-types` protocol.
//!
//! ## Layout
//!
//! ```text
//!   sources ──► ops ──► terminal
//!   (iter,      (map, filter, limit, peek,     (collect, first,
//!    signals,    resume, concat_map,            cancel, builder)
//!    future,     flat_map, via, coupled,
//!    concat)     multicast)
//!         ╲          │          ╱
//!          └───── Multi<T> ────┘   fluent facade over all three
//! ```
//!
//! ## Delivery Rules
//!
//! - Sources emit only against outstanding demand, from inside a drain
//!   loop, so a downstream requesting more from `on_next` never recurses.
//! - Operators that merge several producers (`flat_map`, `concat`,
//!   `concat_map`, error resume) serialize downstream signals; `on_next`
//!   calls never overlap.
//! - A non-positive `request` fails the stream with
//!   [`FlowError::IllegalArgument`](flowline_types::FlowError).
//! - Every stage drops its upstream reference on a terminal signal or
//!   cancel.

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

mod arbiter;
pub mod config;
pub mod metrics;
mod multi;
pub mod ops;
mod serializer;
pub mod sources;
pub mod terminal;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::{EngineConfig, FlatMapConfig, DEFAULT_MAX_CONCURRENCY, DEFAULT_PREFETCH};
pub use multi::Multi;
pub use ops::{CoupledProcessor, DeferredProcessor, MulticastProcessor};
pub use terminal::{Collector, Completion, SubscriberBuilder, SubscriberWithCompletion};

pub use flowline_types::{
    FlowError, FlowResult, Processor, Publisher, Subscriber, Subscription,
};
