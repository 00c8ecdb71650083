//! # Flowline Types Crate
//!
//! The protocol every Flowline stage speaks, plus the small lock-free
//! building blocks the operators share.
//!
//! ## Protocol
//!
//! ```text
//!  Subscriber                         Publisher
//!      │ ◄──── on_subscribe(s) ─────────  │
//!      │ ───── s.request(n) ────────────► │
//!      │ ◄──── on_next(item) (≤ n) ─────  │
//!      │ ◄──── on_complete | on_error ──  │   exactly once
//!      │ ───── s.cancel() ──────────────► │   any time, idempotent
//! ```
//!
//! ## Building Blocks
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`Demand`] | Saturating outstanding-demand counter |
//! | [`UpstreamSlot`] | Set-once upstream subscription with deferred requests |
//! | [`DrainLoop`] | Work-in-progress serialization of downstream delivery |
//! | [`ErrorCollector`] | Arrival-ordered error aggregation |

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod demand;
pub mod drain;
pub mod errors;
pub mod protocol;
pub mod slot;

pub use demand::{as_request, validate_request, Demand, UNBOUNDED};
pub use drain::{DrainLoop, DrainState};
pub use errors::{CompositeError, ErrorCollector, FlowError};
pub use protocol::{
    noop_subscription, NoopSubscription, Processor, Publisher, Subscriber, Subscription,
};
pub use slot::UpstreamSlot;

/// Result alias used by fallible user callbacks.
pub type FlowResult<T> = Result<T, FlowError>;
