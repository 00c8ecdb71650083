//! # Integration Tests
//!
//! Whole pipelines assembled with the `Multi` facade and observed through a
//! `TestSubscriber` or a `Completion`.

mod bridge;
mod collect;
mod flat_map;
mod protocol;
mod threads;
