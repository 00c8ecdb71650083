//! # Flowline Test Suite
//!
//! Cross-crate tests that exercise whole pipelines rather than one stage.
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── src/integration/
//! │   ├── protocol.rs     # demand, bad requests, cancel, completion
//! │   ├── flat_map.rs     # concurrency, ordering, prefetch, delayed errors
//! │   ├── collect.rs      # terminal reduction and its failure paths
//! │   ├── threads.rs      # producers and requesters on other threads
//! │   └── bridge.rs       # pipelines crossing the SPI boundary
//! └── benches/
//!     └── stream_benchmarks.rs
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p flowline-tests
//! cargo test -p flowline-tests integration::flat_map::
//! cargo bench -p flowline-tests
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod integration;
pub mod support;
