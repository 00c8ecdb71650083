//! # Demand Accounting
//!
//! Outstanding demand is a saturating counter capped at [`UNBOUNDED`]
//! (`i64::MAX`, the largest value a single `request` can carry). Once the
//! cap is reached the counter stays there and emissions no longer decrement
//! it.

use crate::errors::FlowError;
use std::sync::atomic::{AtomicU64, Ordering};

/// Demand value meaning "emit without limit".
pub const UNBOUNDED: u64 = i64::MAX as u64;

/// Check a `request(n)` argument.
pub fn validate_request(n: i64) -> Result<u64, FlowError> {
    if n <= 0 {
        Err(FlowError::IllegalArgument { requested: n })
    } else {
        Ok(n as u64)
    }
}

/// Convert an internal demand amount back into a `request` argument.
#[must_use]
pub fn as_request(n: u64) -> i64 {
    n.min(UNBOUNDED) as i64
}

/// Saturating, non-negative outstanding demand.
#[derive(Debug, Default)]
pub struct Demand {
    requested: AtomicU64,
}

impl Demand {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            requested: AtomicU64::new(0),
        }
    }

    /// Add `n`, clamping at [`UNBOUNDED`]. Returns the previous value.
    pub fn add(&self, n: u64) -> u64 {
        let mut current = self.requested.load(Ordering::Acquire);
        loop {
            if current == UNBOUNDED {
                return UNBOUNDED;
            }
            let next = current.saturating_add(n).min(UNBOUNDED);
            match self.requested.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(previous) => return previous,
                Err(actual) => current = actual,
            }
        }
    }

    /// Account for `n` emitted items. Returns the remaining demand.
    pub fn produced(&self, n: u64) -> u64 {
        let mut current = self.requested.load(Ordering::Acquire);
        loop {
            if current == UNBOUNDED {
                return UNBOUNDED;
            }
            debug_assert!(n <= current, "emitted {n} items with only {current} requested");
            let next = current.saturating_sub(n);
            match self.requested.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }

    /// Take one unit of demand if any is outstanding.
    pub fn try_take_one(&self) -> bool {
        let mut current = self.requested.load(Ordering::Acquire);
        loop {
            if current == 0 {
                return false;
            }
            if current == UNBOUNDED {
                return true;
            }
            match self.requested.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Reset to zero and return what was outstanding.
    pub fn take(&self) -> u64 {
        self.requested.swap(0, Ordering::AcqRel)
    }

    #[must_use]
    pub fn get(&self) -> u64 {
        self.requested.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_unbounded(&self) -> bool {
        self.get() == UNBOUNDED
    }
}
