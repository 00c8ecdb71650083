//! # Drain Serialization
//!
//! Every operator that can be signalled from several threads funnels
//! downstream delivery through one [`DrainLoop`]. Whoever moves the
//! work-in-progress counter off zero owns the loop; everybody else bumps the
//! counter and leaves, and the owner keeps looping until it has accounted for
//! every bump.
//!
//! ```text
//!            enter / try_claim                 leave(missed) == 0
//! [Idle] ───────────────────────→ [Draining] ─────────────────────→ [Idle]
//!    │                                 │
//!    ├──────── finish ────────→ [Done] ◄┤
//!    └──────── cancel ────→ [Cancelled] ◄┘
//! ```
//!
//! `Done` and `Cancelled` are terminal; the first transition into either
//! wins and every later attempt reports `false`.

use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

/// Observable state of a drain loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainState {
    /// Nobody is delivering.
    Idle,
    /// A thread owns delivery.
    Draining,
    /// A terminal signal has been delivered (or is being delivered).
    Done,
    /// The downstream cancelled.
    Cancelled,
}

#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Open = 0,
    Done = 1,
    Cancelled = 2,
}

/// Work-in-progress counter plus terminal lifecycle.
pub struct DrainLoop {
    wip: AtomicUsize,
    lifecycle: AtomicU8,
}

impl DrainLoop {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            wip: AtomicUsize::new(0),
            lifecycle: AtomicU8::new(Lifecycle::Open as u8),
        }
    }

    /// Fast path: take ownership only if nobody is draining (CAS 0 → 1).
    pub fn try_claim(&self) -> bool {
        self.wip
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Slow path: register pending work. Returns `true` if the caller became
    /// the owner and must run the loop.
    pub fn enter(&self) -> bool {
        self.wip.fetch_add(1, Ordering::AcqRel) == 0
    }

    /// Retire `missed` units of work. A non-zero result means more work
    /// arrived meanwhile and the owner must loop again with that value.
    pub fn leave(&self, missed: usize) -> usize {
        self.wip.fetch_sub(missed, Ordering::AcqRel) - missed
    }

    /// Transition to `Done`. Only the first terminal transition succeeds.
    pub fn finish(&self) -> bool {
        self.close(Lifecycle::Done)
    }

    /// Transition to `Cancelled`. Only the first terminal transition succeeds.
    pub fn cancel(&self) -> bool {
        self.close(Lifecycle::Cancelled)
    }

    fn close(&self, to: Lifecycle) -> bool {
        self.lifecycle
            .compare_exchange(
                Lifecycle::Open as u8,
                to as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.lifecycle.load(Ordering::Acquire) == Lifecycle::Cancelled as u8
    }

    /// `Done` or `Cancelled`.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.lifecycle.load(Ordering::Acquire) != Lifecycle::Open as u8
    }

    #[must_use]
    pub fn state(&self) -> DrainState {
        match self.lifecycle.load(Ordering::Acquire) {
            x if x == Lifecycle::Done as u8 => DrainState::Done,
            x if x == Lifecycle::Cancelled as u8 => DrainState::Cancelled,
            _ if self.wip.load(Ordering::Acquire) > 0 => DrainState::Draining,
            _ => DrainState::Idle,
        }
    }
}

impl Default for DrainLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DrainLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DrainLoop")
            .field("state", &self.state())
            .field("wip", &self.wip.load(Ordering::Acquire))
            .finish()
    }
}
