//! Count-based stages: limit and skip.

use super::stage::{StageLogic, Step};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Emits at most `limit` items, then cancels upstream and completes.
/// Never asks upstream for more than it will emit.
pub(crate) struct LimitLogic {
    limit: u64,
    remaining: AtomicU64,
    unrequested: AtomicU64,
}

impl LimitLogic {
    pub(crate) fn new(limit: u64) -> Self {
        Self {
            limit,
            remaining: AtomicU64::new(limit),
            unrequested: AtomicU64::new(limit),
        }
    }
}

impl<T: 'static> StageLogic<T, T> for LimitLogic {
    fn on_item(&self, item: T) -> Step<T> {
        match self.remaining.fetch_sub(1, Ordering::AcqRel) {
            0 => Step::Complete,
            1 => Step::EmitAndComplete(item),
            _ => Step::Emit(item),
        }
    }

    fn forward_request(&self, n: u64) -> u64 {
        let mut budget = self.unrequested.load(Ordering::Acquire);
        loop {
            let take = n.min(budget);
            if take == 0 {
                return 0;
            }
            match self.unrequested.compare_exchange_weak(
                budget,
                budget - take,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return take,
                Err(actual) => budget = actual,
            }
        }
    }

    fn completes_immediately(&self) -> bool {
        self.limit == 0
    }
}

/// Drops the first `count` items. The dropped items are requested on top of
/// the first downstream request.
pub(crate) struct SkipLogic {
    count: u64,
    remaining: AtomicU64,
    first_request: AtomicBool,
}

impl SkipLogic {
    pub(crate) fn new(count: u64) -> Self {
        Self {
            count,
            remaining: AtomicU64::new(count),
            first_request: AtomicBool::new(true),
        }
    }
}

impl<T: 'static> StageLogic<T, T> for SkipLogic {
    fn on_item(&self, item: T) -> Step<T> {
        // serial on_next: load then store cannot race
        let remaining = self.remaining.load(Ordering::Acquire);
        if remaining == 0 {
            return Step::Emit(item);
        }
        self.remaining.store(remaining - 1, Ordering::Release);
        Step::Discard
    }

    fn forward_request(&self, n: u64) -> u64 {
        if self.first_request.swap(false, Ordering::AcqRel) {
            n.saturating_add(self.count)
        } else {
            n
        }
    }
}
