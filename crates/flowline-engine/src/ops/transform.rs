//! Per-item transformations: map, filter, take-while, drop-while, distinct.

use super::stage::{StageLogic, Step};
use flowline_types::FlowResult;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub(crate) type MapFn<T, R> = Arc<dyn Fn(T) -> FlowResult<R> + Send + Sync>;
pub(crate) type PredicateFn<T> = Arc<dyn Fn(&T) -> FlowResult<bool> + Send + Sync>;

pub(crate) struct MapLogic<T, R> {
    pub(crate) mapper: MapFn<T, R>,
}

impl<T: 'static, R: 'static> StageLogic<T, R> for MapLogic<T, R> {
    fn on_item(&self, item: T) -> Step<R> {
        match (self.mapper)(item) {
            Ok(value) => Step::Emit(value),
            Err(error) => Step::Fail(error),
        }
    }
}

pub(crate) struct FilterLogic<T> {
    pub(crate) predicate: PredicateFn<T>,
}

impl<T: 'static> StageLogic<T, T> for FilterLogic<T> {
    fn on_item(&self, item: T) -> Step<T> {
        match (self.predicate)(&item) {
            Ok(true) => Step::Emit(item),
            Ok(false) => Step::Skip,
            Err(error) => Step::Fail(error),
        }
    }
}

pub(crate) struct TakeWhileLogic<T> {
    pub(crate) predicate: PredicateFn<T>,
}

impl<T: 'static> StageLogic<T, T> for TakeWhileLogic<T> {
    fn on_item(&self, item: T) -> Step<T> {
        match (self.predicate)(&item) {
            Ok(true) => Step::Emit(item),
            Ok(false) => Step::Complete,
            Err(error) => Step::Fail(error),
        }
    }
}

pub(crate) struct DropWhileLogic<T> {
    predicate: PredicateFn<T>,
    dropping: AtomicBool,
}

impl<T> DropWhileLogic<T> {
    pub(crate) fn new(predicate: PredicateFn<T>) -> Self {
        Self {
            predicate,
            dropping: AtomicBool::new(true),
        }
    }
}

impl<T: 'static> StageLogic<T, T> for DropWhileLogic<T> {
    fn on_item(&self, item: T) -> Step<T> {
        if !self.dropping.load(Ordering::Acquire) {
            return Step::Emit(item);
        }
        match (self.predicate)(&item) {
            Ok(true) => Step::Skip,
            Ok(false) => {
                self.dropping.store(false, Ordering::Release);
                Step::Emit(item)
            }
            Err(error) => Step::Fail(error),
        }
    }
}

/// Drops every item equal to one already emitted on this subscription.
pub(crate) struct DistinctLogic<T> {
    seen: Mutex<HashSet<T>>,
}

impl<T> DistinctLogic<T> {
    pub(crate) fn new() -> Self {
        Self {
            seen: Mutex::new(HashSet::new()),
        }
    }
}

impl<T> StageLogic<T, T> for DistinctLogic<T>
where
    T: Eq + Hash + Clone + Send + 'static,
{
    fn on_item(&self, item: T) -> Step<T> {
        if self.seen.lock().insert(item.clone()) {
            Step::Emit(item)
        } else {
            Step::Skip
        }
    }
}
