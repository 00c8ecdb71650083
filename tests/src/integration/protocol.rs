//! # Protocol Contract
//!
//! Demand accounting, request validation, cancellation and completion as
//! seen from the end of an operator chain.

#[cfg(test)]
mod tests {
    use flowline_engine::testing::TestSubscriber;
    use flowline_engine::Multi;
    use flowline_types::Publisher;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    // =========================================================================
    // DEMAND
    // =========================================================================

    proptest! {
        #[test]
        fn test_on_next_count_never_exceeds_cumulative_demand(
            requests in prop::collection::vec(1i64..40, 0..8),
        ) {
            let source = Multi::range(0, 150).map(|x| x + 1);
            let recorder = TestSubscriber::<i64>::new();
            source.subscribe(recorder.clone());

            let mut total = 0i64;
            for n in requests {
                recorder.request(n);
                total += n;
                prop_assert_eq!(recorder.item_count() as i64, total.min(150));
            }
            prop_assert_eq!(recorder.is_complete(), total >= 150);
            prop_assert_eq!(recorder.violations(), 0);
        }
    }

    #[test]
    fn test_demand_saturates_instead_of_overflowing() {
        let source = Multi::range(0, 20).filter(|x| x % 2 == 0);
        let recorder = TestSubscriber::<i64>::new();
        source.subscribe(recorder.clone());

        recorder.request(i64::MAX);
        recorder.request(i64::MAX);
        recorder.request(3);

        assert_eq!(recorder.items(), vec![0, 2, 4, 6, 8, 10, 12, 14, 16, 18]);
        assert_eq!(recorder.completions(), 1);
        assert!(recorder.errors().is_empty());
    }

    // =========================================================================
    // BAD REQUESTS
    // =========================================================================

    #[test]
    fn test_non_positive_request_fails_once() {
        for bad in [0, -1, i64::MIN] {
            let source = Multi::range(0, 10).map(|x| x * 2).limit(5);
            let recorder = TestSubscriber::<i64>::new();
            source.subscribe(recorder.clone());

            recorder.request(bad);
            recorder.request(4);

            let errors = recorder.errors();
            assert_eq!(errors.len(), 1, "request({bad})");
            assert!(errors[0].is_illegal_argument(), "request({bad})");
            assert_eq!(recorder.item_count(), 0);
            assert_eq!(recorder.terminal_count(), 1);
        }
    }

    #[test]
    fn test_bad_request_after_items_keeps_delivered_items() {
        let source = Multi::range(0, 10);
        let recorder = TestSubscriber::<i64>::with_request(2);
        source.subscribe(recorder.clone());

        recorder.request(-5);
        assert_eq!(recorder.items(), vec![0, 1]);
        assert_eq!(recorder.errors().len(), 1);
        assert!(!recorder.is_complete());
    }

    // =========================================================================
    // CANCEL
    // =========================================================================

    #[test]
    fn test_double_cancel_equals_single_cancel() {
        let cancels = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&cancels);
        let source = Multi::range(0, 100)
            .on_cancel(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .map(|x| x * 10);
        let recorder = TestSubscriber::<i64>::with_request(3);
        source.subscribe(recorder.clone());

        recorder.cancel();
        recorder.cancel();
        recorder.request(10);

        assert_eq!(recorder.items(), vec![0, 10, 20]);
        assert_eq!(cancels.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.terminal_count(), 0);
    }

    #[test]
    fn test_cancel_from_terminal_helper() {
        let cancels = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&cancels);
        let source = Multi::range(0, 5).on_cancel(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        source.cancel().blocking_get().unwrap();
        assert_eq!(cancels.load(Ordering::SeqCst), 1);
    }

    // =========================================================================
    // COMPLETION
    // =========================================================================

    #[test]
    fn test_finite_source_fully_requested_completes_once() {
        let items: Vec<u32> = (0..64).collect();
        let source = Multi::from_iterable(items.clone())
            .peek(|_| {})
            .filter(|_| true);
        let recorder = TestSubscriber::<u32>::unbounded();
        source.subscribe(recorder.clone());

        assert_eq!(recorder.items(), items);
        assert_eq!(recorder.completions(), 1);
        assert!(recorder.errors().is_empty());

        recorder.request(1);
        assert_eq!(recorder.terminal_count(), 1);
        assert_eq!(recorder.violations(), 0);
    }

    #[test]
    fn test_each_subscriber_gets_its_own_run() {
        let source = Multi::from_iterable(vec!["a", "b"]);
        let first = TestSubscriber::<&str>::unbounded();
        let second = TestSubscriber::<&str>::with_request(1);
        source.subscribe(first.clone());
        source.subscribe(second.clone());

        assert_eq!(first.items(), vec!["a", "b"]);
        assert_eq!(second.items(), vec!["a"]);
        assert!(!second.is_complete());
    }

    #[test]
    fn test_nullable_source_fails_on_missing_element() {
        let source = Multi::from_nullable(vec![Some(1), None, Some(3)]);
        let recorder = TestSubscriber::<i32>::unbounded();
        source.subscribe(recorder.clone());

        assert_eq!(recorder.items(), vec![1]);
        assert_eq!(recorder.error().unwrap().kind(), "null_element");
    }
}
