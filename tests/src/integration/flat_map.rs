//! # Flat-Map Integration
//!
//! Merge ordering, concurrency bounds, per-inner prefetch and the two
//! error modes of the bounded-concurrency flat-map, plus its sequential
//! sibling `concat_map`.

#[cfg(test)]
mod tests {
    use crate::support::threaded;
    use flowline_engine::testing::TestSubscriber;
    use flowline_engine::{FlatMapConfig, FlowError, Multi};
    use flowline_types::Publisher;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    // =========================================================================
    // ORDERING
    // =========================================================================

    #[tokio::test]
    async fn test_duplicating_mapper_keeps_order_at_concurrency_one() {
        let result = Multi::from_iterable(vec![1, 2, 3])
            .flat_map_with(|x| Multi::from_iterable(vec![x, x]), FlatMapConfig::sequential())
            .to_vec()
            .await
            .unwrap();
        assert_eq!(result, vec![1, 1, 2, 2, 3, 3]);
    }

    #[tokio::test]
    async fn test_concurrency_one_matches_concat_map() {
        let inner = |x: i64| Multi::range(x * 10, 3);

        let merged = Multi::range(1, 5)
            .flat_map_with(inner, FlatMapConfig::sequential())
            .to_vec()
            .await
            .unwrap();
        let concatenated = Multi::range(1, 5).concat_map(inner).to_vec().await.unwrap();

        assert_eq!(merged, concatenated);
        assert_eq!(merged[..4], [10, 11, 12, 20]);
        assert_eq!(merged.len(), 15);
    }

    #[test]
    fn test_single_item_inners_all_arrive_once() {
        const K: i64 = 24;
        let config = FlatMapConfig::default().with_max_concurrency(K as usize);
        let source = Multi::range(0, K).flat_map_with(|x| threaded(vec![x]), config);
        let recorder = TestSubscriber::<i64>::unbounded();
        source.subscribe(recorder.clone());

        assert!(recorder.await_terminal(WAIT));
        let mut items = recorder.items();
        items.sort_unstable();
        assert_eq!(items, (0..K).collect::<Vec<_>>());
        assert_eq!(recorder.completions(), 1);
        assert_eq!(recorder.violations(), 0);
    }

    // =========================================================================
    // BOUNDS
    // =========================================================================

    #[test]
    fn test_items_emitted_per_inner_stay_within_prefetch() {
        let emitted: Arc<Vec<AtomicUsize>> =
            Arc::new((0..3).map(|_| AtomicUsize::new(0)).collect());
        let counters = Arc::clone(&emitted);
        let config = FlatMapConfig::default()
            .with_max_concurrency(3)
            .with_prefetch(4);
        let source = Multi::range(0, 3).flat_map_with(
            move |i| {
                let counters = Arc::clone(&counters);
                Multi::range(0, 100).peek(move |_| {
                    counters[i as usize].fetch_add(1, Ordering::SeqCst);
                })
            },
            config,
        );
        let recorder = TestSubscriber::<i64>::new();
        source.subscribe(recorder.clone());

        for counter in emitted.iter() {
            assert!(counter.load(Ordering::SeqCst) <= 4);
        }
        assert_eq!(recorder.item_count(), 0);

        recorder.request(5);
        assert_eq!(recorder.item_count(), 5);
        for counter in emitted.iter() {
            assert!(counter.load(Ordering::SeqCst) <= 4 + 5);
        }
        recorder.cancel();
    }

    #[test]
    fn test_outer_is_not_drained_past_concurrency() {
        let pulled = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&pulled);
        let source = Multi::range(0, 50)
            .peek(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .flat_map_with(
                |_| Multi::<i64>::never(),
                FlatMapConfig::default().with_max_concurrency(4),
            );
        let recorder = TestSubscriber::<i64>::unbounded();
        source.subscribe(recorder.clone());

        assert_eq!(pulled.load(Ordering::SeqCst), 4);
        recorder.cancel();
    }

    // =========================================================================
    // ERRORS
    // =========================================================================

    fn failing_at_two(x: i32) -> Multi<i32> {
        if x == 2 {
            Multi::error(FlowError::upstream("inner 2 failed"))
        } else {
            Multi::just(x)
        }
    }

    #[test]
    fn test_delayed_error_arrives_after_every_item() {
        let config = FlatMapConfig::sequential().with_delay_errors(true);
        let source = Multi::from_iterable(vec![1, 2, 3, 4]).flat_map_with(failing_at_two, config);
        let recorder = TestSubscriber::<i32>::unbounded();
        source.subscribe(recorder.clone());

        assert_eq!(recorder.items(), vec![1, 3, 4]);
        assert_eq!(recorder.errors().len(), 1);
        assert_eq!(recorder.error().unwrap().kind(), "upstream");
        assert_eq!(recorder.completions(), 0);
    }

    #[test]
    fn test_several_delayed_errors_are_aggregated() {
        let config = FlatMapConfig::sequential().with_delay_errors(true);
        let source = Multi::from_iterable(vec![1, 2, 3]).flat_map_with(
            |x| {
                if x == 2 {
                    Multi::just(x)
                } else {
                    Multi::error(FlowError::upstream(format!("inner {x}")))
                }
            },
            config,
        );
        let recorder = TestSubscriber::<i32>::unbounded();
        source.subscribe(recorder.clone());

        assert_eq!(recorder.items(), vec![2]);
        let error = recorder.error().unwrap();
        assert_eq!(error.kind(), "composite");
        assert_eq!(error.suppressed().len(), 2);
    }

    #[test]
    fn test_fail_fast_cancels_remaining_inners() {
        let source = Multi::from_iterable(vec![1, 2, 3, 4])
            .flat_map_with(failing_at_two, FlatMapConfig::sequential());
        let recorder = TestSubscriber::<i32>::unbounded();
        source.subscribe(recorder.clone());

        assert_eq!(recorder.items(), vec![1]);
        assert_eq!(recorder.terminal_count(), 1);
        assert_eq!(recorder.error().unwrap().kind(), "upstream");
    }

    #[test]
    fn test_mapper_failure_fails_the_stream() {
        let source = Multi::range(0, 10).try_flat_map_with(
            |x| {
                if x == 3 {
                    Err(FlowError::callback("no inner for 3"))
                } else {
                    Ok(Multi::just(x))
                }
            },
            FlatMapConfig::sequential(),
        );
        let recorder = TestSubscriber::<i64>::unbounded();
        source.subscribe(recorder.clone());

        assert_eq!(recorder.items(), vec![0, 1, 2]);
        assert_eq!(recorder.error().unwrap().kind(), "callback");
    }

    #[tokio::test]
    async fn test_concat_map_resubscribes_inners_in_order() {
        let result = Multi::from_iterable(vec!["a", "b"])
            .concat_map(|s| Multi::from_iterable(vec![s.to_string(), s.to_uppercase()]))
            .to_vec()
            .await
            .unwrap();
        assert_eq!(result, vec!["a", "A", "b", "B"]);
    }
}
