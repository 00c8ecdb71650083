//! # Cross-Thread Delivery
//!
//! Requests, cancels and emissions racing on different threads must still
//! produce a serialized, demand-respecting signal sequence.

#[cfg(test)]
mod tests {
    use crate::support::threaded;
    use flowline_engine::testing::TestSubscriber;
    use flowline_engine::{Collector, FlatMapConfig, Multi};
    use flowline_types::Publisher;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn test_concurrent_requests_are_summed() {
        let source = Multi::range(0, 400).map(|x| x + 1);
        let recorder = TestSubscriber::<i64>::new();
        source.subscribe(recorder.clone());

        let requesters: Vec<_> = (0..4)
            .map(|_| {
                let recorder = Arc::clone(&recorder);
                thread::spawn(move || {
                    for _ in 0..25 {
                        recorder.request(1);
                    }
                })
            })
            .collect();
        for requester in requesters {
            requester.join().unwrap();
        }

        assert_eq!(recorder.item_count(), 100);
        assert_eq!(recorder.items(), (1..=100).collect::<Vec<_>>());
        assert_eq!(recorder.violations(), 0);
        assert!(!recorder.is_complete());
    }

    #[test]
    fn test_cancel_races_with_requests() {
        for _ in 0..20 {
            let source = Multi::range(0, 100_000);
            let recorder = TestSubscriber::<i64>::new();
            source.subscribe(recorder.clone());

            let requester = {
                let recorder = Arc::clone(&recorder);
                thread::spawn(move || {
                    for _ in 0..100 {
                        recorder.request(10);
                    }
                })
            };
            let canceller = {
                let recorder = Arc::clone(&recorder);
                thread::spawn(move || {
                    recorder.cancel();
                    recorder.cancel();
                })
            };
            requester.join().unwrap();
            canceller.join().unwrap();

            let after_cancel = recorder.item_count();
            recorder.request(50);
            assert_eq!(recorder.item_count(), after_cancel);
            assert!(after_cancel <= 1_000);
            assert_eq!(recorder.terminal_count(), 0);
            assert_eq!(recorder.violations(), 0);
        }
    }

    #[test]
    fn test_merge_of_threaded_inners_is_serialized() {
        let config = FlatMapConfig::default()
            .with_max_concurrency(8)
            .with_prefetch(2);
        let source = Multi::range(0, 32).flat_map_with(
            |x| threaded((0..10).map(|i| x * 100 + i).collect()),
            config,
        );
        let recorder = TestSubscriber::<i64>::unbounded();
        source.subscribe(recorder.clone());

        assert!(recorder.await_terminal(WAIT));
        assert_eq!(recorder.item_count(), 320);
        assert_eq!(recorder.completions(), 1);
        assert_eq!(recorder.violations(), 0);

        let mut items = recorder.items();
        items.sort_unstable();
        items.dedup();
        assert_eq!(items.len(), 320);
    }

    #[test]
    fn test_multicast_to_subscribers_requesting_from_own_threads() {
        let shared = threaded((0..200).collect::<Vec<i64>>()).multicast();
        let recorders: Vec<_> = (0..3).map(|_| TestSubscriber::<i64>::new()).collect();
        for recorder in &recorders {
            shared.subscribe(recorder.clone());
        }

        let requesters: Vec<_> = recorders
            .iter()
            .map(|recorder| {
                let recorder = Arc::clone(recorder);
                thread::spawn(move || {
                    for _ in 0..20 {
                        recorder.request(10);
                    }
                })
            })
            .collect();
        for requester in requesters {
            requester.join().unwrap();
        }

        for recorder in &recorders {
            assert!(recorder.await_terminal(WAIT));
            assert_eq!(recorder.items(), (0..200).collect::<Vec<_>>());
            assert_eq!(recorder.completions(), 1);
            assert_eq!(recorder.violations(), 0);
        }
    }

    #[test]
    fn test_slow_consumer_receives_merge_in_small_steps() {
        let source = Multi::range(0, 6).flat_map_with(
            |x| threaded(vec![x; 5]),
            FlatMapConfig::default().with_max_concurrency(3).with_prefetch(2),
        );
        let recorder = TestSubscriber::<i64>::new();
        source.subscribe(recorder.clone());

        let mut expected = 0;
        while !recorder.is_complete() {
            expected = (expected + 3).min(30);
            recorder.request(3);
            assert!(recorder.await_items(expected, WAIT));
            assert!(recorder.item_count() <= expected);
            if expected == 30 {
                assert!(recorder.await_terminal(WAIT));
            }
        }
        assert_eq!(recorder.item_count(), 30);
        assert_eq!(recorder.violations(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_completion_awaited_while_inners_emit_elsewhere() {
        let sum = Multi::range(1, 50)
            .flat_map(|x| threaded(vec![x]))
            .collect(Collector::reducing(|a: i64, b: i64| Ok(a + b)))
            .await
            .unwrap();
        assert_eq!(sum, Some((1..=50).sum()));
    }
}
