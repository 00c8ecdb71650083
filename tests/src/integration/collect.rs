//! # Terminal Reduction
//!
//! Collectors at the end of real pipelines, including the failure paths
//! that must settle the completion exactly once.

#[cfg(test)]
mod tests {
    use flowline_engine::{Collector, FlowError, Multi, SubscriberBuilder};
    use flowline_types::Publisher;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_accumulator_failure_stops_on_second_item() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let collector = Collector::new(
            Vec::new,
            move |acc: &mut Vec<i32>, item: i32| {
                if counter.fetch_add(1, Ordering::SeqCst) == 1 {
                    return Err(FlowError::callback("rejected second item"));
                }
                acc.push(item);
                Ok(())
            },
            Ok,
        );

        let result = Multi::from_iterable(vec![1, 2, 3, 4]).collect(collector).await;

        assert_eq!(result.unwrap_err().kind(), "callback");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_accumulator_failure_cancels_upstream() {
        let cancels = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&cancels);
        let source = Multi::range(0, 1000).on_cancel(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let collector = Collector::new(
            || 0i64,
            |sum: &mut i64, item: i64| {
                if item == 10 {
                    return Err(FlowError::callback("too far"));
                }
                *sum += item;
                Ok(())
            },
            Ok,
        );

        assert!(source.collect(collector).await.is_err());
        assert_eq!(cancels.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_pipeline_reduces_to_single_value() {
        let total = Multi::range(1, 10)
            .filter(|x| x % 2 == 1)
            .map(|x| x * x)
            .reduce(|a, b| a + b)
            .await
            .unwrap();
        assert_eq!(total, Some(1 + 9 + 25 + 49 + 81));

        let empty = Multi::<i64>::empty().reduce(|a, b| a + b).await.unwrap();
        assert_eq!(empty, None);
    }

    #[tokio::test]
    async fn test_joining_after_resume() {
        let source = Multi::concat(
            Multi::from_iterable(vec![1, 2]),
            Multi::error(FlowError::upstream("broken tail")),
        )
        .on_error_resume(|_| 0);

        let joined = source.collect(Collector::joining(",")).await.unwrap();
        assert_eq!(joined, "1,2,0");
    }

    #[tokio::test]
    async fn test_first_cancels_the_rest() {
        let emitted = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&emitted);
        let first = Multi::range(5, 100)
            .peek(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .first()
            .await
            .unwrap();

        assert_eq!(first, Some(5));
        assert_eq!(emitted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_builder_chain_subscribed_later() {
        let built = SubscriberBuilder::<i64>::new()
            .then(|m| m.skip(2).limit(3))
            .then(|m| m.map(|x| x * 100))
            .collect(Collector::to_vec());
        let (inlet, completion) = built.into_parts();

        Multi::range(0, 10).subscribe(inlet);
        assert_eq!(completion.await.unwrap(), vec![200, 300, 400]);
    }

    #[test]
    fn test_blocking_get_on_plain_thread() {
        let count = Multi::range(0, 1_000)
            .flat_map(|x| Multi::from_iterable(vec![x, x]))
            .collect(Collector::counting())
            .blocking_get()
            .unwrap();
        assert_eq!(count, 2_000);
    }
}
