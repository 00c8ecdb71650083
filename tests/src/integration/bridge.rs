//! # SPI Bridge Integration
//!
//! Pipelines that leave the Flowline family and come back, with the hybrid
//! wrappers in between.

#[cfg(test)]
mod tests {
    use flowline_bridge::spi::{self, Throwable};
    use flowline_bridge::{from_spi_publisher, to_spi_publisher, to_spi_subscriber};
    use flowline_engine::testing::TestSubscriber;
    use flowline_engine::{Collector, FlatMapConfig, FlowError, Multi};
    use flowline_types::Publisher;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// SPI subscriber writing every signal down as a line.
    #[derive(Default)]
    struct Transcript {
        lines: Mutex<Vec<String>>,
    }

    impl spi::Subscriber<String> for Transcript {
        fn on_subscribe(&self, subscription: Arc<dyn spi::Subscription>) {
            subscription.request(i64::MAX);
        }

        fn on_next(&self, item: String) {
            self.lines.lock().push(item);
        }

        fn on_error(&self, error: Throwable) {
            self.lines.lock().push(format!("error: {error}"));
        }

        fn on_complete(&self) {
            self.lines.lock().push("done".to_string());
        }
    }

    #[tokio::test]
    async fn test_round_trip_through_spi_preserves_items() {
        let spi_side = to_spi_publisher(Arc::new(Multi::range(0, 5)));
        let back = Multi::from_publisher(from_spi_publisher(Arc::new(SpiRelay(spi_side))));

        let items = back.map(|x| x * 3).collect(Collector::to_vec()).await.unwrap();
        assert_eq!(items, vec![0, 3, 6, 9, 12]);
    }

    #[test]
    fn test_spi_subscriber_sees_items_then_completion() {
        let publisher = to_spi_publisher(Arc::new(
            Multi::from_iterable(vec!["x", "y"]).map(str::to_string),
        ));
        let transcript = Arc::new(Transcript::default());
        publisher.subscribe(transcript.clone());

        assert_eq!(*transcript.lines.lock(), vec!["x", "y", "done"]);
    }

    #[test]
    fn test_flow_error_keeps_its_kind_across_two_crossings() {
        let source = Multi::<i32>::error(FlowError::NullElement);
        let spi_side = to_spi_publisher(Arc::new(source));
        let back = from_spi_publisher(Arc::new(SpiRelay(spi_side)));

        let recorder = TestSubscriber::<i32>::unbounded();
        back.subscribe(recorder.clone());
        assert_eq!(recorder.error().unwrap().kind(), "null_element");
    }

    #[test]
    fn test_bad_request_from_spi_side_fails_once() {
        let publisher = to_spi_publisher(Arc::new(Multi::range(0, 3).map(|x| x.to_string())));
        let transcript = Arc::new(NoRequest::default());
        publisher.subscribe(transcript.clone());

        let subscription = transcript.subscription.lock().clone().unwrap();
        subscription.request(0);
        subscription.request(0);
        assert_eq!(transcript.errors.lock().len(), 1);
        assert!(transcript.errors.lock()[0].contains("must be positive"));
    }

    #[test]
    fn test_flat_map_over_spi_inners() {
        let source = Multi::range(1, 3).flat_map_with(
            |x| {
                let inner = to_spi_publisher(Arc::new(Multi::from_iterable(vec![x, -x])));
                Multi::from_publisher(from_spi_publisher(Arc::new(SpiRelay(inner))))
            },
            FlatMapConfig::sequential(),
        );
        let recorder = TestSubscriber::<i64>::unbounded();
        source.subscribe(recorder.clone());

        assert_eq!(recorder.items(), vec![1, -1, 2, -2, 3, -3]);
        assert_eq!(recorder.completions(), 1);
    }

    #[test]
    fn test_flow_subscriber_on_foreign_publisher() {
        let spi_side = to_spi_publisher(Arc::new(Multi::range(0, 10)));
        let relay = SpiRelay(spi_side);
        let recorder = TestSubscriber::<i64>::with_request(4);
        spi::Publisher::subscribe(&relay, to_spi_subscriber(recorder.clone()));

        assert_eq!(recorder.items(), vec![0, 1, 2, 3]);
        recorder.cancel();
        recorder.request(4);
        assert_eq!(recorder.item_count(), 4);
        assert_eq!(recorder.terminal_count(), 0);
    }

    /// Opaque SPI publisher, so the bridge cannot see the hybrid behind it.
    struct SpiRelay<T>(Arc<dyn spi::Publisher<T>>);

    impl<T> spi::Publisher<T> for SpiRelay<T> {
        fn subscribe(&self, subscriber: Arc<dyn spi::Subscriber<T>>) {
            self.0.subscribe(subscriber);
        }
    }

    #[derive(Default)]
    struct NoRequest {
        subscription: Mutex<Option<Arc<dyn spi::Subscription>>>,
        errors: Mutex<Vec<String>>,
    }

    impl spi::Subscriber<String> for NoRequest {
        fn on_subscribe(&self, subscription: Arc<dyn spi::Subscription>) {
            *self.subscription.lock() = Some(subscription);
        }

        fn on_next(&self, _item: String) {}

        fn on_error(&self, error: Throwable) {
            self.errors.lock().push(error.to_string());
        }

        fn on_complete(&self) {}
    }
}
