//! Sources shared by the integration tests and benches.

use flowline_engine::sources::IterPublisher;
use flowline_engine::Multi;
use flowline_types::{Publisher, Subscriber};
use std::sync::Arc;
use std::thread;

/// Subscribes its downstream from a freshly spawned thread, so the first
/// items are emitted there.
pub struct ThreadedPublisher<T> {
    items: Vec<T>,
}

impl<T: Clone + Send + Sync + 'static> Publisher<T> for ThreadedPublisher<T> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        let source = IterPublisher::new(self.items.clone());
        thread::spawn(move || source.subscribe(subscriber));
    }
}

pub fn threaded<T: Clone + Send + Sync + 'static>(items: Vec<T>) -> Multi<T> {
    let publisher: Arc<dyn Publisher<T>> = Arc::new(ThreadedPublisher { items });
    Multi::from_publisher(publisher)
}
