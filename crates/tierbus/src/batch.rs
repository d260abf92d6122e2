//! Priority-ordered, single-use traversal over one type level's subscribers.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use crate::subscription::Subscription;

struct Ranked(Arc<Subscription>);

// Priority only: equal priorities come out in no particular order.
impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.priority().cmp(&other.0.priority())
    }
}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.0.priority() == other.0.priority()
    }
}

impl Eq for Ranked {}

/// The subscribers of one event type level for one post, highest priority
/// first. Each descriptor is yielded exactly once.
pub struct EventBatch {
    queue: BinaryHeap<Ranked>,
}

impl EventBatch {
    /// Builds a batch from a registry snapshot.
    pub fn new(subscriptions: impl IntoIterator<Item = Arc<Subscription>>) -> Self {
        Self {
            queue: subscriptions.into_iter().map(Ranked).collect(),
        }
    }

    /// A batch holding one descriptor, used for sticky replay.
    pub fn single(subscription: Arc<Subscription>) -> Self {
        Self::new([subscription])
    }

    /// Descriptors not yet yielded.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// True once drained.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl Iterator for EventBatch {
    type Item = Arc<Subscription>;

    fn next(&mut self) -> Option<Arc<Subscription>> {
        self.queue.pop().map(|ranked| ranked.0)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.queue.len(), Some(self.queue.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache;
    use crate::event::Event;
    use crate::subscriber::{Methods, Subscriber, ThreadAffinity};

    struct Job;
    impl Event for Job {}

    struct Worker;

    impl Subscriber for Worker {
        fn subscriptions(methods: &mut Methods<Self>) {
            methods.on::<Job, _>(ThreadAffinity::Posting, |_, _| Ok(()));
        }
    }

    fn at(object: &Arc<Worker>, priority: i32) -> Arc<Subscription> {
        let templates = cache::resolve::<Worker>();
        Arc::new(Subscription::bind(object, &templates[0], priority))
    }

    #[test]
    fn yields_in_descending_priority() {
        let object = Arc::new(Worker);
        let priorities = [5, 300, -2, 100, 200, 100];
        let batch = EventBatch::new(priorities.iter().map(|p| at(&object, *p)));
        assert_eq!(batch.len(), 6);

        let order: Vec<i32> = batch.map(|s| s.priority()).collect();
        assert_eq!(order, vec![300, 200, 100, 100, 5, -2]);
    }

    #[test]
    fn every_descriptor_is_yielded_once() {
        let object = Arc::new(Worker);
        let subs: Vec<_> = (0..50).map(|_| at(&object, fastrand::i32(0..4))).collect();
        let mut ids: Vec<_> = EventBatch::new(subs.clone()).map(|s| s.id()).collect();
        let mut expected: Vec<_> = subs.iter().map(|s| s.id()).collect();
        ids.sort();
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[test]
    fn single_and_empty_batches() {
        let object = Arc::new(Worker);
        let mut batch = EventBatch::single(at(&object, 1));
        assert!(batch.next().is_some());
        assert!(batch.next().is_none());
        assert!(batch.is_empty());
        assert!(EventBatch::new(Vec::new()).next().is_none());
    }
}
