use std::sync::atomic::{AtomicUsize, Ordering};

use crate::BlockingQueue;

/// Counts the values pushed into and popped out of the wrapped queue.
///
/// The counters are only advisory under concurrency: a push is counted before
/// the value becomes visible, so `enq_count() - deq_count()` can briefly run
/// ahead of `len()`.
#[derive(Debug)]
pub struct CountableWrapper<Q> {
    queue: Q,
    enq_count: AtomicUsize,
    deq_count: AtomicUsize,
}

impl<Q> CountableWrapper<Q> {
    pub fn new(queue: Q) -> Self {
        Self {
            queue,
            enq_count: 0.into(),
            deq_count: 0.into(),
        }
    }

    pub fn inner(&self) -> &Q {
        &self.queue
    }

    pub fn enq_count(&self) -> usize {
        self.enq_count.load(Ordering::Relaxed)
    }

    pub fn deq_count(&self) -> usize {
        self.deq_count.load(Ordering::Relaxed)
    }

    fn count_dequeue<T>(&self, item: Option<T>) -> Option<T> {
        if item.is_some() {
            self.deq_count.fetch_add(1, Ordering::Relaxed);
        }
        item
    }
}

impl<Q: Default> Default for CountableWrapper<Q> {
    fn default() -> Self {
        Self::new(Q::default())
    }
}

impl<Q, T> BlockingQueue<T> for CountableWrapper<Q>
where
    Q: BlockingQueue<T>,
{
    fn push(&self, value: T) {
        self.enq_count.fetch_add(1, Ordering::Relaxed);
        self.queue.push(value)
    }

    fn try_pop(&self) -> Option<T> {
        self.count_dequeue(self.queue.try_pop())
    }

    fn wait_and_pop(&self) -> T {
        let item = self.queue.wait_and_pop();
        self.deq_count.fetch_add(1, Ordering::Relaxed);
        item
    }

    fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    fn len(&self) -> usize {
        self.queue.len()
    }

    /// Swaps the wrapped queues' contents. The counters stay with their wrapper.
    fn swap(&self, other: &Self) {
        self.queue.swap(&other.queue)
    }
}
