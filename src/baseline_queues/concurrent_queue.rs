use crate::{ConcurrentQueue, LockFree};

type Unbounded<T> = ::concurrent_queue::ConcurrentQueue<T>;

pub struct UnboundedHandle<'q, T> {
    queue: &'q Unbounded<T>,
}

impl<T> crate::Handle<T> for UnboundedHandle<'_, T> {
    fn enqueue(&mut self, item: T) {
        // An unbounded queue only refuses values once closed, and the
        // benchmark never closes it.
        let _ = self.queue.push(item);
    }

    fn dequeue(&mut self) -> Option<T> {
        self.queue.pop().ok()
    }
}

impl<T> ConcurrentQueue<T> for Unbounded<T> {
    type Granularity = LockFree;

    fn register(&self) -> impl crate::Handle<T> {
        UnboundedHandle { queue: self }
    }
}
