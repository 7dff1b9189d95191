use crossbeam_queue::SegQueue;

use crate::{ConcurrentQueue, LockFree};

pub struct SegQueueHandle<'q, T> {
    queue: &'q SegQueue<T>,
}

impl<T> crate::Handle<T> for SegQueueHandle<'_, T> {
    fn enqueue(&mut self, item: T) {
        self.queue.push(item);
    }

    fn dequeue(&mut self) -> Option<T> {
        self.queue.pop()
    }
}

impl<T> ConcurrentQueue<T> for SegQueue<T> {
    type Granularity = LockFree;

    fn register(&self) -> impl crate::Handle<T> {
        SegQueueHandle { queue: self }
    }
}
