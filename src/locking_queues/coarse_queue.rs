use std::{
    collections::VecDeque,
    fmt,
    sync::{Condvar, Mutex, MutexGuard},
};

use log::{debug, trace};

use super::lock_order::{by_address, recover};
use crate::{BlockingQueue, Coarse, ConcurrentQueue};

/// Unbounded FIFO queue where a single mutex guards the whole buffer.
///
/// Every operation holds the lock for its entire duration. Operations that
/// touch two queues lock the lower-addressed one first.
pub struct CoarseQueue<T> {
    storage: Mutex<VecDeque<T>>,
    not_empty: Condvar,
}

impl<T> CoarseQueue<T> {
    pub fn new() -> Self {
        Self::from_storage(VecDeque::new())
    }

    fn from_storage(storage: VecDeque<T>) -> Self {
        Self {
            storage: Mutex::new(storage),
            not_empty: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        recover(self.storage.lock())
    }

    pub fn push(&self, value: T) {
        self.lock().push_back(value);
        self.not_empty.notify_one();
    }

    /// Builds the value first, so a panicking `make` leaves the queue as it was.
    pub fn emplace<F>(&self, make: F)
    where
        F: FnOnce() -> T,
    {
        self.push(make());
    }

    pub fn try_pop(&self) -> Option<T> {
        self.lock().pop_front()
    }

    pub fn try_pop_into(&self, out: &mut T) -> bool {
        BlockingQueue::try_pop_into(self, out)
    }

    pub fn wait_and_pop(&self) -> T {
        let mut storage = self.lock();
        loop {
            if let Some(value) = storage.pop_front() {
                return value;
            }
            storage = recover(self.not_empty.wait(storage));
        }
    }

    pub fn wait_and_pop_into(&self, out: &mut T) {
        *out = self.wait_and_pop();
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn swap(&self, other: &Self) {
        if std::ptr::eq(self, other) {
            return;
        }
        {
            let (first, second, _) = by_address(self, other);
            let mut first = first.lock();
            let mut second = second.lock();
            std::mem::swap(&mut *first, &mut *second);
        }
        debug!("swapped contents of two coarse queues");
        self.not_empty.notify_all();
        other.not_empty.notify_all();
    }

    /// Replaces the contents with those of `source` and wakes every blocked
    /// consumer. The previous contents are dropped after the lock is released.
    pub fn assign_from(&self, source: Self) {
        let replaced = std::mem::replace(&mut *self.lock(), recover(source.storage.into_inner()));
        self.not_empty.notify_all();
        debug!("move-assigned coarse queue, dropping {} old values", replaced.len());
    }

    /// Moves the contents out, leaving this queue empty.
    pub fn take(&self) -> Self {
        let storage = std::mem::take(&mut *self.lock());
        debug!("took {} values out of coarse queue", storage.len());
        Self::from_storage(storage)
    }
}

impl<T: Clone> CoarseQueue<T> {
    /// Replaces the contents with a copy of `source`. Both locks are held
    /// while copying, so the copy is exactly what `source` held at that time.
    pub fn assign_clone(&self, source: &Self) {
        if std::ptr::eq(self, source) {
            return;
        }
        let replaced = {
            let (first, second, flipped) = by_address(self, source);
            let mut first = first.lock();
            let mut second = second.lock();
            let (target, source) = if flipped {
                (&mut *second, &*first)
            } else {
                (&mut *first, &*second)
            };
            std::mem::replace(target, source.clone())
        };
        self.not_empty.notify_all();
        debug!("copy-assigned coarse queue, dropping {} old values", replaced.len());
    }

    /// Copies the current contents, front first.
    pub fn snapshot(&self) -> Vec<T> {
        self.lock().iter().cloned().collect()
    }
}

impl<T> Default for CoarseQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Clone for CoarseQueue<T> {
    fn clone(&self) -> Self {
        let storage = self.lock();
        Self::from_storage(VecDeque::clone(&storage))
    }
}

impl<T: PartialEq> PartialEq for CoarseQueue<T> {
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        let (first, second, _) = by_address(self, other);
        let first = first.lock();
        let second = second.lock();
        *first == *second
    }
}

impl<T: Eq> Eq for CoarseQueue<T> {}

impl<T> FromIterator<T> for CoarseQueue<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from_storage(iter.into_iter().collect())
    }
}

impl<T> From<Vec<T>> for CoarseQueue<T> {
    fn from(values: Vec<T>) -> Self {
        Self::from_storage(values.into())
    }
}

impl<T> Extend<T> for CoarseQueue<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        recover(self.storage.get_mut()).extend(iter);
    }
}

impl<T> fmt::Debug for CoarseQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoarseQueue")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl<T> BlockingQueue<T> for CoarseQueue<T> {
    fn push(&self, value: T) {
        CoarseQueue::push(self, value);
    }

    fn try_pop(&self) -> Option<T> {
        CoarseQueue::try_pop(self)
    }

    fn wait_and_pop(&self) -> T {
        trace!("waiting on coarse queue");
        CoarseQueue::wait_and_pop(self)
    }

    fn is_empty(&self) -> bool {
        CoarseQueue::is_empty(self)
    }

    fn len(&self) -> usize {
        CoarseQueue::len(self)
    }

    fn swap(&self, other: &Self) {
        CoarseQueue::swap(self, other);
    }
}

pub struct CoarseHandle<'q, T> {
    queue: &'q CoarseQueue<T>,
}

impl<T> crate::Handle<T> for CoarseHandle<'_, T> {
    fn enqueue(&mut self, item: T) {
        self.queue.push(item);
    }

    fn dequeue(&mut self) -> Option<T> {
        self.queue.try_pop()
    }
}

impl<T> ConcurrentQueue<T> for CoarseQueue<T> {
    type Granularity = Coarse;

    fn register(&self) -> impl crate::Handle<T> {
        CoarseHandle { queue: self }
    }
}
