pub mod baseline_queues;
pub mod locking_queues;

pub use locking_queues::{CoarseQueue, CountableWrapper, FineQueue};

/// How a queue synchronizes its producers and consumers.
pub trait Granularity {
    const NAME: &'static str;
}

/// One lock guards the whole queue.
pub struct Coarse;
impl Granularity for Coarse {
    const NAME: &'static str = "coarse";
}

/// Separate locks for the head and the tail.
pub struct Fine;
impl Granularity for Fine {
    const NAME: &'static str = "fine";
}

/// Atomics only, no locks. Used for the baseline queues.
pub struct LockFree;
impl Granularity for LockFree {
    const NAME: &'static str = "lock-free";
}

/// Unbounded FIFO queue shared between any number of producers and consumers.
///
/// An empty queue is not an error: the non-blocking pops report it as `None`
/// or `false`, and the blocking pops wait until a value arrives. `len` and
/// `is_empty` are snapshots that may be stale by the time they are read.
pub trait BlockingQueue<T>: Default {
    /// Appends `value` at the back and wakes at most one blocked consumer.
    fn push(&self, value: T);

    /// Builds the value before any lock is taken, then pushes it.
    /// If `make` panics the queue is left unchanged.
    fn emplace<F>(&self, make: F)
    where
        F: FnOnce() -> T,
    {
        self.push(make());
    }

    /// Removes the front value, or returns `None` right away if there is none.
    fn try_pop(&self) -> Option<T>;

    /// Moves the front value into `out`. Leaves `out` untouched and returns
    /// `false` if the queue is empty.
    fn try_pop_into(&self, out: &mut T) -> bool {
        match self.try_pop() {
            Some(value) => {
                *out = value;
                true
            }
            None => false,
        }
    }

    /// Blocks until a value is available and removes it. Never times out.
    fn wait_and_pop(&self) -> T;

    fn wait_and_pop_into(&self, out: &mut T) {
        *out = self.wait_and_pop();
    }

    fn is_empty(&self) -> bool;

    fn len(&self) -> usize;

    /// Exchanges the contents of both queues in one step and wakes the
    /// consumers blocked on either of them.
    fn swap(&self, other: &Self);
}

pub trait ConcurrentQueue<T> {
    type Granularity: Granularity;
    /// Returns a thread handle to the queue, which can be used for enqueues and dequeues
    fn register(&self) -> impl Handle<T>;
}

pub trait Handle<T> {
    fn enqueue(&mut self, item: T);

    fn dequeue(&mut self) -> Option<T>;
}
