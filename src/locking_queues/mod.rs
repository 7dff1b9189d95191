//! Lock-based unbounded FIFO queues.
//!
//! [`CoarseQueue`] guards a `VecDeque` with one mutex. [`FineQueue`] keeps a
//! linked list with separate head and tail locks so producers and consumers
//! only contend when the queue is empty. Both implement
//! [`BlockingQueue`](crate::BlockingQueue) and can be swapped for each other.

pub mod coarse_queue;
pub mod countable_wrapper;
pub mod fine_queue;
mod lock_order;


pub use coarse_queue::CoarseQueue;
pub use countable_wrapper::CountableWrapper;
pub use fine_queue::FineQueue;
