//! Third-party lock-free queues behind the same [`ConcurrentQueue`](crate::ConcurrentQueue)
//! interface, so the benchmark can put the locking queues next to them.

pub mod concurrent_queue;
pub mod crossbeam_queue;
