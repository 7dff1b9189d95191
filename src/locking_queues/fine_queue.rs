//! Two-lock queue over a singly linked list.
//!
//! The list always ends in a dataless sentinel node. Consumers own the front
//! of the list through `head` and producers own the sentinel through `tail`,
//! so a push and a pop only meet when the queue is empty (`head == tail`).
//!
//! Lock order: head locks before tail locks, and across two queues the
//! lower-addressed queue first within each class. A tail lock is only taken
//! by a thread holding that queue's head lock, or by a thread holding
//! nothing else.

use std::{
    fmt,
    marker::PhantomData,
    ptr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Condvar, Mutex, MutexGuard,
    },
};

use log::{debug, trace};

use super::lock_order::{by_address, recover};
use crate::{BlockingQueue, ConcurrentQueue, Fine};

struct Node<T> {
    data: Option<T>,
    next: *mut Node<T>,
}

impl<T> Node<T> {
    fn sentinel() -> *mut Node<T> {
        Box::into_raw(Box::new(Node {
            data: None,
            next: ptr::null_mut(),
        }))
    }
}

/// Walks the nodes in front of a tail observed under the head lock.
///
/// Pushes may keep appending behind `end`, but nothing in front of it can be
/// written or freed while the head lock the walk borrows from is held.
struct Prefix<'g, T> {
    node: *const Node<T>,
    end: *const Node<T>,
    _head: PhantomData<&'g T>,
}

impl<'g, T> Iterator for Prefix<'g, T> {
    type Item = &'g T;

    fn next(&mut self) -> Option<&'g T> {
        if self.node == self.end {
            return None;
        }
        // SAFETY: nodes in front of the observed tail are fully linked, and
        // detaching them needs the head lock, which is held for 'g.
        let node = unsafe { &*self.node };
        self.node = node.next;
        node.data.as_ref()
    }
}

/// Unbounded FIFO queue with independent locks for the head and the tail.
///
/// Push only takes the tail lock. Pop takes the head lock and briefly the
/// tail lock to tell whether the queue is empty.
pub struct FineQueue<T> {
    head: Mutex<*mut Node<T>>,
    tail: Mutex<*mut Node<T>>,
    not_empty: Condvar,
    // Consumers parked (or about to park) in wait_and_pop.
    sleepers: AtomicUsize,
    _owns: PhantomData<Box<Node<T>>>,
}

// SAFETY: the raw node pointers are only dereferenced under the locks, and
// values of T only ever move between threads, like with Mutex<T>.
unsafe impl<T: Send> Send for FineQueue<T> {}
unsafe impl<T: Send> Sync for FineQueue<T> {}

type HeadGuard<'a, T> = MutexGuard<'a, *mut Node<T>>;

impl<T> FineQueue<T> {
    pub fn new() -> Self {
        let sentinel = Node::sentinel();
        Self {
            head: Mutex::new(sentinel),
            tail: Mutex::new(sentinel),
            not_empty: Condvar::new(),
            sleepers: AtomicUsize::new(0),
            _owns: PhantomData,
        }
    }

    fn lock_head(&self) -> HeadGuard<'_, T> {
        recover(self.head.lock())
    }

    fn lock_tail(&self) -> MutexGuard<'_, *mut Node<T>> {
        recover(self.tail.lock())
    }

    fn current_tail(&self) -> *mut Node<T> {
        *self.lock_tail()
    }

    fn prefix<'g>(&self, head: &'g HeadGuard<'_, T>) -> Prefix<'g, T> {
        Prefix {
            node: **head,
            end: self.current_tail(),
            _head: PhantomData,
        }
    }

    /// Unlinks the front node unless `head` has caught up with `tail`.
    fn unlink_front(head: &mut *mut Node<T>, tail: *mut Node<T>) -> Option<T> {
        if *head == tail {
            return None;
        }
        // SAFETY: the caller holds the head lock and `head` is not the tail,
        // so the node is fully linked and no other thread can reach it.
        let Node { data, next } = *unsafe { Box::from_raw(*head) };
        *head = next;
        data
    }

    pub fn push(&self, value: T) {
        let sentinel = Node::sentinel();
        {
            let mut tail = self.lock_tail();
            // SAFETY: the current sentinel is only written under the tail lock,
            // and consumers never look at it until `tail` has moved past it.
            unsafe {
                (**tail).data = Some(value);
                (**tail).next = sentinel;
            }
            *tail = sentinel;
        }
        self.wake_one();
    }

    fn wake_one(&self) {
        // A consumer registers as a sleeper before it checks for emptiness, so
        // either it sees this push or we see it here. Passing through the head
        // lock makes sure it is already parked when we notify.
        if self.sleepers.load(Ordering::SeqCst) > 0 {
            drop(self.lock_head());
            self.not_empty.notify_one();
        }
    }

    /// Builds the value first, so a panicking `make` leaves the queue as it was.
    pub fn emplace<F>(&self, make: F)
    where
        F: FnOnce() -> T,
    {
        self.push(make());
    }

    pub fn try_pop(&self) -> Option<T> {
        let mut head = self.lock_head();
        Self::unlink_front(&mut head, self.current_tail())
    }

    pub fn try_pop_into(&self, out: &mut T) -> bool {
        BlockingQueue::try_pop_into(self, out)
    }

    pub fn wait_and_pop(&self) -> T {
        let mut head = self.lock_head();
        if let Some(value) = Self::unlink_front(&mut head, self.current_tail()) {
            return value;
        }

        self.sleepers.fetch_add(1, Ordering::SeqCst);
        let value = loop {
            if let Some(value) = Self::unlink_front(&mut head, self.current_tail()) {
                break value;
            }
            head = recover(self.not_empty.wait(head));
        };
        self.sleepers.fetch_sub(1, Ordering::SeqCst);
        drop(head);
        trace!("fine queue consumer woke up with a value");
        value
    }

    pub fn wait_and_pop_into(&self, out: &mut T) {
        *out = self.wait_and_pop();
    }

    pub fn is_empty(&self) -> bool {
        let head = self.lock_head();
        *head == self.current_tail()
    }

    /// Counts the values in front of the tail as of the moment it is read.
    /// Concurrent pushes may already have made the count stale.
    pub fn len(&self) -> usize {
        let head = self.lock_head();
        self.prefix(&head).count()
    }

    pub fn swap(&self, other: &Self) {
        if ptr::eq(self, other) {
            return;
        }
        {
            let (first, second, _) = by_address(self, other);
            let mut first_head = first.lock_head();
            let mut second_head = second.lock_head();
            let mut first_tail = first.lock_tail();
            let mut second_tail = second.lock_tail();
            std::mem::swap(&mut *first_head, &mut *second_head);
            std::mem::swap(&mut *first_tail, &mut *second_tail);
        }
        debug!("swapped contents of two fine queues");
        self.not_empty.notify_all();
        other.not_empty.notify_all();
    }

    /// Replaces the contents with those of `source` and wakes every blocked
    /// consumer. The previous contents are dropped after the locks are released.
    pub fn assign_from(&self, mut source: Self) {
        {
            let mut head = self.lock_head();
            let mut tail = self.lock_tail();
            std::mem::swap(&mut *head, recover(source.head.get_mut()));
            std::mem::swap(&mut *tail, recover(source.tail.get_mut()));
        }
        self.not_empty.notify_all();
        debug!("move-assigned fine queue");
        drop(source);
    }

    /// Moves the contents out, leaving this queue with a fresh sentinel.
    pub fn take(&self) -> Self {
        let mut taken = Self::new();
        {
            let mut head = self.lock_head();
            let mut tail = self.lock_tail();
            std::mem::swap(&mut *head, recover(taken.head.get_mut()));
            std::mem::swap(&mut *tail, recover(taken.tail.get_mut()));
        }
        debug!("took contents out of fine queue");
        taken
    }
}

impl<T: Clone> FineQueue<T> {
    /// Replaces the contents with a copy of `source`.
    ///
    /// The copy is built first, holding only the head lock of `source`, and
    /// then installed in one step, so a panicking `clone` leaves this queue
    /// untouched.
    pub fn assign_clone(&self, source: &Self) {
        if ptr::eq(self, source) {
            return;
        }
        self.assign_from(source.clone());
    }

    /// Copies the current contents, front first.
    pub fn snapshot(&self) -> Vec<T> {
        let head = self.lock_head();
        self.prefix(&head).cloned().collect()
    }
}

impl<T> Drop for FineQueue<T> {
    fn drop(&mut self) {
        let mut node = *recover(self.head.get_mut());
        while !node.is_null() {
            // SAFETY: with &mut self no other thread can reach the list, and
            // every node was allocated by Node::sentinel.
            let boxed = unsafe { Box::from_raw(node) };
            node = boxed.next;
        }
    }
}

impl<T> Default for FineQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Clone for FineQueue<T> {
    /// Copies the values in front of the tail observed when the walk starts.
    /// Pushes racing with the walk are allowed; pops wait for it to finish.
    fn clone(&self) -> Self {
        let copy = Self::new();
        let head = self.lock_head();
        for value in self.prefix(&head) {
            copy.push(value.clone());
        }
        copy
    }
}

impl<T: PartialEq> PartialEq for FineQueue<T> {
    fn eq(&self, other: &Self) -> bool {
        if ptr::eq(self, other) {
            return true;
        }
        let (first, second, _) = by_address(self, other);
        let first_head = first.lock_head();
        let second_head = second.lock_head();
        first.prefix(&first_head).eq(second.prefix(&second_head))
    }
}

impl<T: Eq> Eq for FineQueue<T> {}

impl<T> FromIterator<T> for FineQueue<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut queue = Self::new();
        queue.extend(iter);
        queue
    }
}

impl<T> From<Vec<T>> for FineQueue<T> {
    fn from(values: Vec<T>) -> Self {
        values.into_iter().collect()
    }
}

impl<T> Extend<T> for FineQueue<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for value in iter {
            self.push(value);
        }
    }
}

impl<T> fmt::Debug for FineQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FineQueue")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl<T> BlockingQueue<T> for FineQueue<T> {
    fn push(&self, value: T) {
        FineQueue::push(self, value);
    }

    fn try_pop(&self) -> Option<T> {
        FineQueue::try_pop(self)
    }

    fn wait_and_pop(&self) -> T {
        FineQueue::wait_and_pop(self)
    }

    fn is_empty(&self) -> bool {
        FineQueue::is_empty(self)
    }

    fn len(&self) -> usize {
        FineQueue::len(self)
    }

    fn swap(&self, other: &Self) {
        FineQueue::swap(self, other);
    }
}

pub struct FineHandle<'q, T> {
    queue: &'q FineQueue<T>,
}

impl<T> crate::Handle<T> for FineHandle<'_, T> {
    fn enqueue(&mut self, item: T) {
        self.queue.push(item);
    }

    fn dequeue(&mut self) -> Option<T> {
        self.queue.try_pop()
    }
}

impl<T> ConcurrentQueue<T> for FineQueue<T> {
    type Granularity = Fine;

    fn register(&self) -> impl crate::Handle<T> {
        FineHandle { queue: self }
    }
}
