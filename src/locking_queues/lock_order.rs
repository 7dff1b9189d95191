//! Global acquisition order for operations that lock two queues at once.
//!
//! Queues are ordered by address. Every multi-queue operation picks its
//! first and second queue through [`by_address`], so two threads locking the
//! same pair always agree on who goes first.

use std::sync::{LockResult, PoisonError};

/// Orders two distinct references so the lower address comes first.
///
/// The flag is `true` when the pair was flipped, i.e. `b` is returned first.
pub(crate) fn by_address<'a, Q>(a: &'a Q, b: &'a Q) -> (&'a Q, &'a Q, bool) {
    debug_assert!(!std::ptr::eq(a, b), "a queue cannot be ordered against itself");
    if (a as *const Q) < (b as *const Q) {
        (a, b, false)
    } else {
        (b, a, true)
    }
}

/// Unwraps a lock result, taking the guard back from a poisoned lock.
///
/// A lock only gets poisoned when user code (`Clone`, `PartialEq`) panics
/// while a guard is held, and the queues never leave their structure
/// half-updated around such calls.
pub(crate) fn recover<G>(result: LockResult<G>) -> G {
    result.unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod test {
    use std::sync::Mutex;

    use super::{by_address, recover};

    #[test]
    fn order_is_independent_of_argument_order() {
        let pair = [1u8, 2u8];
        let (first, second, flipped) = by_address(&pair[0], &pair[1]);
        assert!(!flipped);
        assert!(std::ptr::eq(first, &pair[0]));
        assert!(std::ptr::eq(second, &pair[1]));

        let (first, second, flipped) = by_address(&pair[1], &pair[0]);
        assert!(flipped);
        assert!(std::ptr::eq(first, &pair[0]));
        assert!(std::ptr::eq(second, &pair[1]));
    }

    #[test]
    fn poisoned_lock_is_recovered() {
        let lock = Mutex::new(5);
        let _ = std::thread::scope(|s| {
            s.spawn(|| {
                let _guard = lock.lock().unwrap();
                panic!("poison the lock");
            })
            .join()
        });
        assert!(lock.is_poisoned());
        assert_eq!(*recover(lock.lock()), 5);
    }
}
