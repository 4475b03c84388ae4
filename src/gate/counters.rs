//! # Lock-free counter primitives.
//!
//! The admission hot path brackets every unit of work with an increment and a
//! decrement of two counters (the control point's and the controller's).
//! These helpers implement the three operations both levels need:
//!
//! - [`try_acquire`]: limit-checked increment (CAS loop, no side effects on failure)
//! - [`acquire`]: unconditional increment (resume drain, bypass-limit tasks)
//! - [`release_checked`]: decrement that refuses to underflow
//!
//! All operations run in bounded time and never block or sleep.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Attempts to increment `count`, conditioned on `limit` (`0` = unlimited).
///
/// Returns `false` without side effects when the counter is at the limit.
/// The limit is read once per attempt; a concurrent limit change applies to
/// future admissions only.
pub(crate) fn try_acquire(count: &AtomicUsize, limit: &AtomicUsize) -> bool {
    let max = limit.load(Ordering::Acquire);
    let mut current = count.load(Ordering::Acquire);
    loop {
        if max != 0 && current >= max {
            return false;
        }
        match count.compare_exchange_weak(
            current,
            current + 1,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => return true,
            Err(observed) => current = observed,
        }
    }
}

/// Increments `count` unconditionally.
pub(crate) fn acquire(count: &AtomicUsize) {
    count.fetch_add(1, Ordering::AcqRel);
}

/// Decrements `count`, refusing to underflow.
///
/// Returns `false` when the counter is already zero — a completion without a
/// matching admission. The caller surfaces that as an invariant violation;
/// the counter is left untouched.
pub(crate) fn release_checked(count: &AtomicUsize) -> bool {
    let mut current = count.load(Ordering::Acquire);
    loop {
        if current == 0 {
            return false;
        }
        match count.compare_exchange_weak(
            current,
            current - 1,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => return true,
            Err(observed) => current = observed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    #[test]
    fn test_limit_zero_is_unlimited() {
        let count = AtomicUsize::new(0);
        let limit = AtomicUsize::new(0);
        for _ in 0..10_000 {
            assert!(try_acquire(&count, &limit));
        }
        assert_eq!(count.load(Ordering::SeqCst), 10_000);
    }

    #[test]
    fn test_acquire_stops_at_limit() {
        let count = AtomicUsize::new(0);
        let limit = AtomicUsize::new(3);
        assert!(try_acquire(&count, &limit));
        assert!(try_acquire(&count, &limit));
        assert!(try_acquire(&count, &limit));
        assert!(!try_acquire(&count, &limit));
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_release_refuses_underflow() {
        let count = AtomicUsize::new(1);
        assert!(release_checked(&count));
        assert!(!release_checked(&count));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_concurrent_acquire_never_exceeds_limit() {
        let count = Arc::new(AtomicUsize::new(0));
        let limit = Arc::new(AtomicUsize::new(100));
        let admitted = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let count = Arc::clone(&count);
            let limit = Arc::clone(&limit);
            let admitted = Arc::clone(&admitted);
            handles.push(std::thread::spawn(move || {
                for _ in 0..50 {
                    if try_acquire(&count, &limit) {
                        admitted.fetch_add(1, Ordering::SeqCst);
                    }
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(admitted.load(Ordering::SeqCst), 100);
        assert_eq!(count.load(Ordering::SeqCst), 100);
    }
}
