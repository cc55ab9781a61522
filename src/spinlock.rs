//! Spinlock: an atomic word with values `{Unlocked, Locked}`, guarding
//! critical sections shared between cores. No recursion, no owner
//! tracking, no fairness guarantee.

use core::sync::atomic::{AtomicU8, Ordering};

const UNLOCKED: u8 = 0;
const LOCKED: u8 = 1;

pub struct Spinlock {
    state: AtomicU8,
}

impl Spinlock {
    pub const fn new() -> Self {
        Self { state: AtomicU8::new(UNLOCKED) }
    }

    pub const fn new_locked() -> Self {
        Self { state: AtomicU8::new(LOCKED) }
    }

    /// Reset to Unlocked. Only meaningful before the lock is shared with
    /// other cores; calling it on a contended lock loses waiters no
    /// differently than any other unsynchronized write would.
    pub fn init(&self) {
        self.state.store(UNLOCKED, Ordering::Release);
    }

    /// Spin until a CAS Unlocked->Locked succeeds.
    pub fn lock(&self) {
        while self
            .state
            .compare_exchange_weak(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            core::hint::spin_loop();
        }
    }

    /// Non-blocking attempt; `true` on success, lock held on success.
    pub fn trylock(&self) -> bool {
        self.state
            .compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Release. Calling this without holding the lock is a logic error
    /// the type cannot detect.
    pub fn unlock(&self) {
        self.state.store(UNLOCKED, Ordering::Release);
    }

    pub fn is_locked(&self) -> bool {
        self.state.load(Ordering::Relaxed) == LOCKED
    }
}

impl Default for Spinlock {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl Sync for Spinlock {}

#[cfg(test)]
mod tests {
    use super::*;
    extern crate std;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn trylock_fails_while_held() {
        let lock = Spinlock::new();
        assert!(lock.trylock());
        assert!(!lock.trylock());
        lock.unlock();
        assert!(lock.trylock());
    }

    #[test]
    fn mutual_exclusion_under_contention() {
        let lock = Arc::new(Spinlock::new());
        let counter = Arc::new(core::sync::atomic::AtomicUsize::new(0));
        let mut handles = std::vec::Vec::new();
        for _ in 0..8 {
            let lock = Arc::clone(&lock);
            let counter = Arc::clone(&counter);
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    lock.lock();
                    let prev = counter.load(Ordering::Relaxed);
                    counter.store(prev + 1, Ordering::Relaxed);
                    lock.unlock();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(counter.load(Ordering::Relaxed), 8000);
    }
}
