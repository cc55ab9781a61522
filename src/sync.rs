//! Semaphore and fence, built purely on top of [`crate::spinlock`] and
//! [`crate::event`], no hardware primitive beyond those two: a
//! lock-guarded count plus the event bus standing in for a wait queue.

use crate::arch::{ArchOps, Platform};
use crate::config::CORES_NUM;
use crate::error::Errno;
use crate::event;
use crate::spinlock::Spinlock;

/// A core can only ever be blocked in one `down()` at a time, so a
/// waiter list sized to the total core count can never overflow.
const SEMAPHORE_WAITERS: usize = CORES_NUM;

/// A counting semaphore. A negative count records how many cores are
/// currently blocked in `down`: `down` always decrements first, then
/// blocks only if that decrement went negative; `up` increments and, if
/// the pre-increment value was negative, wakes the oldest waiter (FIFO).
pub struct Semaphore {
    lock: Spinlock,
    count: core::cell::UnsafeCell<isize>,
    waiters: core::cell::UnsafeCell<heapless::Vec<usize, SEMAPHORE_WAITERS>>,
}

unsafe impl Sync for Semaphore {}

impl Semaphore {
    pub const fn new(initial: isize) -> Self {
        Self {
            lock: Spinlock::new(),
            count: core::cell::UnsafeCell::new(initial),
            waiters: core::cell::UnsafeCell::new(heapless::Vec::new()),
        }
    }

    /// Decrement the count; block on the event bus if that decrement
    /// made it negative.
    pub fn down(&self) {
        let coreid = Platform::current_core_id();
        self.lock.lock();
        let count = unsafe { &mut *self.count.get() };
        *count -= 1;
        let blocked = *count < 0;
        if blocked {
            let waiters = unsafe { &mut *self.waiters.get() };
            if waiters.push(coreid).is_err() {
                self.lock.unlock();
                crate::kpanic!("semaphore waiter list overflowed beyond CORES_NUM");
            }
        }
        self.lock.unlock();
        if blocked {
            event::wait();
        }
    }

    /// Increment the count; if a waiter was parked on the decrement that
    /// made it negative, wake the oldest one.
    pub fn up(&self) {
        self.lock.lock();
        let count = unsafe { &mut *self.count.get() };
        let pre = *count;
        *count += 1;
        let to_wake = if pre < 0 {
            let waiters = unsafe { &mut *self.waiters.get() };
            if waiters.is_empty() { None } else { Some(waiters.remove(0)) }
        } else {
            None
        };
        self.lock.unlock();
        if let Some(coreid) = to_wake {
            event::notify(coreid);
        }
    }

    pub fn count(&self) -> isize {
        self.lock.lock();
        let v = unsafe { *self.count.get() };
        self.lock.unlock();
        v
    }
}

/// A single-shot counted rendezvous point: `target` cores call `join`;
/// the last one to arrive releases everyone.
pub struct Fence {
    lock: Spinlock,
    target: usize,
    arrived: core::cell::UnsafeCell<usize>,
    waiters: core::cell::UnsafeCell<heapless::Vec<usize, CORES_NUM>>,
}

unsafe impl Sync for Fence {}

impl Fence {
    pub const fn new(target: usize) -> Self {
        Self {
            lock: Spinlock::new(),
            target,
            arrived: core::cell::UnsafeCell::new(0),
            waiters: core::cell::UnsafeCell::new(heapless::Vec::new()),
        }
    }

    /// Record the calling core's arrival. Blocks until `target` cores
    /// have all called `join`, then every caller returns. Calling `join`
    /// on an already-satisfied fence returns immediately; it is
    /// single-shot, not resettable.
    pub fn join(&self) -> Result<(), Errno> {
        let coreid = Platform::current_core_id();
        self.lock.lock();
        let arrived = unsafe { &mut *self.arrived.get() };
        if *arrived >= self.target {
            self.lock.unlock();
            return Ok(());
        }
        *arrived += 1;
        let waiters = unsafe { &mut *self.waiters.get() };
        let reached_target = *arrived == self.target;
        if reached_target {
            let to_wake: heapless::Vec<usize, CORES_NUM> = waiters.clone();
            waiters.clear();
            self.lock.unlock();
            for w in to_wake {
                event::notify(w);
            }
            return Ok(());
        }
        waiters.push(coreid).map_err(|_| Errno::EINVAL)?;
        self.lock.unlock();
        event::wait();
        Ok(())
    }

    /// Block without registering arrival — used by a coordinator that
    /// wants to know when a fence created elsewhere has been satisfied.
    pub fn wait(&self) {
        loop {
            self.lock.lock();
            let satisfied = unsafe { *self.arrived.get() } >= self.target;
            self.lock.unlock();
            if satisfied {
                return;
            }
            Platform::wait_for_event();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::mock::MockArch;
    extern crate std;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn semaphore_blocks_until_up() {
        MockArch::set_current_core_id(10);
        event::drop_pending();
        let sem = Arc::new(Semaphore::new(0));
        let sem2 = Arc::clone(&sem);
        let handle = thread::spawn(move || {
            MockArch::set_current_core_id(10);
            sem2.down();
        });
        thread::sleep(std::time::Duration::from_millis(20));
        sem.up();
        handle.join().unwrap();
        assert_eq!(sem.count(), 0);
    }

    #[test]
    fn semaphore_nonblocking_down_does_not_touch_waiters() {
        let sem = Semaphore::new(2);
        sem.down();
        sem.down();
        assert_eq!(sem.count(), 0);
        sem.up();
        assert_eq!(sem.count(), 1);
    }

    #[test]
    fn fence_releases_all_joiners() {
        let fence = Arc::new(Fence::new(3));
        let mut handles = std::vec::Vec::new();
        for core in 20..23 {
            let fence = Arc::clone(&fence);
            handles.push(thread::spawn(move || {
                MockArch::set_current_core_id(core);
                fence.join().unwrap();
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert!(fence.join().is_ok());
    }
}
