//! Per-core edge-triggered event bus. Each core has one pending-edge
//! counter guarded by its own spinlock. On platforms with hardware
//! inter-processor interrupts, `notify`/`wait` additionally ride an IPI
//! (feature `ipi-counted`); otherwise the bus is memory-polled and
//! coalesces repeated notifies between two waits into at most one
//! delivered edge.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::arch::{ArchOps, Platform};
use crate::config::CORES_NUM;
use crate::error::Errno;
use crate::interrupt;
use crate::spinlock::Spinlock;

struct EventRecord {
    pending: AtomicU32,
    lock: Spinlock,
}

impl EventRecord {
    const fn new() -> Self {
        Self { pending: AtomicU32::new(0), lock: Spinlock::new() }
    }
}

const INIT: EventRecord = EventRecord::new();
static EVENTS: [EventRecord; CORES_NUM] = [INIT; CORES_NUM];

/// Block the calling core until at least one edge has arrived since its
/// last `wait`, consuming exactly one.
pub fn wait() {
    let coreid = Platform::current_core_id();
    wait_on(coreid);
}

fn wait_on(coreid: usize) {
    loop {
        EVENTS[coreid].lock.lock();
        let pending = EVENTS[coreid].pending.load(Ordering::Acquire);
        if pending > 0 {
            EVENTS[coreid].pending.fetch_sub(1, Ordering::AcqRel);
            EVENTS[coreid].lock.unlock();
            return;
        }
        EVENTS[coreid].lock.unlock();
        Platform::wait_for_event();
    }
}

/// Deliver an edge to `coreid`, safe to call from any core. Two notifies
/// with no intervening wait coalesce into one; callers that need a
/// counted wakeup compose a semaphore on top instead, see
/// [`crate::sync::Semaphore`].
pub fn notify(coreid: usize) {
    EVENTS[coreid].lock.lock();
    if EVENTS[coreid].pending.load(Ordering::Relaxed) == 0 {
        EVENTS[coreid].pending.store(1, Ordering::Release);
    }
    EVENTS[coreid].lock.unlock();
    Platform::notify_event(coreid);
    #[cfg(feature = "ipi-counted")]
    interrupt::dispatch(crate::config::INTERRUPT_IPI);
}

/// Discard the calling core's pending edge, if any, without blocking.
pub fn drop_pending() {
    let coreid = Platform::current_core_id();
    EVENTS[coreid].lock.lock();
    EVENTS[coreid].pending.store(0, Ordering::Release);
    EVENTS[coreid].lock.unlock();
}

/// Install an application handler invoked when this core's IPI line
/// fires, independent of the base wait/notify edge counting above.
pub fn register_handler(handler: interrupt::Handler) -> Result<(), Errno> {
    interrupt::register(crate::config::INTERRUPT_IPI, handler)
}

pub fn unregister_handler() -> Result<(), Errno> {
    interrupt::unregister(crate::config::INTERRUPT_IPI)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::mock::MockArch;
    extern crate std;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn notify_then_wait_does_not_block() {
        MockArch::set_current_core_id(2);
        drop_pending();
        notify(2);
        wait_on(2);
        // second wait would block forever absent a second notify; we
        // don't call it here, just assert the first one drained cleanly.
        assert_eq!(EVENTS[2].pending.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn repeated_notify_without_wait_coalesces() {
        MockArch::set_current_core_id(3);
        drop_pending();
        notify(3);
        notify(3);
        notify(3);
        assert_eq!(EVENTS[3].pending.load(Ordering::Relaxed), 1);
        wait_on(3);
        assert_eq!(EVENTS[3].pending.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn cross_thread_notify_wakes_waiter() {
        MockArch::set_current_core_id(4);
        drop_pending();
        let woke = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let woke2 = Arc::clone(&woke);
        let handle = thread::spawn(move || {
            MockArch::set_current_core_id(4);
            wait_on(4);
            woke2.store(true, Ordering::SeqCst);
        });
        thread::sleep(std::time::Duration::from_millis(20));
        notify(4);
        handle.join().unwrap();
        assert!(woke.load(Ordering::SeqCst));
    }
}
