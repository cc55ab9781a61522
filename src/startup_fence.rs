//! Cluster startup fence: a one-shot gate every non-master core spins
//! on until the master signals it is alive. A plain spinlock-guarded
//! flag, published and consumed through [`crate::barrier`].

use crate::arch::{ArchOps, Platform};
use crate::spinlock::Spinlock;

struct StartupFence {
    lock: Spinlock,
    alive: core::cell::UnsafeCell<bool>,
}

unsafe impl Sync for StartupFence {}

static FENCE: StartupFence =
    StartupFence { lock: Spinlock::new(), alive: core::cell::UnsafeCell::new(false) };

/// Called once by the master core after it has finished its own
/// architectural bring-up; unblocks every core spinning in `wait`.
pub fn release() {
    FENCE.lock.lock();
    unsafe { *FENCE.alive.get() = true };
    FENCE.lock.unlock();
    crate::barrier::publish();
}

/// Spin until `release` has been called. Non-master cores call this
/// before doing anything that assumes shared kernel state is ready.
pub fn wait() {
    loop {
        crate::barrier::consume();
        FENCE.lock.lock();
        let alive = unsafe { *FENCE.alive.get() };
        FENCE.lock.unlock();
        if alive {
            return;
        }
        Platform::wait_for_event();
    }
}

pub fn is_alive() -> bool {
    FENCE.lock.lock();
    let alive = unsafe { *FENCE.alive.get() };
    FENCE.lock.unlock();
    alive
}
