//! Software-simulated architecture backend.
//!
//! Stands in for the per-architecture glue spec.md §1 scopes out: cache
//! invalidation becomes a counter bump, `wait_for_event`/`notify_event`
//! a thread-parking edge, the reset trampoline a catchable unwind
//! instead of a real jump, context switch a plain data copy instead of
//! a register-level transfer. Used both as the default build backend and
//! as the harness `#[cfg(test)]` unit tests run against.

use super::ArchOps;
use crate::context::RawRegs;
use core::sync::atomic::{AtomicU64, Ordering};

#[cfg(test)]
extern crate std;

/// Total `dcache_invalidate` calls observed; exposed for test assertions.
pub static DCACHE_INVALIDATES: AtomicU64 = AtomicU64::new(0);
pub static ICACHE_INVALIDATES: AtomicU64 = AtomicU64::new(0);

static CLOCK_RESETS: AtomicU64 = AtomicU64::new(0);

/// Total `ivt_setup` calls observed, and the length of the stack slice
/// passed on the most recent one; exposed for test assertions.
pub static IVT_SETUPS: AtomicU64 = AtomicU64::new(0);
static LAST_IVT_STACK_LEN: AtomicU64 = AtomicU64::new(0);

#[cfg(test)]
std::thread_local! {
    static CURRENT_CORE: core::cell::Cell<usize> = const { core::cell::Cell::new(0) };
    static LIVE_REGS: core::cell::RefCell<RawRegs> = core::cell::RefCell::new(RawRegs::zeroed());
}

/// Marker unwound through by [`MockArch::reset_trampoline`] under test,
/// so a simulated core's driver loop can treat "reached reset" as a
/// normal control-flow event instead of a real divergence. Real
/// hardware has no such escape; this is a test-only stand-in for the
/// out-of-scope reset trampoline (spec.md §1).
#[cfg(test)]
pub struct ResetSignal(pub usize);

pub struct MockArch;

impl MockArch {
    /// Assign the calling (test) thread's simulated core id. Real
    /// targets derive this from hardware state instead.
    #[cfg(test)]
    pub fn set_current_core_id(id: usize) {
        CURRENT_CORE.with(|c| c.set(id));
    }

    #[cfg(test)]
    pub fn set_live_regs(regs: RawRegs) {
        LIVE_REGS.with(|r| *r.borrow_mut() = regs);
    }

    #[cfg(test)]
    pub fn live_regs() -> RawRegs {
        LIVE_REGS.with(|r| RawRegs(r.borrow().0))
    }

    pub fn clock_reset_count() -> u64 {
        CLOCK_RESETS.load(Ordering::Relaxed)
    }

    /// Length of the stack slice passed to the most recent `ivt_setup`.
    pub fn last_ivt_stack_len() -> u64 {
        LAST_IVT_STACK_LEN.load(Ordering::Relaxed)
    }
}

impl ArchOps for MockArch {
    fn dcache_invalidate() {
        DCACHE_INVALIDATES.fetch_add(1, Ordering::Relaxed);
    }

    fn icache_invalidate() {
        ICACHE_INVALIDATES.fetch_add(1, Ordering::Relaxed);
    }

    fn barrier() {
        core::sync::atomic::fence(Ordering::SeqCst);
    }

    fn wait_for_event() {
        core::hint::spin_loop();
        #[cfg(test)]
        std::thread::yield_now();
    }

    fn notify_event(_coreid: usize) {
        // Edge bookkeeping lives in `crate::event`; the mock backend has
        // no hardware IPI line to poke, so there is nothing to do here.
    }

    fn current_core_id() -> usize {
        #[cfg(test)]
        {
            CURRENT_CORE.with(|c| c.get())
        }
        #[cfg(not(test))]
        {
            0
        }
    }

    fn ivt_setup(stack: &mut [u8]) {
        IVT_SETUPS.fetch_add(1, Ordering::Relaxed);
        LAST_IVT_STACK_LEN.store(stack.len() as u64, Ordering::Relaxed);
    }

    fn reset_trampoline() -> ! {
        #[cfg(test)]
        {
            let coreid = Self::current_core_id();
            std::panic::resume_unwind(std::boxed::Box::new(ResetSignal(coreid)));
        }
        #[cfg(not(test))]
        {
            loop {
                core::hint::spin_loop();
            }
        }
    }

    fn power_off() -> ! {
        loop {
            core::hint::spin_loop();
        }
    }

    fn clock_reset() {
        CLOCK_RESETS.fetch_add(1, Ordering::Relaxed);
    }

    fn context_init(regs: &mut RawRegs, entry: extern "C" fn() -> !, kstack_top: usize) {
        regs.0[0] = entry as usize;
        regs.0[1] = kstack_top;
    }

    fn context_switch(from: &mut RawRegs, to: &RawRegs) {
        #[cfg(test)]
        {
            LIVE_REGS.with(|live| {
                let mut live = live.borrow_mut();
                from.0 = live.0;
                live.0 = to.0;
            });
        }
        #[cfg(not(test))]
        {
            from.0 = [0; 16];
            let _ = to;
        }
    }

    fn platform_write(bytes: &[u8]) {
        #[cfg(test)]
        {
            use std::io::Write;
            let _ = std::io::stdout().write_all(bytes);
        }
        #[cfg(not(test))]
        {
            let _ = bytes;
        }
    }
}
