//! Per-architecture glue. Concrete backends implement [`ArchOps`]; the
//! rest of the crate is generic only insofar as it calls through
//! [`Platform`], a zero-sized type bound to a backend by feature flag.

use crate::context::RawRegs;

pub trait ArchOps {
    /// Flush+invalidate the data cache at this ordering point.
    fn dcache_invalidate();
    /// Flush+invalidate the instruction cache.
    fn icache_invalidate();
    /// Generic ordering barrier; a no-op on strongly-ordered platforms.
    fn barrier();

    /// Park the calling core in a low-power state until an event arrives
    /// for it.
    fn wait_for_event();
    /// Deliver an edge to `coreid`'s event record, from any core.
    fn notify_event(coreid: usize);

    /// Identify the calling core (0-based, dense across all clusters).
    fn current_core_id() -> usize;

    /// Install the interrupt vector table on the calling core, using
    /// `stack` as its interrupt stack. Called once from `core_setup`
    /// before a core ever reaches `idle`.
    fn ivt_setup(stack: &mut [u8]);

    /// Architecture-specific reset trampoline; does not return on real
    /// hardware.
    fn reset_trampoline() -> !;
    /// Platform power-off, invoked by `core_shutdown`.
    fn power_off() -> !;

    /// Re-arm the clock device after a clock interrupt.
    fn clock_reset();

    /// Prime `regs` so the first `context_switch` into it resumes at
    /// `entry` with `kstack_top` as its stack pointer.
    fn context_init(regs: &mut RawRegs, entry: extern "C" fn() -> !, kstack_top: usize);
    /// Save the live register file into `from`, then resume `to`.
    fn context_switch(from: &mut RawRegs, to: &RawRegs);

    /// Write raw bytes to the platform's log sink. The sink itself
    /// (serial, virtual TTY) is an out-of-scope output device driver;
    /// this is the seam the HAL hands bytes across.
    fn platform_write(bytes: &[u8]);
}

// A real per-architecture backend (x86_64/aarch64/riscv64) implements
// `ArchOps` the same way `mock` does and would be selected here by
// `target_arch`. `mock-arch` is the only backend this crate ships today.
#[cfg(feature = "mock-arch")]
pub(crate) mod mock;
#[cfg(feature = "mock-arch")]
pub use mock::MockArch as Platform;
