//! `cluster-hal` — the per-cluster core lifecycle and synchronization
//! subsystem of a Hardware Abstraction Layer for a multi-cluster,
//! multi-core research kernel (spec.md §1).
//!
//! This crate exposes a flat symbol surface (spec.md §6) that higher
//! kernel layers call into; concrete per-architecture backends plug in
//! underneath through [`arch::ArchOps`]. Everything here is `no_std`,
//! allocation-free, and re-initialized fresh on every boot — the HAL
//! persists nothing across a reset (spec.md §6 "Persisted state").
#![no_std]
#![cfg_attr(not(test), allow(dead_code))]

pub mod arch;
pub mod barrier;
pub mod config;
pub mod context;
pub mod core_state;
pub mod error;
pub mod event;
pub mod exception;
pub mod interrupt;
pub mod log;
pub mod mmu;
pub mod resource;
pub mod spinlock;
pub mod startup_fence;
pub mod sync;

pub use error::{Errno, HalResult};

// ---------------------------------------------------------------------
// Core lifecycle (spec.md §4.G, §6)
// ---------------------------------------------------------------------

pub use core_state::{State as CoreState, StartFn};

/// Suspend the calling core in its idle loop until [`core_start`]
/// releases it.
pub fn core_idle() {
    core_state::idle();
}

/// Voluntarily suspend the calling core until [`core_wakeup`] arrives.
pub fn core_sleep() {
    core_state::sleep();
}

/// Deliver a wakeup to `coreid`.
pub fn core_wakeup(coreid: usize) -> HalResult<()> {
    core_state::wakeup(coreid)
}

/// Install `entry` on `coreid` and release it from Idle.
pub fn core_start(coreid: usize, entry: StartFn) -> HalResult<()> {
    core_state::start(coreid, entry)
}

/// Resume execution by invoking the installed `start` routine; marks
/// the core initialized on first call.
pub fn core_run() {
    core_state::run();
}

/// Self-deregister in preparation for a reset. Slaves only.
pub fn core_release() -> HalResult<()> {
    core_state::release()
}

/// Reset the calling core through the architecture trampoline. Slaves
/// only, and only after [`core_release`].
pub fn core_reset() -> HalResult<()> {
    core_state::reset()
}

/// Mark the calling core Offline and power it off. Does not return.
pub fn core_shutdown() -> ! {
    core_state::shutdown()
}

/// Disable interrupts and park the calling core forever. Does not
/// return.
pub fn core_halt() -> ! {
    core_state::core_halt()
}

/// The calling core's dense id.
pub fn core_get_id() -> usize {
    core_state::get_id()
}

/// Raw platform power-off, bypassing the state-machine bookkeeping
/// [`core_shutdown`] performs. Does not return.
pub fn core_poweroff() -> ! {
    core_state::poweroff()
}

/// Per-core architectural bring-up, run once before a core ever calls
/// [`core_idle`] (spec.md §2 data-flow paragraph).
pub fn core_setup(stack: &mut [u8]) {
    core_state::core_setup(stack);
}

// ---------------------------------------------------------------------
// Cluster startup fence (spec.md §4.J, §6)
// ---------------------------------------------------------------------

/// Release every slave spinning in [`cluster_fence_wait`]. Called once
/// by the master during cluster bring-up.
pub fn cluster_fence_release() {
    startup_fence::release();
}

/// Spin until [`cluster_fence_release`] has been called.
pub fn cluster_fence_wait() {
    startup_fence::wait();
}

// ---------------------------------------------------------------------
// Interrupts (spec.md §4.D, §6)
// ---------------------------------------------------------------------

pub use interrupt::{Handler as InterruptHandler, Level as InterruptLevel};

/// Globally disable interrupt delivery, returning the previous level.
pub fn interrupts_disable() -> InterruptLevel {
    interrupt::disable()
}

/// Restore interrupt delivery to `level` and switch execution mode
/// back to Normal.
pub fn interrupts_enable(level: InterruptLevel) {
    interrupt::enable(level)
}

pub fn interrupts_get_level() -> InterruptLevel {
    interrupt::get_level()
}

/// Install `level`, returning the one it replaces. Rust's level enum
/// makes the "invalid level" case of spec.md §4.D unrepresentable, so
/// this never actually fails; the `Result` is kept for ABI symmetry
/// with the rest of the fallible surface.
pub fn interrupts_set_level(level: InterruptLevel) -> HalResult<InterruptLevel> {
    Ok(interrupt::set_level(level))
}

pub fn interrupt_mask(num: usize) -> HalResult<()> {
    interrupt::mask(num)
}

pub fn interrupt_unmask(num: usize) -> HalResult<()> {
    interrupt::unmask(num)
}

pub fn interrupt_ack(num: usize) {
    interrupt::ack(num)
}

/// Pop and return the next pending interrupt queued by a backend that
/// signals asynchronously instead of dispatching inline.
pub fn interrupt_next() -> Option<usize> {
    interrupt::next()
}

pub fn interrupt_register(num: usize, handler: InterruptHandler) -> HalResult<()> {
    interrupt::register(num, handler)
}

pub fn interrupt_unregister(num: usize) -> HalResult<()> {
    interrupt::unregister(num)
}

/// Reset the interrupt table to its boot state: every line masked, no
/// handlers installed, spurious counter zeroed.
pub fn interrupt_setup() {
    interrupt::setup()
}

// ---------------------------------------------------------------------
// Exceptions / traps (spec.md §4.E, §6)
// ---------------------------------------------------------------------

pub use exception::ExceptionHandler;

pub fn exception_register(kind: usize, handler: ExceptionHandler) -> HalResult<()> {
    exception::register(kind, handler)
}

pub fn exception_unregister(kind: usize) -> HalResult<()> {
    exception::unregister(kind)
}

pub fn exception_get_addr() -> usize {
    exception::get_addr()
}

/// Synchronous kernel-call trap entry.
pub fn do_kcall(nr: usize, a0: usize, a1: usize, a2: usize, a3: usize, a4: usize) -> i32 {
    exception::do_kcall(nr, a0, a1, a2, a3, a4)
}

// ---------------------------------------------------------------------
// MMU / TLB (spec.md §4.F, §6)
// ---------------------------------------------------------------------

pub use mmu::{PageFlags, Region, TlbEntry};

pub fn mmu_setup(regions: &[Region]) -> HalResult<()> {
    mmu::setup(regions)
}

pub fn tlb_flush() {
    mmu::tlb_flush()
}

pub fn tlb_lookup_vaddr(vaddr: usize) -> Option<TlbEntry> {
    mmu::tlb_lookup_vaddr(vaddr)
}

pub fn tlb_lookup_paddr(frame: usize) -> Option<TlbEntry> {
    mmu::tlb_lookup_paddr(frame)
}

pub fn tlb_write(vaddr: usize, paddr: usize, flags: PageFlags) -> HalResult<()> {
    mmu::tlb_write(vaddr, paddr, flags)
}

pub fn tlb_inval(vaddr: usize) {
    mmu::tlb_inval(vaddr)
}

// ---------------------------------------------------------------------
// Synchronization building blocks (spec.md §4.B, §4.C, §4.I, §6)
// ---------------------------------------------------------------------

pub use spinlock::Spinlock;
pub use sync::{Fence, Semaphore};

pub fn spinlock_init(lock: &Spinlock) {
    lock.init()
}

pub fn spinlock_lock(lock: &Spinlock) {
    lock.lock()
}

pub fn spinlock_trylock(lock: &Spinlock) -> bool {
    lock.trylock()
}

pub fn spinlock_unlock(lock: &Spinlock) {
    lock.unlock()
}

/// Construct a semaphore with the given initial count (spec.md §4.I
/// `init`). Rust builds a fresh value here rather than mutating
/// existing storage in place, the idiomatic equivalent of the
/// upstream C macro-based static initializer.
pub fn semaphore_init(count: isize) -> Semaphore {
    Semaphore::new(count)
}

pub fn semaphore_down(sem: &Semaphore) {
    sem.down()
}

pub fn semaphore_up(sem: &Semaphore) {
    sem.up()
}

/// Construct a single-shot fence with the given target arrival count
/// (spec.md §4.I `init`).
pub fn fence_init(target: usize) -> Fence {
    Fence::new(target)
}

pub fn fence_wait(fence: &Fence) {
    fence.wait()
}

pub fn fence_join(fence: &Fence) -> HalResult<()> {
    fence.join()
}

pub fn event_wait() {
    event::wait()
}

pub fn event_notify(coreid: usize) {
    event::notify(coreid)
}

pub fn event_drop() {
    event::drop_pending()
}

pub fn event_register_handler(handler: InterruptHandler) -> HalResult<()> {
    event::register_handler(handler)
}

pub fn event_unregister_handler() -> HalResult<()> {
    event::unregister_handler()
}

// ---------------------------------------------------------------------
// Logging (spec.md §4.K, §6)
// ---------------------------------------------------------------------

pub use log::LogLevel;

pub fn kputs(s: &str) {
    log::kputs(s)
}

// `kprintf!`/`kpanic!` are `#[macro_export]`ed from `log` and already
// reachable as `cluster_hal::kprintf!`/`cluster_hal::kpanic!` without a
// re-export here.

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::mock::MockArch;

    #[test]
    fn flat_surface_core_lifecycle_smoke() {
        MockArch::set_current_core_id(0);
        core_state::init();
        assert_eq!(core_get_id(), 0);
        let _ = interrupts_disable();
        interrupts_enable(InterruptLevel::Low);
        assert_eq!(interrupts_get_level(), InterruptLevel::Low);
    }

    #[test]
    fn flat_surface_sync_primitives_compose() {
        let sem = semaphore_init(1);
        semaphore_down(&sem);
        semaphore_up(&sem);
        assert_eq!(sem.count(), 1);

        let lock = Spinlock::new();
        spinlock_init(&lock);
        assert!(spinlock_trylock(&lock));
        spinlock_unlock(&lock);
    }

    #[test]
    fn flat_surface_mmu_round_trip() {
        tlb_flush();
        tlb_write(0x4000, 0x5000, PageFlags::WRITABLE).unwrap();
        assert!(tlb_lookup_vaddr(0x4000).is_some());
        tlb_inval(0x4000);
        assert!(tlb_lookup_vaddr(0x4000).is_none());
    }
}
