//! Per-core lifecycle state machine. Every hardware core cycles through
//! reset, idle, running, optionally sleeping, zombie, and back to
//! resetting, guarded at every step by the core's own [`Spinlock`] and
//! published across cores through [`crate::barrier`]. State lives in an
//! array of lock-guarded descriptors indexed by core id; there is no
//! heap allocation, and every fallible transition returns `Result<_,
//! Errno>` to its caller.

use crate::arch::{ArchOps, Platform};
use crate::config::{CORES_NUM, CORE_START_NTRIALS};
use crate::error::Errno;
use crate::event;
use crate::exception::{self, ExecutionMode};
use crate::interrupt::{self, Level};
use crate::kprintf;
use crate::log::LogLevel;
use crate::mmu;
use crate::spinlock::Spinlock;

/// A core's position in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Running,
    Idle,
    Sleeping,
    Zombie,
    Resetting,
    Offline,
}

/// The entry routine a starter installs before releasing a core from
/// Idle.
pub type StartFn = extern "C" fn();

struct Descriptor {
    lock: Spinlock,
    state: core::cell::UnsafeCell<State>,
    initialized: core::cell::UnsafeCell<bool>,
    wakeups: core::cell::UnsafeCell<u32>,
    start: core::cell::UnsafeCell<Option<StartFn>>,
}

unsafe impl Sync for Descriptor {}

impl Descriptor {
    const fn new_slave() -> Self {
        Self {
            lock: Spinlock::new_locked(),
            state: core::cell::UnsafeCell::new(State::Resetting),
            initialized: core::cell::UnsafeCell::new(false),
            wakeups: core::cell::UnsafeCell::new(0),
            start: core::cell::UnsafeCell::new(None),
        }
    }
}

/// Dense table of per-core descriptors: a statically-sized array indexed
/// by core id, each element guarded by its own lock. Slot 0 is
/// `COREID_MASTER` in this build's default configuration; `self::init`
/// re-derives the master slot from [`crate::config::COREID_MASTER`]
/// rather than assuming index 0, so a platform with a non-zero master id
/// still boots correctly.
static CORES: [Descriptor; CORES_NUM] = {
    const SLAVE: Descriptor = Descriptor::new_slave();
    [SLAVE; CORES_NUM]
};

fn descriptor(coreid: usize) -> &'static Descriptor {
    &CORES[coreid]
}

/// Reset every descriptor to its boot-time value. Exists for test
/// isolation and for a platform that wants to re-arm the HAL without a
/// full reboot; real hardware calls this exactly once, before any core
/// other than the master runs.
pub fn init() {
    for coreid in 0..CORES_NUM {
        let d = descriptor(coreid);
        if coreid == crate::config::COREID_MASTER {
            d.lock.init();
            unsafe {
                *d.state.get() = State::Running;
                *d.initialized.get() = false;
                *d.wakeups.get() = 0;
                *d.start.get() = None;
            }
        } else {
            d.lock.init();
            d.lock.lock();
            unsafe {
                *d.state.get() = State::Resetting;
                *d.initialized.get() = false;
                *d.wakeups.get() = 0;
                *d.start.get() = None;
            }
        }
    }
}

fn current() -> usize {
    Platform::current_core_id()
}

fn valid_core(coreid: usize) -> bool {
    coreid < CORES_NUM
}

/// Architectural bring-up path run by every core before it ever reaches
/// [`idle`]. Sets the execution mode to Interrupt, warms this core's TLB
/// against whichever region table the master already built (the address
/// space itself is built once, elsewhere, by a caller that has the real
/// boot-time region list; slaves only inherit it), resets the software
/// interrupt registry, and installs the interrupt vector table on
/// `stack`, the architecture trampoline's interrupt stack, through
/// [`ArchOps::ivt_setup`].
pub fn core_setup(stack: &mut [u8]) {
    exception::set_mode(ExecutionMode::Interrupt);
    mmu::warm_up_local();
    interrupt::setup();
    Platform::ivt_setup(stack);
    kprintf!(LogLevel::Info, "booting up core {}", current());
}

/// Suspend the calling core in the idle loop until a [`start`] hands it
/// a `start` routine. Only ever called by a slave that currently holds
/// its own lock via the reset path.
pub fn idle() {
    let coreid = current();
    let d = descriptor(coreid);

    unsafe { *d.state.get() = State::Idle };
    crate::barrier::publish();
    d.lock.unlock();

    interrupt::set_level(Level::Low);
    let _ = interrupt::unmask(crate::config::INTERRUPT_IPI);

    loop {
        d.lock.lock();
        crate::barrier::consume();

        if unsafe { *d.state.get() } != State::Idle {
            event::drop_pending();
            d.lock.unlock();
            break;
        }

        d.lock.unlock();
        event::wait();
    }

    run();
}

/// Resume instruction execution by invoking the `start` routine
/// installed by whoever called [`start`]. Marks the core `initialized`
/// on the very first call. Called from the tail of [`idle`]; also
/// exposed standalone as its own external entry point.
pub fn run() {
    let coreid = current();
    let d = descriptor(coreid);

    d.lock.lock();
    crate::barrier::consume();
    if !unsafe { *d.initialized.get() } {
        unsafe { *d.initialized.get() = true };
        crate::barrier::publish();
    }
    let entry = unsafe { *d.start.get() };
    d.lock.unlock();

    if let Some(entry) = entry {
        entry();
    }
}

/// Voluntarily suspend the calling core until [`wakeup`] is delivered.
/// The wakeup counter is checked *before* ever blocking, so a wakeup
/// that raced ahead of the sleep is never lost.
pub fn sleep() {
    let coreid = current();
    let d = descriptor(coreid);

    d.lock.lock();
    crate::barrier::consume();
    let snapshot = unsafe { *d.state.get() };
    d.lock.unlock();

    loop {
        d.lock.lock();
        crate::barrier::consume();

        let wakeups = unsafe { *d.wakeups.get() };
        if wakeups > 0 {
            unsafe {
                *d.state.get() = snapshot;
                *d.wakeups.get() = wakeups - 1;
            }
            crate::barrier::publish();
            d.lock.unlock();
            return;
        }

        unsafe { *d.state.get() = State::Sleeping };
        crate::barrier::publish();
        d.lock.unlock();
        event::wait();
    }
}

/// Deliver a wakeup to `coreid`. `EINVAL` if `coreid` is out of range or
/// the target is Idle (an idle core is woken with [`start`], not
/// `wakeup`).
pub fn wakeup(coreid: usize) -> Result<(), Errno> {
    if !valid_core(coreid) {
        return Err(Errno::EINVAL);
    }
    let d = descriptor(coreid);

    d.lock.lock();
    crate::barrier::consume();

    if unsafe { *d.state.get() } == State::Idle {
        d.lock.unlock();
        return Err(Errno::EINVAL);
    }

    unsafe { *d.wakeups.get() += 1 };
    event::notify(coreid);
    crate::barrier::publish();
    d.lock.unlock();
    Ok(())
}

/// Install `entry` on `coreid` and release it from Idle. Retries while
/// the target is Zombie or transiently Resetting, bounded by
/// [`CORE_START_NTRIALS`](crate::config::CORE_START_NTRIALS) against
/// Resetting; fails `EBUSY` if the target is Running, Sleeping, or
/// Offline, or if it is still Resetting after the retry budget.
pub fn start(coreid: usize, entry: StartFn) -> Result<(), Errno> {
    if !valid_core(coreid) || coreid == current() {
        return Err(Errno::EINVAL);
    }

    let d = descriptor(coreid);
    let mut ntrials = 0usize;

    loop {
        d.lock.lock();
        crate::barrier::consume();

        match unsafe { *d.state.get() } {
            State::Zombie => {
                d.lock.unlock();
                continue;
            }
            State::Resetting => {
                d.lock.unlock();
                if ntrials < CORE_START_NTRIALS {
                    ntrials += 1;
                    continue;
                }
                kprintf!(LogLevel::Warn, "failed to start core {}", coreid);
                return Err(Errno::EBUSY);
            }
            State::Idle => {
                unsafe {
                    *d.state.get() = State::Running;
                    *d.start.get() = Some(entry);
                    *d.wakeups.get() = 0;
                }
                crate::barrier::publish();
                event::notify(coreid);
                d.lock.unlock();
                return Ok(());
            }
            State::Running | State::Sleeping | State::Offline => {
                d.lock.unlock();
                return Err(Errno::EBUSY);
            }
        }
    }
}

/// Self-deregister in preparation for a reset. Slaves only; the master
/// fails `EINVAL`.
pub fn release() -> Result<(), Errno> {
    let coreid = current();
    if coreid == crate::config::COREID_MASTER {
        return Err(Errno::EINVAL);
    }
    let d = descriptor(coreid);
    d.lock.lock();
    unsafe { *d.state.get() = State::Zombie };
    crate::barrier::publish();
    d.lock.unlock();
    Ok(())
}

/// Reset the calling core, jumping through the architecture-specific
/// reset trampoline. Must follow [`release`]; asserts `state == Zombie`
/// as a fatal invariant. The core's lock stays held across the
/// trampoline and is only released from within [`idle`] once the core
/// re-arrives there.
pub fn reset() -> Result<(), Errno> {
    let coreid = current();
    if coreid == crate::config::COREID_MASTER {
        return Err(Errno::EINVAL);
    }

    let _ = interrupt::mask(crate::config::INTERRUPT_IPI);
    interrupt::set_level(Level::None);

    let d = descriptor(coreid);
    d.lock.lock();
    crate::barrier::consume();

    if unsafe { *d.state.get() } != State::Zombie {
        crate::kpanic!("core_reset: core {} is not a zombie", coreid);
    }

    unsafe { *d.state.get() = State::Resetting };
    crate::barrier::publish();

    Platform::reset_trampoline();
}

/// Disable interrupts and park the core forever. "Halt and stay":
/// interrupts remain masked across the halt (see [`core_halt_nmi`] for
/// the alternative a backend may opt into).
pub fn core_halt() -> ! {
    kprintf!(LogLevel::Info, "halting...");
    interrupt::disable();
    loop {
        core::hint::spin_loop();
    }
}

/// As [`core_halt`], but leaves the core willing to accept an NMI; this
/// semantic choice is platform-specific and not the default. A backend
/// opts into this explicitly instead of calling `core_halt`.
pub fn core_halt_nmi() -> ! {
    kprintf!(LogLevel::Info, "halting (NMI-acceptant)...");
    interrupt::set_level(Level::High);
    loop {
        core::hint::spin_loop();
    }
}

/// Power off the calling core. Only the master observes
/// `State::Offline` afterward; once set, no further transition is
/// defined.
pub fn shutdown() -> ! {
    let coreid = current();
    let d = descriptor(coreid);
    d.lock.lock();
    unsafe { *d.state.get() = State::Offline };
    crate::barrier::publish();
    d.lock.unlock();
    Platform::power_off();
}

/// The calling core's dense id.
pub fn get_id() -> usize {
    current()
}

/// Raw platform power-off, bypassing the state transition [`shutdown`]
/// performs first.
pub fn poweroff() -> ! {
    Platform::power_off();
}

/// Snapshot a core's state under its lock, for diagnostics and tests.
pub fn state_of(coreid: usize) -> State {
    let d = descriptor(coreid);
    d.lock.lock();
    let s = unsafe { *d.state.get() };
    d.lock.unlock();
    s
}

pub fn is_initialized(coreid: usize) -> bool {
    let d = descriptor(coreid);
    d.lock.lock();
    let v = unsafe { *d.initialized.get() };
    d.lock.unlock();
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::mock::MockArch;
    extern crate std;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::thread;

    fn reset_slot(coreid: usize, state: State) {
        let d = descriptor(coreid);
        d.lock.init();
        unsafe {
            *d.state.get() = state;
            *d.initialized.get() = false;
            *d.wakeups.get() = 0;
            *d.start.get() = None;
        }
    }

    #[test]
    fn core_setup_installs_ivt_on_given_stack() {
        use crate::arch::mock::IVT_SETUPS;
        MockArch::set_current_core_id(0);
        let before = IVT_SETUPS.load(Ordering::Relaxed);
        let mut stack = [0u8; 128];
        core_setup(&mut stack);
        assert_eq!(IVT_SETUPS.load(Ordering::Relaxed), before + 1);
        assert_eq!(MockArch::last_ivt_stack_len(), 128);
    }

    #[test]
    fn start_rejects_self_out_of_range_and_master() {
        MockArch::set_current_core_id(1);
        extern "C" fn noop() {}
        assert_eq!(start(1, noop), Err(Errno::EINVAL));
        assert_eq!(start(CORES_NUM, noop), Err(Errno::EINVAL));
    }

    #[test]
    fn start_on_idle_transitions_to_running() {
        MockArch::set_current_core_id(0);
        reset_slot(5, State::Idle);
        extern "C" fn entry() {}
        assert!(start(5, entry).is_ok());
        assert_eq!(state_of(5), State::Running);
    }

    #[test]
    fn start_on_running_is_busy() {
        MockArch::set_current_core_id(0);
        reset_slot(6, State::Running);
        extern "C" fn entry() {}
        assert_eq!(start(6, entry), Err(Errno::EBUSY));
    }

    #[test]
    fn wakeup_rejects_out_of_range_and_idle_target() {
        MockArch::set_current_core_id(0);
        assert_eq!(wakeup(CORES_NUM), Err(Errno::EINVAL));
        reset_slot(7, State::Idle);
        assert_eq!(wakeup(7), Err(Errno::EINVAL));
    }

    #[test]
    fn release_and_reset_reject_master() {
        MockArch::set_current_core_id(crate::config::COREID_MASTER);
        assert_eq!(release(), Err(Errno::EINVAL));
        assert_eq!(reset(), Err(Errno::EINVAL));
    }

    #[test]
    fn release_then_reset_cycles_through_resetting() {
        let coreid = 8usize;
        reset_slot(coreid, State::Running);
        MockArch::set_current_core_id(coreid);

        assert!(release().is_ok());
        assert_eq!(state_of(coreid), State::Zombie);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = reset();
        }));
        assert!(result.is_err());
        // reset() never releases the lock on the way out; it is only
        // released from within idle() once the core re-arrives there.
        // Peek at the state directly instead of re-locking, then unlock
        // by hand since this mock never really reset the core.
        let d = descriptor(coreid);
        assert_eq!(unsafe { *d.state.get() }, State::Resetting);
        d.lock.unlock();
    }

    #[test]
    fn reset_without_release_panics() {
        let coreid = 9usize;
        reset_slot(coreid, State::Running);
        MockArch::set_current_core_id(coreid);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = reset();
        }));
        assert!(result.is_err());
        descriptor(coreid).lock.unlock();
    }

    #[test]
    fn wakeup_before_sleep_is_not_lost() {
        let coreid = 11usize;
        reset_slot(coreid, State::Running);

        let woke = Arc::new(AtomicU32::new(0));
        let woke2 = Arc::clone(&woke);
        let handle = thread::spawn(move || {
            MockArch::set_current_core_id(coreid);
            // simulate the race: a wakeup lands before sleep ever checks.
            wakeup(coreid).unwrap();
            sleep();
            woke2.store(1, Ordering::SeqCst);
        });
        handle.join().unwrap();
        assert_eq!(woke.load(Ordering::SeqCst), 1);
        assert_eq!(state_of(coreid), State::Running);
    }

    #[test]
    fn sleep_blocks_until_wakeup_arrives_later() {
        let coreid = 12usize;
        reset_slot(coreid, State::Running);

        let done = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let done2 = Arc::clone(&done);
        let handle = thread::spawn(move || {
            MockArch::set_current_core_id(coreid);
            sleep();
            done2.store(true, Ordering::SeqCst);
        });
        thread::sleep(std::time::Duration::from_millis(20));
        assert!(!done.load(Ordering::SeqCst));
        wakeup(coreid).unwrap();
        handle.join().unwrap();
        assert!(done.load(Ordering::SeqCst));
    }

    #[test]
    fn idle_then_start_releases_lock_and_runs_entry() {
        let coreid = 13usize;
        let d = descriptor(coreid);
        d.lock.init();
        d.lock.lock();
        unsafe {
            *d.state.get() = State::Resetting;
            *d.initialized.get() = false;
            *d.start.get() = None;
            *d.wakeups.get() = 0;
        }

        static RAN: AtomicU32 = AtomicU32::new(0);
        extern "C" fn entry() {
            RAN.fetch_add(1, Ordering::SeqCst);
        }

        let handle = thread::spawn(move || {
            MockArch::set_current_core_id(coreid);
            idle();
        });
        thread::sleep(std::time::Duration::from_millis(20));
        start(coreid, entry).unwrap();
        handle.join().unwrap();
        assert_eq!(RAN.load(Ordering::SeqCst), 1);
        assert!(is_initialized(coreid));
    }
}
