//! Hardware interrupt facade: interrupt levels, masking, handler
//! registration, and the clock special case.
//!
//! Every quantity here is tracked per core: each core has its own
//! handler table, its own current interrupt level, and its own pending
//! queue. A slave finishing its bring-up and calling `setup()` only
//! resets its own line state, never another core's.

use spin::Mutex;

use crate::arch::{ArchOps, Platform};
use crate::config::{CORES_NUM, INTERRUPTS_NUM, INTERRUPT_CLOCK, INTERRUPT_SPURIOUS_THRESHOLD};
use crate::error::Errno;
use crate::exception::{self, ExecutionMode};
use crate::kprintf;
use crate::log::LogLevel;

/// The four priority levels a core's interrupt line can be raised to:
/// all unmasked, some masked, timer only, or fully masked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Level {
    None = 0,
    Low = 1,
    Medium = 2,
    High = 3,
}

pub type Handler = fn(u32);

#[derive(Clone, Copy)]
struct Slot {
    handler: Option<Handler>,
    masked: bool,
}

impl Slot {
    const fn new() -> Self {
        Self { handler: None, masked: true }
    }
}

#[derive(Clone, Copy)]
struct Registry {
    slots: [Slot; INTERRUPTS_NUM],
    spurious: u32,
}

impl Registry {
    const fn new() -> Self {
        const SLOT: Slot = Slot::new();
        Self { slots: [SLOT; INTERRUPTS_NUM], spurious: 0 }
    }
}

const REGISTRY_INIT: Mutex<Registry> = Mutex::new(Registry::new());
static REGISTRIES: [Mutex<Registry>; CORES_NUM] = [REGISTRY_INIT; CORES_NUM];

const LEVEL_INIT: Mutex<Level> = Mutex::new(Level::None);
static CURRENT_LEVEL: [Mutex<Level>; CORES_NUM] = [LEVEL_INIT; CORES_NUM];

const _: () = assert!(INTERRUPTS_NUM <= u32::BITS as usize);
const PENDING_INIT: Mutex<u32> = Mutex::new(0);
static PENDING: [Mutex<u32>; CORES_NUM] = [PENDING_INIT; CORES_NUM];

fn here() -> usize {
    Platform::current_core_id()
}

/// Mark `num` pending on the calling core, for a backend that queues raw
/// interrupt signals instead of dispatching them inline.
pub fn mark_pending(num: usize) -> Result<(), Errno> {
    if num >= INTERRUPTS_NUM {
        return Err(Errno::EINVAL);
    }
    *PENDING[here()].lock() |= 1 << num;
    Ok(())
}

/// Pop and return the lowest-numbered interrupt pending on the calling
/// core, if any.
pub fn next() -> Option<usize> {
    let mut pending = PENDING[here()].lock();
    if *pending == 0 {
        return None;
    }
    let num = pending.trailing_zeros() as usize;
    *pending &= !(1 << num);
    Some(num)
}

fn default_handler(coreid: usize, num: u32) {
    let mut reg = REGISTRIES[coreid].lock();
    reg.spurious += 1;
    if reg.spurious > INTERRUPT_SPURIOUS_THRESHOLD {
        drop(reg);
        kprintf!(LogLevel::Warn, "spurious interrupt {} on core {} (count above threshold)", num, coreid);
    }
}

fn clock_wrapper(coreid: usize, num: u32) {
    let handler = REGISTRIES[coreid].lock().slots[INTERRUPT_CLOCK].handler;
    if let Some(h) = handler {
        h(num);
    } else {
        default_handler(coreid, num);
    }
    Platform::clock_reset();
}

/// Register `handler` for interrupt `num` on the calling core. `EINVAL`
/// if `num` is out of range, `EBUSY` if a handler is already installed
/// there.
pub fn register(num: usize, handler: Handler) -> Result<(), Errno> {
    if num >= INTERRUPTS_NUM {
        return Err(Errno::EINVAL);
    }
    let coreid = here();
    let mut reg = REGISTRIES[coreid].lock();
    if reg.slots[num].handler.is_some() {
        return Err(Errno::EBUSY);
    }
    reg.slots[num].handler = Some(handler);
    crate::barrier::dcache_invalidate();
    drop(reg);
    unmask(num)?;
    kprintf!(LogLevel::Debug, "registered interrupt handler for {} on core {}", num, coreid);
    Ok(())
}

/// Remove the handler installed at `num` on the calling core. `EINVAL`
/// if out of range or nothing is registered there.
pub fn unregister(num: usize) -> Result<(), Errno> {
    if num >= INTERRUPTS_NUM {
        return Err(Errno::EINVAL);
    }
    let coreid = here();
    let mut reg = REGISTRIES[coreid].lock();
    if reg.slots[num].handler.is_none() {
        return Err(Errno::EINVAL);
    }
    reg.slots[num].handler = None;
    crate::barrier::dcache_invalidate();
    drop(reg);
    mask(num)?;
    kprintf!(LogLevel::Debug, "unregistered interrupt handler for {} on core {}", num, coreid);
    Ok(())
}

pub fn mask(num: usize) -> Result<(), Errno> {
    if num >= INTERRUPTS_NUM {
        return Err(Errno::EINVAL);
    }
    REGISTRIES[here()].lock().slots[num].masked = true;
    Ok(())
}

pub fn unmask(num: usize) -> Result<(), Errno> {
    if num >= INTERRUPTS_NUM {
        return Err(Errno::EINVAL);
    }
    REGISTRIES[here()].lock().slots[num].masked = false;
    Ok(())
}

pub fn is_masked(num: usize) -> bool {
    if num >= INTERRUPTS_NUM {
        return true;
    }
    REGISTRIES[here()].lock().slots[num].masked
}

/// Dispatch interrupt `num` on the calling core: the clock line runs
/// through the clock-reset wrapper, everything else runs its registered
/// handler or, absent one, falls through to spurious accounting. An
/// out-of-range `num` is itself treated as spurious rather than
/// indexing the table.
pub fn dispatch(num: usize) {
    let coreid = here();
    if num >= INTERRUPTS_NUM {
        default_handler(coreid, num as u32);
        return;
    }
    if REGISTRIES[coreid].lock().slots[num].masked {
        return;
    }
    if num == INTERRUPT_CLOCK {
        clock_wrapper(coreid, num as u32);
        return;
    }
    let handler = REGISTRIES[coreid].lock().slots[num].handler;
    match handler {
        Some(h) => h(num as u32),
        None => default_handler(coreid, num as u32),
    }
}

/// Acknowledge receipt of an interrupt once its handler has run. A
/// placeholder seam for platforms whose controller requires an explicit
/// EOI; the mock/memory-polled backends need nothing here.
pub fn ack(_num: usize) {}

/// Globally disable interrupt delivery on the calling core, returning
/// the previous level so the caller can restore it later.
pub fn disable() -> Level {
    let mut level = CURRENT_LEVEL[here()].lock();
    let prev = *level;
    *level = Level::None;
    prev
}

/// Restore interrupt delivery to `level` on the calling core and switch
/// its execution mode back to Normal.
pub fn enable(level: Level) {
    *CURRENT_LEVEL[here()].lock() = level;
    exception::set_mode(ExecutionMode::Normal);
}

pub fn get_level() -> Level {
    *CURRENT_LEVEL[here()].lock()
}

/// Install `level` on the calling core, returning the one it replaces.
pub fn set_level(level: Level) -> Level {
    let mut current = CURRENT_LEVEL[here()].lock();
    let prev = *current;
    *current = level;
    prev
}

/// Reset the calling core's interrupt table to its boot state: every
/// line masked, no handlers installed, spurious counter zeroed. Only
/// ever touches the calling core's own table.
pub fn setup() {
    let mut reg = REGISTRIES[here()].lock();
    for slot in reg.slots.iter_mut() {
        slot.handler = None;
        slot.masked = true;
    }
    reg.spurious = 0;
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicU32, Ordering};

    static HITS: AtomicU32 = AtomicU32::new(0);

    fn counting_handler(_num: u32) {
        HITS.fetch_add(1, Ordering::Relaxed);
    }

    #[test]
    fn register_unregister_round_trip() {
        setup();
        assert!(register(5, counting_handler).is_ok());
        assert_eq!(register(5, counting_handler), Err(Errno::EBUSY));
        assert!(unregister(5).is_ok());
        assert_eq!(unregister(5), Err(Errno::EINVAL));
    }

    #[test]
    fn register_out_of_range_is_invalid() {
        assert_eq!(register(INTERRUPTS_NUM, counting_handler), Err(Errno::EINVAL));
    }

    #[test]
    fn dispatch_out_of_range_is_spurious_not_a_panic() {
        setup();
        dispatch(INTERRUPTS_NUM + 5);
        assert_eq!(REGISTRIES[here()].lock().spurious, 1);
    }

    #[test]
    fn dispatch_runs_registered_handler() {
        setup();
        HITS.store(0, Ordering::Relaxed);
        register(6, counting_handler).unwrap();
        dispatch(6);
        assert_eq!(HITS.load(Ordering::Relaxed), 1);
        unregister(6).unwrap();
    }

    #[test]
    fn masked_line_does_not_dispatch() {
        setup();
        HITS.store(0, Ordering::Relaxed);
        register(7, counting_handler).unwrap();
        mask(7).unwrap();
        dispatch(7);
        assert_eq!(HITS.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn next_reports_pending_in_ascending_order() {
        while next().is_some() {}
        mark_pending(9).unwrap();
        mark_pending(3).unwrap();
        assert_eq!(next(), Some(3));
        assert_eq!(next(), Some(9));
        assert_eq!(next(), None);
    }

    #[test]
    fn set_level_returns_previous() {
        set_level(Level::Low);
        let prev = set_level(Level::High);
        assert_eq!(prev, Level::Low);
        assert_eq!(get_level(), Level::High);
    }

    #[test]
    fn setup_only_touches_calling_core() {
        use crate::arch::mock::MockArch;
        MockArch::set_current_core_id(1);
        setup();
        register(10, counting_handler).unwrap();
        MockArch::set_current_core_id(2);
        setup();
        assert_eq!(unregister(10), Err(Errno::EINVAL));
        MockArch::set_current_core_id(1);
        assert!(unregister(10).is_ok());
    }
}
