//! Exception/trap facade: a fixed-width table of synchronous fault
//! handlers plus the kernel-call trap dispatcher.

use core::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use spin::Mutex;

use crate::arch::{ArchOps, Platform};
use crate::config::{CORES_NUM, EXCEPTIONS_NUM, EXCEPTION_PAGE_FAULT};
use crate::error::Errno;

/// The core's current trap-handling context, saved/restored around a
/// trap dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExecutionMode {
    Normal = 0,
    Interrupt = 1,
    Trap = 2,
}

impl ExecutionMode {
    const fn from_u8(v: u8) -> Self {
        match v {
            1 => ExecutionMode::Interrupt,
            2 => ExecutionMode::Trap,
            _ => ExecutionMode::Normal,
        }
    }
}

const INIT_MODE: AtomicU8 = AtomicU8::new(ExecutionMode::Normal as u8);
static MODE: [AtomicU8; CORES_NUM] = [INIT_MODE; CORES_NUM];

fn core_slot() -> usize {
    Platform::current_core_id()
}

/// Set this core's execution mode, returning the previous one.
pub fn set_mode(mode: ExecutionMode) -> ExecutionMode {
    let slot = core_slot();
    let prev = MODE[slot].swap(mode as u8, Ordering::AcqRel);
    ExecutionMode::from_u8(prev)
}

pub fn get_mode() -> ExecutionMode {
    ExecutionMode::from_u8(MODE[core_slot()].load(Ordering::Acquire))
}

pub type ExceptionHandler = fn(kind: usize, fault_addr: usize) -> i32;

struct Slot {
    handler: Option<ExceptionHandler>,
}

impl Slot {
    const fn new() -> Self {
        Self { handler: None }
    }
}

static TABLE: Mutex<[Slot; EXCEPTIONS_NUM]> = Mutex::new({
    const S: Slot = Slot::new();
    [S; EXCEPTIONS_NUM]
});

static LAST_FAULT_ADDR: AtomicUsize = AtomicUsize::new(0);

/// Register a handler for exception `kind`. `EINVAL` out of range,
/// `EBUSY` if already registered.
pub fn register(kind: usize, handler: ExceptionHandler) -> Result<(), Errno> {
    if kind >= EXCEPTIONS_NUM {
        return Err(Errno::EINVAL);
    }
    let mut table = TABLE.lock();
    if table[kind].handler.is_some() {
        return Err(Errno::EBUSY);
    }
    table[kind].handler = Some(handler);
    Ok(())
}

pub fn unregister(kind: usize) -> Result<(), Errno> {
    if kind >= EXCEPTIONS_NUM {
        return Err(Errno::EINVAL);
    }
    let mut table = TABLE.lock();
    if table[kind].handler.is_none() {
        return Err(Errno::EINVAL);
    }
    table[kind].handler = None;
    Ok(())
}

/// The faulting address recorded by the most recent page-fault dispatch
/// on this core.
pub fn get_addr() -> usize {
    LAST_FAULT_ADDR.load(Ordering::Relaxed)
}

/// Dispatch a synchronous exception of `kind`, sets the fault address
/// when `kind` is the page-fault kind. Returns `EINVAL` if no handler is
/// installed; an unhandled fault is always a caller bug, never a
/// transient condition.
pub fn dispatch(kind: usize, fault_addr: usize) -> Result<i32, Errno> {
    if kind == EXCEPTION_PAGE_FAULT {
        LAST_FAULT_ADDR.store(fault_addr, Ordering::Relaxed);
    }
    let handler = TABLE.lock().get(kind).and_then(|s| s.handler);
    match handler {
        Some(h) => Ok(h(kind, fault_addr)),
        None => Err(Errno::EINVAL),
    }
}

/// Synchronous kernel-call entry: sets execution mode to Trap, invokes
/// the numbered call as an exception dispatch, restores the previous
/// mode.
pub fn do_kcall(nr: usize, a0: usize, a1: usize, a2: usize, a3: usize, a4: usize) -> i32 {
    let prev = set_mode(ExecutionMode::Trap);
    let _ = (a1, a2, a3, a4);
    let result = dispatch(nr, a0).unwrap_or(Errno::EINVAL.as_negated_isize() as i32);
    set_mode(prev);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::mock::MockArch;

    fn page_fault_handler(_kind: usize, addr: usize) -> i32 {
        addr as i32
    }

    #[test]
    fn register_busy_and_dispatch() {
        MockArch::set_current_core_id(0);
        let _ = unregister(EXCEPTION_PAGE_FAULT);
        assert!(register(EXCEPTION_PAGE_FAULT, page_fault_handler).is_ok());
        assert_eq!(
            register(EXCEPTION_PAGE_FAULT, page_fault_handler),
            Err(Errno::EBUSY)
        );
        let result = dispatch(EXCEPTION_PAGE_FAULT, 0x4000);
        assert_eq!(result, Ok(0x4000));
        assert_eq!(get_addr(), 0x4000);
        unregister(EXCEPTION_PAGE_FAULT).unwrap();
    }

    #[test]
    fn do_kcall_restores_previous_mode() {
        MockArch::set_current_core_id(1);
        set_mode(ExecutionMode::Normal);
        let _ = unregister(5);
        register(5, |_, a0| a0 as i32).unwrap();
        assert_eq!(get_mode(), ExecutionMode::Normal);
        let rc = do_kcall(5, 7, 0, 0, 0, 0);
        assert_eq!(rc, 7);
        assert_eq!(get_mode(), ExecutionMode::Normal);
        unregister(5).unwrap();
    }
}
