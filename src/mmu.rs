//! MMU/TLB one-time setup. Builds a static, identity-ish address space
//! from a caller-supplied region table, validates alignment, and
//! exposes a software TLB (write/lookup/invalidate) used both by the
//! real per-architecture MMU and, here, directly by the mock backend.

use core::sync::atomic::{AtomicBool, Ordering};

use heapless::Vec;
use spin::Mutex;

use crate::arch::{ArchOps, Platform};
use crate::config::{COREID_MASTER, PAGE_SHIFT, PAGE_SIZE, PAGE_TABLE_ALIGN};
use crate::error::Errno;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PageFlags: u32 {
        const WRITABLE  = 1 << 0;
        const EXECUTABLE = 1 << 1;
        const USER      = 1 << 2;
    }
}

/// One named region of the static address space, identity-mapped unless
/// the caller marks it otherwise.
#[derive(Debug, Clone, Copy)]
pub struct Region {
    pub name: &'static str,
    pub phys_base: usize,
    pub virt_base: usize,
    pub size: usize,
    pub flags: PageFlags,
    pub identity: bool,
}

const TLB_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlbEntry {
    pub vaddr: usize,
    pub frame: usize,
    pub flags: PageFlags,
}

struct Tlb {
    entries: Vec<TlbEntry, TLB_CAPACITY>,
}

impl Tlb {
    const fn new() -> Self {
        Self { entries: Vec::new() }
    }
}

static TLB: Mutex<Tlb> = Mutex::new(Tlb::new());
static ADDRESS_SPACE_BUILT: AtomicBool = AtomicBool::new(false);
static REGIONS: Mutex<Vec<Region, 16>> = Mutex::new(Vec::new());

fn page_align(addr: usize) -> bool {
    addr % PAGE_SIZE == 0
}

fn region_align(name: &str, addr: usize) -> bool {
    if name == "devices" {
        page_align(addr)
    } else {
        addr % PAGE_TABLE_ALIGN == 0
    }
}

fn validate(region: &Region) -> Result<(), Errno> {
    if !region_align(region.name, region.phys_base) || !region_align(region.name, region.virt_base)
    {
        return Err(Errno::EINVAL);
    }
    if region.size == 0 || region.size % PAGE_SIZE != 0 {
        return Err(Errno::EINVAL);
    }
    if region.identity && region.phys_base != region.virt_base {
        return Err(Errno::EINVAL);
    }
    Ok(())
}

/// Build the static address space once (the master core does the work;
/// every core, including the master, still performs the per-core TLB
/// warm-up that follows). Calling this again after the address space is
/// built is not an error; it is a no-op other than the warm-up.
pub fn setup(regions: &[Region]) -> Result<(), Errno> {
    if Platform::current_core_id() == COREID_MASTER && !ADDRESS_SPACE_BUILT.load(Ordering::Acquire)
    {
        for region in regions {
            validate(region)?;
        }
        let mut stored = REGIONS.lock();
        stored.clear();
        for region in regions {
            stored.push(*region).map_err(|_| Errno::EINVAL)?;
        }
        drop(stored);
        ADDRESS_SPACE_BUILT.store(true, Ordering::Release);
        crate::barrier::publish();
    }
    warm_up();
    Ok(())
}

/// Per-core TLB warm-up against whatever region table is already
/// installed, without attempting to (re)build the address space. Used
/// by slaves, which inherit the master's region table by reference and
/// perform only this local step.
pub fn warm_up_local() {
    warm_up();
}

fn warm_up() {
    crate::barrier::consume();
    let regions = REGIONS.lock();
    for region in regions.iter() {
        let pages = region.size / PAGE_SIZE;
        for i in 0..pages {
            let _ = tlb_write(
                region.virt_base + i * PAGE_SIZE,
                region.phys_base + i * PAGE_SIZE,
                region.flags,
            );
        }
    }
}

/// Install a translation. Evicts the oldest entry if the software TLB is
/// full.
pub fn tlb_write(vaddr: usize, paddr: usize, flags: PageFlags) -> Result<(), Errno> {
    if !page_align(vaddr) || !page_align(paddr) {
        return Err(Errno::EINVAL);
    }
    let entry = TlbEntry { vaddr, frame: paddr >> PAGE_SHIFT, flags };
    let mut tlb = TLB.lock();
    if let Some(slot) = tlb.entries.iter_mut().find(|e| e.vaddr == vaddr) {
        *slot = entry;
        return Ok(());
    }
    if tlb.entries.is_full() {
        tlb.entries.remove(0);
    }
    let _ = tlb.entries.push(entry);
    Ok(())
}

pub fn tlb_lookup_vaddr(vaddr: usize) -> Option<TlbEntry> {
    let page = vaddr - (vaddr % PAGE_SIZE);
    TLB.lock().entries.iter().find(|e| e.vaddr == page).copied()
}

pub fn tlb_lookup_paddr(frame: usize) -> Option<TlbEntry> {
    TLB.lock().entries.iter().find(|e| e.frame == frame).copied()
}

pub fn tlb_inval(vaddr: usize) {
    let page = vaddr - (vaddr % PAGE_SIZE);
    let mut tlb = TLB.lock();
    if let Some(pos) = tlb.entries.iter().position(|e| e.vaddr == page) {
        tlb.entries.remove(pos);
    }
}

pub fn tlb_flush() {
    TLB.lock().entries.clear();
}

/// Resolve a TLB miss by walking the region table built at `setup` time
/// and installing the translation. Returns `EINVAL` if the address falls
/// outside every region.
pub fn refill(vaddr: usize) -> Result<(), Errno> {
    let page = vaddr - (vaddr % PAGE_SIZE);
    let regions = REGIONS.lock();
    for region in regions.iter() {
        if page >= region.virt_base && page < region.virt_base + region.size {
            let offset = page - region.virt_base;
            return tlb_write(page, region.phys_base + offset, region.flags);
        }
    }
    Err(Errno::EINVAL)
}
