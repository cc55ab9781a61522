//! Build-time platform constants.
//!
//! The HAL takes no runtime configuration: every quantity a client might
//! expect to tune at boot is a compile-time constant here instead.

/// Cores sharing memory within one cluster.
pub const CORES_PER_CLUSTER: usize = 8;

/// Number of compute/IO clusters on the platform.
pub const CLUSTERS_NUM: usize = 4;

/// Total addressable cores across all clusters.
pub const CORES_NUM: usize = CORES_PER_CLUSTER * CLUSTERS_NUM;

/// Core id of the designated master of the master cluster.
pub const COREID_MASTER: usize = 0;

/// Width of the interrupt table.
pub const INTERRUPTS_NUM: usize = 32;

/// Width of the exception/trap table.
pub const EXCEPTIONS_NUM: usize = 16;

/// Interrupt number the clock device raises; dispatched through the
/// internal clock wrapper.
pub const INTERRUPT_CLOCK: usize = 0;

/// Interrupt number used for inter-processor signaling.
pub const INTERRUPT_IPI: usize = 1;

/// Exception kind raised by a TLB miss.
pub const EXCEPTION_PAGE_FAULT: usize = 0;

/// Cache line size in bytes.
pub const CACHE_LINE_SIZE: usize = 64;

/// MMU page size in bytes.
pub const PAGE_SIZE: usize = 4096;

/// log2(PAGE_SIZE); used by the MMU helper for frame arithmetic.
pub const PAGE_SHIFT: u32 = 12;

/// Alignment required for kernel/kpool regions (page-table boundary).
pub const PAGE_TABLE_ALIGN: usize = 1 << 21; // 2 MiB, a typical huge-page stride

/// Retry budget for `core_start` against a Resetting target.
pub const CORE_START_NTRIALS: usize = 10;

/// Spurious-interrupt count above which verbose logging kicks in.
pub const INTERRUPT_SPURIOUS_THRESHOLD: u32 = 100;
