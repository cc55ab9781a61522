//! Cooperative context switching: a small fixed-size register save area
//! plus a `global_asm!`-backed switch routine. This module only
//! specifies the construction and switch contract; the register layout
//! and the actual save/restore sequence are architecture-specific glue
//! supplied by [`crate::arch`].

use crate::arch::{ArchOps, Platform};

/// Opaque saved register set. Content is architecture-defined; callers
/// never inspect fields directly.
#[repr(C)]
pub struct RawRegs(pub [usize; 16]);

impl RawRegs {
    pub const fn zeroed() -> Self {
        Self([0; 16])
    }
}

/// A suspended thread of execution: a saved register file plus the two
/// stacks it runs on.
pub struct Context {
    regs: RawRegs,
    pub ustack: usize,
    pub kstack: usize,
}

impl Context {
    /// Build a context primed so the first `switch_to` into it resumes
    /// at `entry`, running on `kstack`.
    pub fn create(entry: extern "C" fn() -> !, ustack: usize, kstack: usize) -> Self {
        let mut regs = RawRegs::zeroed();
        Platform::context_init(&mut regs, entry, kstack);
        Self { regs, ustack, kstack }
    }

    /// An all-zero placeholder context, used as the initial "current"
    /// slot a core switches *out of* the first time it runs something.
    pub const fn empty(ustack: usize, kstack: usize) -> Self {
        Self { regs: RawRegs::zeroed(), ustack, kstack }
    }
}

/// Save the live register state into `from`, then resume `to`. On real
/// hardware this does not return to its caller until some later switch
/// resumes `from` again.
///
/// # Safety
/// `to` must have been built with [`Context::create`] (or previously
/// been the target of a `switch_to` that suspended it) and both
/// contexts' stacks must still be valid.
pub unsafe fn switch_to(from: &mut Context, to: &Context) {
    Platform::context_switch(&mut from.regs, &to.regs);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::mock::MockArch;

    extern "C" fn entry_stub() -> ! {
        loop {}
    }

    #[test]
    fn create_primes_entry_and_stack() {
        let ctx = Context::create(entry_stub, 0x2000, 0x3000);
        assert_eq!(ctx.regs.0[0], entry_stub as usize);
        assert_eq!(ctx.regs.0[1], 0x3000);
        assert_eq!(ctx.kstack, 0x3000);
        assert_eq!(ctx.ustack, 0x2000);
    }

    #[test]
    fn round_trip_restores_origin() {
        MockArch::set_live_regs(RawRegs([0xAAAA; 16]));

        let mut boot = Context::empty(0, 0);
        let a = Context::create(entry_stub, 0, 0x1000);

        // Switch boot -> a: boot's register file is saved, a's is loaded live.
        unsafe { switch_to(&mut boot, &a) };
        assert_eq!(boot.regs.0[0], 0xAAAA);

        // Switch a -> boot (via a fresh "from" slot): live regs come back to
        // what `a` had loaded, which started out as the primed entry/stack.
        let mut scratch = Context::empty(0, 0);
        unsafe { switch_to(&mut scratch, &boot) };
        assert_eq!(scratch.regs.0[0], a.regs.0[0]);
        assert_eq!(MockArch::live_regs().0[0], boot.regs.0[0]);
    }
}
