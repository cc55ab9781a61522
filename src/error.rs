//! Recoverable error codes and the invariant-violation panic path.

/// POSIX-flavored error codes the HAL's fallible operations can return.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Errno {
    /// Invalid argument (bad core id, misaligned region, unknown kind).
    EINVAL = 22,
    /// Resource already in use (double `lock`/`register`, core not idle).
    EBUSY = 16,
    /// Caller should retry (core transiently Resetting or Zombie).
    EAGAIN = 11,
    /// Resource already exists (duplicate handler registration).
    EEXIST = 17,
    /// The channel backing an operation was torn down mid-flight.
    ECONNABORTED = 103,
    /// Unused by any operation in this HAL; there is no heap allocation
    /// to exhaust.
    ENOMEM = 12,
}

impl Errno {
    /// The negated value a C-style kcall ABI would return.
    pub const fn as_negated_isize(self) -> isize {
        -(self as isize)
    }

    pub const fn description(self) -> &'static str {
        match self {
            Errno::EINVAL => "invalid argument",
            Errno::EBUSY => "resource busy",
            Errno::EAGAIN => "try again",
            Errno::EEXIST => "already exists",
            Errno::ECONNABORTED => "connection aborted",
            Errno::ENOMEM => "out of memory",
        }
    }
}

impl core::fmt::Display for Errno {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.description())
    }
}

/// Result alias used throughout the crate's fallible surface.
pub type HalResult<T> = Result<T, Errno>;
