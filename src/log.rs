//! Structured logger funneling through the platform write sink: a
//! global level gate, no allocation, and a line-buffer `core::fmt::Write`
//! target instead of pulling in the `log` crate facade, since the sink
//! must stay reachable from inside a critical section.

use core::fmt;
use core::sync::atomic::{AtomicU8, Ordering};

use spin::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl LogLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }

    const fn from_u8(v: u8) -> LogLevel {
        match v {
            0 => LogLevel::Error,
            1 => LogLevel::Warn,
            2 => LogLevel::Info,
            3 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }
}

static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);

pub fn set_level(level: LogLevel) {
    LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

pub fn get_level() -> LogLevel {
    LogLevel::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

pub fn is_enabled(level: LogLevel) -> bool {
    level <= get_level()
}

/// Level presets for common deployment modes.
pub mod policy {
    use super::{set_level, LogLevel};

    pub const PRODUCTION_LEVEL: LogLevel = LogLevel::Warn;
    pub const DEVELOPMENT_LEVEL: LogLevel = LogLevel::Debug;
    pub const TESTING_LEVEL: LogLevel = LogLevel::Trace;

    pub fn set_production() {
        set_level(PRODUCTION_LEVEL);
    }

    pub fn set_development() {
        set_level(DEVELOPMENT_LEVEL);
    }

    pub fn set_testing() {
        set_level(TESTING_LEVEL);
    }
}

/// Output device abstraction. Concrete sinks (serial, virtual TTY) are
/// platform drivers; the HAL only defines the seam.
pub trait WriteSink: Sync {
    fn write(&self, bytes: &[u8]);
}

struct NullSink;
impl WriteSink for NullSink {
    fn write(&self, _bytes: &[u8]) {}
}

static NULL_SINK: NullSink = NullSink;
static SINK: Mutex<&'static dyn WriteSink> = Mutex::new(&NULL_SINK);

/// Install the platform write sink. Swaps the sink under the same lock
/// every write takes, so callers may rebind it after bring-up without
/// tearing an in-flight line.
pub fn set_sink(sink: &'static dyn WriteSink) {
    *SINK.lock() = sink;
}

fn write_bytes(bytes: &[u8]) {
    SINK.lock().write(bytes);
}

pub fn kputs(s: &str) {
    write_bytes(s.as_bytes());
    write_bytes(b"\n");
}

const LINE_CAPACITY: usize = 256;

struct LineBuffer {
    buf: [u8; LINE_CAPACITY],
    len: usize,
}

impl LineBuffer {
    const fn new() -> Self {
        Self { buf: [0; LINE_CAPACITY], len: 0 }
    }
}

impl fmt::Write for LineBuffer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let bytes = s.as_bytes();
        let room = LINE_CAPACITY - self.len;
        let n = core::cmp::min(room, bytes.len());
        self.buf[self.len..self.len + n].copy_from_slice(&bytes[..n]);
        self.len += n;
        Ok(())
    }
}

#[doc(hidden)]
pub fn _kprintf(level: LogLevel, module: &str, args: fmt::Arguments<'_>) {
    if !is_enabled(level) {
        return;
    }
    let mut line = LineBuffer::new();
    let _ = fmt::write(&mut line, format_args!("[{}] {}: ", level.as_str(), module));
    let _ = fmt::write(&mut line, args);
    write_bytes(&line.buf[..line.len]);
    write_bytes(b"\n");
}

/// Format and emit a log line through the platform sink, gated by level.
#[macro_export]
macro_rules! kprintf {
    ($level:expr, $($arg:tt)*) => {
        $crate::log::_kprintf($level, core::module_path!(), core::format_args!($($arg)*))
    };
}

/// Unconditional, unformatted halt-and-report path for invariant
/// violations. On real hardware this logs and parks the core forever.
/// Under `#[cfg(test)]` it unwinds instead, the same test-only escape
/// [`crate::arch::mock::MockArch::reset_trampoline`] uses, so host-side
/// tests can assert that a given invariant violation was reached
/// without hanging the test runner.
pub fn kpanic(args: fmt::Arguments<'_>) -> ! {
    let mut line = LineBuffer::new();
    let _ = fmt::write(&mut line, format_args!("[PANIC] "));
    let _ = fmt::write(&mut line, args);
    write_bytes(&line.buf[..line.len]);
    write_bytes(b"\n");
    #[cfg(test)]
    {
        extern crate std;
        std::panic!("kpanic");
    }
    #[cfg(not(test))]
    loop {
        core::hint::spin_loop();
    }
}

#[macro_export]
macro_rules! kpanic {
    ($($arg:tt)*) => {
        $crate::log::kpanic(core::format_args!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    extern crate std;
    use std::sync::Mutex;
    use std::vec::Vec;

    struct CaptureSink {
        data: Mutex<Vec<u8>>,
    }

    static CAPTURE: CaptureSink = CaptureSink { data: Mutex::new(Vec::new()) };

    impl WriteSink for CaptureSink {
        fn write(&self, bytes: &[u8]) {
            self.data.lock().unwrap().extend_from_slice(bytes);
        }
    }

    #[test]
    fn level_gate_suppresses_below_threshold() {
        set_level(LogLevel::Warn);
        assert!(is_enabled(LogLevel::Error));
        assert!(is_enabled(LogLevel::Warn));
        assert!(!is_enabled(LogLevel::Info));
        set_level(LogLevel::Trace);
    }

    #[test]
    fn kputs_reaches_sink() {
        set_sink(&CAPTURE);
        CAPTURE.data.lock().unwrap().clear();
        kputs("hello");
        let buf = CAPTURE.data.lock().unwrap();
        assert_eq!(&buf[..], b"hello\n");
    }
}
