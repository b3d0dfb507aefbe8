//! Kernel logging subsystem
//!
//! Leveled log macros. Lines go to whichever [`LogSink`] the embedding
//! kernel installs (COM1 on bare metal, see [`crate::serial`]); with no
//! sink installed they are dropped. A sink with a clock gets a timestamp
//! column in front of the level tag.

use core::fmt;
use core::sync::atomic::{AtomicU8, Ordering};
use spin::Once;

/// Messages below this level are discarded
static MIN_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);

static SINK: Once<&'static dyn LogSink> = Once::new();

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO ",
            LogLevel::Warn => "WARN ",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
        }
    }
}

/// Destination for formatted log lines
pub trait LogSink: Send + Sync {
    fn write_line(&self, level: LogLevel, line: fmt::Arguments);

    /// Current time in the sink's own units, if it has a clock
    fn timestamp(&self) -> Option<u64> {
        None
    }
}

/// Install the log sink. Only the first call has any effect.
pub fn set_sink(sink: &'static dyn LogSink) {
    SINK.call_once(|| sink);
}

/// Set the minimum level that reaches the sink
pub fn set_level(level: LogLevel) {
    MIN_LEVEL.store(level as u8, Ordering::Relaxed);
}

/// Internal log function
#[doc(hidden)]
pub fn _log(level: LogLevel, args: fmt::Arguments) {
    if (level as u8) < MIN_LEVEL.load(Ordering::Relaxed) {
        return;
    }
    if let Some(sink) = SINK.get() {
        match sink.timestamp() {
            Some(ts) => sink
                .write_line(level, format_args!("[{:>10}][{}] {}\n", ts, level.as_str(), args)),
            None => sink.write_line(level, format_args!("[{}] {}\n", level.as_str(), args)),
        }
    }
}

/// Log macro with level
#[macro_export]
macro_rules! log_level {
    ($level:expr, $($arg:tt)*) => {
        $crate::logger::_log($level, format_args!($($arg)*))
    };
}

/// Info log (default)
#[macro_export]
macro_rules! log {
    ($($arg:tt)*) => {
        $crate::log_level!($crate::logger::LogLevel::Info, $($arg)*)
    };
}

/// Debug log
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::log_level!($crate::logger::LogLevel::Debug, $($arg)*)
    };
}

/// Warning log
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::log_level!($crate::logger::LogLevel::Warn, $($arg)*)
    };
}

/// Error log
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::log_level!($crate::logger::LogLevel::Error, $($arg)*)
    };
}
