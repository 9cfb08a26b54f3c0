//! Console logging.
//!
//! The teaching kernel writes diagnostics through a spinlock-guarded serial
//! teletype and a handful of `info!`/`debug!`/`warning!` macros supplied by
//! its architecture crate. There is no `log`/`tracing` dependency to swap in
//! here: the kernel's own diagnostics never leave the machine, so a thin
//! macro over a locked writer is the idiom, not a gap to fill with a crate.
//! Hosted here over stderr instead of a COM port.

use crate::sync::SpinLock;
use std::io::Write;

#[doc(hidden)]
pub static CONSOLE: SpinLock<()> = SpinLock::new(());

/// Writes a formatted diagnostic line, serialized against concurrent writers.
#[doc(hidden)]
pub fn write_line(level: &str, args: std::fmt::Arguments<'_>) {
    let _guard = CONSOLE.lock();
    let mut stderr = std::io::stderr();
    let _ = writeln!(stderr, "[{level}] {args}");
}

/// Logs an informational message (e.g. a completed format/mount, an eviction
/// decision).
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        $crate::log::write_line("info", format_args!($($arg)*))
    };
}

/// Logs a debug-level message (e.g. sector-level allocation bookkeeping).
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        $crate::log::write_line("debug", format_args!($($arg)*))
    };
}

/// Logs a warning (e.g. a free-map allocation shortfall, a corrupt-metadata
/// condition about to be escalated to a panic).
#[macro_export]
macro_rules! warning {
    ($($arg:tt)*) => {
        $crate::log::write_line("warning", format_args!($($arg)*))
    };
}
