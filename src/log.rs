//! Levelled diagnostics on stderr.
//!
//! Each level is switched on by a cargo feature (`log-error`, `log-warn`,
//! `log-info`, `log-debug`, `log-trace`); enabling a level enables every level
//! above it. A disabled macro expands to `()`, so its arguments are never
//! formatted.

use colored::{ColoredString, Colorize};
use std::fmt;
use std::io::{self, Write};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn label(self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }

    fn painted(self) -> ColoredString {
        let label = format!("{:<5}", self.label());
        match self {
            LogLevel::Trace => label.dimmed(),
            LogLevel::Debug => label.blue(),
            LogLevel::Info => label.green(),
            LogLevel::Warn => label.yellow().bold(),
            LogLevel::Error => label.red().bold(),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Plain rendering of one diagnostic line, without colours.
pub fn format_line(level: LogLevel, target: &str, message: fmt::Arguments<'_>) -> String {
    format!("[{:<5}] {}: {}", level.label(), target, message)
}

pub fn emit(level: LogLevel, target: &str, message: fmt::Arguments<'_>) {
    let stderr = io::stderr();
    let mut handle = stderr.lock();
    // A broken stderr must never take a writer down with it.
    let _ = writeln!(handle, "[{}] {}: {}", level.painted(), target.dimmed(), message);
}

#[macro_export]
macro_rules! log_at {
    ($lvl:expr, $($arg:tt)*) => {
        $crate::log::emit($lvl, module_path!(), format_args!($($arg)*))
    };
}

// ---------------------- ERROR ----------------------
#[cfg(feature = "log-error")]
#[macro_export]
macro_rules! log_error { ($($arg:tt)*) => { $crate::log_at!($crate::log::LogLevel::Error, $($arg)*) } }

#[cfg(not(feature = "log-error"))]
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        ()
    };
}

// ---------------------- WARN -----------------------
#[cfg(feature = "log-warn")]
#[macro_export]
macro_rules! log_warn { ($($arg:tt)*) => { $crate::log_at!($crate::log::LogLevel::Warn, $($arg)*) } }

#[cfg(not(feature = "log-warn"))]
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        ()
    };
}

// ---------------------- INFO -----------------------
#[cfg(feature = "log-info")]
#[macro_export]
macro_rules! log_info { ($($arg:tt)*) => { $crate::log_at!($crate::log::LogLevel::Info, $($arg)*) } }

#[cfg(not(feature = "log-info"))]
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        ()
    };
}

// ---------------------- DEBUG ----------------------
#[cfg(feature = "log-debug")]
#[macro_export]
macro_rules! log_debug { ($($arg:tt)*) => { $crate::log_at!($crate::log::LogLevel::Debug, $($arg)*) } }

#[cfg(not(feature = "log-debug"))]
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        ()
    };
}

// ---------------------- TRACE ----------------------
#[cfg(feature = "log-trace")]
#[macro_export]
macro_rules! log_trace { ($($arg:tt)*) => { $crate::log_at!($crate::log::LogLevel::Trace, $($arg)*) } }

#[cfg(not(feature = "log-trace"))]
#[macro_export]
macro_rules! log_trace {
    ($($arg:tt)*) => {
        ()
    };
}
