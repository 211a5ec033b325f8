//! Process-wide stdout sink.
//!
//! Built on first use and never torn down, so no writer can outlive it. All
//! stdout output that may race with other threads should go through here.

use crate::error::SinkError;
use crate::sink::SynchronizedSink;
use std::io::{self, Stdout, Write};

lazy_static::lazy_static! {
    static ref CONSOLE: SynchronizedSink<Stdout> = console_sink(io::stdout());
}

/// The sink the console is built from, over any destination.
pub fn console_sink<W: Write>(out: W) -> SynchronizedSink<W> {
    SynchronizedSink::new(out)
}

pub fn console() -> &'static SynchronizedSink<Stdout> {
    &CONSOLE
}

/// Prints `msg` as one uninterrupted line.
pub fn shared_print(msg: &str) -> Result<(), SinkError> {
    CONSOLE.write(msg)
}
