// Destinations for capturing sink output and for injecting faults into it.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

// =============================================================================
// In-memory capture
// =============================================================================

/// Cloneable in-memory destination; every clone appends to the same buffer.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        let bytes = self.bytes.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_owned).collect()
    }

    pub fn len(&self) -> usize {
        self.bytes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// =============================================================================
// Fault injection
// =============================================================================

/// Passes writes through to `inner` until the trigger text shows up, then
/// fails.
///
/// Bytes before the trigger are written first, so a record containing the
/// trigger fails partway through, not up front.
#[derive(Debug)]
pub struct FaultyWriter<W> {
    inner: W,
    trigger: Vec<u8>,
    faults: usize,
}

impl<W: Write> FaultyWriter<W> {
    pub fn new(inner: W, trigger: impl Into<String>) -> Self {
        FaultyWriter {
            inner,
            trigger: trigger.into().into_bytes(),
            faults: 0,
        }
    }

    pub fn faults(&self) -> usize {
        self.faults
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    fn trigger_at(&self, buf: &[u8]) -> Option<usize> {
        if self.trigger.is_empty() || buf.len() < self.trigger.len() {
            return None;
        }
        buf.windows(self.trigger.len())
            .position(|window| window == self.trigger.as_slice())
    }
}

impl<W: Write> Write for FaultyWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.trigger_at(buf) {
            Some(0) => {
                self.faults += 1;
                Err(io::Error::new(
                    io::ErrorKind::Other,
                    "destination rejected record",
                ))
            }
            Some(pos) => self.inner.write(&buf[..pos]),
            None => self.inner.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

// =============================================================================
// Slow destination
// =============================================================================

/// Accepts at most one byte per call and yields the thread in between, which
/// gives any missing mutual exclusion every chance to show up as interleaved
/// output.
#[derive(Debug)]
pub struct TrickleWriter<W> {
    inner: W,
}

impl<W: Write> TrickleWriter<W> {
    pub fn new(inner: W) -> Self {
        TrickleWriter { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for TrickleWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let written = self.inner.write(&buf[..1])?;
        thread::yield_now();
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
