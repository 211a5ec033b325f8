//! The manual lock/unlock sink. Do not use it for anything but comparison.
//!
//! Each write is `acquire`, append, `release` as three separate statements.
//! The append uses `?`, so a destination error returns before `release` runs
//! and the lock stays held for the rest of the process: every later writer
//! blocks forever. [`crate::sink::SynchronizedSink`] is the same sink with the
//! release tied to a guard's lifetime.

use crate::error::SinkError;
use crate::lock::{LockState, TicketLock};
use std::io::Write;
use std::time::Duration;

pub struct NakedSink<W> {
    lock: TicketLock<W>,
    terminator: String,
}

impl<W: Write> NakedSink<W> {
    pub fn new(destination: W) -> Self {
        NakedSink {
            lock: TicketLock::new(destination),
            terminator: "\n".to_string(),
        }
    }

    pub fn write(&self, record: &str) -> Result<(), SinkError> {
        self.lock.acquire();
        self.write_acquired(record)
    }

    pub fn try_write(&self, record: &str) -> Result<(), SinkError> {
        self.lock.try_acquire()?;
        self.write_acquired(record)
    }

    /// Gives up after `timeout`; the only way to observe a leaked lock
    /// without hanging the caller.
    pub fn write_within(&self, record: &str, timeout: Duration) -> Result<(), SinkError> {
        self.lock.acquire_timeout(timeout)?;
        self.write_acquired(record)
    }

    // Callers have just acquired the lock.
    fn write_acquired(&self, record: &str) -> Result<(), SinkError> {
        // SAFETY: the hold taken by the caller keeps everyone else out until
        // the release below.
        let destination = unsafe { &mut *self.lock.data_ptr() };
        destination.write_all(record.as_bytes())?;
        destination.write_all(self.terminator.as_bytes())?;
        destination.flush()?;

        // Only reached on success.
        // SAFETY: the caller's hold; `destination` is not used past this point.
        unsafe { self.lock.release() }?;
        Ok(())
    }

    pub fn state(&self) -> LockState {
        self.lock.state()
    }

    pub fn into_inner(self) -> W {
        self.lock.into_inner()
    }
}
