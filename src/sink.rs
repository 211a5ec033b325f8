//! Line-oriented sink shared by many writer threads.
//!
//! Every `write` takes the sink's [`TicketLock`] through a scoped guard, emits
//! the record and its terminator as one unit, and lets the guard release the
//! lock when it goes out of scope. Whatever the destination does, whether it
//! errors halfway through or panics, the next writer gets in and its record
//! starts on a fresh line.

use crate::config::SinkConfig;
use crate::counter::{AtomicCounter, Counter};
use crate::error::SinkError;
use crate::lock::{LockGuard, LockState, TicketLock};
use std::fmt;
use std::io::{self, Write};
use std::time::Duration;

pub struct SynchronizedSink<W> {
    destination: TicketLock<Outlet<W>>,
    terminator: String,
    flush_each_record: bool,
    acquire_timeout: Option<Duration>,
    written: AtomicCounter,
    failed: AtomicCounter,
}

impl<W: Write> SynchronizedSink<W> {
    pub fn new(destination: W) -> Self {
        Self::with_config(destination, &SinkConfig::default())
    }

    pub fn with_config(destination: W, config: &SinkConfig) -> Self {
        SynchronizedSink {
            destination: TicketLock::new(Outlet::new(destination)),
            terminator: config.terminator.clone(),
            flush_each_record: config.flush_each_record,
            acquire_timeout: config.acquire_timeout(),
            written: AtomicCounter::new(),
            failed: AtomicCounter::new(),
        }
    }

    // =========================================================================
    // Writing
    // =========================================================================

    /// Appends `record` plus the terminator.
    ///
    /// Blocks until the lock is free, or until the configured acquire timeout
    /// runs out.
    pub fn write(&self, record: &str) -> Result<(), SinkError> {
        let guard = self.hold()?;
        self.append_held(guard, record)
    }

    pub fn write_timeout(&self, record: &str, timeout: Duration) -> Result<(), SinkError> {
        let guard = self.destination.lock_timeout(timeout)?;
        self.append_held(guard, record)
    }

    /// Writes only if no other writer holds or waits for the lock.
    pub fn try_write(&self, record: &str) -> Result<(), SinkError> {
        let guard = self.destination.try_lock()?;
        self.append_held(guard, record)
    }

    pub fn flush(&self) -> Result<(), SinkError> {
        let mut guard = self.hold()?;
        guard.writer.flush()?;
        Ok(())
    }

    fn hold(&self) -> Result<LockGuard<'_, Outlet<W>>, SinkError> {
        let guard = match self.acquire_timeout {
            Some(timeout) => self.destination.lock_timeout(timeout)?,
            None => self.destination.lock(),
        };
        Ok(guard)
    }

    fn append_held(
        &self,
        mut guard: LockGuard<'_, Outlet<W>>,
        record: &str,
    ) -> Result<(), SinkError> {
        let result = guard.append(record, &self.terminator, self.flush_each_record);
        drop(guard);

        match result {
            Ok(()) => {
                self.written.increment();
                crate::log_trace!("appended record of {} bytes", record.len());
                Ok(())
            }
            Err(err) => {
                self.failed.increment();
                crate::log_warn!("record of {} bytes not written: {}", record.len(), err);
                Err(SinkError::Destination(err))
            }
        }
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub fn state(&self) -> LockState {
        self.destination.state()
    }

    pub fn records_written(&self) -> u64 {
        self.written.get()
    }

    pub fn failed_writes(&self) -> u64 {
        self.failed.get()
    }

    pub fn terminator(&self) -> &str {
        &self.terminator
    }

    /// Runs `inspect` against the destination while holding the lock.
    pub fn with_destination<R>(&self, inspect: impl FnOnce(&W) -> R) -> R {
        let guard = self.destination.lock();
        inspect(&guard.writer)
    }

    pub fn into_inner(self) -> W {
        self.destination.into_inner().writer
    }
}

impl<W> fmt::Debug for SynchronizedSink<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SynchronizedSink")
            .field("destination", &self.destination)
            .field("terminator", &self.terminator)
            .field("written", &self.written.get())
            .field("failed", &self.failed.get())
            .finish()
    }
}

// =============================================================================
// Outlet: the destination plus the frame in progress
// =============================================================================

// Progress of the record currently going out. Still set after a write ends
// means the writer left mid-record, by error or by panic.
#[derive(Debug, Clone, Copy)]
struct OpenFrame {
    record_len: usize,
    written: usize,
}

struct Outlet<W> {
    writer: W,
    open: Option<OpenFrame>,
}

impl<W: Write> Outlet<W> {
    fn new(writer: W) -> Self {
        Outlet { writer, open: None }
    }

    /// Finishes the line of a torn record so the next one cannot run into it.
    fn seal(&mut self, terminator: &str) -> io::Result<()> {
        if let Some(frame) = self.open {
            if frame.written > 0 {
                let from = frame.written.saturating_sub(frame.record_len);
                self.writer.write_all(&terminator.as_bytes()[from..])?;
            }
            self.open = None;
        }
        Ok(())
    }

    /// Writes `record` and `terminator` back to back.
    ///
    /// A frame torn by an error is sealed on the spot, best effort. One torn
    /// by a panic stays open and is sealed by the next append.
    fn append(&mut self, record: &str, terminator: &str, flush: bool) -> io::Result<()> {
        self.seal(terminator)?;

        let mut frame = Vec::with_capacity(record.len() + terminator.len());
        frame.extend_from_slice(record.as_bytes());
        frame.extend_from_slice(terminator.as_bytes());

        let mut written = 0;
        self.open = Some(OpenFrame {
            record_len: record.len(),
            written,
        });
        while written < frame.len() {
            let err = match self.writer.write(&frame[written..]) {
                Ok(0) => io::Error::new(io::ErrorKind::WriteZero, "destination accepted no bytes"),
                Ok(n) => {
                    written += n;
                    self.open = Some(OpenFrame {
                        record_len: record.len(),
                        written,
                    });
                    continue;
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => err,
            };

            let _ = self.seal(terminator);
            return Err(err);
        }
        self.open = None;

        if flush {
            self.writer.flush()?;
        }
        Ok(())
    }
}
