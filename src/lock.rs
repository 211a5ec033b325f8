//! A fair, blocking lock that owns the value it protects.
//!
//! Waiters are served in ticket order, so every writer that asks for the lock
//! eventually gets it. Access goes through one of two disciplines:
//!
//! - scoped: [`TicketLock::lock`] returns a [`LockGuard`] whose `Drop` releases
//!   the lock on every exit path, including `?` returns and panics;
//! - manual: [`TicketLock::acquire`] followed by an explicit
//!   [`TicketLock::release`]. Any early exit between the two leaves the lock
//!   held forever. Kept for [`crate::naked::NakedSink`].

use crate::error::LockError;
use std::cell::UnsafeCell;
use std::collections::BTreeSet;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Free,
    Held,
}

// =============================================================================
// Ticket bookkeeping
// =============================================================================

#[derive(Debug, Default)]
struct Tickets {
    next: u64,
    serving: u64,
    held: bool,
    // Tickets whose owners gave up waiting; skipped on release.
    abandoned: BTreeSet<u64>,
}

impl Tickets {
    fn take(&mut self) -> u64 {
        let ticket = self.next;
        self.next += 1;
        ticket
    }

    fn advance(&mut self) {
        self.held = false;
        self.serving += 1;
        while self.abandoned.remove(&self.serving) {
            self.serving += 1;
        }
    }
}

pub struct TicketLock<T> {
    tickets: Mutex<Tickets>,
    turn: Condvar,
    data: UnsafeCell<T>,
}

// SAFETY: access to `data` is serialized by the ticket protocol.
unsafe impl<T: Send> Send for TicketLock<T> {}
unsafe impl<T: Send> Sync for TicketLock<T> {}

impl<T> TicketLock<T> {
    pub fn new(value: T) -> Self {
        TicketLock {
            tickets: Mutex::new(Tickets::default()),
            turn: Condvar::new(),
            data: UnsafeCell::new(value),
        }
    }

    // No user code ever runs while this mutex is held, so a poisoned state is
    // still consistent.
    fn queue(&self) -> MutexGuard<'_, Tickets> {
        self.tickets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Manual discipline
    // =========================================================================

    /// Blocks until this caller's turn comes, then marks the lock held.
    pub fn acquire(&self) {
        let mut tickets = self.queue();
        let ticket = tickets.take();
        while tickets.serving != ticket {
            tickets = self
                .turn
                .wait(tickets)
                .unwrap_or_else(PoisonError::into_inner);
        }
        tickets.held = true;
    }

    /// Like [`acquire`](Self::acquire), but gives up after `timeout`.
    ///
    /// A caller that times out forfeits its place in the queue; later waiters
    /// are not held up by it. A timeout too large to express as a deadline
    /// waits without bound.
    pub fn acquire_timeout(&self, timeout: Duration) -> Result<(), LockError> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            self.acquire();
            return Ok(());
        };
        let mut tickets = self.queue();
        let ticket = tickets.take();

        while tickets.serving != ticket {
            let now = Instant::now();
            if now >= deadline {
                tickets.abandoned.insert(ticket);
                return Err(LockError::Timeout { waited: timeout });
            }
            tickets = self
                .turn
                .wait_timeout(tickets, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        tickets.held = true;
        Ok(())
    }

    /// Takes the lock only if nobody holds it and nobody is queued for it.
    pub fn try_acquire(&self) -> Result<(), LockError> {
        let mut tickets = self.queue();
        if tickets.held || tickets.serving != tickets.next {
            return Err(LockError::WouldBlock);
        }
        tickets.take();
        tickets.held = true;
        Ok(())
    }

    /// Hands the lock to the next queued waiter.
    ///
    /// # Safety
    ///
    /// The caller must own the current hold, taken through one of the manual
    /// `acquire` methods, and must not have touched the data through a pointer
    /// obtained earlier once this returns. Releasing a hold that belongs to a
    /// live [`LockGuard`] lets two parties reach the data at once.
    pub unsafe fn release(&self) -> Result<(), LockError> {
        let mut tickets = self.queue();
        if !tickets.held {
            return Err(LockError::NotHeld);
        }
        tickets.advance();
        drop(tickets);
        self.turn.notify_all();
        Ok(())
    }

    /// Raw pointer to the protected value, for use between a manual
    /// `acquire` and `release`.
    pub fn data_ptr(&self) -> *mut T {
        self.data.get()
    }

    // =========================================================================
    // Scoped discipline
    // =========================================================================

    pub fn lock(&self) -> LockGuard<'_, T> {
        self.acquire();
        LockGuard::new(self)
    }

    pub fn lock_timeout(&self, timeout: Duration) -> Result<LockGuard<'_, T>, LockError> {
        self.acquire_timeout(timeout)?;
        Ok(LockGuard::new(self))
    }

    pub fn try_lock(&self) -> Result<LockGuard<'_, T>, LockError> {
        self.try_acquire()?;
        Ok(LockGuard::new(self))
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub fn state(&self) -> LockState {
        if self.queue().held {
            LockState::Held
        } else {
            LockState::Free
        }
    }

    /// Number of callers currently queued behind the holder.
    pub fn waiting(&self) -> usize {
        let tickets = self.queue();
        let outstanding = tickets.next - tickets.serving;
        let queued = outstanding - u64::from(tickets.held) - tickets.abandoned.len() as u64;
        queued as usize
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: Default> Default for TicketLock<T> {
    fn default() -> Self {
        TicketLock::new(T::default())
    }
}

impl<T> fmt::Debug for TicketLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TicketLock")
            .field("state", &self.state())
            .field("waiting", &self.waiting())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Guard
// =============================================================================

/// Scoped hold on a [`TicketLock`]; the lock is released when this drops.
pub struct LockGuard<'a, T> {
    lock: &'a TicketLock<T>,
    _not_send: PhantomData<*const ()>,
}

// SAFETY: sharing the guard only hands out `&T`.
unsafe impl<T: Sync> Sync for LockGuard<'_, T> {}

impl<'a, T> LockGuard<'a, T> {
    fn new(lock: &'a TicketLock<T>) -> Self {
        LockGuard {
            lock,
            _not_send: PhantomData,
        }
    }
}

impl<T> Deref for LockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard's existence proves the hold.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for LockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard's existence proves the hold, and `&mut self`
        // makes this the only live reference.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for LockGuard<'_, T> {
    fn drop(&mut self) {
        // SAFETY: this guard owns the current hold and ends here.
        let _ = unsafe { self.lock.release() };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel;
    use std::sync::Arc;
    use std::thread;

    fn wait_for_queue(lock: &TicketLock<Vec<u32>>, len: usize) {
        while lock.waiting() < len {
            thread::yield_now();
        }
    }

    #[test]
    fn test_initial_state_is_free() {
        let lock = TicketLock::new(0);
        assert_eq!(lock.state(), LockState::Free);
        assert_eq!(lock.waiting(), 0);
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let lock = TicketLock::new(1);
        {
            let mut guard = lock.lock();
            *guard += 1;
            assert_eq!(lock.state(), LockState::Held);
        }
        assert_eq!(lock.state(), LockState::Free);
        assert_eq!(lock.into_inner(), 2);
    }

    #[test]
    fn test_guard_releases_on_early_return() {
        fn bump_then_fail(lock: &TicketLock<u32>) -> Result<(), String> {
            let mut guard = lock.lock();
            *guard += 1;
            let step: u32 = "not a number".parse().map_err(|_| "body failed".to_string())?;
            *guard += step;
            Ok(())
        }

        let lock = TicketLock::new(0);
        assert!(bump_then_fail(&lock).is_err());
        assert_eq!(lock.state(), LockState::Free);
        assert_eq!(*lock.try_lock().unwrap(), 1);
    }

    #[test]
    fn test_guard_releases_on_panic() {
        let lock = Arc::new(TicketLock::new(0));
        let worker = Arc::clone(&lock);
        let result = thread::spawn(move || {
            let _guard = worker.lock();
            panic!("intentional panic while holding the lock");
        })
        .join();

        assert!(result.is_err());
        assert_eq!(lock.state(), LockState::Free);
        assert!(lock.try_lock().is_ok());
    }

    #[test]
    fn test_try_lock_fails_while_held() {
        let lock = TicketLock::new(());
        let _guard = lock.lock();
        assert_eq!(lock.try_lock().err(), Some(LockError::WouldBlock));
    }

    #[test]
    fn test_lock_timeout_reports_wait() {
        let lock = TicketLock::new(());
        let _guard = lock.lock();
        let waited = Duration::from_millis(20);
        assert_eq!(
            lock.lock_timeout(waited).err(),
            Some(LockError::Timeout { waited })
        );
    }

    #[test]
    fn test_lock_timeout_with_maximal_duration() {
        let lock = Arc::new(TicketLock::new(0));
        *lock.lock_timeout(Duration::MAX).unwrap() += 1;

        // Also while contended: waits for the holder instead of overflowing.
        let guard = lock.lock();
        let waiter = Arc::clone(&lock);
        let handle = thread::spawn(move || {
            *waiter.lock_timeout(Duration::MAX).unwrap() += 1;
        });
        while lock.waiting() < 1 {
            thread::yield_now();
        }
        drop(guard);
        handle.join().unwrap();

        assert_eq!(*lock.lock(), 2);
    }

    #[test]
    fn test_abandoned_ticket_does_not_stall_next_waiter() {
        let lock = Arc::new(TicketLock::new(Vec::new()));
        let guard = lock.lock();

        // Queues behind the holder, then gives up.
        assert!(lock.lock_timeout(Duration::from_millis(10)).is_err());

        let waiter = Arc::clone(&lock);
        let handle = thread::spawn(move || {
            waiter.lock().push(7);
        });
        wait_for_queue(&lock, 1);
        drop(guard);

        handle.join().unwrap();
        assert_eq!(lock.state(), LockState::Free);
        assert_eq!(*lock.lock(), vec![7]);
    }

    #[test]
    fn test_waiters_are_served_in_arrival_order() {
        let lock = Arc::new(TicketLock::new(Vec::new()));
        let guard = lock.lock();

        let mut handles = Vec::new();
        for id in 0..4 {
            let waiter = Arc::clone(&lock);
            handles.push(thread::spawn(move || {
                waiter.lock().push(id);
            }));
            wait_for_queue(&lock, id as usize + 1);
        }
        drop(guard);

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(*lock.lock(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_every_contender_eventually_acquires() {
        const WRITERS: usize = 8;
        const ROUNDS: usize = 200;

        let lock = Arc::new(TicketLock::new(0usize));
        let (done_tx, done_rx) = channel::unbounded();

        for id in 0..WRITERS {
            let lock = Arc::clone(&lock);
            let done_tx = done_tx.clone();
            thread::spawn(move || {
                for _ in 0..ROUNDS {
                    *lock.lock() += 1;
                }
                done_tx.send(id).unwrap();
            });
        }

        let mut finished = Vec::new();
        for _ in 0..WRITERS {
            let id = done_rx
                .recv_timeout(Duration::from_secs(10))
                .expect("a writer starved");
            finished.push(id);
        }
        finished.sort_unstable();
        assert_eq!(finished, (0..WRITERS).collect::<Vec<_>>());
        assert_eq!(*lock.lock(), WRITERS * ROUNDS);
    }

    #[test]
    fn test_manual_release_requires_hold() {
        let lock = TicketLock::new(());
        assert_eq!(unsafe { lock.release() }, Err(LockError::NotHeld));

        lock.acquire();
        assert_eq!(lock.state(), LockState::Held);
        assert_eq!(unsafe { lock.release() }, Ok(()));
        assert_eq!(lock.state(), LockState::Free);
    }

    #[test]
    fn test_manual_acquire_without_release_leaks() {
        let lock = TicketLock::new(());
        lock.acquire();
        // No release: the lock never becomes free again.
        assert_eq!(lock.state(), LockState::Held);
        assert!(lock.lock_timeout(Duration::from_millis(20)).is_err());
        assert_eq!(lock.state(), LockState::Held);
    }
}
