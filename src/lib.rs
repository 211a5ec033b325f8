// Serialized line output shared between threads.
//
// - `lock`: fair ticket lock with a scoped guard and a manual acquire/release pair
// - `sink`: `SynchronizedSink`, one uninterrupted record per `write`, lock always released
// - `naked`: the same sink with manual unlock, leaks its lock on the first failure
// - `counter`: lock-free atomic counter next to a read-then-write racy one
// - `scenario`: concurrent writer driver and output audit
// - `console`: process-wide stdout sink
// - `destination`: capture and fault-injection writers

#[macro_use]
pub mod log;

pub mod config;
pub mod console;
pub mod counter;
pub mod destination;
pub mod error;
pub mod lock;
pub mod naked;
pub mod scenario;
pub mod sink;

pub use config::{Config, DemoConfig, SinkConfig};
pub use console::shared_print;
pub use counter::{AtomicCounter, Counter, RacyCounter};
pub use error::{ConfigError, LockError, SinkError};
pub use lock::{LockGuard, LockState, TicketLock};
pub use naked::NakedSink;
pub use sink::SynchronizedSink;
