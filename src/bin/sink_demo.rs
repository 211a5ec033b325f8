//! Shared counters and shared output, with and without proper synchronization.
//!
//! Run with: cargo run --bin sink_demo -- [config.toml]

use colored::Colorize;
use guarded_sink::destination::{FaultyWriter, SharedBuffer};
use guarded_sink::scenario::{self, WriterReport};
use guarded_sink::{
    log_warn, shared_print, AtomicCounter, Config, NakedSink, RacyCounter,
    SynchronizedSink,
};
use std::env;
use std::io::{self, Write};
use std::path::Path;
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

// Every line of the demo goes through the shared console sink.
fn say(line: impl AsRef<str>) {
    if let Err(err) = shared_print(line.as_ref()) {
        log_warn!("console write failed: {}", err);
    }
}

fn banner(title: &str) {
    say(format!("\n=== {} ===", title).bold().to_string());
}

fn verdict(ok: bool, text: String) {
    if ok {
        say(format!("  {} {}", "ok".green().bold(), text));
    } else {
        say(format!("  {} {}", "!!".red().bold(), text));
    }
}

// =============================================================================
// I + II: shared counters
// =============================================================================

fn counters(config: &Config) {
    let threads = config.demo.counter_threads;
    let increments = config.demo.increments_per_thread;
    let expected = (threads * increments) as u64;

    banner("Racy counter (load, then store)");
    let racy = guarded_sink::counter::run_increments(&RacyCounter::new(), threads, increments);
    verdict(
        racy == expected,
        format!("{threads} threads x {increments} -> {racy} (expected {expected}, lost {})", expected - racy),
    );

    banner("Atomic counter (fetch_add)");
    let atomic = guarded_sink::counter::run_increments(&AtomicCounter::new(), threads, increments);
    verdict(
        atomic == expected,
        format!("{threads} threads x {increments} -> {atomic} (expected {expected})"),
    );
}

// =============================================================================
// IV A: manual lock / unlock
// =============================================================================

fn naked_sink(config: &Config) {
    banner("Manual lock/unlock with a failing destination");
    let wait = Duration::from_millis(config.demo.deadlock_probe_ms);
    let sink = NakedSink::new(FaultyWriter::new(SharedBuffer::new(), "FAIL"));

    for record in ["naked: 0", "naked: 1 FAIL", "naked: 2"] {
        match sink.write_within(record, wait) {
            Ok(()) => say(format!("  wrote {record:?}")),
            Err(err) if err.is_timeout() => verdict(
                false,
                format!("{record:?} still waiting after {wait:?}: lock leaked ({:?})", sink.state()),
            ),
            Err(err) => say(format!("  {record:?} failed: {err}")),
        }
    }
}

// =============================================================================
// IV B: scoped lock
// =============================================================================

fn scoped_sink(config: &Config) {
    banner("Scoped lock with a failing destination");
    let wait = Duration::from_millis(config.demo.deadlock_probe_ms);
    let sink = SynchronizedSink::with_config(
        FaultyWriter::new(SharedBuffer::new(), "FAIL"),
        &config.sink,
    );

    for record in ["scoped: 0", "scoped: 1 FAIL", "scoped: 2"] {
        match sink.write_timeout(record, wait) {
            Ok(()) => say(format!("  wrote {record:?}")),
            Err(err) => say(format!("  {record:?} failed: {err}")),
        }
    }
    verdict(
        sink.records_written() == 2,
        format!("lock is {:?}; later writers were not blocked", sink.state()),
    );

    let writers = config.demo.writers;
    let records = config.demo.records_per_writer;
    banner(&format!("{writers} writers x {records} records"));

    let buffer = SharedBuffer::new();
    let sink = SynchronizedSink::with_config(buffer.clone(), &config.sink);
    let jitter = Duration::from_micros(config.demo.max_jitter_us);
    let reports = scenario::spawn_writers(&sink, writers, records, "stress", jitter);

    for WriterReport { writer, written, failed } in &reports {
        say(format!("  writer {writer}: {written} written, {failed} failed"));
    }
    let audit = scenario::audit(&buffer.contents(), sink.terminator(), writers, records, "stress");
    verdict(
        audit.is_clean(),
        format!(
            "{} lines, {} intact, {} foreign, {} missing, {} out of order",
            audit.total,
            audit.intact,
            audit.foreign.len(),
            audit.missing,
            audit.out_of_order
        ),
    );
}

// =============================================================================
// Console
// =============================================================================

// Bypasses the console sink on purpose: each line goes out in three pieces,
// so the two threads' pieces can mix on one line.
fn racing_stdout() {
    banner("Two threads printing straight to stdout, piece by piece");
    fn pieces(who: &str) {
        let stdout = io::stdout();
        for i in 0..5 {
            for piece in [format!("  {who}"), format!(": {i}"), "\n".to_string()] {
                let _ = stdout.lock().write_all(piece.as_bytes());
                thread::yield_now();
            }
        }
    }
    thread::scope(|s| {
        s.spawn(|| pieces("worker"));
        pieces("main");
    });
}

fn console_threads() {
    banner("Two threads printing through the console sink");
    thread::scope(|s| {
        s.spawn(|| {
            for i in 0..5 {
                say(format!("  worker: {i}"));
            }
        });
        for i in 0..5 {
            say(format!("  main: {i}"));
        }
    });
}

fn main() -> ExitCode {
    let config = match env::args().nth(1) {
        Some(path) => match Config::load(Path::new(&path)) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("{} {}", "error:".red().bold(), err);
                return ExitCode::FAILURE;
            }
        },
        None => Config::default(),
    };

    banner("Shared state across threads");
    say(format!("  hardware threads: {}", num_cpus::get()));
    say(format!("  main thread: {:?}", thread::current().id()));

    counters(&config);
    naked_sink(&config);
    scoped_sink(&config);
    racing_stdout();
    console_threads();

    banner("Key Points");
    say("1. A read-then-write increment loses updates; fetch_add does not");
    say("2. Manual unlock is skipped by any early return and leaks the lock");
    say("3. A guard releases the lock on every exit path, errors and panics included");
    say("4. Unsynchronized pieces can mix on one line; a sink write never splits a record");

    ExitCode::SUCCESS
}
