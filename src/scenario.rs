//! Concurrent writer driver and the audit that checks what it produced.

use crate::sink::SynchronizedSink;
use rand::Rng;
use std::collections::HashMap;
use std::io::Write;
use std::panic;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterReport {
    pub writer: usize,
    pub written: usize,
    pub failed: usize,
}

pub fn record_text(tag: &str, writer: usize, index: usize) -> String {
    format!("{tag}-{writer}: {index}")
}

/// Runs `writers` scoped threads against `sink`, each writing `records`
/// uniquely tagged records with a random pause of up to `max_jitter` between
/// them. Returns one report per writer, in writer order.
pub fn spawn_writers<W: Write + Send>(
    sink: &SynchronizedSink<W>,
    writers: usize,
    records: usize,
    tag: &str,
    max_jitter: Duration,
) -> Vec<WriterReport> {
    let max_jitter_us = max_jitter.as_micros() as u64;

    thread::scope(|s| {
        let handles: Vec<_> = (0..writers)
            .map(|writer| {
                s.spawn(move || {
                    let mut rng = rand::thread_rng();
                    let mut report = WriterReport {
                        writer,
                        ..WriterReport::default()
                    };
                    for index in 0..records {
                        match sink.write(&record_text(tag, writer, index)) {
                            Ok(()) => report.written += 1,
                            Err(_) => report.failed += 1,
                        }
                        if max_jitter_us > 0 {
                            thread::sleep(Duration::from_micros(rng.gen_range(0..=max_jitter_us)));
                        }
                    }
                    report
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| handle.join().unwrap_or_else(|payload| panic::resume_unwind(payload)))
            .collect()
    })
}

// =============================================================================
// Audit
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Audit {
    pub expected: usize,
    pub total: usize,
    pub intact: usize,
    /// Lines that are not exactly one expected record: fragments, two records
    /// run together, or duplicates.
    pub foreign: Vec<String>,
    pub missing: usize,
    /// Records that appear before an earlier record of the same writer.
    pub out_of_order: usize,
}

impl Audit {
    pub fn is_clean(&self) -> bool {
        self.foreign.is_empty()
            && self.missing == 0
            && self.out_of_order == 0
            && self.total == self.expected
    }
}

/// Splits `output` on `terminator` and checks it against the records
/// [`spawn_writers`] would have produced for the same parameters.
pub fn audit(output: &str, terminator: &str, writers: usize, records: usize, tag: &str) -> Audit {
    let mut pending: HashMap<String, (usize, usize)> = (0..writers)
        .flat_map(|writer| (0..records).map(move |index| (writer, index)))
        .map(|(writer, index)| (record_text(tag, writer, index), (writer, index)))
        .collect();
    let mut last_index: Vec<Option<usize>> = vec![None; writers];
    let mut audit = Audit {
        expected: writers * records,
        ..Audit::default()
    };

    for line in output.split_terminator(terminator) {
        audit.total += 1;
        match pending.remove(line) {
            Some((writer, index)) => {
                audit.intact += 1;
                if last_index[writer].is_some_and(|last| last > index) {
                    audit.out_of_order += 1;
                }
                last_index[writer] = Some(index);
            }
            None => audit.foreign.push(line.to_string()),
        }
    }
    audit.missing = pending.len();
    audit
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destination::{FaultyWriter, SharedBuffer, TrickleWriter};

    #[test]
    fn test_three_writers_hundred_records_each() {
        let buffer = SharedBuffer::new();
        let sink = SynchronizedSink::new(TrickleWriter::new(buffer.clone()));

        let reports = spawn_writers(&sink, 3, 100, "stress", Duration::ZERO);
        assert!(reports.iter().all(|r| r.written == 100 && r.failed == 0));

        let audit = audit(&buffer.contents(), "\n", 3, 100, "stress");
        assert_eq!(audit.total, 300);
        assert_eq!(audit.intact, 300);
        assert!(audit.is_clean(), "{audit:?}");
    }

    #[test]
    fn test_jittered_writers_stay_clean() {
        let buffer = SharedBuffer::new();
        let sink = SynchronizedSink::new(buffer.clone());

        spawn_writers(&sink, 4, 25, "jitter", Duration::from_micros(200));
        assert!(audit(&buffer.contents(), "\n", 4, 25, "jitter").is_clean());
    }

    #[test]
    fn test_reports_count_failures() {
        let buffer = SharedBuffer::new();
        // Only writer 1's record 7 contains "-1: 7".
        let sink = SynchronizedSink::new(FaultyWriter::new(buffer.clone(), "-1: 7"));

        let reports = spawn_writers(&sink, 2, 10, "f", Duration::ZERO);
        assert_eq!(reports[0], WriterReport { writer: 0, written: 10, failed: 0 });
        assert_eq!(reports[1], WriterReport { writer: 1, written: 9, failed: 1 });

        let audit = audit(&buffer.contents(), "\n", 2, 10, "f");
        assert_eq!(audit.intact, 19);
        assert_eq!(audit.missing, 1);
        assert_eq!(audit.foreign, vec!["f".to_string()]);
    }

    #[test]
    fn test_audit_flags_interleaved_records() {
        let output = "t-0: 0\nt-1: t-0: 10\n: 0\n";
        let audit = audit(output, "\n", 2, 2, "t");

        assert_eq!(audit.intact, 1);
        assert_eq!(audit.foreign.len(), 2);
        assert_eq!(audit.missing, 3);
        assert!(!audit.is_clean());
    }

    #[test]
    fn test_audit_flags_reordered_writer() {
        let output = "t-0: 1\nt-0: 0\n";
        let audit = audit(output, "\n", 1, 2, "t");
        assert_eq!(audit.out_of_order, 1);
        assert!(!audit.is_clean());
    }

    #[test]
    fn test_audit_flags_duplicates() {
        let audit = audit("t-0: 0\nt-0: 0\n", "\n", 1, 1, "t");
        assert_eq!(audit.foreign, vec!["t-0: 0".to_string()]);
        assert!(!audit.is_clean());
    }
}
