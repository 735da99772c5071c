//! Single-writer persistence queue.
//!
//! Readings are handed to one worker on the blocking pool which persists them
//! one after another. The control loop never waits for disk I/O, and the
//! rewrite sink never sees two read-modify-write cycles at once.

use super::{PersistReport, SinkWriter};
use crate::parser::Reading;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::error;

/// Totals over every reading the queue persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistSummary {
    /// Readings taken off the queue.
    pub readings: usize,
    /// Rows added to the append sink.
    pub append_written: usize,
    /// Rows added to the rewrite sink.
    pub rewrite_written: usize,
    /// Readings that no sink accepted.
    pub lost: usize,
}

impl PersistSummary {
    fn record(&mut self, report: &PersistReport) {
        self.readings += 1;
        if report.append.is_written() {
            self.append_written += 1;
        }
        if report.rewrite.is_written() {
            self.rewrite_written += 1;
        }
        if !report.any_written() {
            self.lost += 1;
        }
    }
}

/// Handle to the persistence worker of one session.
#[derive(Debug)]
pub struct PersistQueue {
    tx: Option<mpsc::UnboundedSender<Reading>>,
    worker: Option<JoinHandle<PersistSummary>>,
    pending: Arc<AtomicUsize>,
}

impl PersistQueue {
    /// Start the worker. Must be called from within a Tokio runtime.
    pub fn spawn(writer: Arc<SinkWriter>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Reading>();
        let pending = Arc::new(AtomicUsize::new(0));
        let worker_pending = Arc::clone(&pending);

        let worker = tokio::task::spawn_blocking(move || {
            let mut summary = PersistSummary::default();
            while let Some(reading) = rx.blocking_recv() {
                match panic::catch_unwind(AssertUnwindSafe(|| writer.persist(&reading))) {
                    Ok(report) => summary.record(&report),
                    Err(_) => {
                        error!("Unexpected Error: sink writer panicked at {}", reading.timestamp());
                        summary.readings += 1;
                        summary.lost += 1;
                    }
                }
                worker_pending.fetch_sub(1, Ordering::SeqCst);
            }
            summary
        });

        Self {
            tx: Some(tx),
            worker: Some(worker),
            pending,
        }
    }

    /// Queue a reading. Returns false once the queue has been finished.
    pub fn submit(&self, reading: Reading) -> bool {
        let Some(tx) = self.tx.as_ref() else {
            return false;
        };
        self.pending.fetch_add(1, Ordering::SeqCst);
        if tx.send(reading).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            error!("Persistence worker is gone; reading dropped");
            return false;
        }
        true
    }

    /// Readings submitted but not yet persisted.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Stop accepting readings and wait until every queued one is persisted.
    ///
    /// Nothing queued is cancelled. Later calls return an empty summary.
    pub async fn finish(&mut self) -> PersistSummary {
        self.tx.take();
        let Some(worker) = self.worker.take() else {
            return PersistSummary::default();
        };
        match worker.await {
            Ok(summary) => summary,
            Err(e) => {
                error!("Persistence worker failed: {}", e);
                PersistSummary::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppResult, LoggerError};
    use crate::parser::parse_frame;
    use crate::sink::{SinkTargets, TableSink};
    use chrono::NaiveDate;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    /// In-memory table that records rows in arrival order.
    #[derive(Clone, Default)]
    struct MemorySink {
        rows: Arc<Mutex<Vec<Vec<String>>>>,
        fail: bool,
    }

    impl TableSink for MemorySink {
        fn name(&self) -> &'static str {
            "memory"
        }
        fn path(&self) -> &Path {
            Path::new("memory")
        }
        fn append_row(&self, reading: &Reading) -> AppResult<()> {
            if self.fail {
                return Err(LoggerError::Io(std::io::Error::other("unwritable")));
            }
            let mut rows = self.rows.lock().unwrap();
            rows.push(reading.cells().iter().map(|c| c.to_string()).collect());
            Ok(())
        }
        fn rows(&self) -> AppResult<Vec<Vec<String>>> {
            Ok(self.rows.lock().unwrap().clone())
        }
    }

    fn reading(n: u32) -> Reading {
        let raw = format!("MPU6050: ax={n}\nBend Sensor: {n}");
        let at = NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, n % 60))
            .unwrap();
        parse_frame(&raw).unwrap().stamp(at, raw)
    }

    fn writer(append: MemorySink, rewrite: MemorySink) -> Arc<SinkWriter> {
        let targets = SinkTargets::derive(
            &PathBuf::from("."),
            None,
            NaiveDate::from_ymd_opt(2024, 1, 1)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .unwrap(),
            true,
            true,
        );
        Arc::new(SinkWriter::with_sinks(
            targets,
            Box::new(append),
            Box::new(rewrite),
        ))
    }

    #[tokio::test]
    async fn persists_in_submission_order() {
        let append = MemorySink::default();
        let rewrite = MemorySink::default();
        let mut queue = PersistQueue::spawn(writer(append.clone(), rewrite.clone()));

        for n in 0..20 {
            assert!(queue.submit(reading(n)));
        }
        let summary = queue.finish().await;

        assert_eq!(summary.readings, 20);
        assert_eq!(summary.append_written, 20);
        assert_eq!(summary.rewrite_written, 20);
        assert_eq!(summary.lost, 0);
        assert_eq!(queue.pending(), 0);

        let rows = rewrite.rows().unwrap();
        for (n, row) in rows.iter().enumerate() {
            assert_eq!(row[2], format!("Bend Sensor: {n}"));
        }
        assert_eq!(append.rows().unwrap(), rows);
    }

    #[tokio::test]
    async fn counts_lost_readings() {
        let failing = MemorySink {
            fail: true,
            ..Default::default()
        };
        let mut queue = PersistQueue::spawn(writer(failing.clone(), failing));
        queue.submit(reading(1));
        let summary = queue.finish().await;
        assert_eq!(summary.readings, 1);
        assert_eq!(summary.lost, 1);
    }

    #[tokio::test]
    async fn submit_after_finish_is_refused() {
        let mut queue = PersistQueue::spawn(writer(MemorySink::default(), MemorySink::default()));
        queue.finish().await;
        assert!(!queue.submit(reading(1)));
        assert_eq!(queue.finish().await, PersistSummary::default());
    }
}
