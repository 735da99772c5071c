//! Dual-sink persistence for validated readings.
//!
//! Every reading goes to two independent destinations that share the same base
//! name and the same three columns:
//!
//! - **append sink** (`.csv`): one row appended per reading, header written when
//!   the file is created. A crash can at worst truncate the last row.
//! - **rewrite sink** (`.xlsx`): the whole workbook is read back, the row added in
//!   memory, and the complete table written out again. This costs O(n) per
//!   reading and is not atomic; a crash mid-write can corrupt this file but never
//!   the append sink.
//!
//! The two sinks are attempted independently. A failing sink is logged and
//! reported in the [`PersistReport`], it never aborts the other sink or the
//! session.
//!
//! Both destinations are fixed once per session through [`SinkTargets`].
//!
//! TODO: replace the rewrite-on-every-reading workbook with an append-only
//! columnar file once downstream tooling no longer needs `.xlsx`.

use crate::error::AppResult;
use crate::parser::Reading;
use chrono::NaiveDateTime;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

pub mod csv_sink;
pub mod queue;
pub mod xlsx_sink;

pub use csv_sink::CsvSink;
pub use queue::{PersistQueue, PersistSummary};
pub use xlsx_sink::XlsxSink;

/// Column titles shared by both sinks.
pub const COLUMNS: [&str; 3] = ["Timestamp", "MPU6050 Data", "Flex Sensor Data"];

/// Base name used when the operator does not supply one.
pub const DEFAULT_PREFIX: &str = "sensor_data";

/// Timestamp suffix appended to every base name.
pub const FILENAME_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Extension of the append sink file.
pub const CSV_EXTENSION: &str = "csv";
/// Extension of the rewrite sink file.
pub const XLSX_EXTENSION: &str = "xlsx";

/// A table destination that accepts one reading at a time.
pub trait TableSink: Send + Sync {
    /// Short name used in log lines ("csv", "xlsx").
    fn name(&self) -> &'static str;

    /// Destination file.
    fn path(&self) -> &Path;

    /// Add one row for `reading`, creating the destination if necessary.
    fn append_row(&self, reading: &Reading) -> AppResult<()>;

    /// Read back all data rows (header excluded), in file order.
    ///
    /// A missing destination reads as an empty table.
    fn rows(&self) -> AppResult<Vec<Vec<String>>>;
}

/// Where one sink writes and whether it is used at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkDescriptor {
    /// Destination file.
    pub path: PathBuf,
    /// Whether the sink is attempted at all.
    pub enabled: bool,
}

/// The pair of destinations chosen at session start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkTargets {
    /// CSV destination.
    pub append: SinkDescriptor,
    /// XLSX destination.
    pub rewrite: SinkDescriptor,
}

impl SinkTargets {
    /// Derive both destinations from an optional operator-supplied name.
    ///
    /// `custom_name` that is `None` or blank falls back to [`DEFAULT_PREFIX`].
    /// The same `started_at` stamp is used for both files so they always pair up.
    pub fn derive(
        output_dir: &Path,
        custom_name: Option<&str>,
        started_at: NaiveDateTime,
        csv_enabled: bool,
        xlsx_enabled: bool,
    ) -> Self {
        let base = base_name(custom_name, started_at);
        Self {
            append: SinkDescriptor {
                path: output_dir.join(format!("{base}.{CSV_EXTENSION}")),
                enabled: csv_enabled,
            },
            rewrite: SinkDescriptor {
                path: output_dir.join(format!("{base}.{XLSX_EXTENSION}")),
                enabled: xlsx_enabled,
            },
        }
    }

    /// Create the parent directories of every enabled destination.
    pub fn ensure_dirs(&self) -> AppResult<()> {
        for descriptor in [&self.append, &self.rewrite] {
            if !descriptor.enabled {
                continue;
            }
            if let Some(parent) = descriptor.path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }
        Ok(())
    }

    /// True unless both sinks are disabled.
    pub fn any_enabled(&self) -> bool {
        self.append.enabled || self.rewrite.enabled
    }
}

/// `<custom>_<YYYYMMDD_HHMMSS>`, or `sensor_data_<YYYYMMDD_HHMMSS>`.
pub fn base_name(custom_name: Option<&str>, started_at: NaiveDateTime) -> String {
    let stamp = started_at.format(FILENAME_TIMESTAMP_FORMAT);
    match custom_name.map(str::trim).filter(|name| !name.is_empty()) {
        Some(name) => format!("{name}_{stamp}"),
        None => format!("{DEFAULT_PREFIX}_{stamp}"),
    }
}

/// Result of attempting a single sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkOutcome {
    /// The row was added.
    Written,
    /// The sink is switched off for this session.
    Disabled,
    /// The sink failed; carries the error text.
    Failed(String),
}

impl SinkOutcome {
    /// True only for [`SinkOutcome::Written`].
    pub fn is_written(&self) -> bool {
        matches!(self, SinkOutcome::Written)
    }
}

impl fmt::Display for SinkOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkOutcome::Written => write!(f, "written"),
            SinkOutcome::Disabled => write!(f, "disabled"),
            SinkOutcome::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Per-sink outcome of persisting one reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistReport {
    /// Outcome of the CSV sink.
    pub append: SinkOutcome,
    /// Outcome of the XLSX sink.
    pub rewrite: SinkOutcome,
}

impl PersistReport {
    /// True when at least one sink accepted the row.
    pub fn any_written(&self) -> bool {
        self.append.is_written() || self.rewrite.is_written()
    }

    /// True when at least one sink failed.
    pub fn any_failed(&self) -> bool {
        matches!(self.append, SinkOutcome::Failed(_)) || matches!(self.rewrite, SinkOutcome::Failed(_))
    }
}

/// Writes readings to the append and rewrite sinks of one session.
pub struct SinkWriter {
    targets: SinkTargets,
    append: Box<dyn TableSink>,
    rewrite: Box<dyn TableSink>,
}

impl fmt::Debug for SinkWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkWriter")
            .field("targets", &self.targets)
            .finish_non_exhaustive()
    }
}

impl SinkWriter {
    /// CSV append sink plus XLSX rewrite sink at the given targets.
    pub fn new(targets: SinkTargets) -> Self {
        let append = Box::new(CsvSink::new(targets.append.path.clone()));
        let rewrite = Box::new(XlsxSink::new(targets.rewrite.path.clone()));
        Self::with_sinks(targets, append, rewrite)
    }

    /// Use custom sink implementations. `targets` still decides which are enabled.
    pub fn with_sinks(
        targets: SinkTargets,
        append: Box<dyn TableSink>,
        rewrite: Box<dyn TableSink>,
    ) -> Self {
        Self {
            targets,
            append,
            rewrite,
        }
    }

    /// Destinations this writer was built for.
    pub fn targets(&self) -> &SinkTargets {
        &self.targets
    }

    /// Persist `reading` to both sinks, isolating failures per sink.
    ///
    /// Never returns an error: failures are logged and surface as
    /// [`SinkOutcome::Failed`] in the report.
    pub fn persist(&self, reading: &Reading) -> PersistReport {
        let report = PersistReport {
            append: attempt(&self.targets.append, self.append.as_ref(), reading),
            rewrite: attempt(&self.targets.rewrite, self.rewrite.as_ref(), reading),
        };

        if report.any_written() {
            info!("[{}] Data Logged:\n{}\n", reading.timestamp(), reading.frame());
        }
        report
    }
}

fn attempt(descriptor: &SinkDescriptor, sink: &dyn TableSink, reading: &Reading) -> SinkOutcome {
    if !descriptor.enabled {
        return SinkOutcome::Disabled;
    }
    match sink.append_row(reading) {
        Ok(()) => {
            debug!(sink = sink.name(), path = %sink.path().display(), "Row written");
            SinkOutcome::Written
        }
        Err(e) => {
            error!(
                sink = sink.name(),
                path = %sink.path().display(),
                "Failed to write {} sink: {}",
                sink.name(),
                e
            );
            SinkOutcome::Failed(e.to_string())
        }
    }
}

/// Stateless form of [`SinkWriter::persist`].
pub fn persist(reading: &Reading, targets: &SinkTargets) -> PersistReport {
    SinkWriter::new(targets.clone()).persist(reading)
}
