//! Append-only CSV sink.
use super::TableSink;
use crate::error::AppResult;
#[cfg(not(feature = "storage_csv"))]
use crate::error::LoggerError;
use crate::parser::Reading;
use std::path::{Path, PathBuf};

/// A writer for CSV files.
///
/// The file is opened in append mode for every row, so rows written before a
/// crash are never rewritten.
#[derive(Debug, Clone)]
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    /// Sink appending to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[cfg(feature = "storage_csv")]
impl TableSink for CsvSink {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn append_row(&self, reading: &Reading) -> AppResult<()> {
        use std::fs::OpenOptions;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        // A new (or still empty) file gets the header in the same flush as the row.
        let needs_header = file.metadata()?.len() == 0;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if needs_header {
            writer.write_record(super::COLUMNS)?;
        }
        writer.write_record(reading.cells())?;
        writer.flush()?;
        Ok(())
    }

    fn rows(&self) -> AppResult<Vec<Vec<String>>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(&self.path)?;
        let mut rows = Vec::new();
        for record in reader.records() {
            rows.push(record?.iter().map(str::to_owned).collect());
        }
        Ok(rows)
    }
}

#[cfg(not(feature = "storage_csv"))]
impl TableSink for CsvSink {
    fn name(&self) -> &'static str {
        "csv"
    }
    fn path(&self) -> &Path {
        &self.path
    }
    fn append_row(&self, _reading: &Reading) -> AppResult<()> {
        Err(LoggerError::FeatureNotEnabled("storage_csv".to_string()))
    }
    fn rows(&self) -> AppResult<Vec<Vec<String>>> {
        Err(LoggerError::FeatureNotEnabled("storage_csv".to_string()))
    }
}

#[cfg(all(test, feature = "storage_csv"))]
mod tests {
    use super::*;
    use crate::parser::parse_frame;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn reading(secs: u32, imu: &str, flex: &str) -> Reading {
        let raw = format!("{imu}\n{flex}");
        let at = NaiveDate::from_ymd_opt(2024, 5, 6)
            .and_then(|d| d.and_hms_opt(7, 8, secs))
            .unwrap();
        parse_frame(&raw).unwrap().stamp(at, raw)
    }

    #[test]
    fn first_row_writes_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let sink = CsvSink::new(&path);

        sink.append_row(&reading(0, "MPU6050: ax=1", "Bend Sensor: 200")).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "Timestamp,MPU6050 Data,Flex Sensor Data\n2024-05-06 07:08:00,MPU6050: ax=1,Bend Sensor: 200\n"
        );
    }

    #[test]
    fn appends_n_rows_with_single_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let sink = CsvSink::new(&path);

        for i in 0..5 {
            sink.append_row(&reading(i, &format!("MPU6050: ax={i}"), "Bend Sensor: 1"))
                .unwrap();
        }

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("Timestamp,").count(), 1);

        let rows = sink.rows().unwrap();
        assert_eq!(rows.len(), 5);
        for (i, row) in rows.iter().enumerate() {
            assert_eq!(row[1], format!("MPU6050: ax={i}"));
        }
    }

    #[test]
    fn multi_line_blocks_round_trip_through_quoting() {
        let dir = tempdir().unwrap();
        let sink = CsvSink::new(dir.path().join("log.csv"));
        let r = reading(1, "MPU6050: ax=1\nMPU6050: gx=2", "Bend Sensor: \"3\"");

        sink.append_row(&r).unwrap();

        let rows = sink.rows().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0], vec![r.timestamp(), r.primary_block(), r.secondary_block()]);
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = tempdir().unwrap();
        let sink = CsvSink::new(dir.path().join("absent.csv"));
        assert!(sink.rows().unwrap().is_empty());
    }

    #[test]
    fn unwritable_destination_is_an_error() {
        let dir = tempdir().unwrap();
        // A directory cannot be opened for appending.
        let sink = CsvSink::new(dir.path());
        assert!(sink
            .append_row(&reading(0, "MPU6050: a", "Bend Sensor: b"))
            .is_err());
    }
}
